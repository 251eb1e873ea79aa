use crate::{
    audio::note::cents_between,
    audio::tuning::{nearest_string, tuning, TUNINGS},
    error::{AppError, AppResult},
};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct NearestQuery {
    pub frequency: f64,
}

pub async fn list_tunings() -> AppResult<HttpResponse> {
    let presets: Vec<_> = TUNINGS
        .iter()
        .enumerate()
        .map(|(index, preset)| {
            json!({
                "index": index,
                "name": preset.name,
                "strings": preset.strings
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "tunings": presets })))
}

pub async fn nearest_tuning_string(
    path: web::Path<usize>,
    query: web::Query<NearestQuery>,
) -> AppResult<HttpResponse> {
    let index = path.into_inner();
    let frequency = query.frequency;

    let preset = tuning(index)
        .ok_or_else(|| AppError::NotFound(format!("Unknown tuning preset: {}", index)))?;

    if !frequency.is_finite() {
        return Err(AppError::BadRequest(format!("Invalid frequency: {}", frequency)));
    }

    // An undetected pitch (0 Hz) has no nearest string
    let Some(string_index) = nearest_string(preset, frequency) else {
        return Ok(HttpResponse::Ok().json(json!({
            "tuning": preset.name,
            "frequency": frequency,
            "string": null
        })));
    };

    let target = preset.strings[string_index];
    Ok(HttpResponse::Ok().json(json!({
        "tuning": preset.name,
        "frequency": frequency,
        "string": {
            "index": string_index,
            "note": target.note,
            "target_frequency": target.frequency,
            "cents": cents_between(frequency, target.frequency)
        }
    })))
}
