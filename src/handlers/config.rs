use crate::{audio::decoder::SAMPLE_RATE, error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config,
        "audio": {
            "sample_rate": SAMPLE_RATE,
            "channels": 1,
            "bit_depth": 16,
            "configurable": false
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    info!(
        max_concurrent_sessions = current_config.performance.max_concurrent_sessions,
        max_frame_bytes = current_config.tuner.max_frame_bytes,
        "Configuration updated"
    );

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": current_config
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};
    use serde_json::Value;

    macro_rules! config_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .route("/config", web::get().to(get_config))
                    .route("/config", web::put().to(update_config)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_get_config() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = config_app!(state);

        let req = test::TestRequest::get().uri("/config").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["server"]["port"], 8080);
        assert_eq!(body["config"]["tuner"]["max_frame_bytes"], 65536);
        assert_eq!(body["audio"]["sample_rate"], 44_100);
    }

    #[actix_web::test]
    async fn test_partial_update() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = config_app!(state);

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"performance": {"max_concurrent_sessions": 4}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        assert_eq!(state.get_config().performance.max_concurrent_sessions, 4);
        assert_eq!(state.sessions.max_sessions(), 4);
        assert_eq!(state.get_config().server, AppConfig::default().server);
    }

    #[actix_web::test]
    async fn test_invalid_update_is_rejected() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = config_app!(state);

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"tuner": {"client_timeout_secs": 1}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
        assert_eq!(state.get_config(), AppConfig::default());
    }
}
