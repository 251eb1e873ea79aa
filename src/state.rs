//! # Application State Management
//!
//! Shared state handed to every HTTP handler and every tuner WebSocket actor.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: Many handlers and actors hold a reference to the same data
//! - **RwLock**: Many readers OR one writer at a time
//! - **Clone**: Cloning `AppState` clones the `Arc`s, never the data behind them
//!
//! ## What lives here:
//! - **config**: Runtime-updatable configuration
//! - **metrics**: Request counters and tuner counters
//! - **sessions**: Registry of open tuner connections (bookkeeping only)
//!
//! No audio or pitch data is ever shared between sessions.

use crate::audio::session::SessionRegistry;
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// The main application state shared across handlers and actors.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Counters updated by middleware and tuner sessions
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Open tuner sessions
    pub sessions: SessionRegistry,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected since server start.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: HTTP load and reliability
/// - **chunks_analyzed / pitches_detected**: How much audio flows and how much of it is tonal
/// - **transport_errors**: Broken or misbehaving tuner connections
/// - **endpoint_metrics**: Per-endpoint statistics
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub chunks_analyzed: u64,
    pub pitches_detected: u64,
    pub transport_errors: u64,
    pub sessions_opened: u64,

    /// Key: endpoint name (e.g., "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    ///
    /// The session registry takes its capacity from
    /// `performance.max_concurrent_sessions`.
    pub fn new(config: AppConfig) -> Self {
        let sessions = SessionRegistry::new(config.performance.max_concurrent_sessions);
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            sessions,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    /// A poisoned lock still holds a valid config, so it is read anyway.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the configuration after validating it.
    ///
    /// The registry capacity follows the new `max_concurrent_sessions`;
    /// sessions already open are never evicted.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;

        self.sessions
            .set_max_sessions(new_config.performance.max_concurrent_sessions);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
        Ok(())
    }

    fn with_metrics(&self, update: impl FnOnce(&mut AppMetrics)) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics);
    }

    pub fn increment_request_count(&self) {
        self.with_metrics(|m| m.request_count += 1);
    }

    pub fn increment_error_count(&self) {
        self.with_metrics(|m| m.error_count += 1);
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        self.with_metrics(|m| {
            let endpoint_metric = m.endpoint_metrics.entry(endpoint.to_string()).or_default();
            endpoint_metric.request_count += 1;
            endpoint_metric.total_duration_ms += duration_ms;
            if is_error {
                endpoint_metric.error_count += 1;
            }
        });
    }

    pub fn record_session_opened(&self) {
        self.with_metrics(|m| m.sessions_opened += 1);
    }

    /// Count one analysed chunk, and whether it produced a pitch.
    pub fn record_chunk(&self, detected: bool) {
        self.with_metrics(|m| {
            m.chunks_analyzed += 1;
            if detected {
                m.pitches_detected += 1;
            }
        });
    }

    pub fn record_transport_error(&self) {
        self.with_metrics(|m| m.transport_errors += 1);
    }

    /// Get a consistent copy of the counters.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    /// Fraction of HTTP requests that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of analysed chunks that contained a detectable pitch.
    pub fn detection_rate(&self) -> f64 {
        if self.chunks_analyzed > 0 {
            self.pitches_detected as f64 / self.chunks_analyzed as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    /// Average = Total Duration / Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_counters() {
        let state = AppState::new(AppConfig::default());
        state.record_chunk(true);
        state.record_chunk(false);
        state.record_chunk(true);
        state.record_transport_error();

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.chunks_analyzed, 3);
        assert_eq!(metrics.pitches_detected, 2);
        assert_eq!(metrics.transport_errors, 1);
        assert!((metrics.detection_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let metrics = state.get_metrics_snapshot();
        let health = &metrics.endpoint_metrics["GET /health"];
        assert_eq!(health.request_count, 2);
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_resizes_registry() {
        let state = AppState::new(AppConfig::default());
        let mut config = state.get_config();
        config.performance.max_concurrent_sessions = 3;

        state.update_config(config).unwrap();
        assert_eq!(state.sessions.max_sessions(), 3);
        assert_eq!(state.get_config().performance.max_concurrent_sessions, 3);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let state = AppState::new(AppConfig::default());
        let mut config = state.get_config();
        config.server.port = 0;

        assert!(state.update_config(config).is_err());
        assert_eq!(state.get_config().server.port, 8080);
        assert_eq!(state.sessions.max_sessions(), 100);
    }
}
