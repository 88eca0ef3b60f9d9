use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "agent-relay is running",
        "config": {
            "model": config.upstream.model,
            "request_budget_bytes": config.upstream.request_budget_bytes,
            "idle_read_timeout_secs": config.upstream.idle_read_timeout_secs,
            "session_max_turns": config.session.max_turns,
            "weather_configured": !config.weather.app_code.trim().is_empty(),
            "log_level": config.features.log_level,
        }
    }))
}
