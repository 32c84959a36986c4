use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Health check handler
/// Returns a simple JSON response indicating the server is running
pub async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "OK"
    })))
}

/// List the synthesis providers this server can actually serve
pub async fn list_providers(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let providers = state.configured_providers();
    if providers.is_empty() {
        return Err(AppError::InternalServerError(
            "No synthesis backend is configured".to_string(),
        ));
    }
    Ok(Json(json!({
        "providers": providers,
        "default": state.config.default_provider,
    })))
}
