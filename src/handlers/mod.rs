pub mod admin;
pub mod appointments;
pub mod calendar;
pub mod services;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/services", post(services::create_service))
        .route("/api/services/:id", get(services::get_service))
        .route(
            "/api/services/:id/slots",
            get(services::get_slots).put(services::replace_slots),
        )
        .route(
            "/api/services/:id/appointments",
            get(admin::list_appointments).post(appointments::book),
        )
        .route(
            "/api/services/:id/appointments/available",
            get(appointments::get_available),
        )
        .route(
            "/api/appointments/:id/cancel",
            post(admin::cancel_appointment),
        )
        .route(
            "/calendar/:appointment_id",
            get(calendar::download_ics),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
