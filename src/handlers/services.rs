use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{
    validate_slot_templates, Service, SlotTemplate, SlotTemplateInput, MAX_DAYS_IN_ADVANCE,
};
use crate::state::AppState;

// POST /api/services
#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub timezone: Option<String>,
    pub appointment_days_in_advance: Option<u32>,
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("service name must not be empty".to_string()));
    }
    let timezone = body
        .timezone
        .unwrap_or_else(|| state.config.default_timezone.clone());
    if timezone.parse::<Tz>().is_err() {
        return Err(AppError::Validation(format!("unknown timezone: {timezone}")));
    }

    let days_in_advance = body
        .appointment_days_in_advance
        .unwrap_or(state.config.default_days_in_advance);
    if days_in_advance > MAX_DAYS_IN_ADVANCE {
        return Err(AppError::Validation(format!(
            "appointment_days_in_advance must be at most {MAX_DAYS_IN_ADVANCE}, got {days_in_advance}"
        )));
    }

    let service = Service {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name.trim().to_string(),
        timezone,
        appointment_days_in_advance: days_in_advance,
        created_at: Utc::now(),
    };

    {
        let db = state.conn()?;
        queries::create_service(&db, &service)?;
    }

    tracing::info!(service_id = %service.id, timezone = %service.timezone, "created service");
    Ok((StatusCode::CREATED, Json(service)))
}

// GET /api/services/:id
pub async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Service>, AppError> {
    let db = state.conn()?;
    let service = queries::get_service(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("service {id}")))?;
    Ok(Json(service))
}

// GET /api/services/:id/slots
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SlotTemplate>>, AppError> {
    let db = state.conn()?;
    if queries::get_service(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("service {id}")));
    }
    Ok(Json(queries::get_slot_templates(&db, &id)?))
}

// PUT /api/services/:id/slots
#[derive(Deserialize)]
pub struct ReplaceSlotsRequest {
    pub slots: Vec<SlotTemplateInput>,
}

pub async fn replace_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReplaceSlotsRequest>,
) -> Result<Json<Vec<SlotTemplate>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let templates: Vec<SlotTemplate> = body
        .slots
        .into_iter()
        .map(|input| input.into_template(&id))
        .collect();
    validate_slot_templates(&templates)?;

    let db = state.conn()?;
    if queries::get_service(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("service {id}")));
    }
    queries::replace_slot_templates(&db, &id, &templates)?;

    tracing::info!(service_id = %id, slots = templates.len(), "replaced slot templates");
    Ok(Json(templates))
}
