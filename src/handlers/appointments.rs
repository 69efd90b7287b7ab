use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Appointment, NewAppointment, Service, SlotTemplate, TemplateAvailability};
use crate::services::availability::Bounds;
use crate::services::scheduling;
use crate::state::AppState;

fn load_service(state: &AppState, id: &str) -> Result<(Service, Vec<SlotTemplate>), AppError> {
    let db = state.conn()?;
    let service = queries::get_service(&db, id)?
        .ok_or_else(|| AppError::NotFound(format!("service {id}")))?;
    let templates = queries::get_slot_templates(&db, id)?;
    Ok((service, templates))
}

// GET /api/services/:id/appointments/available
#[derive(Deserialize)]
pub struct AvailableQuery {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub include_partial: Option<bool>,
}

pub async fn get_available(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<Vec<TemplateAvailability>>, AppError> {
    let (service, templates) = load_service(&state, &id)?;

    let bounds = Bounds {
        after: query.after,
        before: query.before,
        include_partial: query.include_partial.unwrap_or(true),
    };

    let grouped = scheduling::get_available_appointments(
        state.appointments.as_ref(),
        &service,
        &templates,
        Utc::now(),
        &bounds,
    )
    .await?;

    Ok(Json(grouped))
}

// POST /api/services/:id/appointments
pub async fn book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<NewAppointment>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    if body.customer_name.trim().is_empty() {
        return Err(AppError::Validation("customer name must not be empty".to_string()));
    }

    let db = state.conn()?;
    let service = queries::get_service(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("service {id}")))?;
    let templates = queries::get_slot_templates(&db, &id)?;

    let appointment = scheduling::book_appointment(&db, &service, &templates, body, Utc::now())?;
    Ok((StatusCode::CREATED, Json(appointment)))
}
