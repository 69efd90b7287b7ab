use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::db::queries;
use crate::errors::AppError;
use crate::services::calendar::generate_ics;
use crate::state::AppState;

pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    // Strip .ics suffix if present
    let appointment_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);

    let (appointment, service_name) = {
        let db = state.conn()?;
        let appointment = queries::get_appointment_by_id(&db, appointment_id)?
            .ok_or_else(|| AppError::NotFound("appointment not found".to_string()))?;
        let service_name = queries::get_service(&db, &appointment.service_id)?
            .map(|s| s.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Appointment".to_string());
        (appointment, service_name)
    };

    let ics = generate_ics(&appointment, &service_name);
    let filename = format!("appointment-{appointment_id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
