use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::db::store::AppointmentStore;
use crate::models::{
    Appointment, AppointmentStatus, AvailableAppointment, NewAppointment, Service, SlotTemplate,
    TemplateAvailability,
};
use crate::services::availability::{compute_available, Bounds};
use crate::services::intervals::SortedIntervals;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("no appointment slot starts at {0}")]
    NoSuchSlot(DateTime<Utc>),

    #[error("the appointment slot at {0} is fully booked")]
    FullyBooked(DateTime<Utc>),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Open appointments of a service grouped by slot template, in template order.
///
/// Appointments are fetched once for the whole visible window; fetch errors
/// are returned unchanged.
pub async fn get_available_appointments(
    store: &dyn AppointmentStore,
    service: &Service,
    templates: &[SlotTemplate],
    now: DateTime<Utc>,
    bounds: &Bounds,
) -> anyhow::Result<Vec<TemplateAvailability>> {
    let booked = match fetch_range(templates, service, now, bounds) {
        Some((range_start, range_end)) => {
            store
                .fetch_overlapping(&service.id, range_start, range_end, AppointmentStatus::OPEN)
                .await?
        }
        None => vec![],
    };

    tracing::debug!(
        service_id = %service.id,
        booked = booked.len(),
        "fetched booked appointments"
    );

    let available = available_for(service, templates, &booked, now, bounds);
    Ok(group_by_template(templates, available))
}

/// Flat, start-ordered open appointments for an already fetched set of bookings.
pub fn available_for(
    service: &Service,
    templates: &[SlotTemplate],
    booked: &[Appointment],
    now: DateTime<Utc>,
    bounds: &Bounds,
) -> Vec<AvailableAppointment> {
    let index = SortedIntervals::from_appointments(booked);
    compute_available(
        templates,
        &index,
        now.with_timezone(&service.tz()),
        service.horizon_days(),
        bounds,
    )
}

/// Instant range whose bookings can affect an instance offered under `bounds`.
///
/// Offered instances may have started up to one appointment duration before
/// `max(now, after)`, and may end up to one duration after `before`.
/// Returns `None` when that range is empty.
pub fn fetch_range(
    templates: &[SlotTemplate],
    service: &Service,
    now: DateTime<Utc>,
    bounds: &Bounds,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let longest = templates
        .iter()
        .map(|t| t.appointment_duration())
        .max()
        .unwrap_or_else(Duration::zero)
        .max(Duration::zero());
    let widest_span = templates.iter().map(|t| t.span_days()).max().unwrap_or(0);

    let floor = bounds.after.map_or(now, |after| after.max(now));
    let floor = floor.checked_sub_signed(longest).unwrap_or(floor);
    let horizon_end = now
        .checked_add_signed(Duration::days(service.horizon_days() as i64 + widest_span + 2))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let ceiling = match bounds.before {
        Some(before) => before
            .checked_add_signed(longest)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .min(horizon_end),
        None => horizon_end,
    };

    (floor < ceiling).then_some((floor, ceiling))
}

/// Presentation grouping: one entry per template, keeping each group's order.
pub fn group_by_template(
    templates: &[SlotTemplate],
    available: Vec<AvailableAppointment>,
) -> Vec<TemplateAvailability> {
    let mut by_template: HashMap<String, Vec<AvailableAppointment>> = HashMap::new();
    for appointment in available {
        by_template
            .entry(appointment.slot_template_id.clone())
            .or_default()
            .push(appointment);
    }

    templates
        .iter()
        .map(|template| TemplateAvailability {
            slot_template: template.clone(),
            available_appointments: by_template.remove(&template.id).unwrap_or_default(),
        })
        .collect()
}

/// Books the open slot instance starting exactly at `request.start`.
///
/// Runs against a single connection so the capacity check and the insert see
/// the same bookings.
pub fn book_appointment(
    conn: &Connection,
    service: &Service,
    templates: &[SlotTemplate],
    request: NewAppointment,
    now: DateTime<Utc>,
) -> Result<Appointment, BookingError> {
    let templates: Vec<SlotTemplate> = match &request.slot_template_id {
        Some(id) => templates.iter().filter(|t| &t.id == id).cloned().collect(),
        None => templates.to_vec(),
    };

    let bounds = Bounds {
        after: Some(request.start),
        before: Some(request.start + Duration::seconds(1)),
        include_partial: true,
    };

    let booked = match fetch_range(&templates, service, now, &bounds) {
        Some((range_start, range_end)) => queries::get_appointments_overlapping(
            conn,
            &service.id,
            &range_start,
            &range_end,
            AppointmentStatus::OPEN,
        )?,
        None => vec![],
    };

    let starts_at_request =
        |a: &AvailableAppointment| a.start.with_timezone(&Utc) == request.start;

    let Some(slot) = available_for(service, &templates, &booked, now, &bounds)
        .into_iter()
        .find(starts_at_request)
    else {
        let exists = available_for(service, &templates, &[], now, &bounds)
            .iter()
            .any(starts_at_request);
        return Err(if exists {
            BookingError::FullyBooked(request.start)
        } else {
            BookingError::NoSuchSlot(request.start)
        });
    };

    let appointment = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        service_id: service.id.clone(),
        slot_template_id: Some(slot.slot_template_id),
        customer_name: request.customer_name,
        customer_contact: request.customer_contact,
        start: slot.start.with_timezone(&Utc),
        end: slot.end.with_timezone(&Utc),
        status: AppointmentStatus::Pending,
        notes: request.notes,
        created_at: now,
        updated_at: now,
    };
    queries::create_appointment(conn, &appointment)?;

    tracing::info!(
        service_id = %service.id,
        appointment_id = %appointment.id,
        start = %appointment.start,
        remaining = slot.amount - 1,
        "booked appointment"
    );

    Ok(appointment)
}
