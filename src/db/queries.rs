use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection};

use crate::models::{Appointment, AppointmentStatus, DayOfWeek, Service, SlotTemplate};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))?;
    Ok(naive.and_utc())
}

// ── Services ──

pub fn create_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, name, timezone, appointment_days_in_advance, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            service.id,
            service.name,
            service.timezone,
            service.appointment_days_in_advance,
            format_ts(&service.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, name, timezone, appointment_days_in_advance, created_at FROM services WHERE id = ?1",
        params![id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    );

    match result {
        Ok((id, name, timezone, appointment_days_in_advance, created_at)) => Ok(Some(Service {
            id,
            name,
            timezone,
            appointment_days_in_advance,
            created_at: parse_ts(&created_at)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Slot Templates ──

/// Replaces every slot template of a service in one transaction, keeping the
/// given order.
pub fn replace_slot_templates(
    conn: &Connection,
    service_id: &str,
    templates: &[SlotTemplate],
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM slot_templates WHERE service_id = ?1",
        params![service_id],
    )?;
    for (position, t) in templates.iter().enumerate() {
        tx.execute(
            "INSERT INTO slot_templates (id, service_id, position, start_day, end_day, start_time, end_time, appointment_duration_minutes, max_appointments_per_slot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                t.id,
                service_id,
                position as i64,
                t.start_day.to_index(),
                t.end_day.to_index(),
                t.start_time.format("%H:%M").to_string(),
                t.end_time.format("%H:%M").to_string(),
                t.appointment_duration_minutes,
                t.max_appointments_per_slot,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_slot_templates(conn: &Connection, service_id: &str) -> anyhow::Result<Vec<SlotTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, start_day, end_day, start_time, end_time, appointment_duration_minutes, max_appointments_per_slot
         FROM slot_templates WHERE service_id = ?1 ORDER BY position ASC",
    )?;

    let rows = stmt.query_map(params![service_id], |row| Ok(parse_slot_template_row(row)))?;

    let mut templates = vec![];
    for row in rows {
        templates.push(row??);
    }
    Ok(templates)
}

fn parse_slot_template_row(row: &rusqlite::Row) -> anyhow::Result<SlotTemplate> {
    let start_day: u8 = row.get(2)?;
    let end_day: u8 = row.get(3)?;
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;

    Ok(SlotTemplate {
        id: row.get(0)?,
        service_id: row.get(1)?,
        start_day: DayOfWeek::from_index(start_day)
            .with_context(|| format!("invalid stored weekday: {start_day}"))?,
        end_day: DayOfWeek::from_index(end_day)
            .with_context(|| format!("invalid stored weekday: {end_day}"))?,
        start_time: NaiveTime::parse_from_str(&start_time, "%H:%M")
            .with_context(|| format!("invalid stored time: {start_time}"))?,
        end_time: NaiveTime::parse_from_str(&end_time, "%H:%M")
            .with_context(|| format!("invalid stored time: {end_time}"))?,
        appointment_duration_minutes: row.get(6)?,
        max_appointments_per_slot: row.get(7)?,
    })
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "id, service_id, slot_template_id, customer_name, customer_contact, start_at, end_at, status, notes, created_at, updated_at";

pub fn create_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, service_id, slot_template_id, customer_name, customer_contact, start_at, end_at, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            appointment.id,
            appointment.service_id,
            appointment.slot_template_id,
            appointment.customer_name,
            appointment.customer_contact,
            format_ts(&appointment.start),
            format_ts(&appointment.end),
            appointment.status.as_str(),
            appointment.notes,
            format_ts(&appointment.created_at),
            format_ts(&appointment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let result = conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appointment) => Ok(Some(appointment?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Appointments of a service whose `[start, end)` intersects `[range_start, range_end)`
/// and whose status is one of `statuses`, ordered by start.
pub fn get_appointments_overlapping(
    conn: &Connection,
    service_id: &str,
    range_start: &DateTime<Utc>,
    range_end: &DateTime<Utc>,
    statuses: &[AppointmentStatus],
) -> anyhow::Result<Vec<Appointment>> {
    if statuses.is_empty() {
        return Ok(vec![]);
    }

    let placeholders = (0..statuses.len())
        .map(|i| format!("?{}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE service_id = ?1 AND start_at < ?3 AND end_at > ?2 AND status IN ({placeholders})
         ORDER BY start_at ASC"
    );

    let mut params_vec: Vec<Box<dyn ToSql>> = vec![
        Box::new(service_id.to_string()),
        Box::new(format_ts(range_start)),
        Box::new(format_ts(range_end)),
    ];
    for status in statuses {
        params_vec.push(Box::new(status.as_str()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_appointment_row(row)))?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn list_appointments(
    conn: &Connection,
    service_id: &str,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Appointment>> {
    let (sql, params_vec): (String, Vec<Box<dyn ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
                 WHERE service_id = ?1 AND status = ?2 ORDER BY start_at DESC LIMIT ?3"
            ),
            vec![
                Box::new(service_id.to_string()) as Box<dyn ToSql>,
                Box::new(status.to_string()),
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
                 WHERE service_id = ?1 ORDER BY start_at DESC LIMIT ?2"
            ),
            vec![
                Box::new(service_id.to_string()) as Box<dyn ToSql>,
                Box::new(limit),
            ],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_appointment_row(row)))?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
) -> anyhow::Result<bool> {
    let now = format_ts(&Utc::now());
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let start_at: String = row.get(5)?;
    let end_at: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Appointment {
        id: row.get(0)?,
        service_id: row.get(1)?,
        slot_template_id: row.get(2)?,
        customer_name: row.get(3)?,
        customer_contact: row.get(4)?,
        start: parse_ts(&start_at)?,
        end: parse_ts(&end_at)?,
        status: AppointmentStatus::parse(&status),
        notes: row.get(8)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
