use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Appointment, AppointmentStatus};

/// Read access to booked appointments, as needed by availability computation.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Appointments of `service_id` whose `[start, end)` intersects
    /// `[range_start, range_end)` and whose status is in `statuses`.
    async fn fetch_overlapping(
        &self,
        service_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> anyhow::Result<Vec<Appointment>>;
}

pub struct SqliteAppointmentStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteAppointmentStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AppointmentStore for SqliteAppointmentStore {
    async fn fetch_overlapping(
        &self,
        service_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> anyhow::Result<Vec<Appointment>> {
        let db = self
            .db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        queries::get_appointments_overlapping(&db, service_id, &range_start, &range_end, statuses)
    }
}
