use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A booked, concrete appointment of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub service_id: String,
    pub slot_template_id: Option<String>,
    pub customer_name: String,
    pub customer_contact: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking request for the slot instance starting at `start`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub start: DateTime<Utc>,
    pub slot_template_id: Option<String>,
    pub customer_name: String,
    pub customer_contact: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses that still occupy capacity.
    pub const OPEN: &'static [AppointmentStatus] =
        &[AppointmentStatus::Pending, AppointmentStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => AppointmentStatus::Confirmed,
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Pending,
        }
    }
}
