use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Longest booking horizon a service may be configured with.
pub const MAX_DAYS_IN_ADVANCE: u32 = 366;

/// A bookable service offered by a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub appointment_days_in_advance: u32,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Days ahead that slot instances are generated for, at most
    /// [`MAX_DAYS_IN_ADVANCE`].
    pub fn horizon_days(&self) -> u32 {
        self.appointment_days_in_advance.min(MAX_DAYS_IN_ADVANCE)
    }

    /// Resolves the IANA timezone name, falling back to UTC.
    pub fn tz(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    service_id = %self.id,
                    timezone = %self.timezone,
                    "unknown service timezone, using UTC"
                );
                Tz::UTC
            }
        }
    }
}
