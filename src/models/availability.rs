use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::SlotTemplate;

/// One open, bookable slot instance with its remaining capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableAppointment {
    #[serde(skip)]
    pub slot_template_id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub amount: i64,
}

/// Open slot instances grouped under the template that produced them.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateAvailability {
    pub slot_template: SlotTemplate,
    pub available_appointments: Vec<AvailableAppointment>,
}
