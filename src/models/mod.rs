pub mod appointment;
pub mod availability;
pub mod service;
pub mod slot_template;
pub mod weekday;

pub use appointment::{Appointment, AppointmentStatus, NewAppointment};
pub use availability::{AvailableAppointment, TemplateAvailability};
pub use service::{Service, MAX_DAYS_IN_ADVANCE};
pub use slot_template::{validate_slot_templates, SlotTemplate, SlotTemplateError, SlotTemplateInput};
pub use weekday::DayOfWeek;
