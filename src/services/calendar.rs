use crate::models::{Appointment, AppointmentStatus};

const ICS_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn generate_ics(appointment: &Appointment, service_name: &str) -> String {
    let dtstart = appointment.start.format(ICS_FORMAT).to_string();
    let dtend = appointment.end.format(ICS_FORMAT).to_string();
    let dtstamp = appointment.created_at.format(ICS_FORMAT).to_string();
    let uid = format!("{}@marketplace", appointment.id);

    let summary = format!("Appointment with {service_name}");
    let description = appointment
        .notes
        .as_deref()
        .unwrap_or("No additional notes");
    let status = match appointment.status {
        AppointmentStatus::Cancelled => "CANCELLED",
        AppointmentStatus::Confirmed => "CONFIRMED",
        AppointmentStatus::Pending => "TENTATIVE",
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Marketplace//Appointments//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}
