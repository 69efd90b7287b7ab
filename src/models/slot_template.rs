use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::weekday::DayOfWeek;

pub const MIN_APPOINTMENT_MINUTES: i64 = 5;

const MINUTES_PER_DAY: i64 = 24 * 60;
const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;

/// Recurring weekly availability rule of a service.
///
/// The window runs from `start_day` at `start_time` to the next `end_day` at
/// `end_time`, both interpreted as wall-clock times in the service's timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotTemplate {
    pub id: String,
    pub service_id: String,
    pub start_day: DayOfWeek,
    pub end_day: DayOfWeek,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub appointment_duration_minutes: i64,
    pub max_appointments_per_slot: i64,
}

impl SlotTemplate {
    pub fn appointment_duration(&self) -> Duration {
        Duration::minutes(self.appointment_duration_minutes)
    }

    /// Calendar days between the start and the end of one occurrence.
    pub fn span_days(&self) -> i64 {
        self.start_day.days_until(self.end_day) as i64
    }

    /// Length of one concrete occurrence of the window, in minutes.
    ///
    /// Negative or zero for a same-day window whose end is not after its start.
    pub fn window_minutes(&self) -> i64 {
        self.span_days() * MINUTES_PER_DAY + minute_of_day(self.end_time)
            - minute_of_day(self.start_time)
    }

    /// Half-open `[start, end)` minutes since Monday 00:00. `end` may exceed one
    /// week for windows that wrap past Sunday.
    pub fn week_interval(&self) -> (i64, i64) {
        let start = self.start_day.to_index() as i64 * MINUTES_PER_DAY
            + minute_of_day(self.start_time);
        (start, start + self.window_minutes())
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {} - {} {}",
            self.start_day.as_str(),
            self.start_time.format("%H:%M"),
            self.end_day.as_str(),
            self.end_time.format("%H:%M"),
        )
    }
}

fn minute_of_day(t: NaiveTime) -> i64 {
    (t.hour() * 60 + t.minute()) as i64
}

/// Slot template as submitted by a service owner, before it is assigned ids.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotTemplateInput {
    pub start_day: DayOfWeek,
    pub end_day: DayOfWeek,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub appointment_duration_minutes: i64,
    #[serde(default = "default_capacity")]
    pub max_appointments_per_slot: i64,
}

fn default_capacity() -> i64 {
    1
}

impl SlotTemplateInput {
    pub fn into_template(self, service_id: &str) -> SlotTemplate {
        SlotTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            service_id: service_id.to_string(),
            start_day: self.start_day,
            end_day: self.end_day,
            start_time: self.start_time,
            end_time: self.end_time,
            appointment_duration_minutes: self.appointment_duration_minutes,
            max_appointments_per_slot: self.max_appointments_per_slot,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SlotTemplateError {
    #[error("appointment duration must be at least 5 minutes, got {0}")]
    DurationTooShort(i64),

    #[error("max appointments per slot must be positive, got {0}")]
    InvalidCapacity(i64),

    #[error("slot window {window} is shorter than one {minutes} minute appointment")]
    WindowTooShort { window: String, minutes: i64 },

    #[error("slot windows overlap: {first} and {second}")]
    Overlap { first: String, second: String },
}

/// Checks a service's full set of slot templates before it is stored.
pub fn validate_slot_templates(templates: &[SlotTemplate]) -> Result<(), SlotTemplateError> {
    for template in templates {
        if template.appointment_duration_minutes < MIN_APPOINTMENT_MINUTES {
            return Err(SlotTemplateError::DurationTooShort(
                template.appointment_duration_minutes,
            ));
        }
        if template.max_appointments_per_slot < 1 {
            return Err(SlotTemplateError::InvalidCapacity(
                template.max_appointments_per_slot,
            ));
        }
        if template.window_minutes() < template.appointment_duration_minutes {
            return Err(SlotTemplateError::WindowTooShort {
                window: template.describe(),
                minutes: template.appointment_duration_minutes,
            });
        }
    }

    let mut intervals: Vec<(i64, i64, &SlotTemplate)> = templates
        .iter()
        .map(|t| {
            let (start, end) = t.week_interval();
            (start, end, t)
        })
        .collect();
    intervals.sort_by_key(|(start, _, _)| *start);

    for pair in intervals.windows(2) {
        let (_, a_end, a) = pair[0];
        let (b_start, _, b) = pair[1];
        if a_end > b_start {
            return Err(SlotTemplateError::Overlap {
                first: a.describe(),
                second: b.describe(),
            });
        }
    }

    // The window ending latest may run past Sunday into the first one of the week.
    if intervals.len() > 1 {
        let (first_start, _, first) = intervals[0];
        if let Some((_, last_end, last)) = intervals.iter().max_by_key(|(_, end, _)| *end) {
            if *last_end > first_start + MINUTES_PER_WEEK {
                return Err(SlotTemplateError::Overlap {
                    first: last.describe(),
                    second: first.describe(),
                });
            }
        }
    }

    Ok(())
}

pub(crate) mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parses `HH:MM`. `HH:MM:SS` is accepted only on a whole minute.
    pub fn parse(s: &str) -> Result<NaiveTime, String> {
        let t = NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map_err(|_| format!("invalid time format: {s}"))?;
        if t.second() != 0 {
            return Err(format!("time must be on a whole minute: {s}"));
        }
        Ok(t)
    }
}
