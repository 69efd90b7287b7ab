use chrono::{
    DateTime, Datelike, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};
use chrono_tz::Tz;

use crate::models::{AvailableAppointment, DayOfWeek, SlotTemplate};
use crate::services::intervals::OverlapIndex;

/// Restricts the instances returned beyond the `now` floor.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    /// Keep instances that only partly fall within `[after, before)`.
    pub include_partial: bool,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            after: None,
            before: None,
            include_partial: true,
        }
    }
}

impl Bounds {
    fn admits(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if self.include_partial {
            self.after.map_or(true, |after| end > after)
                && self.before.map_or(true, |before| start < before)
        } else {
            self.after.map_or(true, |after| start >= after)
                && self.before.map_or(true, |before| end <= before)
        }
    }
}

/// Expands weekly slot templates into the open slot instances between `now`
/// and `horizon_days` calendar days ahead, in the timezone of `now`.
///
/// Templates are bucketed by their start weekday. Each calendar day in
/// `[today, today + horizon_days]` generates one window per template starting
/// that weekday; windows are cut into back-to-back instances of the template's
/// duration. An instance is offered while its end is still after `now`, and its
/// remaining capacity is the template capacity minus the booked intervals that
/// overlap it. Instances without capacity are omitted. The result is sorted by
/// start.
pub fn compute_available(
    templates: &[SlotTemplate],
    booked: &impl OverlapIndex,
    now: DateTime<Tz>,
    horizon_days: u32,
    bounds: &Bounds,
) -> Vec<AvailableAppointment> {
    let tz = now.timezone();
    let now_utc = now.with_timezone(&Utc);
    let today = now.date_naive();

    let mut buckets: [Vec<&SlotTemplate>; 7] = Default::default();
    for template in templates {
        buckets[template.start_day.to_index() as usize].push(template);
    }

    let mut result = Vec::new();
    for offset in 0..=horizon_days as u64 {
        let Some(day) = today.checked_add_days(Days::new(offset)) else {
            break;
        };

        if let Some(before) = bounds.before {
            match localize(&tz, day.and_time(NaiveTime::MIN)) {
                Some(midnight) if midnight.with_timezone(&Utc) >= before => break,
                _ => {}
            }
        }

        let weekday = DayOfWeek::from(day.weekday());
        for template in &buckets[weekday.to_index() as usize] {
            expand_window(template, day, &tz, booked, now_utc, bounds, &mut result);
        }
    }

    result.sort_by_key(|a| a.start);

    tracing::debug!(
        templates = templates.len(),
        horizon_days,
        available = result.len(),
        "computed available appointments"
    );
    result
}

fn expand_window(
    template: &SlotTemplate,
    day: NaiveDate,
    tz: &Tz,
    booked: &impl OverlapIndex,
    now: DateTime<Utc>,
    bounds: &Bounds,
    out: &mut Vec<AvailableAppointment>,
) {
    let duration = template.appointment_duration();
    if duration <= Duration::zero() {
        return;
    }

    let Some(window_end) = day
        .checked_add_days(Days::new(template.span_days() as u64))
        .map(|end_day| end_day.and_time(template.end_time))
    else {
        return;
    };
    let mut cursor = day.and_time(template.start_time);

    while let Some(slot_end) = cursor.checked_add_signed(duration) {
        if slot_end > window_end {
            break;
        }
        if let Some(available) =
            open_instance(template, tz, cursor, slot_end, booked, now, bounds)
        {
            out.push(available);
        }
        cursor = slot_end;
    }
}

fn open_instance(
    template: &SlotTemplate,
    tz: &Tz,
    start: NaiveDateTime,
    end: NaiveDateTime,
    booked: &impl OverlapIndex,
    now: DateTime<Utc>,
    bounds: &Bounds,
) -> Option<AvailableAppointment> {
    let (Some(start), Some(end)) = (localize(tz, start), localize(tz, end)) else {
        tracing::warn!(
            slot_template_id = %template.id,
            %start,
            "slot instance does not exist in service timezone, skipping"
        );
        return None;
    };

    let (start_utc, end_utc) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
    if end_utc <= now || start_utc >= end_utc || !bounds.admits(start_utc, end_utc) {
        return None;
    }

    let taken = booked.count_overlapping(start_utc, end_utc) as i64;
    let amount = template.max_appointments_per_slot - taken;
    if amount <= 0 {
        return None;
    }

    Some(AvailableAppointment {
        slot_template_id: template.id.clone(),
        start: start.fixed_offset(),
        end: end.fixed_offset(),
        amount,
    })
}

/// Resolves a wall-clock time in `tz`. Folds take the earlier instant; times
/// inside a gap move forward by one hour.
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&naive.checked_add_signed(Duration::hours(1))?)
            .earliest(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::intervals::SortedIntervals;

    // 2025-06-16 is a Monday
    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, m, 0).unwrap()
    }

    fn now_at(d: u32, h: u32, m: u32) -> DateTime<Tz> {
        utc(d, h, m).with_timezone(&Tz::UTC)
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn template(
        id: &str,
        start_day: DayOfWeek,
        start: &str,
        end_day: DayOfWeek,
        end: &str,
        minutes: i64,
        capacity: i64,
    ) -> SlotTemplate {
        SlotTemplate {
            id: id.to_string(),
            service_id: "svc".to_string(),
            start_day,
            end_day,
            start_time: time(start),
            end_time: time(end),
            appointment_duration_minutes: minutes,
            max_appointments_per_slot: capacity,
        }
    }

    fn monday_morning(capacity: i64) -> SlotTemplate {
        template("mon", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "09:00", 30, capacity)
    }

    fn booked(intervals: &[(DateTime<Utc>, DateTime<Utc>)]) -> SortedIntervals {
        SortedIntervals::new(intervals.to_vec())
    }

    fn summary(result: &[AvailableAppointment]) -> Vec<(DateTime<Utc>, DateTime<Utc>, i64)> {
        result
            .iter()
            .map(|a| (a.start.with_timezone(&Utc), a.end.with_timezone(&Utc), a.amount))
            .collect()
    }

    #[test]
    fn test_open_template_full_capacity() {
        let result = compute_available(
            &[monday_morning(3)],
            &booked(&[]),
            now_at(16, 1, 0),
            0,
            &Bounds::default(),
        );
        assert_eq!(
            summary(&result),
            vec![(utc(16, 8, 0), utc(16, 8, 30), 3), (utc(16, 8, 30), utc(16, 9, 0), 3)]
        );
        assert!(result.iter().all(|a| a.slot_template_id == "mon"));
    }

    #[test]
    fn test_booking_decrements_matching_slot() {
        let result = compute_available(
            &[monday_morning(3)],
            &booked(&[(utc(16, 8, 0), utc(16, 8, 30))]),
            now_at(16, 1, 0),
            0,
            &Bounds::default(),
        );
        assert_eq!(
            summary(&result),
            vec![(utc(16, 8, 0), utc(16, 8, 30), 2), (utc(16, 8, 30), utc(16, 9, 0), 3)]
        );
    }

    #[test]
    fn test_elapsed_slot_excluded() {
        let result = compute_available(
            &[monday_morning(3)],
            &booked(&[]),
            now_at(16, 8, 40),
            0,
            &Bounds::default(),
        );
        assert_eq!(summary(&result), vec![(utc(16, 8, 30), utc(16, 9, 0), 3)]);
    }

    #[test]
    fn test_wide_booking_consumes_every_overlapped_slot() {
        let result = compute_available(
            &[monday_morning(1)],
            &booked(&[(utc(16, 8, 0), utc(16, 8, 45))]),
            now_at(16, 1, 0),
            0,
            &Bounds::default(),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_horizon_includes_next_week() {
        let single = template("mon", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "08:30", 30, 1);
        let result = compute_available(&[single], &booked(&[]), now_at(16, 1, 0), 7, &Bounds::default());
        assert_eq!(
            summary(&result),
            vec![(utc(16, 8, 0), utc(16, 8, 30), 1), (utc(23, 8, 0), utc(23, 8, 30), 1)]
        );
    }

    #[test]
    fn test_started_slot_offered_until_it_ends() {
        let single = template("mon", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "08:30", 30, 1);

        let mid_slot = compute_available(
            std::slice::from_ref(&single),
            &booked(&[]),
            now_at(16, 8, 15),
            0,
            &Bounds::default(),
        );
        assert_eq!(summary(&mid_slot), vec![(utc(16, 8, 0), utc(16, 8, 30), 1)]);

        let at_end = compute_available(&[single], &booked(&[]), now_at(16, 8, 30), 0, &Bounds::default());
        assert!(at_end.is_empty());
    }

    #[test]
    fn test_weekend_wraparound_has_no_gaps() {
        let weekend = template("wknd", DayOfWeek::Friday, "22:00", DayOfWeek::Monday, "02:00", 60, 1);
        // Friday 2025-06-20
        let result = compute_available(&[weekend], &booked(&[]), now_at(20, 0, 0), 0, &Bounds::default());

        assert_eq!(result.len(), 76);
        assert_eq!(result[0].start.with_timezone(&Utc), utc(20, 22, 0));
        assert_eq!(result[75].end.with_timezone(&Utc), utc(23, 2, 0));
        for pair in result.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_wraparound_occurrence_from_last_horizon_day() {
        let weekend = template("wknd", DayOfWeek::Friday, "22:00", DayOfWeek::Monday, "02:00", 60, 1);
        // Monday now with a four-day horizon reaches Friday, whose window runs into Monday
        let result = compute_available(&[weekend], &booked(&[]), now_at(16, 1, 0), 4, &Bounds::default());
        assert_eq!(result.len(), 76);
        assert_eq!(result[75].end.with_timezone(&Utc), utc(23, 2, 0));
    }

    #[test]
    fn test_capacity_not_pooled_across_templates() {
        let templates = vec![
            template("early", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "09:00", 30, 2),
            template("late", DayOfWeek::Monday, "09:00", DayOfWeek::Monday, "10:00", 30, 2),
        ];
        let result = compute_available(
            &templates,
            &booked(&[(utc(16, 8, 30), utc(16, 9, 30))]),
            now_at(16, 1, 0),
            0,
            &Bounds::default(),
        );
        assert_eq!(
            summary(&result),
            vec![
                (utc(16, 8, 0), utc(16, 8, 30), 2),
                (utc(16, 8, 30), utc(16, 9, 0), 1),
                (utc(16, 9, 0), utc(16, 9, 30), 1),
                (utc(16, 9, 30), utc(16, 10, 0), 2),
            ]
        );
        assert_eq!(result[1].slot_template_id, "early");
        assert_eq!(result[2].slot_template_id, "late");
    }

    #[test]
    fn test_result_sorted_even_when_templates_unordered() {
        let templates = vec![
            template("late", DayOfWeek::Monday, "13:00", DayOfWeek::Monday, "14:00", 60, 1),
            template("early", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "09:00", 60, 1),
            template("sunday", DayOfWeek::Sunday, "23:00", DayOfWeek::Monday, "01:00", 60, 1),
        ];
        let result = compute_available(&templates, &booked(&[]), now_at(15, 12, 0), 1, &Bounds::default());
        let ids: Vec<_> = result.iter().map(|a| a.slot_template_id.as_str()).collect();
        assert_eq!(ids, vec!["sunday", "sunday", "early", "late"]);
    }

    #[test]
    fn test_result_properties() {
        let templates = vec![
            template("a", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "12:00", 45, 3),
            template("b", DayOfWeek::Wednesday, "22:00", DayOfWeek::Thursday, "03:00", 30, 2),
            template("c", DayOfWeek::Saturday, "10:00", DayOfWeek::Saturday, "11:00", 20, 1),
        ];
        let bookings = booked(&[
            (utc(16, 9, 0), utc(16, 10, 0)),
            (utc(16, 9, 30), utc(16, 9, 45)),
            (utc(18, 23, 0), utc(19, 1, 0)),
            (utc(21, 10, 0), utc(21, 10, 20)),
        ]);
        let now = now_at(16, 9, 10);
        let result = compute_available(&templates, &bookings, now, 14, &Bounds::default());

        assert!(!result.is_empty());
        for a in &result {
            assert!(a.end.with_timezone(&Utc) > now.with_timezone(&Utc));
            let cap = templates
                .iter()
                .find(|t| t.id == a.slot_template_id)
                .unwrap()
                .max_appointments_per_slot;
            assert!(a.amount > 0 && a.amount <= cap);
        }
        for pair in result.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }

        let again = compute_available(&templates, &bookings, now, 14, &Bounds::default());
        assert_eq!(result, again);
    }

    #[test]
    fn test_empty_templates() {
        let result = compute_available(&[], &booked(&[]), now_at(16, 1, 0), 30, &Bounds::default());
        assert!(result.is_empty());
    }

    #[test]
    fn test_degenerate_templates_produce_nothing() {
        let templates = vec![
            template("empty", DayOfWeek::Monday, "09:00", DayOfWeek::Monday, "09:00", 30, 1),
            template("reversed", DayOfWeek::Monday, "17:00", DayOfWeek::Monday, "09:00", 30, 1),
            template("zero", DayOfWeek::Monday, "10:00", DayOfWeek::Monday, "11:00", 0, 1),
        ];
        let result = compute_available(&templates, &booked(&[]), now_at(16, 1, 0), 0, &Bounds::default());
        assert!(result.is_empty());
    }

    #[test]
    fn test_partial_bounds() {
        let t = template("mon", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "10:00", 30, 1);
        let bounds = Bounds {
            after: Some(utc(16, 8, 45)),
            before: Some(utc(16, 9, 15)),
            include_partial: true,
        };
        let result = compute_available(&[t], &booked(&[]), now_at(16, 1, 0), 0, &bounds);
        let starts: Vec<_> = result.iter().map(|a| a.start.with_timezone(&Utc)).collect();
        assert_eq!(starts, vec![utc(16, 8, 30), utc(16, 9, 0)]);
    }

    #[test]
    fn test_strict_bounds() {
        let t = template("mon", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "10:00", 30, 1);
        let bounds = Bounds {
            after: Some(utc(16, 8, 30)),
            before: Some(utc(16, 9, 45)),
            include_partial: false,
        };
        let result = compute_available(&[t], &booked(&[]), now_at(16, 1, 0), 0, &bounds);
        let starts: Vec<_> = result.iter().map(|a| a.start.with_timezone(&Utc)).collect();
        assert_eq!(starts, vec![utc(16, 8, 30), utc(16, 9, 0)]);
    }

    #[test]
    fn test_after_does_not_lift_now_floor() {
        let bounds = Bounds {
            after: Some(utc(16, 7, 0)),
            ..Bounds::default()
        };
        let result = compute_available(&[monday_morning(1)], &booked(&[]), now_at(16, 8, 40), 0, &bounds);
        assert_eq!(summary(&result), vec![(utc(16, 8, 30), utc(16, 9, 0), 1)]);
    }

    #[test]
    fn test_before_stops_day_iteration() {
        let single = template("mon", DayOfWeek::Monday, "08:00", DayOfWeek::Monday, "08:30", 30, 1);
        let bounds = Bounds {
            before: Some(utc(20, 0, 0)),
            ..Bounds::default()
        };
        let result = compute_available(&[single], &booked(&[]), now_at(16, 1, 0), 14, &bounds);
        assert_eq!(summary(&result), vec![(utc(16, 8, 0), utc(16, 8, 30), 1)]);
    }

    #[test]
    fn test_local_times_in_service_timezone() {
        let now = utc(16, 0, 0).with_timezone(&chrono_tz::Europe::Berlin);
        let result = compute_available(&[monday_morning(1)], &booked(&[]), now, 0, &Bounds::default());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].start.to_rfc3339(), "2025-06-16T08:00:00+02:00");
        assert_eq!(result[0].start.with_timezone(&Utc), utc(16, 6, 0));
    }

    #[test]
    fn test_dst_gap_instance_skipped() {
        let berlin = chrono_tz::Europe::Berlin;
        // Clocks jump from 02:00 to 03:00 on Sunday 2025-03-30
        let sunday = template("sun", DayOfWeek::Sunday, "01:00", DayOfWeek::Sunday, "04:00", 60, 1);
        let now = Utc.with_ymd_and_hms(2025, 3, 29, 12, 0, 0).unwrap().with_timezone(&berlin);
        let result = compute_available(&[sunday], &booked(&[]), now, 1, &Bounds::default());

        let starts: Vec<_> = result.iter().map(|a| a.start.with_timezone(&Utc)).collect();
        assert_eq!(
            starts,
            vec![
                Utc.with_ymd_and_hms(2025, 3, 30, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 30, 1, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_localize_fold_takes_earliest() {
        let berlin = chrono_tz::Europe::Berlin;
        // 02:30 happens twice on 2025-10-26
        let naive = NaiveDate::from_ymd_opt(2025, 10, 26).unwrap().and_hms_opt(2, 30, 0).unwrap();
        let dt = localize(&berlin, naive).unwrap();
        assert_eq!(dt.with_timezone(&Utc), Utc.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap());
    }

    #[test]
    fn test_horizon_past_last_representable_day() {
        let daily: Vec<_> = DayOfWeek::ALL
            .iter()
            .map(|&day| template(day.as_str(), day, "08:00", day, "09:00", 60, 1))
            .collect();
        let now = (DateTime::<Utc>::MAX_UTC - Duration::days(3)).with_timezone(&Tz::UTC);

        let result = compute_available(&daily, &booked(&[]), now, 30, &Bounds::default());

        // Generation stops at the last calendar day instead of overflowing
        assert_eq!(result.len(), 3);
        assert_eq!(
            result.last().map(|a| a.start.date_naive()),
            Some(DateTime::<Utc>::MAX_UTC.date_naive())
        );
    }
}
