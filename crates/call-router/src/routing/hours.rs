//! Business-hours schedule evaluation.
//!
//! Evaluation happens in the tenant's configured UTC offset. Calendar
//! date exceptions are matched before the weekly pattern; an
//! exception with no time ranges closes the whole day, one with
//! ranges applies those ranges only.

use crate::routing::snapshot::{BusinessHoursConfig, Weekday};
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use tracing::warn;

/// Shift `now` into the schedule's local offset. An out-of-range
/// offset evaluates in UTC.
fn to_local(config: &BusinessHoursConfig, now: DateTime<Utc>) -> DateTime<FixedOffset> {
    let secs = config.utc_offset_minutes.saturating_mul(60);
    match FixedOffset::east_opt(secs) {
        Some(offset) => now.with_timezone(&offset),
        None => {
            warn!(
                target: "router.engine",
                schedule_id = %config.schedule_id,
                utc_offset_minutes = config.utc_offset_minutes,
                "Schedule has an out-of-range UTC offset, evaluating in UTC"
            );
            now.fixed_offset()
        }
    }
}

/// Whether the schedule is open at `now`.
#[must_use]
pub fn is_open(config: &BusinessHoursConfig, now: DateTime<Utc>) -> bool {
    let local = to_local(config, now);
    let date = local.date_naive();
    let time = local.time();

    // Exceptions are matched by calendar date before the weekly
    // pattern.
    if let Some(exception) = config.exceptions.iter().find(|e| e.date == date) {
        return exception.ranges.iter().any(|r| r.contains(time));
    }

    let weekday = Weekday::from_chrono(local.weekday());
    config
        .weekly
        .iter()
        .filter(|d| d.weekday == weekday)
        .flat_map(|d| d.ranges.iter())
        .any(|r| r.contains(time))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::routing::snapshot::{DateException, DayHours, TimeRange};
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use common::types::ScheduleId;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Mon-Fri 09:00-17:00 at UTC-5.
    fn weekday_schedule() -> BusinessHoursConfig {
        let nine_to_five = vec![TimeRange {
            start: t(9, 0),
            end: t(17, 0),
        }];
        BusinessHoursConfig {
            schedule_id: ScheduleId::new(),
            utc_offset_minutes: -300,
            weekly: vec![
                DayHours {
                    weekday: Weekday::Monday,
                    ranges: nine_to_five.clone(),
                },
                DayHours {
                    weekday: Weekday::Tuesday,
                    ranges: nine_to_five.clone(),
                },
                DayHours {
                    weekday: Weekday::Wednesday,
                    ranges: nine_to_five.clone(),
                },
                DayHours {
                    weekday: Weekday::Thursday,
                    ranges: nine_to_five.clone(),
                },
                DayHours {
                    weekday: Weekday::Friday,
                    ranges: nine_to_five,
                },
            ],
            exceptions: vec![],
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_open_during_weekday_hours() {
        // 2026-08-05 is a Wednesday; 15:00 UTC = 10:00 local (UTC-5)
        assert!(is_open(&weekday_schedule(), utc(2026, 8, 5, 15, 0)));
    }

    #[test]
    fn test_closed_outside_weekday_hours() {
        // 13:00 UTC = 08:00 local, before opening
        assert!(!is_open(&weekday_schedule(), utc(2026, 8, 5, 13, 0)));
        // 22:30 UTC = 17:30 local, after closing
        assert!(!is_open(&weekday_schedule(), utc(2026, 8, 5, 22, 30)));
    }

    #[test]
    fn test_closed_on_weekend() {
        // 2026-08-08 is a Saturday; 15:00 UTC = 10:00 local
        assert!(!is_open(&weekday_schedule(), utc(2026, 8, 8, 15, 0)));
    }

    #[test]
    fn test_offset_shifts_the_local_date() {
        // 01:00 UTC Saturday = 20:00 local Friday (UTC-5); the weekly
        // pattern for Friday applies, and 20:00 is after close.
        assert!(!is_open(&weekday_schedule(), utc(2026, 8, 8, 1, 0)));

        // A schedule open Friday evenings catches it.
        let mut schedule = weekday_schedule();
        schedule.weekly.push(DayHours {
            weekday: Weekday::Friday,
            ranges: vec![TimeRange {
                start: t(18, 0),
                end: t(22, 0),
            }],
        });
        assert!(is_open(&schedule, utc(2026, 8, 8, 1, 0)));
    }

    #[test]
    fn test_exception_with_empty_ranges_closes_the_day() {
        // Wednesday would be open, but the exception closes it.
        let mut schedule = weekday_schedule();
        schedule.exceptions.push(DateException {
            date: NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
            ranges: vec![],
        });

        assert!(!is_open(&schedule, utc(2026, 8, 5, 15, 0)));
    }

    #[test]
    fn test_exception_ranges_override_weekly_pattern() {
        // Exception narrows Wednesday to 13:00-14:00 local.
        let mut schedule = weekday_schedule();
        schedule.exceptions.push(DateException {
            date: NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
            ranges: vec![TimeRange {
                start: t(13, 0),
                end: t(14, 0),
            }],
        });

        // 10:00 local would be open weekly, but the exception rules
        assert!(!is_open(&schedule, utc(2026, 8, 5, 15, 0)));
        // 13:30 local falls inside the exception range
        assert!(is_open(&schedule, utc(2026, 8, 5, 18, 30)));
    }

    #[test]
    fn test_exception_on_other_date_does_not_apply() {
        let mut schedule = weekday_schedule();
        schedule.exceptions.push(DateException {
            date: NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            ranges: vec![],
        });

        assert!(is_open(&schedule, utc(2026, 8, 5, 15, 0)));
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let mut schedule = weekday_schedule();
        schedule.utc_offset_minutes = 100_000;

        // 15:00 UTC Wednesday is inside 09:00-17:00 evaluated in UTC
        assert!(is_open(&schedule, utc(2026, 8, 5, 15, 0)));
    }
}
