//! Execution timing for dispatched actions
//!
//! This module only computes *when* a command becomes executable. The timer
//! or queue that waits for that moment belongs to the action executor.

use crate::error::DispatchError;
use crate::model::Schedule;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When a dispatched command may be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Timing {
    /// Execute right away
    Immediate,
    /// Execute at (or after) the given time; cancellable until then
    Deferred {
        #[serde(rename = "executeAt")]
        execute_at: DateTime<FixedOffset>,
    },
}

impl Timing {
    pub fn is_immediate(&self) -> bool {
        matches!(self, Timing::Immediate)
    }
}

/// Weekly business-hours window, in a rule's local time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// Opening time (inclusive)
    pub start: NaiveTime,
    /// Closing time (exclusive)
    pub end: NaiveTime,
    /// Open days
    pub days: Vec<Weekday>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

/// Error parsing a business-hours window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBusinessHours(String);

impl fmt::Display for InvalidBusinessHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid business hours '{}', expected HH:MM-HH:MM", self.0)
    }
}

impl std::error::Error for InvalidBusinessHours {}

impl FromStr for BusinessHours {
    type Err = InvalidBusinessHours;

    /// Parse a weekday window such as `09:00-17:00`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidBusinessHours(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(err)?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| err())?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| err())?;
        if start >= end {
            return Err(err());
        }
        Ok(Self {
            start,
            end,
            ..Self::default()
        })
    }
}

impl BusinessHours {
    /// Whether the local time falls inside the window
    pub fn contains(&self, local: NaiveDateTime) -> bool {
        let time = local.time();
        self.days.contains(&local.weekday()) && time >= self.start && time < self.end
    }

    /// Start of the next window at or after `local`.
    ///
    /// Returns `None` when no day is open.
    pub fn next_opening(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = local.date();
        if self.days.contains(&today.weekday()) && local.time() < self.start {
            return Some(today.and_time(self.start));
        }

        let mut day = today;
        for _ in 0..7 {
            day = day.succ_opt()?;
            if self.days.contains(&day.weekday()) {
                return Some(day.and_time(self.start));
            }
        }
        None
    }
}

/// Resolve a rule's schedule into the timing of a command for an event.
///
/// Delays are measured from the event's timestamp, never from the wall clock,
/// so resolution is a pure function of its inputs. Business hours are checked
/// in the rule's declared UTC offset. A delay that lands outside the
/// representable date range is an error rather than a panic.
pub fn resolve(
    schedule: Option<Schedule>,
    event_time: DateTime<FixedOffset>,
    utc_offset_minutes: i32,
    business_hours: &BusinessHours,
) -> Result<Timing, DispatchError> {
    let timing = match schedule {
        None | Some(Schedule::Instant) => Timing::Immediate,
        Some(Schedule::DelayMinutes { minutes }) => {
            delayed(event_time, Duration::minutes(i64::from(minutes)))?
        }
        Some(Schedule::DelayHours { hours }) => {
            delayed(event_time, Duration::hours(i64::from(hours)))?
        }
        Some(Schedule::BusinessHoursOnly) => {
            let Some(offset) = FixedOffset::east_opt(utc_offset_minutes * 60) else {
                tracing::warn!(
                    "Invalid UTC offset {} minutes, executing immediately",
                    utc_offset_minutes
                );
                return Ok(Timing::Immediate);
            };
            let local = event_time.with_timezone(&offset).naive_local();
            if business_hours.contains(local) {
                return Ok(Timing::Immediate);
            }

            match business_hours
                .next_opening(local)
                .and_then(|next| next.and_local_timezone(offset).single())
            {
                Some(execute_at) => Timing::Deferred { execute_at },
                None => {
                    tracing::warn!("Business hours have no open day, executing immediately");
                    Timing::Immediate
                }
            }
        }
    };
    Ok(timing)
}

fn delayed(event_time: DateTime<FixedOffset>, delay: Duration) -> Result<Timing, DispatchError> {
    event_time
        .checked_add_signed(delay)
        .map(|execute_at| Timing::Deferred { execute_at })
        .ok_or(DispatchError::DelayOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at;

    fn business(event: &str, offset_minutes: i32) -> Timing {
        resolve(
            Some(Schedule::BusinessHoursOnly),
            at(event),
            offset_minutes,
            &BusinessHours::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_instant_and_missing_schedule() {
        let t = at("2024-05-15T10:30:00+00:00");
        let hours = BusinessHours::default();
        assert_eq!(resolve(None, t, 0, &hours), Ok(Timing::Immediate));
        assert_eq!(
            resolve(Some(Schedule::Instant), t, 0, &hours),
            Ok(Timing::Immediate)
        );
    }

    #[test]
    fn test_delays_are_relative_to_event() {
        let t = at("2024-05-15T10:30:00+02:00");
        let hours = BusinessHours::default();
        assert_eq!(
            resolve(Some(Schedule::DelayMinutes { minutes: 5 }), t, 0, &hours),
            Ok(Timing::Deferred {
                execute_at: at("2024-05-15T10:35:00+02:00")
            })
        );
        assert_eq!(
            resolve(Some(Schedule::DelayHours { hours: 15 }), t, 0, &hours),
            Ok(Timing::Deferred {
                execute_at: at("2024-05-16T01:30:00+02:00")
            })
        );
    }

    #[test]
    fn test_delay_past_date_range_is_error() {
        let t = at("2024-05-15T10:30:00+00:00");
        let hours = BusinessHours::default();
        // ~490,000 years, beyond chrono's last representable date
        assert_eq!(
            resolve(Some(Schedule::DelayHours { hours: u32::MAX }), t, 0, &hours),
            Err(DispatchError::DelayOutOfRange)
        );
        // ~8,000 years still fits
        assert!(!resolve(Some(Schedule::DelayMinutes { minutes: u32::MAX }), t, 0, &hours)
            .unwrap()
            .is_immediate());
    }

    #[test]
    fn test_business_hours_inside_window() {
        assert_eq!(business("2024-05-15T09:00:00+00:00", 0), Timing::Immediate);
        assert_eq!(business("2024-05-15T16:59:00+00:00", 0), Timing::Immediate);
    }

    #[test]
    fn test_business_hours_before_opening() {
        assert_eq!(
            business("2024-05-15T07:45:00+00:00", 0),
            Timing::Deferred {
                execute_at: at("2024-05-15T09:00:00+00:00")
            }
        );
    }

    #[test]
    fn test_business_hours_at_closing_moves_to_next_day() {
        assert_eq!(
            business("2024-05-15T17:00:00+00:00", 0),
            Timing::Deferred {
                execute_at: at("2024-05-16T09:00:00+00:00")
            }
        );
    }

    #[test]
    fn test_business_hours_skip_weekend() {
        // Friday evening and Saturday both wait for Monday morning
        let monday = Timing::Deferred {
            execute_at: at("2024-05-20T09:00:00+00:00"),
        };
        assert_eq!(business("2024-05-17T18:00:00+00:00", 0), monday);
        assert_eq!(business("2024-05-18T11:00:00+00:00", 0), monday);
    }

    #[test]
    fn test_business_hours_use_rule_timezone() {
        // 14:00 UTC is 23:00 in UTC+9, outside the window there
        assert_eq!(
            business("2024-05-15T14:00:00+00:00", 9 * 60),
            Timing::Deferred {
                execute_at: at("2024-05-16T09:00:00+09:00")
            }
        );
        // 06:00 UTC is 10:00 in UTC+4, inside the window
        assert_eq!(business("2024-05-15T06:00:00+00:00", 4 * 60), Timing::Immediate);
    }

    #[test]
    fn test_parse_business_hours() {
        let hours: BusinessHours = "08:30-18:00".parse().unwrap();
        assert_eq!(hours.start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(hours.end, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert_eq!(hours.days.len(), 5);

        assert!("18:00-08:00".parse::<BusinessHours>().is_err());
        assert!("9am-5pm".parse::<BusinessHours>().is_err());
    }

    #[test]
    fn test_no_open_days() {
        let hours = BusinessHours {
            days: Vec::new(),
            ..BusinessHours::default()
        };
        let t = at("2024-05-15T07:00:00+00:00");
        assert_eq!(
            resolve(Some(Schedule::BusinessHoursOnly), t, 0, &hours),
            Ok(Timing::Immediate)
        );
    }
}
