// src/scheduler/trigger.rs
//! Wall-clock triggers (local time).

use chrono::{Datelike, Days, NaiveDateTime, NaiveTime, Weekday};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Every day at each listed hour, minute 0.
    Daily { hours: Vec<u32> },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
}

impl Trigger {
    /// 00:00, 08:00 and 16:00 every day plus Sunday 02:00.
    pub fn defaults() -> Vec<Trigger> {
        vec![
            Trigger::Daily {
                hours: vec![0, 8, 16],
            },
            Trigger::Weekly {
                weekday: Weekday::Sun,
                hour: 2,
                minute: 0,
            },
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Daily { .. } => "daily",
            Trigger::Weekly { .. } => "weekly",
        }
    }

    /// First fire instant strictly after `now`. `None` for an empty or
    /// out-of-range schedule.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Trigger::Daily { hours } => {
                let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
                hours.sort_unstable();
                hours.dedup();
                // today, then tomorrow
                (0..=1u64).find_map(|offset| {
                    let day = now.date().checked_add_days(Days::new(offset))?;
                    hours.iter().find_map(|h| {
                        let at = day.and_time(NaiveTime::from_hms_opt(*h, 0, 0)?);
                        (at > now).then_some(at)
                    })
                })
            }
            Trigger::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let time = NaiveTime::from_hms_opt(*hour, *minute, 0)?;
                (0..=7u64).find_map(|offset| {
                    let day = now.date().checked_add_days(Days::new(offset))?;
                    let at = day.and_time(time);
                    (day.weekday() == *weekday && at > now).then_some(at)
                })
            }
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Daily { hours } => {
                let hs: Vec<String> = hours.iter().map(|h| format!("{h:02}:00")).collect();
                write!(f, "daily at {}", hs.join(", "))
            }
            Trigger::Weekly {
                weekday,
                hour,
                minute,
            } => write!(f, "weekly on {weekday} at {hour:02}:{minute:02}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn daily_picks_next_slot_or_rolls_over() {
        let daily = &Trigger::defaults()[0];
        assert_eq!(daily.next_after(at(2025, 4, 10, 7, 59)), Some(at(2025, 4, 10, 8, 0)));
        // exactly on a slot: the next one
        assert_eq!(daily.next_after(at(2025, 4, 10, 8, 0)), Some(at(2025, 4, 10, 16, 0)));
        assert_eq!(daily.next_after(at(2025, 4, 10, 16, 30)), Some(at(2025, 4, 11, 0, 0)));
    }

    #[test]
    fn weekly_fires_on_sunday_two_am() {
        let weekly = &Trigger::defaults()[1];
        // Thursday
        assert_eq!(weekly.next_after(at(2025, 4, 10, 12, 0)), Some(at(2025, 4, 13, 2, 0)));
        // Sunday, before and after the slot
        assert_eq!(weekly.next_after(at(2025, 4, 13, 1, 0)), Some(at(2025, 4, 13, 2, 0)));
        assert_eq!(weekly.next_after(at(2025, 4, 13, 2, 0)), Some(at(2025, 4, 20, 2, 0)));
    }

    #[test]
    fn empty_schedule_never_fires() {
        let t = Trigger::Daily { hours: vec![25] };
        assert_eq!(t.next_after(at(2025, 1, 1, 0, 0)), None);
    }
}
