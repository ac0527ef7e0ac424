//! Fixed daily sync schedule.

use chrono::{DateTime, Days, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CoreError, CoreResult};

/// Parse a `HH:MM` wall-clock time.
pub fn parse_time(time_str: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(time_str.trim(), "%H:%M")
        .map_err(|_| CoreError::Config(format!("Invalid time '{}'. Expected HH:MM", time_str)))
}

/// Wall-clock times, every day, in one timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    times: Vec<NaiveTime>,
    tz: Tz,
}

impl Schedule {
    pub fn new(mut times: Vec<NaiveTime>, tz: Tz) -> CoreResult<Self> {
        if times.is_empty() {
            return Err(CoreError::Config("Schedule needs at least one time".into()));
        }
        times.sort();
        times.dedup();
        Ok(Schedule { times, tz })
    }

    pub fn parse<S: AsRef<str>>(times: &[S], tz: Tz) -> CoreResult<Self> {
        let times = times
            .iter()
            .map(|t| parse_time(t.as_ref()))
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(times, tz)
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// The first scheduled instant strictly after `now`.
    ///
    /// Times that fall into a DST gap are skipped that day; on a repeated
    /// hour the first occurrence counts.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.tz).date_naive();

        for offset in 0..=2 {
            let Some(day) = today.checked_add_days(Days::new(offset)) else {
                break;
            };
            for time in &self.times {
                let candidate = match self.tz.from_local_datetime(&day.and_time(*time)) {
                    LocalResult::Single(dt) => dt,
                    LocalResult::Ambiguous(first, _) => first,
                    LocalResult::None => continue,
                };
                let candidate = candidate.with_timezone(&Utc);
                if candidate > now {
                    return candidate;
                }
            }
        }

        // Every configured time sat in a DST gap for three days straight
        now + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("06:00").unwrap(), NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("noon").is_err());
    }

    #[test]
    fn test_next_time_later_today() {
        let schedule = Schedule::parse(&["18:00", "06:00", "12:00"], Tz::UTC).unwrap();
        assert_eq!(schedule.next_after(utc(2025, 3, 3, 7, 0)), utc(2025, 3, 3, 12, 0));
    }

    #[test]
    fn test_exact_time_moves_to_next_slot() {
        let schedule = Schedule::parse(&["06:00", "12:00"], Tz::UTC).unwrap();
        assert_eq!(schedule.next_after(utc(2025, 3, 3, 12, 0)), utc(2025, 3, 4, 6, 0));
    }

    #[test]
    fn test_schedule_timezone_is_respected() {
        let schedule = Schedule::parse(&["06:00"], chrono_tz::Europe::Stockholm).unwrap();
        // 06:00 CET is 05:00 UTC in winter
        assert_eq!(schedule.next_after(utc(2025, 1, 10, 4, 0)), utc(2025, 1, 10, 5, 0));
        // 06:00 CEST is 04:00 UTC in summer
        assert_eq!(schedule.next_after(utc(2025, 7, 10, 4, 30)), utc(2025, 7, 11, 4, 0));
    }

    #[test]
    fn test_dst_gap_is_skipped() {
        // 02:30 does not exist in Stockholm on 2025-03-30
        let schedule = Schedule::parse(&["02:30"], chrono_tz::Europe::Stockholm).unwrap();
        assert_eq!(schedule.next_after(utc(2025, 3, 29, 12, 0)), utc(2025, 3, 31, 0, 30));
    }

    #[test]
    fn test_empty_schedule_is_rejected() {
        assert!(Schedule::parse::<&str>(&[], Tz::UTC).is_err());
    }
}
