//! Month-aligned sync windows.

use chrono::{DateTime, Utc};

use crate::month::MonthKey;

pub const DEFAULT_MONTHS_BACK: u32 = 1;
pub const DEFAULT_MONTHS_FORWARD: u32 = 3;
/// Upper bound for either direction
pub const MAX_WINDOW_MONTHS: u32 = 36;

/// The span of time one sync covers.
///
/// Windows always start and end on month boundaries so that every month
/// bucket a sync rewrites is one it saw in full. Both ends are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    months: Vec<MonthKey>,
}

impl SyncWindow {
    /// From the first instant of `months_back` months before `now`'s month to
    /// the last instant of `months_forward` months after it.
    pub fn around(now: DateTime<Utc>, months_back: u32, months_forward: u32) -> Self {
        let back = months_back.min(MAX_WINDOW_MONTHS) as i32;
        let forward = months_forward.min(MAX_WINDOW_MONTHS) as i32;

        let current = MonthKey::of(now);
        let first = current.add_months(-back);
        let last = current.add_months(forward);

        let mut months = Vec::with_capacity((back + forward + 1) as usize);
        let mut month = first;
        while month <= last {
            months.push(month);
            month = month.next();
        }

        SyncWindow {
            start: first.first_instant(),
            end: last.last_instant(),
            months,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Every month the window covers, oldest first
    pub fn months(&self) -> &[MonthKey] {
        &self.months
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_window_is_month_aligned() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 12, 30, 0).unwrap();
        let window = SyncWindow::around(now, 1, 3);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(
            window.end,
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap() - Duration::milliseconds(1)
        );
        let months: Vec<String> = window.months().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2025-02", "2025-03", "2025-04", "2025-05", "2025-06"]);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 12, 5, 0, 0, 0).unwrap();
        let window = SyncWindow::around(now, 0, 1);
        assert!(window.contains(window.start));
        assert!(window.contains(window.end));
        assert!(!window.contains(window.end + Duration::milliseconds(1)));
        assert_eq!(window.months().len(), 2);
        assert_eq!(window.months()[1].to_string(), "2026-01");
    }

    #[test]
    fn test_window_is_clamped() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let window = SyncWindow::around(now, 500, 0);
        assert_eq!(window.months().len(), (MAX_WINDOW_MONTHS + 1) as usize);
    }
}
