// File: ./src/scheduler.rs
// Decides which entries of a calendar are newly due.
//
// `scan` is pure: the same calendar, config and `now` always give the same
// result. The caller delivers `due`, then stores `new_pos` in the config.
// Rerunning a cycle that crashed before the store was saved yields the same
// batch again instead of skipping it.
use crate::calendar_config::CalendarConfig;
use crate::model::{CEntry, Calendar};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult<'a> {
    /// Newly due entries, in calendar order. Index of `due[0]` is `first_index`.
    pub due: &'a [CEntry],
    pub first_index: usize,
    /// Cursor after delivering `due`; never below the config's `pos`.
    pub new_pos: usize,
    /// When the next entry becomes due, if there is one.
    pub next_wake: Option<NaiveDateTime>,
}

impl ScanResult<'_> {
    /// `(index, entry)` pairs of the due batch.
    pub fn indexed_due(&self) -> impl Iterator<Item = (usize, &CEntry)> {
        self.due
            .iter()
            .enumerate()
            .map(|(i, e)| (self.first_index + i, e))
    }
}

/// The moment an entry should be notified.
///
/// With the earliest-time floor enabled, an entry whose own time of day is
/// before the floor is moved forward to the floor on the same date. Entries
/// are never moved earlier.
pub fn effective_notification_time(entry: &CEntry, config: &CalendarConfig) -> NaiveDateTime {
    if config.earliest_notification_time_enabled
        && entry.time_of_day() < config.earliest_notification_time
    {
        entry.date.date().and_time(config.earliest_notification_time)
    } else {
        entry.date
    }
}

pub fn scan<'a>(calendar: &'a Calendar, config: &CalendarConfig, now: NaiveDateTime) -> ScanResult<'a> {
    let entries = calendar.entries();
    let start = config.pos;
    if start >= entries.len() {
        // Also covers a source that shrank below the cursor: keep the cursor.
        return ScanResult {
            due: &[],
            first_index: start,
            new_pos: start,
            next_wake: None,
        };
    }

    let mut pos = start;
    while pos < entries.len() && effective_notification_time(&entries[pos], config) <= now {
        pos += 1;
    }

    ScanResult {
        due: &entries[start..pos],
        first_index: start,
        new_pos: pos,
        next_wake: entries
            .get(pos)
            .map(|e| effective_notification_time(e, config)),
    }
}

/// Earliest of several optional wake-up times.
pub fn global_next_wake<I>(wakes: I) -> Option<NaiveDateTime>
where
    I: IntoIterator<Item = Option<NaiveDateTime>>,
{
    wakes.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn cfg(floor: Option<(u32, u32)>) -> CalendarConfig {
        CalendarConfig::new(
            0,
            "/cal.txt",
            "Cal",
            floor.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap()),
        )
    }

    #[test]
    fn test_effective_time_floor() {
        let floor = cfg(Some((12, 0)));
        let early = CEntry::new(at(9, 0), None, "early");
        let late = CEntry::new(at(14, 0), None, "late");
        let exact = CEntry::new(at(12, 0), None, "exact");

        assert_eq!(effective_notification_time(&early, &floor), at(12, 0));
        assert_eq!(effective_notification_time(&late, &floor), at(14, 0));
        assert_eq!(effective_notification_time(&exact, &floor), at(12, 0));

        let no_floor = cfg(None);
        assert_eq!(effective_notification_time(&early, &no_floor), at(9, 0));
    }

    #[test]
    fn test_floor_stays_on_entry_date() {
        let floor = cfg(Some((12, 0)));
        let old = CEntry::new(
            NaiveDate::from_ymd_opt(2021, 3, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            None,
            "old",
        );
        let eff = effective_notification_time(&old, &floor);
        assert_eq!(eff.date(), NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
        // Long past entries are due regardless of the current time of day.
        assert!(eff <= at(7, 0));
    }

    #[test]
    fn test_global_next_wake() {
        assert_eq!(global_next_wake([None, None]), None);
        assert_eq!(
            global_next_wake([Some(at(14, 0)), None, Some(at(9, 30))]),
            Some(at(9, 30))
        );
    }
}
