// File: ./src/cache.rs
// Explicit cache of parsed calendars, owned by whoever drives notifications.
//
// A calendar is a pure function of its source text, so an entry stays valid
// as long as the config still points at the same file and the file's
// modification time has not changed. Failed loads are never cached.
use crate::calendar_config::CalendarConfig;
use crate::model::Calendar;
use crate::parser::load_calendar;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

struct CachedCalendar {
    source: PathBuf,
    modified: Option<SystemTime>,
    calendar: Arc<Calendar>,
}

#[derive(Default)]
pub struct CalendarCache {
    calendars: HashMap<u32, CachedCalendar>,
}

impl CalendarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parsed calendar for `config`, reparsing the source if it changed.
    pub fn get(&mut self, config: &CalendarConfig) -> Result<Arc<Calendar>> {
        let source = Path::new(&config.calendar_file);
        let modified = Self::modified(source);

        if let Some(cached) = self.calendars.get(&config.id)
            && cached.source == source
            && cached.modified.is_some()
            && cached.modified == modified
        {
            return Ok(Arc::clone(&cached.calendar));
        }

        // Drop a stale entry first so a failing reload does not leave it behind.
        self.calendars.remove(&config.id);
        let calendar = Arc::new(load_calendar(source)?);
        self.calendars.insert(
            config.id,
            CachedCalendar {
                source: source.to_path_buf(),
                modified,
                calendar: Arc::clone(&calendar),
            },
        );
        Ok(calendar)
    }

    pub fn invalidate(&mut self, id: u32) {
        self.calendars.remove(&id);
    }

    pub fn clear(&mut self) {
        self.calendars.clear();
    }

    /// Keeps only the calendars whose ids are still subscribed.
    pub fn retain(&mut self, ids: &HashSet<u32>) {
        self.calendars.retain(|id, _| ids.contains(id));
    }

    pub fn contains(&self, id: u32) -> bool {
        self.calendars.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calendars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calendars.is_empty()
    }

    fn modified(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}
