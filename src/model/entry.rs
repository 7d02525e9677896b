// File: ./src/model/entry.rs
use chrono::{NaiveDateTime, NaiveTime};

/// One dated item of a linear calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CEntry {
    /// Local wall-clock date and time of the entry, always fully resolved.
    pub date: NaiveDateTime,
    pub description: Option<String>,
    pub link: String,
}

impl CEntry {
    pub fn new(date: NaiveDateTime, description: Option<String>, link: impl Into<String>) -> Self {
        Self {
            date,
            description,
            link: link.into(),
        }
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.date.time()
    }

    /// Whether the entry's own date has passed. Ignores any notification floor.
    pub fn is_past(&self, now: NaiveDateTime) -> bool {
        self.date <= now
    }

    pub fn date_str(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    pub fn date_time_str(&self) -> String {
        self.date.format("%d/%m/%Y %H:%M").to_string()
    }

    /// Text for a notification body: the description when present, the link otherwise.
    pub fn summary_text(&self) -> &str {
        match &self.description {
            Some(d) if !d.is_empty() => d,
            _ => &self.link,
        }
    }
}
