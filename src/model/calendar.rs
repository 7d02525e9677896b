// File: ./src/model/calendar.rs
use crate::model::display::EntryDisplayMode;
use crate::model::entry::CEntry;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Header fields every calendar document must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    Title,
    Author,
    Descr,
    Version,
    Date,
}

impl fmt::Display for CalendarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarField::Title => write!(f, "TITLE"),
            CalendarField::Author => write!(f, "AUTHOR"),
            CalendarField::Descr => write!(f, "DESCR"),
            CalendarField::Version => write!(f, "VERSION"),
            CalendarField::Date => write!(f, "DATE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot build calendar: missing field: {0}")]
pub struct MissingFieldError(pub CalendarField);

/// A parsed linear calendar. Frozen once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    title: String,
    author: String,
    description: String,
    version: String,
    date: NaiveDate,
    entry_display_mode_date: EntryDisplayMode,
    entry_display_mode_description: EntryDisplayMode,
    force_entry_display_mode_date: bool,
    force_entry_display_mode_description: bool,
    entries: Vec<CEntry>,
}

impl Calendar {
    pub fn builder() -> CalendarBuilder {
        CalendarBuilder::default()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn date_str(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    pub fn entry_display_mode_date(&self) -> EntryDisplayMode {
        self.entry_display_mode_date
    }

    pub fn entry_display_mode_description(&self) -> EntryDisplayMode {
        self.entry_display_mode_description
    }

    /// If true, subscribers may not override the date display mode.
    pub fn force_entry_display_mode_date(&self) -> bool {
        self.force_entry_display_mode_date
    }

    /// If true, subscribers may not override the description display mode.
    pub fn force_entry_display_mode_description(&self) -> bool {
        self.force_entry_display_mode_description
    }

    /// Entries sorted by date; equal dates keep definition order.
    pub fn entries(&self) -> &[CEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates header values and entries while a document is parsed.
#[derive(Debug, Clone, Default)]
pub struct CalendarBuilder {
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
    version: Option<String>,
    date: Option<NaiveDate>,
    entry_display_mode_date: Option<EntryDisplayMode>,
    entry_display_mode_description: Option<EntryDisplayMode>,
    force_entry_display_mode_date: bool,
    force_entry_display_mode_description: bool,
    entries: Vec<CEntry>,
}

impl CalendarBuilder {
    pub fn title(&mut self, value: impl Into<String>) -> &mut Self {
        self.title = Some(value.into());
        self
    }

    pub fn author(&mut self, value: impl Into<String>) -> &mut Self {
        self.author = Some(value.into());
        self
    }

    pub fn description(&mut self, value: impl Into<String>) -> &mut Self {
        self.description = Some(value.into());
        self
    }

    pub fn version(&mut self, value: impl Into<String>) -> &mut Self {
        self.version = Some(value.into());
        self
    }

    pub fn date(&mut self, value: NaiveDate) -> &mut Self {
        self.date = Some(value);
        self
    }

    pub fn entry_display_mode_date(&mut self, mode: EntryDisplayMode) -> &mut Self {
        self.entry_display_mode_date = Some(mode);
        self
    }

    pub fn entry_display_mode_description(&mut self, mode: EntryDisplayMode) -> &mut Self {
        self.entry_display_mode_description = Some(mode);
        self
    }

    pub fn force_entry_display_mode_date(&mut self, force: bool) -> &mut Self {
        self.force_entry_display_mode_date = force;
        self
    }

    pub fn force_entry_display_mode_description(&mut self, force: bool) -> &mut Self {
        self.force_entry_display_mode_description = force;
        self
    }

    pub fn add_entry(&mut self, entry: CEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Checks the mandatory header fields and freezes the calendar.
    /// The builder is consumed; entries are stable-sorted by date.
    pub fn build(self) -> Result<Calendar, MissingFieldError> {
        let title = self.title.ok_or(MissingFieldError(CalendarField::Title))?;
        let author = self.author.ok_or(MissingFieldError(CalendarField::Author))?;
        let description = self
            .description
            .ok_or(MissingFieldError(CalendarField::Descr))?;
        let version = self.version.ok_or(MissingFieldError(CalendarField::Version))?;
        let date = self.date.ok_or(MissingFieldError(CalendarField::Date))?;

        let mut entries = self.entries;
        // Vec::sort_by_key is stable.
        entries.sort_by_key(|e| e.date);

        Ok(Calendar {
            title,
            author,
            description,
            version,
            date,
            entry_display_mode_date: self
                .entry_display_mode_date
                .unwrap_or(EntryDisplayMode::ShowAll),
            entry_display_mode_description: self
                .entry_display_mode_description
                .unwrap_or(EntryDisplayMode::HideFuture),
            force_entry_display_mode_date: self.force_entry_display_mode_date,
            force_entry_display_mode_description: self.force_entry_display_mode_description,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn filled_builder() -> CalendarBuilder {
        let mut b = Calendar::builder();
        b.title("Advent")
            .author("Santa")
            .description("Door a day")
            .version("1")
            .date(NaiveDate::from_ymd_opt(2020, 11, 1).unwrap());
        b
    }

    fn entry(y: i32, m: u32, d: u32, h: u32, link: &str) -> CEntry {
        let date = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap();
        CEntry::new(date, None, link)
    }

    #[test]
    fn test_build_reports_first_missing_field() {
        let mut b = Calendar::builder();
        b.title("t").author("a").description("d");
        assert_eq!(
            b.build().unwrap_err(),
            MissingFieldError(CalendarField::Version)
        );

        assert_eq!(
            Calendar::builder().build().unwrap_err(),
            MissingFieldError(CalendarField::Title)
        );
    }

    #[test]
    fn test_build_sorts_stably() {
        let mut b = filled_builder();
        b.add_entry(entry(2020, 12, 2, 0, "c"))
            .add_entry(entry(2020, 12, 1, 0, "a"))
            .add_entry(entry(2020, 12, 1, 0, "b"))
            .add_entry(entry(2020, 11, 30, 23, "z"));
        let cal = b.build().unwrap();
        let links: Vec<_> = cal.entries().iter().map(|e| e.link.as_str()).collect();
        assert_eq!(links, vec!["z", "a", "b", "c"]);
    }

    #[test]
    fn test_default_display_modes() {
        let cal = filled_builder().build().unwrap();
        assert_eq!(cal.entry_display_mode_date(), EntryDisplayMode::ShowAll);
        assert_eq!(
            cal.entry_display_mode_description(),
            EntryDisplayMode::HideFuture
        );
        assert!(!cal.force_entry_display_mode_date());
        assert!(cal.is_empty());
    }

    #[test]
    fn test_missing_field_display() {
        assert_eq!(CalendarField::Version.to_string(), "VERSION");
        assert_eq!(
            MissingFieldError(CalendarField::Date).to_string(),
            "cannot build calendar: missing field: DATE"
        );
    }
}
