// File: ./src/calendar_config.rs
// Per-subscription settings and the scan cursor, plus their one-line record format.
//
// ⚠️ VERSION BUMP REQUIRED:
// Changing the field list or order of a record requires incrementing
// FORMAT_VERSION and teaching `CalendarConfig::from_record` the previous layout.
use crate::model::{
    CEntry, Calendar, EntryDisplayMode, format_time_of_day, parse_time_of_day,
};
use anyhow::{Context, Result, bail};
use chrono::{NaiveDateTime, NaiveTime};
use std::str::FromStr;

pub const SEPARATOR: char = ';';

// Version history:
// - v0: calendarFile;calendarTitle;GIVEN_TIME|SCREEN_ON;H:mm;pos (no ids, no display modes)
// - v1: id;calendarFile;calendarTitle;dateMode;descrMode;notify;earliestEnabled;earliest;onScreenOn;pos
pub const FORMAT_VERSION: u32 = 1;

const V0_FIELD_COUNT: usize = 5;
const V1_FIELD_COUNT: usize = 10;

/// Settings a subscriber controls for one calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarConfig {
    pub id: u32,
    pub calendar_file: String,
    pub calendar_title: String,
    /// `None` inherits the calendar's own mode.
    pub entry_display_mode_date: Option<EntryDisplayMode>,
    pub entry_display_mode_description: Option<EntryDisplayMode>,
    pub notifications_enabled: bool,
    pub earliest_notification_time_enabled: bool,
    pub earliest_notification_time: NaiveTime,
    pub on_screen_on: bool,
    /// Number of entries already notified.
    pub pos: usize,
}

impl CalendarConfig {
    pub fn new(
        id: u32,
        calendar_file: impl Into<String>,
        calendar_title: impl Into<String>,
        earliest_notification_time: Option<NaiveTime>,
    ) -> Self {
        Self {
            id,
            calendar_file: calendar_file.into(),
            calendar_title: calendar_title.into(),
            entry_display_mode_date: None,
            entry_display_mode_description: None,
            notifications_enabled: true,
            earliest_notification_time_enabled: earliest_notification_time.is_some(),
            earliest_notification_time: earliest_notification_time
                .unwrap_or(NaiveTime::MIN),
            on_screen_on: false,
            pos: 0,
        }
    }

    /// The date display mode in effect: forced calendar modes win over the
    /// subscriber's override, which wins over the calendar default.
    pub fn effective_display_mode_date(&self, calendar: &Calendar) -> EntryDisplayMode {
        if calendar.force_entry_display_mode_date() {
            return calendar.entry_display_mode_date();
        }
        self.entry_display_mode_date
            .unwrap_or(calendar.entry_display_mode_date())
    }

    pub fn effective_display_mode_description(&self, calendar: &Calendar) -> EntryDisplayMode {
        if calendar.force_entry_display_mode_description() {
            return calendar.entry_display_mode_description();
        }
        self.entry_display_mode_description
            .unwrap_or(calendar.entry_display_mode_description())
    }

    pub fn shows_date(&self, calendar: &Calendar, entry: &CEntry, now: NaiveDateTime) -> bool {
        self.effective_display_mode_date(calendar)
            .reveals(entry.is_past(now))
    }

    pub fn shows_description(
        &self,
        calendar: &Calendar,
        entry: &CEntry,
        now: NaiveDateTime,
    ) -> bool {
        self.effective_display_mode_description(calendar)
            .reveals(entry.is_past(now))
    }

    /// An entry's link is only handed out once the entry is due and its
    /// description is revealed.
    pub fn shows_link(&self, calendar: &Calendar, entry: &CEntry, now: NaiveDateTime) -> bool {
        entry.is_past(now) && self.shows_description(calendar, entry, now)
    }

    /// Applies user changes. `calendar` is used to refuse overrides of forced
    /// display modes; nothing is changed when any part of the update is rejected.
    pub fn apply_update(&mut self, update: &SettingsUpdate, calendar: Option<&Calendar>) -> Result<()> {
        if let Some(title) = &update.title {
            check_field("calendar title", title)?;
        }
        if let Some(cal) = calendar {
            if let Some(ModeOverride::Set(_)) = update.date_mode
                && cal.force_entry_display_mode_date()
            {
                bail!(
                    "Calendar '{}' forces its date display mode ({})",
                    cal.title(),
                    cal.entry_display_mode_date()
                );
            }
            if let Some(ModeOverride::Set(_)) = update.descr_mode
                && cal.force_entry_display_mode_description()
            {
                bail!(
                    "Calendar '{}' forces its description display mode ({})",
                    cal.title(),
                    cal.entry_display_mode_description()
                );
            }
        }

        if let Some(title) = &update.title {
            self.calendar_title = title.clone();
        }
        if let Some(mode) = update.date_mode {
            self.entry_display_mode_date = mode.as_option();
        }
        if let Some(mode) = update.descr_mode {
            self.entry_display_mode_description = mode.as_option();
        }
        match update.earliest {
            Some(EarliestFloor::Off) => self.earliest_notification_time_enabled = false,
            Some(EarliestFloor::At(time)) => {
                self.earliest_notification_time_enabled = true;
                self.earliest_notification_time = time;
            }
            None => {}
        }
        Ok(())
    }

    /// Serializes to a current-format record line.
    pub fn to_record(&self) -> String {
        let mode = |m: Option<EntryDisplayMode>| m.map(|m| m.to_string()).unwrap_or_default();
        [
            self.id.to_string(),
            self.calendar_file.clone(),
            self.calendar_title.clone(),
            mode(self.entry_display_mode_date),
            mode(self.entry_display_mode_description),
            self.notifications_enabled.to_string(),
            self.earliest_notification_time_enabled.to_string(),
            format_time_of_day(self.earliest_notification_time),
            self.on_screen_on.to_string(),
            self.pos.to_string(),
        ]
        .join(&SEPARATOR.to_string())
    }

    /// Parses a record written in the current format.
    pub fn from_record(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        if fields.len() != V1_FIELD_COUNT {
            bail!(
                "Expected {} fields but found {} in config record '{}'",
                V1_FIELD_COUNT,
                fields.len(),
                line
            );
        }
        let mode = |s: &str| -> Result<Option<EntryDisplayMode>> {
            if s.is_empty() {
                return Ok(None);
            }
            EntryDisplayMode::from_str(s)
                .map(Some)
                .with_context(|| format!("Invalid display mode '{}'", s))
        };

        Ok(Self {
            id: fields[0]
                .parse()
                .with_context(|| format!("Invalid id '{}'", fields[0]))?,
            calendar_file: fields[1].to_string(),
            calendar_title: fields[2].to_string(),
            entry_display_mode_date: mode(fields[3])?,
            entry_display_mode_description: mode(fields[4])?,
            notifications_enabled: parse_bool(fields[5])?,
            earliest_notification_time_enabled: parse_bool(fields[6])?,
            earliest_notification_time: parse_time(fields[7])?,
            on_screen_on: parse_bool(fields[8])?,
            pos: fields[9]
                .parse()
                .with_context(|| format!("Invalid position '{}'", fields[9]))?,
        })
    }

    /// Parses a record of the first, id-less format and assigns it `id`.
    pub fn from_v0_record(line: &str, id: u32) -> Result<Self> {
        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        if fields.len() != V0_FIELD_COUNT {
            bail!(
                "Expected {} fields but found {} in legacy config record '{}'",
                V0_FIELD_COUNT,
                fields.len(),
                line
            );
        }
        let (given_time, screen_on) = match fields[2] {
            "GIVEN_TIME" => (true, false),
            "SCREEN_ON" => (false, true),
            other => bail!("Unknown notification mode '{}'", other),
        };
        Ok(Self {
            id,
            calendar_file: fields[0].to_string(),
            calendar_title: fields[1].to_string(),
            entry_display_mode_date: None,
            entry_display_mode_description: None,
            notifications_enabled: true,
            earliest_notification_time_enabled: given_time,
            earliest_notification_time: parse_time(fields[3])?,
            on_screen_on: screen_on,
            pos: fields[4]
                .parse()
                .with_context(|| format!("Invalid position '{}'", fields[4]))?,
        })
    }
}

/// A subscriber's choice for one display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOverride {
    /// Follow the calendar's own mode.
    Inherit,
    Set(EntryDisplayMode),
}

impl ModeOverride {
    pub const INHERIT: &'static str = "inherit";

    pub fn as_option(self) -> Option<EntryDisplayMode> {
        match self {
            ModeOverride::Inherit => None,
            ModeOverride::Set(mode) => Some(mode),
        }
    }
}

impl FromStr for ModeOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == Self::INHERIT {
            return Ok(ModeOverride::Inherit);
        }
        EntryDisplayMode::from_str(s).map(ModeOverride::Set).map_err(|_| {
            anyhow::anyhow!(
                "Invalid display mode '{}': expected {}, {}",
                s,
                EntryDisplayMode::valid_values(),
                Self::INHERIT
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarliestFloor {
    Off,
    At(NaiveTime),
}

/// Changes to a subscription. `None` fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub title: Option<String>,
    pub date_mode: Option<ModeOverride>,
    pub descr_mode: Option<ModeOverride>,
    pub earliest: Option<EarliestFloor>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Rejects values that would corrupt the record layout.
pub fn check_field(name: &str, value: &str) -> Result<()> {
    if value.contains(SEPARATOR) || value.contains('\n') {
        bail!(
            "The {} may not contain '{}' or line breaks: '{}'",
            name,
            SEPARATOR,
            value
        );
    }
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Invalid boolean '{}'", s),
    }
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    parse_time_of_day(s).ok_or_else(|| anyhow::anyhow!("Invalid time '{}'", s))
}
