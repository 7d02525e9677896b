// File: ./src/parser/mod.rs
//! Parser for linear calendar documents.
//!
//! A document has a header section holding the calendar's metadata and a main
//! section listing entries. Entries fall on consecutive days unless a `@d`
//! switch moves the running date:
//!
//! ```text
//! # Advent calendar
//! @title Advent
//! @author Santa
//! @descr One door a day
//! @version 2
//! @date 1/11/2020
//! @forceDescrDisplayMode hideFuture
//! @begin
//! @d 1/12/2020
//! @st 8:00
//! @descr Door one
//! https://example.org/door/1
//! @t 18:30
//! https://example.org/door/2
//! ```
pub mod error;
pub mod line;

pub use error::{ParseError, ParseErrorKind, Section};

use crate::model::{CEntry, Calendar, CalendarBuilder, EntryDisplayMode, parse_time_of_day};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveTime};
use line::Line;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// header keys
const BEGIN_MAIN: &str = "begin";
const CAL_TITLE: &str = "title";
const CAL_AUTHOR: &str = "author";
const CAL_DESCRIPTION: &str = "descr";
const CAL_VERSION: &str = "version";
const CAL_DATE: &str = "date";
const SET_ENTRY_DISPLAY_MODE_DATE: &str = "setDateDisplayMode";
const SET_ENTRY_DISPLAY_MODE_DESCRIPTION: &str = "setDescrDisplayMode";
const FORCE_ENTRY_DISPLAY_MODE_DATE: &str = "forceDateDisplayMode";
const FORCE_ENTRY_DISPLAY_MODE_DESCRIPTION: &str = "forceDescrDisplayMode";

// main keys
const SWITCH_DATE: &str = "d";
const SET_TIME: &str = "t";
const SET_DEFAULT_TIME: &str = "st";
const ENTRY_DESCRIPTION: &str = "descr";

const MAIN_SECTION_NAME: &str = "main";

const HINT_DATE_FORMAT: &str = "expected d, d/m or d/m/y";
const HINT_FULL_DATE_HEADER: &str = "the header date must be a full date d/m/y";
const HINT_FULL_DATE_FIRST: &str = "the first date switch must be a full date d/m/y";
const HINT_NO_SUCH_DAY: &str = "no such day in the calendar";

/// Parses a calendar document given as a sequence of lines.
pub fn parse<I, S>(lines: I) -> Result<Calendar, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut state = ParseState::new();
    for raw in lines {
        state.line += 1;
        state
            .process(raw.as_ref())
            .map_err(|kind| ParseError::new(state.line, kind))?;
    }
    state.finish()
}

pub fn parse_str(text: &str) -> Result<Calendar, ParseError> {
    parse(text.lines())
}

/// Reads and parses a calendar file. A [`ParseError`] stays reachable through
/// `downcast_ref` on the returned error.
pub fn load_calendar(path: &Path) -> Result<Calendar> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calendar file '{}'", path.display()))?;
    let calendar = parse_str(&text)
        .with_context(|| format!("Failed to parse calendar file '{}'", path.display()))?;
    log::debug!(
        "Parsed calendar '{}' with {} entries from {}",
        calendar.title(),
        calendar.len(),
        path.display()
    );
    Ok(calendar)
}

/// A `@d` value. Components left out keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DateSpec {
    day: u32,
    month: Option<u32>,
    year: Option<i32>,
}

impl DateSpec {
    fn parse(spec: &str) -> Result<Self, ParseErrorKind> {
        let invalid = |hint: String| ParseErrorKind::InvalidDateSpecification {
            spec: spec.to_string(),
            hint,
        };
        let parts: Vec<&str> = spec.split('/').map(str::trim).collect();
        if parts.len() > 3 {
            return Err(invalid(HINT_DATE_FORMAT.to_string()));
        }
        let number = |token: &str| -> Result<u32, ParseErrorKind> {
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("'{}' is not a number", token)));
            }
            token
                .parse::<u32>()
                .map_err(|_| invalid(format!("'{}' is out of range", token)))
        };

        let day = number(parts[0])?;
        let month = parts.get(1).map(|&t| number(t)).transpose()?;
        let year = match parts.get(2) {
            Some(&t) => {
                let y = number(t)?;
                Some(i32::try_from(y).map_err(|_| invalid(format!("'{}' is out of range", t)))?)
            }
            None => None,
        };
        Ok(Self { day, month, year })
    }

    fn full(&self) -> Option<(i32, u32, u32)> {
        Some((self.year?, self.month?, self.day))
    }

    /// Applies the supplied components on top of `current`.
    fn apply(&self, current: NaiveDate) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            self.year.unwrap_or(current.year()),
            self.month.unwrap_or(current.month()),
            self.day,
        )
    }
}

/// Everything that changes while a single document is read.
struct ParseState {
    line: usize,
    section: Section,
    builder: CalendarBuilder,
    /// Running date in the main section; `None` until the first `@d`.
    current_date: Option<NaiveDate>,
    default_time: NaiveTime,
    /// One-shot time from `@t`, consumed by the next entry.
    pending_time: Option<NaiveTime>,
    /// Description buffered for the entry under construction.
    description: Option<String>,
}

impl ParseState {
    fn new() -> Self {
        Self {
            line: 0,
            section: Section::Header,
            builder: Calendar::builder(),
            current_date: None,
            default_time: NaiveTime::MIN,
            pending_time: None,
            description: None,
        }
    }

    fn process(&mut self, raw: &str) -> Result<(), ParseErrorKind> {
        match Line::classify(raw) {
            Line::Blank | Line::Comment => Ok(()),
            Line::Key { key, arg } => match self.section {
                Section::Header => self.header_key(key, arg),
                Section::Main => self.main_key(key, arg),
            },
            Line::Default(text) => match self.section {
                Section::Header => Err(ParseErrorKind::IllegalLine {
                    line: text.to_string(),
                    section: Section::Header,
                }),
                Section::Main => self.terminate_entry(text),
            },
        }
    }

    fn header_key(&mut self, key: &str, arg: Option<&str>) -> Result<(), ParseErrorKind> {
        let require = || arg.ok_or_else(|| ParseErrorKind::MissingArgument(key.to_string()));
        match key {
            BEGIN_MAIN => match arg {
                None | Some(MAIN_SECTION_NAME) => self.section = Section::Main,
                Some(other) => return Err(ParseErrorKind::UnknownSection(other.to_string())),
            },
            CAL_TITLE => {
                self.builder.title(require()?);
            }
            CAL_AUTHOR => {
                self.builder.author(require()?);
            }
            CAL_DESCRIPTION => {
                self.builder.description(require()?);
            }
            CAL_VERSION => {
                self.builder.version(require()?);
            }
            CAL_DATE => {
                let date = full_date(require()?, HINT_FULL_DATE_HEADER)?;
                self.builder.date(date);
            }
            SET_ENTRY_DISPLAY_MODE_DATE => {
                self.builder.entry_display_mode_date(display_mode(require()?)?);
            }
            SET_ENTRY_DISPLAY_MODE_DESCRIPTION => {
                self.builder
                    .entry_display_mode_description(display_mode(require()?)?);
            }
            FORCE_ENTRY_DISPLAY_MODE_DATE => {
                self.builder
                    .entry_display_mode_date(display_mode(require()?)?)
                    .force_entry_display_mode_date(true);
            }
            FORCE_ENTRY_DISPLAY_MODE_DESCRIPTION => {
                self.builder
                    .entry_display_mode_description(display_mode(require()?)?)
                    .force_entry_display_mode_description(true);
            }
            _ => {
                return Err(ParseErrorKind::UnknownKey {
                    key: key.to_string(),
                    section: Section::Header,
                });
            }
        }
        Ok(())
    }

    fn main_key(&mut self, key: &str, arg: Option<&str>) -> Result<(), ParseErrorKind> {
        let require = || arg.ok_or_else(|| ParseErrorKind::MissingArgument(key.to_string()));
        match key {
            SWITCH_DATE => {
                let spec = require()?;
                let date = match self.current_date {
                    None => full_date(spec, HINT_FULL_DATE_FIRST)?,
                    Some(current) => DateSpec::parse(spec)?.apply(current).ok_or_else(|| {
                        ParseErrorKind::InvalidDateSpecification {
                            spec: spec.to_string(),
                            hint: HINT_NO_SUCH_DAY.to_string(),
                        }
                    })?,
                };
                self.current_date = Some(date);
            }
            SET_TIME => self.pending_time = Some(time_spec(require()?)?),
            SET_DEFAULT_TIME => self.default_time = time_spec(require()?)?,
            ENTRY_DESCRIPTION => {
                let text = require()?;
                self.description = Some(match self.description.take() {
                    Some(mut buf) => {
                        buf.push('\n');
                        buf.push_str(text);
                        buf
                    }
                    None => text.to_string(),
                });
            }
            _ => {
                return Err(ParseErrorKind::UnknownKey {
                    key: key.to_string(),
                    section: Section::Main,
                });
            }
        }
        Ok(())
    }

    fn terminate_entry(&mut self, link: &str) -> Result<(), ParseErrorKind> {
        let date = self
            .current_date
            .ok_or(ParseErrorKind::DateSpecificationRequired)?;
        let time = self.pending_time.take().unwrap_or(self.default_time);

        self.builder.add_entry(CEntry::new(
            date.and_time(time),
            self.description.take(),
            link,
        ));

        let next = date
            .succ_opt()
            .ok_or_else(|| ParseErrorKind::InvalidDateSpecification {
                spec: date.to_string(),
                hint: "date range exhausted".to_string(),
            })?;
        self.current_date = Some(next);
        Ok(())
    }

    fn finish(self) -> Result<Calendar, ParseError> {
        // an empty document still reports line 1
        let line = self.line.max(1);
        self.builder
            .build()
            .map_err(|missing| ParseError::new(line, ParseErrorKind::MissingField(missing.0)))
    }
}

fn full_date(spec: &str, hint: &str) -> Result<NaiveDate, ParseErrorKind> {
    let invalid = |hint: &str| ParseErrorKind::InvalidDateSpecification {
        spec: spec.to_string(),
        hint: hint.to_string(),
    };
    let (y, m, d) = DateSpec::parse(spec)?.full().ok_or_else(|| invalid(hint))?;
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| invalid(HINT_NO_SUCH_DAY))
}

fn time_spec(spec: &str) -> Result<NaiveTime, ParseErrorKind> {
    parse_time_of_day(spec).ok_or_else(|| ParseErrorKind::InvalidTimeSpecification(spec.to_string()))
}

fn display_mode(spec: &str) -> Result<EntryDisplayMode, ParseErrorKind> {
    EntryDisplayMode::from_str(spec).map_err(|_| ParseErrorKind::InvalidDisplayModeSpecification {
        spec: spec.to_string(),
        valid: EntryDisplayMode::valid_values(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_spec_partial() {
        let current = NaiveDate::from_ymd_opt(2020, 6, 5).unwrap();
        let spec = DateSpec::parse("10").unwrap();
        assert_eq!(spec.full(), None);
        assert_eq!(
            spec.apply(current),
            NaiveDate::from_ymd_opt(2020, 6, 10)
        );
        assert_eq!(
            DateSpec::parse("1/1").unwrap().apply(current),
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
        assert_eq!(
            DateSpec::parse("3/4/2021").unwrap().full(),
            Some((2021, 4, 3))
        );
    }

    #[test]
    fn test_date_spec_rejects_bad_tokens() {
        for bad in ["", "x", "1/x", "1/2/y", "1/2/3/4", "1//2020", "-1", "1/+2"] {
            assert!(
                matches!(
                    DateSpec::parse(bad),
                    Err(ParseErrorKind::InvalidDateSpecification { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_date_spec_invalid_day_of_month() {
        let feb = NaiveDate::from_ymd_opt(2021, 2, 1).unwrap();
        assert_eq!(DateSpec::parse("30").unwrap().apply(feb), None);
    }

    #[test]
    fn test_state_is_fresh_per_call() {
        let doc = "@title t\n@author a\n@descr d\n@version 1\n@date 1/1/2020\n@begin\n@d 1/1/2020\n@st 9:00\nx";
        let first = parse_str(doc).unwrap();
        let second = parse_str(doc).unwrap();
        assert_eq!(first, second);
    }
}
