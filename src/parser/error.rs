// File: ./src/parser/error.rs
use crate::model::CalendarField;
use std::fmt;
use thiserror::Error;

/// The two sections of a calendar document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Main,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Header => write!(f, "header"),
            Section::Main => write!(f, "main"),
        }
    }
}

/// A failed parse. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }

    /// Malformed document syntax, as opposed to a well-formed line with a bad value.
    pub fn is_structural(&self) -> bool {
        matches!(
            self.kind,
            ParseErrorKind::UnknownSection(_)
                | ParseErrorKind::UnknownKey { .. }
                | ParseErrorKind::IllegalLine { .. }
                | ParseErrorKind::MissingArgument(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unknown section '{0}'")]
    UnknownSection(String),

    #[error("unknown key '{key}' in {section} section")]
    UnknownKey { key: String, section: Section },

    #[error("illegal line in {section} section: '{line}'")]
    IllegalLine { line: String, section: Section },

    #[error("key '{0}' requires an argument")]
    MissingArgument(String),

    #[error("invalid date specification '{spec}': {hint}")]
    InvalidDateSpecification { spec: String, hint: String },

    #[error("invalid time specification '{0}': expected H:MM in 24-hour format")]
    InvalidTimeSpecification(String),

    #[error("invalid display mode '{spec}': valid display modes are: {valid}")]
    InvalidDisplayModeSpecification { spec: String, valid: String },

    #[error("an entry needs a date: set one with '@d d/m/y' before the first entry")]
    DateSpecificationRequired,

    #[error("missing field in header section: {0}")]
    MissingField(CalendarField),
}
