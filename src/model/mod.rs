// File: ./src/model/mod.rs
pub mod calendar;
pub mod display;
pub mod entry;
pub mod time;

pub use calendar::{Calendar, CalendarBuilder, CalendarField, MissingFieldError};
pub use display::EntryDisplayMode;
pub use entry::CEntry;
pub use time::{format_time_of_day, parse_time_of_day};
