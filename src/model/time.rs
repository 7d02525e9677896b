// File: ./src/model/time.rs
use chrono::{NaiveTime, Timelike};

/// Parses a 24-hour `H:MM` time of day. The hour may omit its leading zero.
pub fn parse_time_of_day(spec: &str) -> Option<NaiveTime> {
    let (h_str, m_str) = spec.trim().split_once(':')?;
    if h_str.is_empty() || h_str.len() > 2 || m_str.len() != 2 {
        return None;
    }
    if !h_str.bytes().all(|b| b.is_ascii_digit()) || !m_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour = h_str.parse::<u32>().ok()?;
    let minute = m_str.parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Formats a time of day the way it is written in documents and config records.
pub fn format_time_of_day(time: NaiveTime) -> String {
    format!("{}:{:02}", time.hour(), time.minute())
}
