//! Record timestamp helpers.
//!
//! # Responsibility
//! - Issue `created_at`/`updated_at`/`deleted_at` values.
//! - Encode and decode the ISO-8601 text form used in storage and JSON.
//!
//! # Invariants
//! - Timestamps are naive UTC with microsecond precision.
//! - `now()` never returns a value less than or equal to a previous result
//!   within the same process.

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use once_cell::sync::Lazy;
use std::sync::{Mutex, PoisonError};

/// Naive UTC point in time carried by every record.
pub type Timestamp = NaiveDateTime;

/// Storage and JSON text form: `YYYY-MM-DDTHH:MM:SS.ffffff`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

const PARSE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

static LAST_ISSUED: Lazy<Mutex<Option<Timestamp>>> = Lazy::new(|| Mutex::new(None));

/// Returns the current UTC time, strictly after any value this process
/// issued before.
pub fn now() -> Timestamp {
    let current = truncate_to_micros(Utc::now().naive_utc());
    let mut last = LAST_ISSUED.lock().unwrap_or_else(PoisonError::into_inner);
    let next = match *last {
        Some(previous) if current <= previous => previous + Duration::microseconds(1),
        _ => current,
    };
    *last = Some(next);
    next
}

/// Renders a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(value: &Timestamp) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses ISO-8601 text with optional fraction, a space separator, or an
/// RFC 3339 offset (converted to UTC).
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let trimmed = value.trim();
    for format in PARSE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|parsed| parsed.naive_utc())
}

fn truncate_to_micros(value: Timestamp) -> Timestamp {
    let micros = value.nanosecond() / 1_000;
    value.with_nanosecond(micros * 1_000).unwrap_or(value)
}
