//! Repository layer: entity-scoped database operations.

mod exam;
mod patient;
mod setting;

use chrono::NaiveDateTime;

pub use exam::*;
pub use patient::*;
pub use setting::*;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}
