//! Wire encoding of message timestamps.
//!
//! Records written today carry `yyyy-MM-ddTHH:mm:ss.SSSZ` strings; older
//! records carry raw millisecond integers, either as JSON numbers or as
//! decimal strings. Old records are never migrated, so decoding accepts all
//! three forever.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format `millis` as UTC ISO-8601 with millisecond precision. Instants
/// outside the calendar range clamp to its nearest end.
pub fn encode(millis: i64) -> String {
    let instant = DateTime::from_timestamp_millis(millis).unwrap_or(if millis < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    });
    instant.format(WIRE_FORMAT).to_string()
}

/// Milliseconds since the epoch for a wire value; `0` when unreadable.
pub fn decode(wire: &Value) -> i64 {
    match wire {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(0),
        Value::String(text) => decode_str(text),
        _ => 0,
    }
}

pub fn decode_str(wire: &str) -> i64 {
    if let Ok(millis) = wire.parse::<i64>() {
        return millis;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(wire, WIRE_FORMAT) {
        return naive.and_utc().timestamp_millis();
    }
    DateTime::parse_from_rfc3339(wire)
        .map(|instant| instant.timestamp_millis())
        .unwrap_or(0)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
