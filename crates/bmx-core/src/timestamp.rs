//! Wire timestamp handling.
//!
//! The feed stamps every entry as `YYYY-MM-DDTHH:mm:ss.SSSZ` (UTC, exactly
//! three fractional digits). Anything else is rejected.

use crate::error::{CoreError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// chrono format string matching the wire layout.
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

const WIRE_TIMESTAMP_LEN: usize = 24;

/// Parse a wire timestamp strictly.
pub fn parse_wire_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if !has_wire_shape(s) {
        return Err(CoreError::InvalidTimestamp(s.to_string()));
    }

    NaiveDateTime::parse_from_str(s, WIRE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| CoreError::InvalidTimestamp(format!("{s}: {e}")))
}

/// Format a timestamp the way the feed does.
pub fn format_wire_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(WIRE_TIMESTAMP_FORMAT).to_string()
}

/// chrono is lenient about fractional digits, so the fixed layout is checked
/// byte by byte first.
fn has_wire_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != WIRE_TIMESTAMP_LEN {
        return false;
    }

    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b'T',
        13 | 16 => *b == b':',
        19 => *b == b'.',
        23 => *b == b'Z',
        _ => b.is_ascii_digit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_valid_timestamp() {
        let ts = parse_wire_timestamp("2019-04-05T12:01:02.345Z").unwrap();
        assert_eq!(ts.year(), 2019);
        assert_eq!(ts.month(), 4);
        assert_eq!(ts.second(), 2);
        assert_eq!(ts.timestamp_subsec_millis(), 345);
    }

    #[test]
    fn test_round_trip_format() {
        let raw = "2020-01-01T00:00:00.001Z";
        let ts = parse_wire_timestamp(raw).unwrap();
        assert_eq!(format_wire_timestamp(&ts), raw);
    }

    #[test]
    fn test_reject_wrong_shapes() {
        for bad in [
            "",
            "2019-04-05T12:01:02Z",
            "2019-04-05T12:01:02.34Z",
            "2019-04-05T12:01:02.3456Z",
            "2019-04-05 12:01:02.345Z",
            "2019-04-05T12:01:02.345+00:00",
            "2019-13-05T12:01:02.345Z",
            "not a timestamp at all!!",
        ] {
            assert!(parse_wire_timestamp(bad).is_err(), "accepted {bad:?}");
        }
    }
}
