use chrono::{DateTime, NaiveDateTime, Utc};

/// Naive layouts accepted for entries written without an offset.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a stored timestamp into UTC.
///
/// RFC 3339 values keep their offset and are converted. Values without an
/// offset (older entries were written that way) are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(format!("unrecognized timestamp: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_z_suffix() {
        let ts = parse_timestamp("2024-01-15T10:30:00.250Z").unwrap();
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_offset_converts_to_utc() {
        let ts = parse_timestamp("2024-01-15T23:30:00+02:00").unwrap();
        assert_eq!(ts.day(), 15);
        assert_eq!(ts.hour(), 21);
    }

    #[test]
    fn test_parse_naive_with_microseconds() {
        let ts = parse_timestamp("2024-01-15T10:30:00.123456").unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123456);
    }

    #[test]
    fn test_parse_naive_without_fraction() {
        assert!(parse_timestamp("2024-01-15T10:30:00").is_ok());
        assert!(parse_timestamp("2024-01-15 10:30:00").is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_timestamp("invalid").is_err());
        assert!(parse_timestamp("2024-13-40T00:00:00").is_err());
    }
}
