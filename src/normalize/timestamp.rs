//! Timestamp canonicalization.
//!
//! Every source encoding resolves to a `DateTime<Utc>` or to nothing. Values
//! outside [1980, 2100) are rejected rather than guessed at.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;

use crate::constants::{CHROME_EPOCH_OFFSET_SECS, COCOA_EPOCH_OFFSET_SECS};
use crate::models::RawTimestamp;

/// Canonical text form used by the store and by fingerprints.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const MICROS_PER_SEC: i64 = 1_000_000;

lazy_static! {
    static ref EARLIEST: DateTime<Utc> = Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap();
    static ref LATEST: DateTime<Utc> = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
}

/// Zoneless layouts accepted after RFC 3339 fails. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Layouts carrying a numeric offset without the RFC 3339 colon.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Resolve a raw timestamp to a UTC instant.
///
/// Returns `None` for absent, ambiguous or out-of-window values.
pub fn normalize_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    let resolved = match raw {
        RawTimestamp::Absent => None,
        RawTimestamp::Auto(value) => from_magnitude(*value),
        RawTimestamp::UnixSeconds(secs) => from_secs_f64(*secs),
        RawTimestamp::UnixMillis(millis) => from_secs_f64(*millis / 1_000.0),
        RawTimestamp::UnixMicros(micros) => from_micros(*micros),
        RawTimestamp::Chrome(micros) => micros
            .checked_sub(CHROME_EPOCH_OFFSET_SECS * MICROS_PER_SEC)
            .and_then(from_micros),
        RawTimestamp::Cocoa(secs) => from_secs_f64(*secs + COCOA_EPOCH_OFFSET_SECS as f64),
        RawTimestamp::Text(text) => parse_text(text),
    };

    resolved.filter(|dt| *dt >= *EARLIEST && *dt < *LATEST)
}

/// Render an instant in the store's canonical form.
pub fn to_canonical(dt: &DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/// Bare numbers are classified by order of magnitude only.
///
/// | range | unit |
/// |---|---|
/// | [1e9, 1e11) | Unix seconds |
/// | [1e11, 1e14) | Unix milliseconds |
/// | [1e14, 1e16) | Unix microseconds |
/// | [1e16, 1e18) | browser-epoch microseconds |
fn from_magnitude(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    match value {
        v if (1e9..1e11).contains(&v) => from_secs_f64(v),
        v if (1e11..1e14).contains(&v) => from_secs_f64(v / 1_000.0),
        v if (1e14..1e16).contains(&v) => from_micros(v as i64),
        v if (1e16..1e18).contains(&v) => normalize_timestamp(&RawTimestamp::Chrome(v as i64)),
        _ => None,
    }
}

fn from_secs_f64(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos).single()
}

fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(MICROS_PER_SEC);
    let nanos = (micros.rem_euclid(MICROS_PER_SEC) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(number) = text.parse::<f64>() {
        return from_magnitude(number);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_unix_units() {
        let expected = utc(2023, 11, 14, 22, 13, 20);
        assert_eq!(normalize_timestamp(&RawTimestamp::UnixSeconds(1_700_000_000.0)), Some(expected));
        assert_eq!(normalize_timestamp(&RawTimestamp::UnixMillis(1_700_000_000_000.0)), Some(expected));
        assert_eq!(normalize_timestamp(&RawTimestamp::UnixMicros(1_700_000_000_000_000)), Some(expected));
    }

    #[test]
    fn test_auto_bands() {
        let expected = utc(2023, 11, 14, 22, 13, 20);
        assert_eq!(normalize_timestamp(&RawTimestamp::Auto(1_700_000_000.0)), Some(expected));
        assert_eq!(normalize_timestamp(&RawTimestamp::Auto(1_700_000_000_000.0)), Some(expected));
        assert_eq!(normalize_timestamp(&RawTimestamp::Auto(1.7e15)), Some(expected));
        assert_eq!(normalize_timestamp(&RawTimestamp::Auto(42.0)), None);
        assert_eq!(normalize_timestamp(&RawTimestamp::Auto(-5.0)), None);
        assert_eq!(normalize_timestamp(&RawTimestamp::Auto(f64::NAN)), None);
    }

    #[test]
    fn test_chrome_epoch_lands_in_the_right_century() {
        // 2024-01-15T10:30:00Z in WebKit microseconds
        let webkit = (1_705_314_600 + CHROME_EPOCH_OFFSET_SECS) * MICROS_PER_SEC;
        let dt = normalize_timestamp(&RawTimestamp::Chrome(webkit)).unwrap();
        assert_eq!(dt, utc(2024, 1, 15, 10, 30, 0));

        let auto = normalize_timestamp(&RawTimestamp::Auto(webkit as f64)).unwrap();
        assert_eq!(auto.year(), 2024);
        assert!((auto - dt).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_cocoa_epoch() {
        let dt = normalize_timestamp(&RawTimestamp::Cocoa(727_000_000.5)).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(normalize_timestamp(&RawTimestamp::Cocoa(0.0)), Some(utc(2001, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_text_forms() {
        let expected = utc(2024, 3, 1, 12, 0, 0);
        for text in [
            "2024-03-01T12:00:00Z",
            "2024-03-01T14:00:00+02:00",
            "2024-03-01T12:00:00.000",
            "2024-03-01 12:00:00",
            "2024-03-01T12:00:00+0000",
            "1709294400",
            " 1709294400000 ",
        ] {
            assert_eq!(
                normalize_timestamp(&RawTimestamp::Text(text.to_string())),
                Some(expected),
                "{text}"
            );
        }
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Text("2024-03-01".into())),
            Some(utc(2024, 3, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_unresolvable_values() {
        for raw in [
            RawTimestamp::Absent,
            RawTimestamp::Text("yesterday".into()),
            RawTimestamp::Text("".into()),
            RawTimestamp::UnixSeconds(0.0),
            RawTimestamp::UnixSeconds(5_000_000_000.0),
            RawTimestamp::Chrome(0),
            RawTimestamp::Chrome(i64::MIN),
        ] {
            assert_eq!(normalize_timestamp(&raw), None, "{raw:?}");
        }
    }

    #[test]
    fn test_canonical_form() {
        let dt = utc(2024, 3, 1, 12, 0, 0);
        assert_eq!(to_canonical(&dt), "2024-03-01T12:00:00.000000Z");
    }

    proptest! {
        #[test]
        fn prop_units_agree(secs in 315_532_800i64..4_102_444_799i64) {
            let expected = Utc.timestamp_opt(secs, 0).single().unwrap();
            let from_s = normalize_timestamp(&RawTimestamp::UnixSeconds(secs as f64)).unwrap();
            let from_ms = normalize_timestamp(&RawTimestamp::UnixMillis(secs as f64 * 1000.0)).unwrap();
            let from_us = normalize_timestamp(&RawTimestamp::UnixMicros(secs * MICROS_PER_SEC)).unwrap();
            let from_chrome = normalize_timestamp(
                &RawTimestamp::Chrome((secs + CHROME_EPOCH_OFFSET_SECS) * MICROS_PER_SEC),
            ).unwrap();
            prop_assert_eq!(from_s, expected);
            prop_assert!((from_ms - expected).num_seconds().abs() <= 1);
            prop_assert_eq!(from_us, expected);
            prop_assert_eq!(from_chrome, expected);
        }

        #[test]
        fn prop_never_outside_window(value in proptest::num::f64::ANY) {
            if let Some(dt) = normalize_timestamp(&RawTimestamp::Auto(value)) {
                prop_assert!(dt >= *EARLIEST && dt < *LATEST);
            }
        }
    }
}
