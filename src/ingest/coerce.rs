//! Lenient field coercion for delivery records.
//!
//! Source tables are produced by several tools and are not always clean:
//! `"4.0"` where an integer is expected, blank cells, stray text. Rather
//! than rejecting a row, numbers fall back to 0, flags to `false` and
//! dates to `None`.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

/// Parse an integer, accepting float notation. Anything else yields 0.
pub fn int_or_zero(raw: &str) -> i64 {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return v;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => v.trunc() as i64,
        _ => 0,
    }
}

pub fn flag(raw: &str) -> bool {
    match raw.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => true,
        "false" | "f" | "no" | "n" | "" => false,
        other => other.parse::<f64>().map(|v| v != 0.0).unwrap_or(false),
    }
}

pub fn date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(int_or_zero).unwrap_or(0))
}

pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(flag).unwrap_or(false))
}

pub fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_accepts_plain_and_float_notation() {
        assert_eq!(int_or_zero("4"), 4);
        assert_eq!(int_or_zero(" 12 "), 12);
        assert_eq!(int_or_zero("6.0"), 6);
        assert_eq!(int_or_zero("-3"), -3);
    }

    #[test]
    fn int_falls_back_to_zero() {
        assert_eq!(int_or_zero(""), 0);
        assert_eq!(int_or_zero("four"), 0);
        assert_eq!(int_or_zero("NaN"), 0);
        assert_eq!(int_or_zero("inf"), 0);
    }

    #[test]
    fn flag_variants() {
        assert!(flag("True"));
        assert!(flag("1"));
        assert!(flag("1.0"));
        assert!(flag("yes"));
        assert!(!flag("False"));
        assert!(!flag("0"));
        assert!(!flag(""));
        assert!(!flag("garbage"));
    }

    #[test]
    fn date_parses_iso_only() {
        assert_eq!(date("2022-10-23"), NaiveDate::from_ymd_opt(2022, 10, 23));
        assert_eq!(date("23/10/2022"), None);
    }
}
