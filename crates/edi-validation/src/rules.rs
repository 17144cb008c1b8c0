//! Value rules for simple elements and components
//!
//! Every rule is independent: one value can break several of them, and
//! each broken rule is reported.

use chrono::{NaiveDate, NaiveTime};
use edi_ir::ViolationKind;
use edi_schema::{BaseKind, SimpleType};
use regex::Regex;
use std::sync::LazyLock;

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+$").expect("invalid integer regex"));

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(?:[0-9]+(?:\.(?<fraction>[0-9]*))?|\.(?<bare>[0-9]+))(?:[Ee](?<exponent>-?[0-9]+))?$")
        .expect("invalid decimal regex")
});

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("invalid digits regex"));

/// A broken rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub kind: ViolationKind,
    pub message: String,
}

impl RuleFailure {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Check a non-empty value against the constraints `ty` has for `version`.
///
/// Empty values carry no data and pass; required-ness is checked at the
/// segment level.
#[must_use]
pub fn check_value(
    ty: &SimpleType,
    version: Option<&str>,
    value: &str,
    check_codes: bool,
) -> Vec<RuleFailure> {
    let mut failures = Vec::new();
    if value.is_empty() {
        return failures;
    }

    let length = value_length(ty.kind(), value);
    let min = ty.min_length(version);
    let max = ty.max_length(version);
    if length < min {
        failures.push(RuleFailure::new(
            ViolationKind::TooShort,
            format!("{}: length {length} is less than minimum {min}", ty.id()),
        ));
    }
    if length > max {
        failures.push(RuleFailure::new(
            ViolationKind::TooLong,
            format!("{}: length {length} exceeds maximum {max}", ty.id()),
        ));
    }

    if check_codes {
        let codes = ty.values(version);
        if !codes.is_empty() && !codes.contains_key(value) {
            failures.push(RuleFailure::new(
                ViolationKind::InvalidCodeValue,
                format!("{}: '{value}' is not an allowed code", ty.id()),
            ));
        }
    }

    if let Err(reason) = check_lexical(ty, value) {
        failures.push(RuleFailure::new(
            ViolationKind::InvalidDateOrTimeOrNumber,
            format!("{}: {reason}", ty.id()),
        ));
    }

    failures
}

/// Length of a value as the schema measures it: mantissa digits for numeric
/// kinds, characters otherwise
#[must_use]
pub fn value_length(kind: BaseKind, value: &str) -> usize {
    if kind.is_numeric() {
        value
            .chars()
            .take_while(|c| !matches!(c, 'E' | 'e'))
            .filter(char::is_ascii_digit)
            .count()
    } else {
        value.chars().count()
    }
}

/// Check the lexical form required by the type's base kind
///
/// # Errors
///
/// Returns a description of the problem when the value is malformed.
pub fn check_lexical(ty: &SimpleType, value: &str) -> Result<(), String> {
    match ty.kind() {
        BaseKind::Integer => check_integer(value),
        BaseKind::Decimal => check_decimal(value, ty.scale()),
        BaseKind::Date => check_date(value),
        BaseKind::Time => check_time(value),
        BaseKind::Identifier | BaseKind::String | BaseKind::Binary => Ok(()),
    }
}

/// # Errors
///
/// Returns a description when `value` is not an optionally signed integer.
pub fn check_integer(value: &str) -> Result<(), String> {
    if INTEGER.is_match(value) {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid integer"))
    }
}

/// # Errors
///
/// Returns a description when `value` is not a decimal number, or when it
/// carries more fractional digits than `scale` once the exponent is applied.
pub fn check_decimal(value: &str, scale: Option<u32>) -> Result<(), String> {
    let invalid = || format!("'{value}' is not a valid decimal");
    let Some(captures) = DECIMAL.captures(value) else {
        return Err(invalid());
    };

    let written = captures
        .name("fraction")
        .or_else(|| captures.name("bare"))
        .map_or(0, |m| m.as_str().len());
    let exponent: i64 = match captures.name("exponent") {
        Some(m) => m.as_str().parse().map_err(|_| invalid())?,
        None => 0,
    };
    let fraction = i64::try_from(written)
        .unwrap_or(i64::MAX)
        .saturating_sub(exponent);

    match scale {
        Some(scale) if fraction > i64::from(scale) => Err(format!(
            "'{value}' has {fraction} decimal places, at most {scale} allowed"
        )),
        _ => Ok(()),
    }
}

/// Dates are `YYMMDD` or `CCYYMMDD`
///
/// # Errors
///
/// Returns a description when `value` is not a calendar date.
pub fn check_date(value: &str) -> Result<(), String> {
    let invalid = || format!("'{value}' is not a valid date");
    if !DIGITS.is_match(value) {
        return Err(invalid());
    }

    let (year, rest) = match value.len() {
        6 => {
            let yy: i32 = parse(&value[..2]).ok_or_else(invalid)?;
            (if yy < 50 { 2000 + yy } else { 1900 + yy }, &value[2..])
        }
        8 => (parse(&value[..4]).ok_or_else(invalid)?, &value[4..]),
        _ => return Err(invalid()),
    };
    let month = parse(&rest[..2]).ok_or_else(invalid)?;
    let day = parse(&rest[2..]).ok_or_else(invalid)?;

    NaiveDate::from_ymd_opt(year, month, day)
        .map(|_| ())
        .ok_or_else(invalid)
}

/// Times are `HHMM`, `HHMMSS`, or `HHMMSS` followed by one or two decimal
/// seconds digits
///
/// # Errors
///
/// Returns a description when `value` is not a clock time.
pub fn check_time(value: &str) -> Result<(), String> {
    let invalid = || format!("'{value}' is not a valid time");
    if !DIGITS.is_match(value) || !matches!(value.len(), 4 | 6 | 7 | 8) {
        return Err(invalid());
    }

    let hour = parse(&value[..2]).ok_or_else(invalid)?;
    let minute = parse(&value[2..4]).ok_or_else(invalid)?;
    let second = if value.len() >= 6 {
        parse(&value[4..6]).ok_or_else(invalid)?
    } else {
        0
    };

    NaiveTime::from_hms_opt(hour, minute, second)
        .map(|_| ())
        .ok_or_else(invalid)
}

fn parse<T: std::str::FromStr>(digits: &str) -> Option<T> {
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_schema::VersionOverride;
    use edi_schema::VersionRange;

    fn kinds(failures: &[RuleFailure]) -> Vec<ViolationKind> {
        failures.iter().map(|f| f.kind).collect()
    }

    fn coded() -> SimpleType {
        SimpleType::builder("E3", BaseKind::Identifier)
            .length(2, 2)
            .code("10", "Ten")
            .code("20", "Twenty")
            .build()
            .unwrap()
    }

    #[test]
    fn test_valid_code() {
        assert!(check_value(&coded(), None, "10", true).is_empty());
    }

    #[test]
    fn test_invalid_code_only() {
        let failures = check_value(&coded(), None, "30", true);
        assert_eq!(kinds(&failures), vec![ViolationKind::InvalidCodeValue]);
    }

    #[test]
    fn test_code_check_disabled() {
        assert!(check_value(&coded(), None, "30", false).is_empty());
    }

    #[test]
    fn test_multiple_failures_reported() {
        let failures = check_value(&coded(), None, "300", true);
        assert_eq!(
            kinds(&failures),
            vec![ViolationKind::TooLong, ViolationKind::InvalidCodeValue]
        );
    }

    #[test]
    fn test_empty_value_passes() {
        assert!(check_value(&coded(), None, "", true).is_empty());
    }

    #[test]
    fn test_versioned_length() {
        let range = VersionRange::new(Some("00600".into()), Some("00700".into())).unwrap();
        let ty = SimpleType::builder("E1", BaseKind::String)
            .length(2, 5)
            .version(VersionOverride::new(range).max_length(10))
            .build()
            .unwrap();

        assert!(check_value(&ty, Some("00650"), "ABCDEFGH", true).is_empty());
        assert_eq!(
            kinds(&check_value(&ty, Some("00800"), "ABCDEFGH", true)),
            vec![ViolationKind::TooLong]
        );
        assert_eq!(
            kinds(&check_value(&ty, None, "A", true)),
            vec![ViolationKind::TooShort]
        );
    }

    #[test]
    fn test_numeric_length_counts_digits() {
        assert_eq!(value_length(BaseKind::Decimal, "-12.50"), 4);
        assert_eq!(value_length(BaseKind::Integer, "-120"), 3);
        assert_eq!(value_length(BaseKind::String, "-12.50"), 6);
        assert_eq!(value_length(BaseKind::String, "Zürich"), 6);
    }

    #[test]
    fn test_numeric_length_ignores_exponent() {
        assert_eq!(value_length(BaseKind::Decimal, "1.5E3"), 2);
        assert_eq!(value_length(BaseKind::Decimal, "-25e-10"), 2);
        assert_eq!(value_length(BaseKind::String, "1.5E3"), 5);

        let ty = SimpleType::builder("E1", BaseKind::Decimal)
            .length(1, 2)
            .build()
            .unwrap();
        assert!(check_value(&ty, None, "1.5E3", true).is_empty());
        assert_eq!(
            kinds(&check_value(&ty, None, "1.25E3", true)),
            vec![ViolationKind::TooLong]
        );
    }

    #[test]
    fn test_integer() {
        assert!(check_integer("0042").is_ok());
        assert!(check_integer("-7").is_ok());
        assert!(check_integer("4.2").is_err());
        assert!(check_integer("12A").is_err());
    }

    #[test]
    fn test_decimal() {
        assert!(check_decimal("12.5", None).is_ok());
        assert!(check_decimal("-.5", None).is_ok());
        assert!(check_decimal("12.", None).is_ok());
        assert!(check_decimal("1.5E3", None).is_ok());
        assert!(check_decimal("1.2.3", None).is_err());
        assert!(check_decimal("abc", None).is_err());
        assert!(check_decimal("12.50", Some(2)).is_ok());
        assert!(check_decimal("12.505", Some(2)).is_err());
        assert!(check_decimal("12", Some(0)).is_ok());
    }

    #[test]
    fn test_decimal_scale_applies_exponent() {
        // 123.4
        assert!(check_decimal("1.234E2", Some(2)).is_ok());
        assert!(check_decimal("1.2345E1", Some(2)).is_err());
        // 0.0125
        assert!(check_decimal("1.25e-2", Some(2)).is_err());
        assert!(check_decimal("125E-2", Some(2)).is_ok());
        assert!(check_decimal("5E3", Some(0)).is_ok());
    }

    #[test]
    fn test_dates() {
        assert!(check_date("20240229").is_ok());
        assert!(check_date("20230229").is_err());
        assert!(check_date("991231").is_ok());
        assert!(check_date("20241301").is_err());
        assert!(check_date("2024011").is_err());
        assert!(check_date("2024-01-01").is_err());
    }

    #[test]
    fn test_times() {
        assert!(check_time("2359").is_ok());
        assert!(check_time("235959").is_ok());
        assert!(check_time("23595999").is_ok());
        assert!(check_time("2460").is_err());
        assert!(check_time("2400").is_err());
        assert!(check_time("23595").is_err());
        assert!(check_time("12:30").is_err());
    }

    #[test]
    fn test_date_kind_reports_lexical_failure() {
        let ty = SimpleType::builder("E373", BaseKind::Date)
            .length(8, 8)
            .build()
            .unwrap();
        assert_eq!(
            kinds(&check_value(&ty, None, "20241340", true)),
            vec![ViolationKind::InvalidDateOrTimeOrNumber]
        );
    }
}
