use super::temporal::{Date, DateTime, Duration};
use super::{DECIMAL64_DIGITS, DataTypeAdapter, JsonType, unsupported_cast};
use crate::error::MetapathError;
use crate::types::AtomicItem;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::str::FromStr;
use std::sync::LazyLock;

static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+$").expect("BUG: invalid INTEGER_RE regex literal"));

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").expect("BUG: invalid DECIMAL_RE regex literal")
});

static DOUBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$")
        .expect("BUG: invalid DOUBLE_RE regex literal")
});

static NCNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}_][\p{L}\p{N}_.\-]*$").expect("BUG: invalid NCNAME_RE regex literal")
});

const URI_EXCLUDED: &[char] = &['<', '>', '"', '{', '}', '|', '\\', '^', '`'];

fn parse_with<T>(
    type_name: &str,
    text: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, MetapathError> {
    parse(text.trim()).ok_or_else(|| MetapathError::parse_value(type_name, text))
}

#[derive(Debug)]
pub struct StringAdapter;

impl DataTypeAdapter for StringAdapter {
    fn name(&self) -> &'static str {
        "string"
    }

    fn json_type(&self) -> JsonType {
        JsonType::String
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        Ok(AtomicItem::String(text.to_string()))
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        Ok(AtomicItem::String(item.as_string()))
    }
}

#[derive(Debug)]
pub struct UntypedAtomicAdapter;

impl DataTypeAdapter for UntypedAtomicAdapter {
    fn name(&self) -> &'static str {
        "untyped-atomic"
    }

    fn json_type(&self) -> JsonType {
        JsonType::String
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        Ok(AtomicItem::UntypedAtomic(text.to_string()))
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        Ok(AtomicItem::UntypedAtomic(item.as_string()))
    }
}

#[derive(Debug)]
pub struct BooleanAdapter;

impl DataTypeAdapter for BooleanAdapter {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn json_type(&self) -> JsonType {
        JsonType::Boolean
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        parse_with("boolean", text, |s| match s {
            "true" | "1" => Some(AtomicItem::Boolean(true)),
            "false" | "0" => Some(AtomicItem::Boolean(false)),
            _ => None,
        })
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        match item {
            AtomicItem::Double(d) => Ok(AtomicItem::Boolean(*d != 0.0 && !d.is_nan())),
            numeric if numeric.is_numeric() => Ok(AtomicItem::Boolean(
                numeric.as_decimal().is_some_and(|d| !d.is_zero()),
            )),
            string if string.is_string_like() => self
                .parse(&string.as_string())
                .map_err(|err| MetapathError::cast(item.type_name(), self.name(), err.to_string())),
            other => Err(unsupported_cast(other, self.name())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntegerRange {
    Any,
    NonNegative,
    Positive,
}

/// The integer family. Values outside the type's range are rejected.
#[derive(Debug)]
pub struct IntegerAdapter {
    range: IntegerRange,
}

impl IntegerAdapter {
    pub fn integer() -> Self {
        Self {
            range: IntegerRange::Any,
        }
    }

    pub fn non_negative() -> Self {
        Self {
            range: IntegerRange::NonNegative,
        }
    }

    pub fn positive() -> Self {
        Self {
            range: IntegerRange::Positive,
        }
    }

    fn make(&self, value: i64) -> Option<AtomicItem> {
        match self.range {
            IntegerRange::Any => Some(AtomicItem::Integer(value)),
            IntegerRange::NonNegative if value >= 0 => Some(AtomicItem::NonNegativeInteger(value)),
            IntegerRange::Positive if value > 0 => Some(AtomicItem::PositiveInteger(value)),
            _ => None,
        }
    }

    fn make_cast(&self, source: &AtomicItem, value: Option<i64>) -> Result<AtomicItem, MetapathError> {
        value.and_then(|v| self.make(v)).ok_or_else(|| {
            MetapathError::cast(
                source.type_name(),
                self.name(),
                format!("value '{}' is out of range", source.as_string()),
            )
        })
    }
}

impl DataTypeAdapter for IntegerAdapter {
    fn name(&self) -> &'static str {
        match self.range {
            IntegerRange::Any => "integer",
            IntegerRange::NonNegative => "non-negative-integer",
            IntegerRange::Positive => "positive-integer",
        }
    }

    fn json_type(&self) -> JsonType {
        JsonType::Number
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        parse_with(self.name(), text, |s| {
            if !INTEGER_RE.is_match(s) {
                return None;
            }
            s.trim_start_matches('+').parse::<i64>().ok().and_then(|v| self.make(v))
        })
    }

    fn is_instance(&self, item: &AtomicItem) -> bool {
        match self.range {
            IntegerRange::Any => item.is_integer(),
            IntegerRange::NonNegative => matches!(
                item,
                AtomicItem::NonNegativeInteger(_) | AtomicItem::PositiveInteger(_)
            ),
            IntegerRange::Positive => matches!(item, AtomicItem::PositiveInteger(_)),
        }
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        match item {
            AtomicItem::Boolean(b) => self.make_cast(item, Some(i64::from(*b))),
            AtomicItem::Decimal(d) => self.make_cast(item, d.trunc().to_i64()),
            AtomicItem::Double(d) if d.is_finite() => self.make_cast(item, d.trunc().to_i64()),
            integer if integer.is_integer() => self.make_cast(item, integer.as_i64()),
            string if string.is_string_like() => self
                .parse(&string.as_string())
                .map_err(|err| MetapathError::cast(item.type_name(), self.name(), err.to_string())),
            other => Err(unsupported_cast(other, self.name())),
        }
    }
}

/// Rewrites the unsigned decimal text `integer.fraction` as plain decimal
/// text with at most decimal64 significant digits, rounding half-even.
/// Text that already fits keeps its scale.
fn round_decimal_text(integer: &str, fraction: &str) -> String {
    let integer = match integer.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let all = format!("{integer}{fraction}");
    let significant = all.trim_start_matches('0');
    let limit = DECIMAL64_DIGITS as usize;
    if significant.len() <= limit {
        return if fraction.is_empty() {
            integer.to_string()
        } else {
            format!("{integer}.{fraction}")
        };
    }

    let (kept, dropped) = significant.split_at(limit);
    let mut mantissa = kept
        .bytes()
        .fold(0_u64, |acc, digit| acc * 10 + u64::from(digit - b'0'));
    let mut rest = dropped.bytes();
    let round_up = match rest.next() {
        Some(b'6'..=b'9') => true,
        Some(b'5') => rest.any(|digit| digit != b'0') || mantissa % 2 == 1,
        _ => false,
    };
    // value = mantissa * 10^exponent
    let mut exponent = dropped.len() as isize - fraction.len() as isize;
    if round_up {
        mantissa += 1;
        if mantissa == 10_u64.pow(DECIMAL64_DIGITS) {
            mantissa /= 10;
            exponent += 1;
        }
    }

    let digits = mantissa.to_string();
    if exponent >= 0 {
        return format!("{digits}{}", "0".repeat(exponent.unsigned_abs()));
    }
    let scale = exponent.unsigned_abs();
    if digits.len() > scale {
        let (whole, part) = digits.split_at(digits.len() - scale);
        format!("{whole}.{part}")
    } else {
        format!("0.{}{digits}", "0".repeat(scale - digits.len()))
    }
}

/// Decimals, held at decimal64 precision.
#[derive(Debug)]
pub struct DecimalAdapter;

impl DataTypeAdapter for DecimalAdapter {
    fn name(&self) -> &'static str {
        "decimal"
    }

    fn json_type(&self) -> JsonType {
        JsonType::Number
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        let s = text.trim();
        if !DECIMAL_RE.is_match(s) {
            return Err(MetapathError::parse_value("decimal", text));
        }
        let (sign, unsigned) = match s.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", s.trim_start_matches('+')),
        };
        let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let rounded = round_decimal_text(integer, fraction);
        Decimal::from_str(&format!("{sign}{rounded}"))
            .map(AtomicItem::decimal)
            .map_err(|_| MetapathError::DecimalOverflow {
                value: text.to_string(),
            })
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        match item {
            AtomicItem::Boolean(true) => Ok(AtomicItem::Decimal(Decimal::new(10, 1))),
            AtomicItem::Boolean(false) => Ok(AtomicItem::Decimal(Decimal::new(0, 1))),
            AtomicItem::Double(d) => Decimal::from_f64(*d)
                .map(AtomicItem::decimal)
                .ok_or_else(|| {
                    MetapathError::cast(
                        item.type_name(),
                        self.name(),
                        format!("'{}' has no decimal value", item.as_string()),
                    )
                }),
            integer if integer.is_integer() => Ok(AtomicItem::decimal(
                integer.as_decimal().unwrap_or_default(),
            )),
            string if string.is_string_like() => self
                .parse(&string.as_string())
                .map_err(|err| MetapathError::cast(item.type_name(), self.name(), err.to_string())),
            other => Err(unsupported_cast(other, self.name())),
        }
    }
}

#[derive(Debug)]
pub struct DoubleAdapter;

impl DataTypeAdapter for DoubleAdapter {
    fn name(&self) -> &'static str {
        "double"
    }

    fn json_type(&self) -> JsonType {
        JsonType::Number
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        parse_with("double", text, |s| match s {
            "INF" | "+INF" => Some(AtomicItem::Double(f64::INFINITY)),
            "-INF" => Some(AtomicItem::Double(f64::NEG_INFINITY)),
            "NaN" => Some(AtomicItem::Double(f64::NAN)),
            _ if DOUBLE_RE.is_match(s) => s.parse::<f64>().ok().map(AtomicItem::Double),
            _ => None,
        })
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        match item {
            AtomicItem::Boolean(b) => Ok(AtomicItem::Double(if *b { 1.0 } else { 0.0 })),
            numeric if numeric.is_numeric() => Ok(AtomicItem::Double(
                numeric.as_f64().unwrap_or(f64::NAN),
            )),
            string if string.is_string_like() => self
                .parse(&string.as_string())
                .map_err(|err| MetapathError::cast(item.type_name(), self.name(), err.to_string())),
            other => Err(unsupported_cast(other, self.name())),
        }
    }
}

#[derive(Debug)]
pub struct DateAdapter;

impl DataTypeAdapter for DateAdapter {
    fn name(&self) -> &'static str {
        "date"
    }

    fn json_type(&self) -> JsonType {
        JsonType::String
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        Date::parse(text).map(AtomicItem::Date)
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        match item {
            AtomicItem::DateTime(dt) => Ok(AtomicItem::Date(dt.to_date())),
            string if string.is_string_like() => self
                .parse(&string.as_string())
                .map_err(|err| MetapathError::cast(item.type_name(), self.name(), err.to_string())),
            other => Err(unsupported_cast(other, self.name())),
        }
    }
}

#[derive(Debug)]
pub struct DateTimeAdapter;

impl DataTypeAdapter for DateTimeAdapter {
    fn name(&self) -> &'static str {
        "date-time"
    }

    fn json_type(&self) -> JsonType {
        JsonType::String
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        DateTime::parse(text).map(AtomicItem::DateTime)
    }

    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        match item {
            AtomicItem::Date(date) => Ok(AtomicItem::DateTime(date.to_date_time())),
            string if string.is_string_like() => self
                .parse(&string.as_string())
                .map_err(|err| MetapathError::cast(item.type_name(), self.name(), err.to_string())),
            other => Err(unsupported_cast(other, self.name())),
        }
    }
}

#[derive(Debug)]
pub struct DurationAdapter;

impl DataTypeAdapter for DurationAdapter {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn json_type(&self) -> JsonType {
        JsonType::String
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        Duration::parse(text).map(AtomicItem::Duration)
    }
}

#[derive(Debug)]
pub struct UriAdapter;

impl DataTypeAdapter for UriAdapter {
    fn name(&self) -> &'static str {
        "uri"
    }

    fn json_type(&self) -> JsonType {
        JsonType::String
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        parse_with("uri", text, |s| {
            let valid = url::Url::parse(s).is_ok()
                || !s.chars().any(|c| c.is_whitespace() || URI_EXCLUDED.contains(&c));
            valid.then(|| AtomicItem::Uri(s.to_string()))
        })
    }
}

#[derive(Debug)]
pub struct NcNameAdapter;

impl DataTypeAdapter for NcNameAdapter {
    fn name(&self) -> &'static str {
        "ncname"
    }

    fn json_type(&self) -> JsonType {
        JsonType::String
    }

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError> {
        parse_with("ncname", text, |s| {
            NCNAME_RE
                .is_match(s)
                .then(|| AtomicItem::NcName(s.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_round_trip() {
        let adapter = DecimalAdapter;
        for text in ["0", "1.0", "-12.345", "0.0001", "12345678901234.56", ".5"] {
            let value = adapter.parse(text).unwrap();
            let reparsed = adapter.parse(&adapter.format(&value)).unwrap();
            assert_eq!(value, reparsed, "round trip of {text}");
        }
        assert!(adapter.parse("1e5").is_err());
        assert!(adapter.parse("abc").is_err());
    }

    #[test]
    fn test_decimal_rounds_long_text_to_decimal64() {
        let adapter = DecimalAdapter;
        let decimal = |text: &str| AtomicItem::Decimal(Decimal::from_str(text).unwrap());

        assert_eq!(
            adapter.parse("1234567890123456789012345678").unwrap(),
            decimal("1234567890123457000000000000")
        );
        assert_eq!(
            adapter.parse("0000000000000000000000000000000012.5").unwrap(),
            decimal("12.5")
        );
        // ties go to the even neighbour
        assert_eq!(
            adapter.parse("1234567890123456.5").unwrap(),
            decimal("1234567890123456")
        );
        assert_eq!(
            adapter.parse("-9999999999999999.5").unwrap(),
            decimal("-10000000000000000")
        );
        assert_eq!(
            adapter.parse("0.12345678901234567890123456789012345678901").unwrap(),
            decimal("0.1234567890123457")
        );
        assert_eq!(adapter.parse("1.0").unwrap().as_string(), "1.0");
    }

    #[test]
    fn test_decimal_out_of_range() {
        let adapter = DecimalAdapter;
        assert_eq!(
            adapter.parse("12345678901234567890123456789012345").unwrap_err(),
            MetapathError::DecimalOverflow {
                value: "12345678901234567890123456789012345".into()
            }
        );
    }

    #[test]
    fn test_decimal_from_boolean() {
        let adapter = DecimalAdapter;
        let one = adapter.cast(&AtomicItem::Boolean(true)).unwrap();
        let zero = adapter.cast(&AtomicItem::Boolean(false)).unwrap();
        assert!(matches!(one, AtomicItem::Decimal(d) if d == Decimal::new(10, 1)));
        assert_eq!(one.as_string(), "1.0");
        assert_eq!(zero.as_string(), "0.0");
    }

    #[test]
    fn test_decimal_from_numeric() {
        let adapter = DecimalAdapter;
        let from_int = adapter.cast(&AtomicItem::Integer(7)).unwrap();
        assert!(matches!(from_int, AtomicItem::Decimal(_)));
        let from_double = adapter.cast(&AtomicItem::Double(0.25)).unwrap();
        assert_eq!(from_double.as_string(), "0.25");
        assert!(matches!(
            adapter.cast(&AtomicItem::Double(f64::NAN)),
            Err(MetapathError::Cast { .. })
        ));
    }

    #[test]
    fn test_unsupported_cast_names_source_type() {
        let adapter = DateAdapter;
        let err = adapter.cast(&AtomicItem::Integer(3)).unwrap_err();
        match err {
            MetapathError::Cast { source_type, target_type, .. } => {
                assert_eq!(source_type, "integer");
                assert_eq!(target_type, "date");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_date_casts() {
        let adapter = DateAdapter;
        let from_date_time = adapter
            .cast(&AtomicItem::DateTime(DateTime::parse("2024-06-01T10:00:00Z").unwrap()))
            .unwrap();
        assert_eq!(from_date_time.as_string(), "2024-06-01Z");

        let from_string = adapter.cast(&AtomicItem::string("2024-06-01")).unwrap();
        assert_eq!(from_string.as_string(), "2024-06-01");

        assert!(matches!(
            adapter.cast(&AtomicItem::string("2024-02-30")),
            Err(MetapathError::Cast { .. })
        ));
    }

    #[test]
    fn test_integer_ranges() {
        assert!(IntegerAdapter::positive().parse("0").is_err());
        assert!(IntegerAdapter::non_negative().parse("0").is_ok());
        assert!(IntegerAdapter::non_negative().parse("-1").is_err());
        assert!(IntegerAdapter::integer().parse("+42").is_ok());

        let truncated = IntegerAdapter::integer()
            .cast(&AtomicItem::Double(-3.7))
            .unwrap();
        assert_eq!(truncated, AtomicItem::Integer(-3));
        assert!(
            IntegerAdapter::positive()
                .cast(&AtomicItem::Integer(-3))
                .is_err()
        );
    }

    #[test]
    fn test_boolean_parse_and_cast() {
        let adapter = BooleanAdapter;
        assert_eq!(adapter.parse("1").unwrap(), AtomicItem::Boolean(true));
        assert!(adapter.parse("yes").is_err());
        assert_eq!(
            adapter.cast(&AtomicItem::Integer(0)).unwrap(),
            AtomicItem::Boolean(false)
        );
    }

    #[test]
    fn test_double_special_values() {
        let adapter = DoubleAdapter;
        assert!(matches!(adapter.parse("NaN").unwrap(), AtomicItem::Double(d) if d.is_nan()));
        assert_eq!(adapter.parse("-INF").unwrap().as_string(), "-INF");
        assert_eq!(adapter.parse("1.5e3").unwrap().as_string(), "1500");
    }

    #[test]
    fn test_ncname_and_uri() {
        assert!(NcNameAdapter.parse("valid-name_1").is_ok());
        assert!(NcNameAdapter.parse("1invalid").is_err());
        assert!(NcNameAdapter.parse("a:b").is_err());
        assert!(UriAdapter.parse("https://example.com/a?b=c").is_ok());
        assert!(UriAdapter.parse("relative/path.xml").is_ok());
        assert!(UriAdapter.parse("has space").is_err());
    }
}
