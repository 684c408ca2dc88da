use crate::datatype::temporal::{Date, DateTime, Duration};
use crate::datatype::{JsonType, to_decimal64};
use crate::types::map::MapKey;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::fmt;

/// A typed scalar value.
///
/// Equality follows map-key identity: values of the same type class with
/// equal canonical values are equal (`1` and `1.0` are the same number),
/// while dates with and without a timezone never are.
#[derive(Debug, Clone)]
pub enum AtomicItem {
    String(String),
    UntypedAtomic(String),
    Uri(String),
    NcName(String),
    Boolean(bool),
    Integer(i64),
    NonNegativeInteger(i64),
    PositiveInteger(i64),
    Decimal(Decimal),
    Double(f64),
    Date(Date),
    DateTime(DateTime),
    Duration(Duration),
}

impl AtomicItem {
    pub fn string(value: impl Into<String>) -> Self {
        AtomicItem::String(value.into())
    }

    /// A decimal value, rounded to DECIMAL64 precision.
    pub fn decimal(value: Decimal) -> Self {
        AtomicItem::Decimal(to_decimal64(value))
    }

    /// The name of the data type adapter that produced this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicItem::String(_) => "string",
            AtomicItem::UntypedAtomic(_) => "untyped-atomic",
            AtomicItem::Uri(_) => "uri",
            AtomicItem::NcName(_) => "ncname",
            AtomicItem::Boolean(_) => "boolean",
            AtomicItem::Integer(_) => "integer",
            AtomicItem::NonNegativeInteger(_) => "non-negative-integer",
            AtomicItem::PositiveInteger(_) => "positive-integer",
            AtomicItem::Decimal(_) => "decimal",
            AtomicItem::Double(_) => "double",
            AtomicItem::Date(_) => "date",
            AtomicItem::DateTime(_) => "date-time",
            AtomicItem::Duration(_) => "duration",
        }
    }

    pub fn json_type(&self) -> JsonType {
        match self {
            AtomicItem::Boolean(_) => JsonType::Boolean,
            AtomicItem::Integer(_)
            | AtomicItem::NonNegativeInteger(_)
            | AtomicItem::PositiveInteger(_)
            | AtomicItem::Decimal(_)
            | AtomicItem::Double(_) => JsonType::Number,
            _ => JsonType::String,
        }
    }

    /// The canonical lexical form.
    pub fn as_string(&self) -> String {
        match self {
            AtomicItem::String(s)
            | AtomicItem::UntypedAtomic(s)
            | AtomicItem::Uri(s)
            | AtomicItem::NcName(s) => s.clone(),
            AtomicItem::Boolean(b) => b.to_string(),
            AtomicItem::Integer(i)
            | AtomicItem::NonNegativeInteger(i)
            | AtomicItem::PositiveInteger(i) => i.to_string(),
            AtomicItem::Decimal(d) => d.to_string(),
            AtomicItem::Double(d) => format_double(*d),
            AtomicItem::Date(d) => d.to_string(),
            AtomicItem::DateTime(d) => d.to_string(),
            AtomicItem::Duration(d) => d.to_string(),
        }
    }

    /// Strings, URIs, NCNames and untyped values all compare as strings.
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            AtomicItem::String(_)
                | AtomicItem::UntypedAtomic(_)
                | AtomicItem::Uri(_)
                | AtomicItem::NcName(_)
        )
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, AtomicItem::UntypedAtomic(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            AtomicItem::Integer(_) | AtomicItem::NonNegativeInteger(_) | AtomicItem::PositiveInteger(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, AtomicItem::Decimal(_) | AtomicItem::Double(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AtomicItem::Integer(i)
            | AtomicItem::NonNegativeInteger(i)
            | AtomicItem::PositiveInteger(i) => Some(*i),
            _ => None,
        }
    }

    /// Exact decimal view of integer and decimal values.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            AtomicItem::Decimal(d) => Some(*d),
            other => other.as_i64().map(Decimal::from),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AtomicItem::Double(d) => Some(*d),
            AtomicItem::Decimal(d) => d.to_f64(),
            other => other.as_i64().map(|i| i as f64),
        }
    }

    pub fn to_map_key(&self) -> MapKey {
        match self {
            AtomicItem::String(s)
            | AtomicItem::UntypedAtomic(s)
            | AtomicItem::Uri(s)
            | AtomicItem::NcName(s) => MapKey::String(s.clone()),
            AtomicItem::Boolean(b) => MapKey::Boolean(*b),
            AtomicItem::Double(d) => match Decimal::from_f64(*d) {
                Some(value) if d.is_finite() => MapKey::Numeric(value.normalize()),
                _ if d.is_nan() => MapKey::Double(f64::NAN.to_bits()),
                _ => MapKey::Double(d.to_bits()),
            },
            AtomicItem::Date(d) => MapKey::Date(*d),
            AtomicItem::DateTime(d) => MapKey::DateTime(*d),
            AtomicItem::Duration(d) => MapKey::Duration(*d),
            numeric => MapKey::Numeric(numeric.as_decimal().unwrap_or_default().normalize()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            AtomicItem::Boolean(b) => Value::Bool(*b),
            AtomicItem::Integer(i)
            | AtomicItem::NonNegativeInteger(i)
            | AtomicItem::PositiveInteger(i) => Value::from(*i),
            AtomicItem::Decimal(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(d.to_string())),
            AtomicItem::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(format_double(*d))),
            other => Value::String(other.as_string()),
        }
    }
}

impl PartialEq for AtomicItem {
    fn eq(&self, other: &Self) -> bool {
        self.to_map_key() == other.to_map_key()
    }
}

impl fmt::Display for AtomicItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<bool> for AtomicItem {
    fn from(value: bool) -> Self {
        AtomicItem::Boolean(value)
    }
}

impl From<i64> for AtomicItem {
    fn from(value: i64) -> Self {
        AtomicItem::Integer(value)
    }
}

impl From<&str> for AtomicItem {
    fn from(value: &str) -> Self {
        AtomicItem::String(value.to_string())
    }
}

impl From<String> for AtomicItem {
    fn from(value: String) -> Self {
        AtomicItem::String(value)
    }
}

impl From<Decimal> for AtomicItem {
    fn from(value: Decimal) -> Self {
        AtomicItem::decimal(value)
    }
}

impl From<f64> for AtomicItem {
    fn from(value: f64) -> Self {
        AtomicItem::Double(value)
    }
}

/// Formats a double using plain notation for magnitudes in `[1e-6, 1e6)` and
/// scientific notation (`1.0E7`) otherwise.
pub(crate) fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let magnitude = value.abs();
    if (1e-6..1e6).contains(&magnitude) {
        return value.to_string();
    }
    let formatted = format!("{value:E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{mantissa}.0E{exponent}")
        }
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_identity_across_types() {
        assert_eq!(AtomicItem::Integer(1), AtomicItem::decimal(Decimal::new(10, 1)));
        assert_eq!(AtomicItem::Double(2.5), AtomicItem::decimal(Decimal::new(25, 1)));
        assert_ne!(AtomicItem::Integer(1), AtomicItem::string("1"));
        assert_eq!(AtomicItem::Double(f64::NAN), AtomicItem::Double(f64::NAN));
    }

    #[test]
    fn test_string_like_values_share_a_class() {
        assert_eq!(
            AtomicItem::UntypedAtomic("a".into()),
            AtomicItem::string("a")
        );
        assert_eq!(AtomicItem::Uri("x".into()), AtomicItem::NcName("x".into()));
    }

    #[test]
    fn test_double_formatting() {
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(0.5), "0.5");
        assert_eq!(format_double(1e7), "1.0E7");
        assert_eq!(format_double(1.5e-7), "1.5E-7");
        assert_eq!(format_double(f64::NEG_INFINITY), "-INF");
    }

    #[test]
    fn test_json_representation() {
        assert_eq!(AtomicItem::Integer(3).to_json(), serde_json::json!(3));
        assert_eq!(AtomicItem::Boolean(true).to_json(), serde_json::json!(true));
        assert_eq!(
            AtomicItem::Date(Date::parse("2024-01-02").unwrap()).to_json(),
            serde_json::json!("2024-01-02")
        );
    }
}
