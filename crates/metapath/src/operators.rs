//! Arithmetic and comparison over atomic values.
//!
//! Numeric operands are promoted along integer, decimal, double before the
//! operation is applied. Untyped operands become doubles in arithmetic,
//! strings in value comparisons, and take the type of the other operand in
//! general comparisons.

use crate::datatype::temporal::Duration;
use crate::datatype::{DataTypeAdapter, DoubleAdapter, TypeRegistry};
use crate::error::MetapathError;
use crate::types::AtomicItem;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
}

impl ArithmeticOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOperator::Add => "+",
            ArithmeticOperator::Subtract => "-",
            ArithmeticOperator::Multiply => "*",
            ArithmeticOperator::Divide => "div",
            ArithmeticOperator::IntegerDivide => "idiv",
            ArithmeticOperator::Modulo => "mod",
        }
    }
}

impl fmt::Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl ComparisonOperator {
    /// The general comparison symbol, e.g. `<=`.
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterOrEqual => ">=",
        }
    }

    /// The value comparison keyword, e.g. `le`.
    pub fn keyword(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "eq",
            ComparisonOperator::NotEqual => "ne",
            ComparisonOperator::LessThan => "lt",
            ComparisonOperator::LessOrEqual => "le",
            ComparisonOperator::GreaterThan => "gt",
            ComparisonOperator::GreaterOrEqual => "ge",
        }
    }

    /// Unordered operands only satisfy `ne`.
    fn test(&self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return *self == ComparisonOperator::NotEqual;
        };
        match self {
            ComparisonOperator::Equal => ordering == Ordering::Equal,
            ComparisonOperator::NotEqual => ordering != Ordering::Equal,
            ComparisonOperator::LessThan => ordering == Ordering::Less,
            ComparisonOperator::LessOrEqual => ordering != Ordering::Greater,
            ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
            ComparisonOperator::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
}

impl Numeric {
    fn of(item: &AtomicItem) -> Option<Self> {
        match item {
            AtomicItem::Double(d) => Some(Numeric::Double(*d)),
            AtomicItem::Decimal(d) => Some(Numeric::Decimal(*d)),
            other => other.as_i64().map(Numeric::Integer),
        }
    }

    fn as_decimal(&self) -> Decimal {
        match self {
            Numeric::Integer(i) => Decimal::from(*i),
            Numeric::Decimal(d) => *d,
            Numeric::Double(d) => Decimal::from_f64(*d).unwrap_or_default(),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Numeric::Integer(i) => *i as f64,
            Numeric::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            Numeric::Double(d) => *d,
        }
    }
}

fn promote(left: Numeric, right: Numeric) -> (Numeric, Numeric) {
    match (left, right) {
        (Numeric::Integer(_), Numeric::Integer(_)) => (left, right),
        (Numeric::Double(_), _) | (_, Numeric::Double(_)) => {
            (Numeric::Double(left.as_f64()), Numeric::Double(right.as_f64()))
        }
        _ => (
            Numeric::Decimal(left.as_decimal()),
            Numeric::Decimal(right.as_decimal()),
        ),
    }
}

fn untyped_as_double(item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
    if item.is_untyped() {
        DoubleAdapter.cast(item)
    } else {
        Ok(item.clone())
    }
}

fn untyped_as_string(item: &AtomicItem) -> AtomicItem {
    match item {
        AtomicItem::UntypedAtomic(s) => AtomicItem::String(s.clone()),
        other => other.clone(),
    }
}

fn undefined_operator(op: impl fmt::Display, left: &AtomicItem, right: &AtomicItem) -> MetapathError {
    MetapathError::dynamic_type(
        format!(
            "operator '{}' is not defined for {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
        left.type_name(),
    )
}

/// Applies a binary arithmetic operator.
pub fn arithmetic(
    op: ArithmeticOperator,
    left: &AtomicItem,
    right: &AtomicItem,
) -> Result<AtomicItem, MetapathError> {
    let left = untyped_as_double(left)?;
    let right = untyped_as_double(right)?;
    if let (Some(l), Some(r)) = (Numeric::of(&left), Numeric::of(&right)) {
        return match promote(l, r) {
            (Numeric::Integer(a), Numeric::Integer(b)) => integer_arithmetic(op, a, b),
            (Numeric::Decimal(a), Numeric::Decimal(b)) => decimal_arithmetic(op, a, b),
            (a, b) => double_arithmetic(op, a.as_f64(), b.as_f64()),
        };
    }
    temporal_arithmetic(op, &left, &right)
}

fn integer_arithmetic(op: ArithmeticOperator, a: i64, b: i64) -> Result<AtomicItem, MetapathError> {
    let result = match op {
        ArithmeticOperator::Add => a.checked_add(b),
        ArithmeticOperator::Subtract => a.checked_sub(b),
        ArithmeticOperator::Multiply => a.checked_mul(b),
        ArithmeticOperator::Divide => {
            return decimal_arithmetic(op, Decimal::from(a), Decimal::from(b));
        }
        ArithmeticOperator::IntegerDivide | ArithmeticOperator::Modulo if b == 0 => {
            return Err(MetapathError::DivisionByZero);
        }
        ArithmeticOperator::IntegerDivide => a.checked_div(b),
        ArithmeticOperator::Modulo => a.checked_rem(b),
    };
    result.map(AtomicItem::Integer).ok_or(MetapathError::Overflow)
}

fn decimal_arithmetic(
    op: ArithmeticOperator,
    a: Decimal,
    b: Decimal,
) -> Result<AtomicItem, MetapathError> {
    let divides = matches!(
        op,
        ArithmeticOperator::Divide | ArithmeticOperator::IntegerDivide | ArithmeticOperator::Modulo
    );
    if divides && b.is_zero() {
        return Err(MetapathError::DivisionByZero);
    }
    let result = match op {
        ArithmeticOperator::Add => a.checked_add(b),
        ArithmeticOperator::Subtract => a.checked_sub(b),
        ArithmeticOperator::Multiply => a.checked_mul(b),
        ArithmeticOperator::Divide => a.checked_div(b),
        ArithmeticOperator::IntegerDivide => {
            return a
                .checked_div(b)
                .and_then(|q| q.trunc().to_i64())
                .map(AtomicItem::Integer)
                .ok_or(MetapathError::Overflow);
        }
        ArithmeticOperator::Modulo => a.checked_rem(b),
    };
    result
        .map(|d| AtomicItem::decimal(d.normalize()))
        .ok_or(MetapathError::Overflow)
}

fn double_arithmetic(op: ArithmeticOperator, a: f64, b: f64) -> Result<AtomicItem, MetapathError> {
    let result = match op {
        ArithmeticOperator::Add => a + b,
        ArithmeticOperator::Subtract => a - b,
        ArithmeticOperator::Multiply => a * b,
        ArithmeticOperator::Divide => a / b,
        ArithmeticOperator::IntegerDivide => {
            if b == 0.0 {
                return Err(MetapathError::DivisionByZero);
            }
            let quotient = (a / b).trunc();
            if !quotient.is_finite() || quotient.abs() >= i64::MAX as f64 {
                return Err(MetapathError::Overflow);
            }
            return Ok(AtomicItem::Integer(quotient as i64));
        }
        ArithmeticOperator::Modulo => a % b,
    };
    Ok(AtomicItem::Double(result))
}

fn temporal_arithmetic(
    op: ArithmeticOperator,
    left: &AtomicItem,
    right: &AtomicItem,
) -> Result<AtomicItem, MetapathError> {
    use AtomicItem as A;
    use ArithmeticOperator as Op;
    match (op, left, right) {
        (Op::Add, A::Date(date), A::Duration(duration))
        | (Op::Add, A::Duration(duration), A::Date(date)) => Ok(A::Date(date.add(duration)?)),
        (Op::Subtract, A::Date(date), A::Duration(duration)) => {
            Ok(A::Date(date.add(&duration.negate())?))
        }
        (Op::Subtract, A::Date(a), A::Date(b)) => Ok(A::Duration(a.subtract(b))),
        (Op::Add, A::DateTime(value), A::Duration(duration))
        | (Op::Add, A::Duration(duration), A::DateTime(value)) => {
            Ok(A::DateTime(value.add(duration)?))
        }
        (Op::Subtract, A::DateTime(value), A::Duration(duration)) => {
            Ok(A::DateTime(value.add(&duration.negate())?))
        }
        (Op::Subtract, A::DateTime(a), A::DateTime(b)) => Ok(A::Duration(a.subtract(b))),
        (Op::Add, A::Duration(a), A::Duration(b)) => Ok(A::Duration(a.add(b)?)),
        (Op::Subtract, A::Duration(a), A::Duration(b)) => Ok(A::Duration(a.add(&b.negate())?)),
        (Op::Multiply, A::Duration(duration), factor)
        | (Op::Multiply, factor, A::Duration(duration))
            if factor.is_numeric() =>
        {
            scale_duration(duration, numeric_factor(factor)?).map(A::Duration)
        }
        (Op::Divide, A::Duration(duration), divisor) if divisor.is_numeric() => {
            let divisor = numeric_factor(divisor)?;
            if divisor.is_zero() {
                return Err(MetapathError::DivisionByZero);
            }
            let factor = Decimal::ONE
                .checked_div(divisor)
                .ok_or(MetapathError::Overflow)?;
            scale_duration(duration, factor).map(A::Duration)
        }
        (Op::Divide, A::Duration(a), A::Duration(b)) => divide_durations(a, b),
        _ => Err(undefined_operator(op, left, right)),
    }
}

fn numeric_factor(item: &AtomicItem) -> Result<Decimal, MetapathError> {
    match item {
        AtomicItem::Double(d) => Decimal::from_f64(*d).ok_or(MetapathError::Overflow),
        other => other.as_decimal().ok_or(MetapathError::Overflow),
    }
}

fn scale_duration(duration: &Duration, factor: Decimal) -> Result<Duration, MetapathError> {
    let months = Decimal::from(duration.months())
        .checked_mul(factor)
        .and_then(|m| m.round().to_i64())
        .ok_or(MetapathError::Overflow)?;
    let seconds = duration
        .seconds()
        .checked_mul(factor)
        .ok_or(MetapathError::Overflow)?;
    Ok(Duration::new(months, seconds))
}

fn divide_durations(a: &Duration, b: &Duration) -> Result<AtomicItem, MetapathError> {
    let (numerator, denominator) = if a.seconds().is_zero() && b.seconds().is_zero() {
        (Decimal::from(a.months()), Decimal::from(b.months()))
    } else {
        (a.seconds(), b.seconds())
    };
    if denominator.is_zero() {
        return Err(MetapathError::DivisionByZero);
    }
    numerator
        .checked_div(denominator)
        .map(|q| AtomicItem::decimal(q.normalize()))
        .ok_or(MetapathError::Overflow)
}

/// Unary minus.
pub fn negate(item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
    match untyped_as_double(item)? {
        AtomicItem::Double(d) => Ok(AtomicItem::Double(-d)),
        AtomicItem::Decimal(d) => Ok(AtomicItem::Decimal(-d)),
        AtomicItem::Duration(d) => Ok(AtomicItem::Duration(d.negate())),
        other => other
            .as_i64()
            .map(|i| i.checked_neg().map(AtomicItem::Integer).ok_or(MetapathError::Overflow))
            .unwrap_or_else(|| {
                Err(MetapathError::dynamic_type(
                    "unary minus requires a numeric operand",
                    other.type_name(),
                ))
            }),
    }
}

/// Orders two atomic values of comparable types. `None` means the values
/// are unordered, as with NaN or durations mixing months and seconds.
pub fn compare_atomics(
    left: &AtomicItem,
    right: &AtomicItem,
) -> Result<Option<Ordering>, MetapathError> {
    if let (Some(l), Some(r)) = (Numeric::of(left), Numeric::of(right)) {
        return Ok(match promote(l, r) {
            (Numeric::Integer(a), Numeric::Integer(b)) => Some(a.cmp(&b)),
            (Numeric::Decimal(a), Numeric::Decimal(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        });
    }
    match (left, right) {
        (l, r) if l.is_string_like() && r.is_string_like() => {
            Ok(Some(l.as_string().cmp(&r.as_string())))
        }
        (AtomicItem::Boolean(a), AtomicItem::Boolean(b)) => Ok(Some(a.cmp(b))),
        (AtomicItem::Date(a), AtomicItem::Date(b)) => Ok(Some(a.compare(b))),
        (AtomicItem::DateTime(a), AtomicItem::DateTime(b)) => Ok(Some(a.compare(b))),
        (AtomicItem::Duration(a), AtomicItem::Duration(b)) => Ok(a.compare(b)),
        _ => Err(MetapathError::dynamic_type(
            format!(
                "cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            ),
            left.type_name(),
        )),
    }
}

/// A value comparison (`eq`, `lt`, ...) of two single atomic values.
pub fn value_compare(
    op: ComparisonOperator,
    left: &AtomicItem,
    right: &AtomicItem,
) -> Result<bool, MetapathError> {
    let left = untyped_as_string(left);
    let right = untyped_as_string(right);
    Ok(op.test(compare_atomics(&left, &right)?))
}

/// A general comparison (`=`, `<`, ...): true if any pair of operands
/// satisfies the operator.
pub fn general_compare(
    op: ComparisonOperator,
    left: &[AtomicItem],
    right: &[AtomicItem],
    types: &TypeRegistry,
) -> Result<bool, MetapathError> {
    for l in left {
        for r in right {
            let (l, r) = match (l.is_untyped(), r.is_untyped()) {
                (true, true) => (untyped_as_string(l), untyped_as_string(r)),
                (true, false) => (convert_untyped(l, r, types)?, r.clone()),
                (false, true) => (l.clone(), convert_untyped(r, l, types)?),
                (false, false) => (l.clone(), r.clone()),
            };
            if op.test(compare_atomics(&l, &r)?) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn convert_untyped(
    untyped: &AtomicItem,
    other: &AtomicItem,
    types: &TypeRegistry,
) -> Result<AtomicItem, MetapathError> {
    if other.is_numeric() {
        return DoubleAdapter.cast(untyped);
    }
    if other.is_string_like() {
        return Ok(untyped_as_string(untyped));
    }
    match types.get(other.type_name()) {
        Some(adapter) => adapter.cast(untyped),
        None => Err(MetapathError::dynamic_type(
            "no adapter to compare with",
            other.type_name(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::temporal::Date;

    fn dec(text: &str) -> AtomicItem {
        AtomicItem::Decimal(text.parse().unwrap())
    }

    #[test]
    fn test_integer_arithmetic() {
        let two = AtomicItem::Integer(2);
        let three = AtomicItem::Integer(3);
        assert_eq!(
            arithmetic(ArithmeticOperator::Multiply, &two, &three).unwrap(),
            AtomicItem::Integer(6)
        );
        assert_eq!(
            arithmetic(ArithmeticOperator::IntegerDivide, &three, &two).unwrap(),
            AtomicItem::Integer(1)
        );
        assert_eq!(
            arithmetic(ArithmeticOperator::Modulo, &three, &two).unwrap(),
            AtomicItem::Integer(1)
        );
        // integer division yields a decimal
        assert_eq!(
            arithmetic(ArithmeticOperator::Divide, &three, &two).unwrap(),
            dec("1.5")
        );
        assert_eq!(
            arithmetic(ArithmeticOperator::Add, &AtomicItem::Integer(i64::MAX), &two),
            Err(MetapathError::Overflow)
        );
        assert_eq!(
            arithmetic(ArithmeticOperator::IntegerDivide, &two, &AtomicItem::Integer(0)),
            Err(MetapathError::DivisionByZero)
        );
    }

    #[test]
    fn test_numeric_promotion() {
        let result = arithmetic(ArithmeticOperator::Add, &AtomicItem::Integer(1), &dec("0.5")).unwrap();
        assert_eq!(result.type_name(), "decimal");
        assert_eq!(result, dec("1.5"));

        let result =
            arithmetic(ArithmeticOperator::Add, &dec("0.5"), &AtomicItem::Double(0.25)).unwrap();
        assert_eq!(result, AtomicItem::Double(0.75));

        let untyped = AtomicItem::UntypedAtomic("4".to_string());
        let result = arithmetic(ArithmeticOperator::Multiply, &untyped, &AtomicItem::Integer(2)).unwrap();
        assert_eq!(result, AtomicItem::Double(8.0));
    }

    #[test]
    fn test_double_division_by_zero() {
        let result =
            arithmetic(ArithmeticOperator::Divide, &AtomicItem::Double(1.0), &AtomicItem::Double(0.0))
                .unwrap();
        assert_eq!(result, AtomicItem::Double(f64::INFINITY));
        assert_eq!(
            arithmetic(ArithmeticOperator::Divide, &dec("1"), &dec("0")),
            Err(MetapathError::DivisionByZero)
        );
    }

    #[test]
    fn test_string_arithmetic_is_type_error() {
        let result = arithmetic(
            ArithmeticOperator::Add,
            &AtomicItem::string("a"),
            &AtomicItem::Integer(1),
        );
        assert!(matches!(result, Err(MetapathError::DynamicType { .. })));
    }

    #[test]
    fn test_date_arithmetic() {
        let date = AtomicItem::Date(Date::parse("2024-01-31").unwrap());
        let month = AtomicItem::Duration(Duration::parse("P1M").unwrap());
        let result = arithmetic(ArithmeticOperator::Add, &date, &month).unwrap();
        assert_eq!(result.as_string(), "2024-02-29");

        let later = AtomicItem::Date(Date::parse("2024-03-01").unwrap());
        let result = arithmetic(ArithmeticOperator::Subtract, &later, &date).unwrap();
        assert_eq!(result.as_string(), "P30D");

        let doubled =
            arithmetic(ArithmeticOperator::Multiply, &month, &AtomicItem::Integer(2)).unwrap();
        assert_eq!(doubled.as_string(), "P2M");
    }

    #[test]
    fn test_value_comparison() {
        let one = AtomicItem::Integer(1);
        assert!(value_compare(ComparisonOperator::Equal, &one, &dec("1.0")).unwrap());
        assert!(value_compare(ComparisonOperator::LessThan, &one, &AtomicItem::Double(1.5)).unwrap());
        assert!(
            value_compare(
                ComparisonOperator::Equal,
                &AtomicItem::UntypedAtomic("abc".into()),
                &AtomicItem::string("abc")
            )
            .unwrap()
        );
        let nan = AtomicItem::Double(f64::NAN);
        assert!(!value_compare(ComparisonOperator::Equal, &nan, &nan).unwrap());
        assert!(value_compare(ComparisonOperator::NotEqual, &nan, &nan).unwrap());
        assert!(value_compare(ComparisonOperator::Equal, &one, &AtomicItem::string("1")).is_err());
    }

    #[test]
    fn test_general_comparison() {
        let types = TypeRegistry::builtin();
        let left = vec![AtomicItem::Integer(1), AtomicItem::Integer(2)];
        let right = vec![AtomicItem::Integer(2), AtomicItem::Integer(3)];
        assert!(general_compare(ComparisonOperator::Equal, &left, &right, &types).unwrap());
        assert!(!general_compare(ComparisonOperator::GreaterThan, &left, &right, &types).unwrap());
        assert!(!general_compare(ComparisonOperator::Equal, &[], &right, &types).unwrap());

        // untyped against a number compares numerically
        let untyped = vec![AtomicItem::UntypedAtomic("10".into())];
        let nine = vec![AtomicItem::Integer(9)];
        assert!(general_compare(ComparisonOperator::GreaterThan, &untyped, &nine, &types).unwrap());

        let date = vec![AtomicItem::Date(Date::parse("2024-01-01").unwrap())];
        let text = vec![AtomicItem::UntypedAtomic("2024-01-01".into())];
        assert!(general_compare(ComparisonOperator::Equal, &text, &date, &types).unwrap());
    }

    #[test]
    fn test_negate() {
        assert_eq!(negate(&AtomicItem::Integer(3)).unwrap(), AtomicItem::Integer(-3));
        assert_eq!(negate(&dec("1.5")).unwrap(), dec("-1.5"));
        assert!(negate(&AtomicItem::string("x")).is_err());
    }
}
