use super::{
    Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, atomic, atomics,
    integer_arg, optional, optional_atomic,
};
use crate::context::{DynamicContext, FN_NS};
use crate::datatype::{DataTypeAdapter, DoubleAdapter};
use crate::error::MetapathError;
use crate::operators::{ArithmeticOperator, arithmetic, compare_atomics};
use crate::types::{AtomicItem, Item, Sequence};
use metaschema_node::MetapathNode;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    let number = || Argument::zero_or_one("arg", ItemKind::Numeric);
    let rounding: [(&str, fn(&AtomicItem) -> Result<AtomicItem, MetapathError>); 3] =
        [("abs", abs), ("ceiling", ceiling), ("floor", floor)];
    for (name, operation) in rounding {
        library.register(
            FunctionSignature::builder(FN_NS, name)
                .argument(number())
                .returns(ItemKind::Numeric, Occurrence::ZeroOrOne)
                .handler(move |args, _, _| {
                    Ok(optional(optional_atomic(&args[0])?.map(|v| operation(&v)).transpose()?))
                }),
        );
    }
    library.register(
        FunctionSignature::builder(FN_NS, "round")
            .argument(number())
            .returns(ItemKind::Numeric, Occurrence::ZeroOrOne)
            .handler(fn_round),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "round")
            .argument(number())
            .argument(Argument::one("precision", ItemKind::Integer))
            .returns(ItemKind::Numeric, Occurrence::ZeroOrOne)
            .handler(fn_round),
    );

    library.register(
        FunctionSignature::builder(FN_NS, "sum")
            .argument(Argument::zero_or_more("arg", ItemKind::AnyAtomic))
            .returns(ItemKind::AnyAtomic, Occurrence::One)
            .handler(fn_sum),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "sum")
            .argument(Argument::zero_or_more("arg", ItemKind::AnyAtomic))
            .argument(Argument::zero_or_one("zero", ItemKind::AnyAtomic))
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrOne)
            .handler(fn_sum),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "avg")
            .argument(Argument::zero_or_more("arg", ItemKind::AnyAtomic))
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrOne)
            .handler(fn_avg),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "min")
            .argument(Argument::zero_or_more("arg", ItemKind::AnyAtomic))
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrOne)
            .handler(|args, _, _| extreme(&args[0], Ordering::Less)),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "max")
            .argument(Argument::zero_or_more("arg", ItemKind::AnyAtomic))
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrOne)
            .handler(|args, _, _| extreme(&args[0], Ordering::Greater)),
    );
}

fn map_numeric(
    value: &AtomicItem,
    on_integer: impl Fn(i64) -> Option<i64>,
    on_decimal: impl Fn(Decimal) -> Decimal,
    on_double: impl Fn(f64) -> f64,
) -> Result<AtomicItem, MetapathError> {
    match value {
        AtomicItem::Decimal(d) => Ok(AtomicItem::decimal(on_decimal(*d))),
        AtomicItem::Double(d) => Ok(AtomicItem::Double(on_double(*d))),
        other => match other.as_i64() {
            Some(i) => on_integer(i)
                .map(AtomicItem::Integer)
                .ok_or(MetapathError::Overflow),
            None => Err(MetapathError::dynamic_type(
                "expected a numeric value",
                other.type_name(),
            )),
        },
    }
}

fn abs(value: &AtomicItem) -> Result<AtomicItem, MetapathError> {
    map_numeric(value, i64::checked_abs, |d| d.abs(), f64::abs)
}

fn ceiling(value: &AtomicItem) -> Result<AtomicItem, MetapathError> {
    map_numeric(value, Some, |d| d.ceil(), f64::ceil)
}

fn floor(value: &AtomicItem) -> Result<AtomicItem, MetapathError> {
    map_numeric(value, Some, |d| d.floor(), f64::floor)
}

/// Rounds half towards positive infinity, so `round(-2.5)` is `-2`.
fn round(value: &AtomicItem, precision: i64) -> Result<AtomicItem, MetapathError> {
    let precision = i32::try_from(precision.clamp(-28, 28)).unwrap_or(0);
    let half = Decimal::new(5, 1);
    match value {
        AtomicItem::Double(d) if !d.is_finite() => Ok(value.clone()),
        AtomicItem::Double(d) => {
            let scale = 10f64.powi(precision);
            Ok(AtomicItem::Double((d * scale + 0.5).floor() / scale))
        }
        AtomicItem::Decimal(d) => {
            let scale = decimal_scale(precision)?;
            let rounded = d
                .checked_mul(scale)
                .and_then(|v| v.checked_add(half))
                .map(|v| v.floor())
                .and_then(|v| v.checked_div(scale))
                .ok_or(MetapathError::Overflow)?;
            Ok(AtomicItem::decimal(rounded.normalize()))
        }
        other => match other.as_i64() {
            Some(i) if precision >= 0 => Ok(AtomicItem::Integer(i)),
            Some(i) => {
                let scale = decimal_scale(precision)?;
                Decimal::from(i)
                    .checked_mul(scale)
                    .map(|v| (v + half).floor())
                    .and_then(|v| v.checked_div(scale))
                    .and_then(|v| v.to_i64())
                    .map(AtomicItem::Integer)
                    .ok_or(MetapathError::Overflow)
            }
            None => Err(MetapathError::dynamic_type(
                "expected a numeric value",
                other.type_name(),
            )),
        },
    }
}

fn decimal_scale(precision: i32) -> Result<Decimal, MetapathError> {
    let ten = Decimal::TEN;
    let magnitude = (0..precision.unsigned_abs())
        .try_fold(Decimal::ONE, |acc, _| acc.checked_mul(ten))
        .ok_or(MetapathError::Overflow)?;
    if precision >= 0 {
        Ok(magnitude)
    } else {
        Decimal::ONE
            .checked_div(magnitude)
            .ok_or(MetapathError::Overflow)
    }
}

fn fn_round<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let precision = match args.get(1) {
        Some(precision) => integer_arg(precision, "round")?,
        None => 0,
    };
    Ok(optional(
        optional_atomic(&args[0])?
            .map(|value| round(&value, precision))
            .transpose()?,
    ))
}

/// Aggregates treat untyped values as doubles.
fn aggregate_values<N: MetapathNode>(arg: &Sequence<N>) -> Result<Vec<AtomicItem>, MetapathError> {
    atomics(arg)?
        .into_iter()
        .map(|value| {
            if value.is_untyped() {
                DoubleAdapter.cast(&value)
            } else {
                Ok(value)
            }
        })
        .collect()
}

fn total(values: &[AtomicItem]) -> Result<Option<AtomicItem>, MetapathError> {
    let mut iter = values.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };
    let mut sum = first.clone();
    if !sum.is_numeric() && !matches!(sum, AtomicItem::Duration(_)) {
        return Err(MetapathError::dynamic_type(
            "sum requires numeric or duration values",
            sum.type_name(),
        ));
    }
    for value in iter {
        sum = arithmetic(ArithmeticOperator::Add, &sum, value)?;
    }
    Ok(Some(sum))
}

fn fn_sum<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let values = aggregate_values(&args[0])?;
    match total(&values)? {
        Some(sum) => Ok(atomic(sum)),
        None => match args.get(1) {
            Some(zero) => Ok(optional(optional_atomic(zero)?)),
            None => Ok(atomic(AtomicItem::Integer(0))),
        },
    }
}

fn fn_avg<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let values = aggregate_values(&args[0])?;
    let Some(sum) = total(&values)? else {
        return Ok(Sequence::empty());
    };
    let count = AtomicItem::Integer(i64::try_from(values.len()).map_err(|_| MetapathError::Overflow)?);
    Ok(atomic(arithmetic(ArithmeticOperator::Divide, &sum, &count)?))
}

/// `min` or `max`. NaN wins over every other value.
fn extreme<N: MetapathNode>(arg: &Sequence<N>, wanted: Ordering) -> FunctionResult<N> {
    let values = aggregate_values(arg)?;
    let mut best: Option<AtomicItem> = None;
    for value in values {
        if matches!(value, AtomicItem::Double(d) if d.is_nan()) {
            return Ok(atomic(value));
        }
        best = match best {
            None => Some(value),
            Some(current) => match compare_atomics(&value, &current)? {
                Some(ordering) if ordering == wanted => Some(value),
                _ => Some(current),
            },
        };
    }
    Ok(optional(best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    fn seq(values: Vec<AtomicItem>) -> Sequence<SimpleNode> {
        Sequence::from_items(values.into_iter().map(Item::Atomic).collect())
    }

    fn dec(text: &str) -> AtomicItem {
        AtomicItem::Decimal(text.parse().unwrap())
    }

    fn call(name: &str, args: Vec<Sequence<SimpleNode>>) -> FunctionResult<SimpleNode> {
        let library = FunctionLibrary::builtin();
        let ctx = DynamicContext::new(Arc::new(StaticContext::new()));
        library
            .resolve(FN_NS, name, args.len())
            .unwrap()
            .invoke(args, &ctx, &Sequence::empty())
    }

    #[test]
    fn test_abs_keeps_type() {
        assert_eq!(call("abs", vec![seq(vec![AtomicItem::Integer(-3)])]).unwrap(), seq(vec![AtomicItem::Integer(3)]));
        assert_eq!(call("abs", vec![seq(vec![dec("-1.5")])]).unwrap(), seq(vec![dec("1.5")]));
        assert_eq!(call("abs", vec![Sequence::empty()]).unwrap(), Sequence::empty());
    }

    #[test]
    fn test_floor_and_ceiling() {
        assert_eq!(call("floor", vec![seq(vec![dec("-1.5")])]).unwrap(), seq(vec![dec("-2")]));
        assert_eq!(call("ceiling", vec![seq(vec![AtomicItem::Double(1.2)])]).unwrap(), seq(vec![AtomicItem::Double(2.0)]));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round(&dec("2.5"), 0).unwrap(), dec("3"));
        assert_eq!(round(&dec("-2.5"), 0).unwrap(), dec("-2"));
        assert_eq!(round(&dec("1.125"), 2).unwrap(), dec("1.13"));
        assert_eq!(round(&AtomicItem::Integer(1250), -2).unwrap(), AtomicItem::Integer(1300));
        assert_eq!(round(&AtomicItem::Double(2.4), 0).unwrap(), AtomicItem::Double(2.0));
    }

    #[test]
    fn test_sum_and_avg() {
        let values = seq(vec![AtomicItem::Integer(1), AtomicItem::Integer(2), dec("0.5")]);
        assert_eq!(call("sum", vec![values.clone()]).unwrap(), seq(vec![dec("3.5")]));
        assert_eq!(call("sum", vec![Sequence::empty()]).unwrap(), seq(vec![AtomicItem::Integer(0)]));
        assert_eq!(
            call("sum", vec![Sequence::empty(), Sequence::empty()]).unwrap(),
            Sequence::empty()
        );
        let values = seq(vec![AtomicItem::Integer(1), AtomicItem::Integer(2)]);
        assert_eq!(call("avg", vec![values]).unwrap(), seq(vec![dec("1.5")]));
        assert_eq!(call("avg", vec![Sequence::empty()]).unwrap(), Sequence::empty());
        assert!(call("sum", vec![seq(vec![AtomicItem::string("a")])]).is_err());
    }

    #[test]
    fn test_min_max() {
        let values = seq(vec![AtomicItem::Integer(3), dec("1.5"), AtomicItem::Integer(2)]);
        assert_eq!(call("min", vec![values.clone()]).unwrap(), seq(vec![dec("1.5")]));
        assert_eq!(call("max", vec![values]).unwrap(), seq(vec![AtomicItem::Integer(3)]));
        let words = seq(vec![AtomicItem::string("b"), AtomicItem::string("a")]);
        assert_eq!(call("min", vec![words]).unwrap(), seq(vec![AtomicItem::string("a")]));
        assert_eq!(call("max", vec![Sequence::empty()]).unwrap(), Sequence::empty());
    }
}
