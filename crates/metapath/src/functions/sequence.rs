use super::{
    Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, atomic, atomics,
    boolean, integer_arg, required_atomic,
};
use crate::context::{DynamicContext, FN_NS};
use crate::error::MetapathError;
use crate::types::{AtomicItem, Item, Sequence};
use metaschema_node::MetapathNode;
use std::collections::HashSet;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    let any = || Argument::zero_or_more("input", ItemKind::Any);

    library.register(
        FunctionSignature::builder(FN_NS, "count")
            .argument(any())
            .returns(ItemKind::Integer, Occurrence::One)
            .handler(fn_count),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "empty")
            .argument(any())
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(|args, _, _| Ok(boolean(args[0].is_empty()?))),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "exists")
            .argument(any())
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(|args, _, _| Ok(boolean(!args[0].is_empty()?))),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "head")
            .argument(any())
            .returns(ItemKind::Any, Occurrence::ZeroOrOne)
            .handler(fn_head),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "tail")
            .argument(any())
            .handler(fn_tail),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "reverse")
            .argument(any())
            .handler(fn_reverse),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "insert-before")
            .argument(any())
            .argument(Argument::one("position", ItemKind::Integer))
            .argument(Argument::zero_or_more("inserts", ItemKind::Any))
            .handler(fn_insert_before),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "remove")
            .argument(any())
            .argument(Argument::one("position", ItemKind::Integer))
            .handler(fn_remove),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "subsequence")
            .argument(any())
            .argument(Argument::one("starting-loc", ItemKind::Numeric))
            .handler(fn_subsequence),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "subsequence")
            .argument(any())
            .argument(Argument::one("starting-loc", ItemKind::Numeric))
            .argument(Argument::one("length", ItemKind::Numeric))
            .handler(fn_subsequence),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "distinct-values")
            .argument(Argument::zero_or_more("values", ItemKind::AnyAtomic))
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrMore)
            .handler(fn_distinct_values),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "index-of")
            .argument(Argument::zero_or_more("seq", ItemKind::AnyAtomic))
            .argument(Argument::one("search", ItemKind::AnyAtomic))
            .returns(ItemKind::Integer, Occurrence::ZeroOrMore)
            .handler(fn_index_of),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "exactly-one")
            .argument(any())
            .returns(ItemKind::Any, Occurrence::One)
            .handler(|args, _, _| cardinality_check(&args[0], "exactly-one", Occurrence::One)),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "zero-or-one")
            .argument(any())
            .returns(ItemKind::Any, Occurrence::ZeroOrOne)
            .handler(|args, _, _| cardinality_check(&args[0], "zero-or-one", Occurrence::ZeroOrOne)),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "one-or-more")
            .argument(any())
            .returns(ItemKind::Any, Occurrence::OneOrMore)
            .handler(|args, _, _| cardinality_check(&args[0], "one-or-more", Occurrence::OneOrMore)),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "deep-equal")
            .argument(Argument::zero_or_more("parameter1", ItemKind::Any))
            .argument(Argument::zero_or_more("parameter2", ItemKind::Any))
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(fn_deep_equal),
    );
}

fn fn_count<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let count = i64::try_from(args[0].len()?).map_err(|_| MetapathError::Overflow)?;
    Ok(atomic(AtomicItem::Integer(count)))
}

fn fn_head<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(args[0]
        .first_item(false)?
        .map(Sequence::of)
        .unwrap_or_default())
}

fn fn_tail<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let items = args[0].items()?;
    Ok(Sequence::from_items(items.iter().skip(1).cloned().collect()))
}

fn fn_reverse<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let items = args[0].items()?;
    Ok(Sequence::from_items(items.iter().rev().cloned().collect()))
}

/// Positions below one insert at the start, past the end append.
fn fn_insert_before<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let mut items = args[0].to_vec()?;
    let position = integer_arg(&args[1], "insert-before")?;
    let index = usize::try_from(position.saturating_sub(1))
        .unwrap_or(0)
        .min(items.len());
    let inserts = args[2].to_vec()?;
    items.splice(index..index, inserts);
    Ok(Sequence::from_items(items))
}

/// An out of range position leaves the sequence unchanged.
fn fn_remove<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let mut items = args[0].to_vec()?;
    let position = integer_arg(&args[1], "remove")?;
    if let Ok(index) = usize::try_from(position.saturating_sub(1))
        && index < items.len()
    {
        items.remove(index);
    }
    Ok(Sequence::from_items(items))
}

/// Keeps the items whose position `p` satisfies
/// `round(start) <= p < round(start) + round(length)`.
fn fn_subsequence<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let items = args[0].items()?;
    let start = round_half_up(&required_atomic(&args[1], "subsequence")?);
    let end = match args.get(2) {
        Some(length) => start + round_half_up(&required_atomic(length, "subsequence")?),
        None => f64::INFINITY,
    };
    Ok(Sequence::from_items(
        items
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let position = (*i + 1) as f64;
                position >= start && position < end
            })
            .map(|(_, item)| item.clone())
            .collect(),
    ))
}

fn round_half_up(value: &AtomicItem) -> f64 {
    value.as_f64().map_or(f64::NAN, |v| (v + 0.5).floor())
}

/// First occurrences, in order.
fn fn_distinct_values<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let mut seen = HashSet::new();
    let distinct = atomics(&args[0])?
        .into_iter()
        .filter(|value| seen.insert(value.to_map_key()))
        .map(Item::Atomic)
        .collect();
    Ok(Sequence::from_items(distinct))
}

fn fn_index_of<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let search = required_atomic(&args[1], "index-of")?;
    let positions = atomics(&args[0])?
        .iter()
        .enumerate()
        .filter(|(_, value)| **value == search)
        .map(|(i, _)| Item::Atomic(AtomicItem::Integer(i as i64 + 1)))
        .collect();
    Ok(Sequence::from_items(positions))
}

fn cardinality_check<N: MetapathNode>(
    arg: &Sequence<N>,
    function: &str,
    occurrence: Occurrence,
) -> FunctionResult<N> {
    let count = arg.len()?;
    if !occurrence.matches(count) {
        return Err(MetapathError::cardinality(
            format!("fn:{function}"),
            occurrence.description(),
            count,
        ));
    }
    Ok(arg.clone())
}

fn fn_deep_equal<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(boolean(args[0] == args[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    fn ints(values: &[i64]) -> Sequence<SimpleNode> {
        Sequence::from_items(values.iter().map(|v| AtomicItem::Integer(*v).into()).collect())
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
    fn test_count_and_exists() {
        assert_eq!(call("count", vec![ints(&[1, 2, 3])]).unwrap(), ints(&[3]));
        assert_eq!(call("count", vec![ints(&[])]).unwrap(), ints(&[0]));
        assert_eq!(call("exists", vec![ints(&[])]).unwrap(), boolean(false));
        assert_eq!(call("empty", vec![ints(&[])]).unwrap(), boolean(true));
    }

    #[test]
    fn test_insert_and_remove() {
        let result = call("insert-before", vec![ints(&[1, 2, 3]), ints(&[2]), ints(&[9])]).unwrap();
        assert_eq!(result, ints(&[1, 9, 2, 3]));
        let result = call("insert-before", vec![ints(&[1]), ints(&[0]), ints(&[9])]).unwrap();
        assert_eq!(result, ints(&[9, 1]));
        let result = call("insert-before", vec![ints(&[1]), ints(&[7]), ints(&[9])]).unwrap();
        assert_eq!(result, ints(&[1, 9]));

        assert_eq!(call("remove", vec![ints(&[1, 2, 3]), ints(&[2])]).unwrap(), ints(&[1, 3]));
        assert_eq!(call("remove", vec![ints(&[1, 2, 3]), ints(&[5])]).unwrap(), ints(&[1, 2, 3]));
    }

    #[test]
    fn test_subsequence() {
        let input = ints(&[1, 2, 3, 4, 5]);
        let result = call("subsequence", vec![input.clone(), ints(&[4])]).unwrap();
        assert_eq!(result, ints(&[4, 5]));
        let start = Sequence::from_atomic(AtomicItem::Double(1.5));
        let result = call("subsequence", vec![input, start, ints(&[2])]).unwrap();
        assert_eq!(result, ints(&[2, 3]));
    }

    #[test]
    fn test_distinct_values_keeps_first() {
        let input = Sequence::from_items(vec![
            AtomicItem::Integer(1).into(),
            AtomicItem::Decimal("1.0".parse().unwrap()).into(),
            AtomicItem::Integer(2).into(),
            AtomicItem::Integer(1).into(),
        ]);
        assert_eq!(call("distinct-values", vec![input]).unwrap(), ints(&[1, 2]));
    }

    #[test]
    fn test_index_of() {
        let result = call("index-of", vec![ints(&[10, 20, 10]), ints(&[10])]).unwrap();
        assert_eq!(result, ints(&[1, 3]));
    }

    #[test]
    fn test_cardinality_functions() {
        assert!(call("exactly-one", vec![ints(&[1])]).is_ok());
        assert!(matches!(
            call("exactly-one", vec![ints(&[1, 2])]),
            Err(MetapathError::Cardinality { .. })
        ));
        assert!(call("zero-or-one", vec![ints(&[])]).is_ok());
        assert!(call("one-or-more", vec![ints(&[])]).is_err());
    }

    #[test]
    fn test_deep_equal() {
        assert_eq!(call("deep-equal", vec![ints(&[1, 2]), ints(&[1, 2])]).unwrap(), boolean(true));
        assert_eq!(call("deep-equal", vec![ints(&[1, 2]), ints(&[2, 1])]).unwrap(), boolean(false));
    }
}
