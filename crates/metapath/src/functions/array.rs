use super::{
    Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, atomic, atomics,
    integer_arg,
};
use crate::context::{ARRAY_NS, DynamicContext};
use crate::error::MetapathError;
use crate::types::{ArrayItem, AtomicItem, CollectionValue, Item, Sequence};
use metaschema_node::MetapathNode;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    let array = || Argument::one("array", ItemKind::Array);
    let position = || Argument::one("position", ItemKind::Integer);
    let member = || Argument::zero_or_more("member", ItemKind::Any);
    let returns_array = (ItemKind::Array, Occurrence::One);

    library.register(
        FunctionSignature::builder(ARRAY_NS, "get")
            .argument(array())
            .argument(position())
            .handler(fn_get),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "size")
            .argument(array())
            .returns(ItemKind::Integer, Occurrence::One)
            .handler(fn_size),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "put")
            .argument(array())
            .argument(position())
            .argument(member())
            .returns(returns_array.0, returns_array.1)
            .handler(fn_put),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "append")
            .argument(array())
            .argument(member())
            .returns(returns_array.0, returns_array.1)
            .handler(fn_append),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "subarray")
            .argument(array())
            .argument(Argument::one("start", ItemKind::Integer))
            .returns(returns_array.0, returns_array.1)
            .handler(fn_subarray),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "subarray")
            .argument(array())
            .argument(Argument::one("start", ItemKind::Integer))
            .argument(Argument::one("length", ItemKind::Integer))
            .returns(returns_array.0, returns_array.1)
            .handler(fn_subarray),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "remove")
            .argument(array())
            .argument(Argument::zero_or_more("positions", ItemKind::Integer))
            .returns(returns_array.0, returns_array.1)
            .handler(fn_remove),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "insert-before")
            .argument(array())
            .argument(position())
            .argument(member())
            .returns(returns_array.0, returns_array.1)
            .handler(fn_insert_before),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "head")
            .argument(array())
            .handler(|args, _, _| Ok(single_array(&args[0])?.head()?.as_sequence())),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "tail")
            .argument(array())
            .returns(returns_array.0, returns_array.1)
            .handler(|args, _, _| Ok(Sequence::of(Item::Array(single_array(&args[0])?.tail()?)))),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "reverse")
            .argument(array())
            .returns(returns_array.0, returns_array.1)
            .handler(|args, _, _| Ok(Sequence::of(Item::Array(single_array(&args[0])?.reverse())))),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "join")
            .argument(Argument::zero_or_more("arrays", ItemKind::Array))
            .returns(returns_array.0, returns_array.1)
            .handler(fn_join),
    );
    library.register(
        FunctionSignature::builder(ARRAY_NS, "flatten")
            .argument(Argument::zero_or_more("input", ItemKind::Any))
            .handler(fn_flatten),
    );
}

fn single_array<N: MetapathNode>(arg: &Sequence<N>) -> Result<ArrayItem<N>, MetapathError> {
    match arg.exactly_one("array argument")? {
        Item::Array(array) => Ok(array),
        other => Err(MetapathError::dynamic_type("expected an array", other.type_name())),
    }
}

fn fn_get<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let array = single_array(&args[0])?;
    let position = integer_arg(&args[1], "array:get")?;
    Ok(array.get(position)?.as_sequence())
}

fn fn_size<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let size = single_array(&args[0])?.size();
    Ok(atomic(AtomicItem::Integer(
        i64::try_from(size).map_err(|_| MetapathError::Overflow)?,
    )))
}

fn fn_put<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let array = single_array(&args[0])?;
    let position = integer_arg(&args[1], "array:put")?;
    let member = CollectionValue::from_sequence(args[2].clone())?;
    Ok(Sequence::of(Item::Array(array.put(position, member)?)))
}

fn fn_append<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let array = single_array(&args[0])?;
    let member = CollectionValue::from_sequence(args[1].clone())?;
    Ok(Sequence::of(Item::Array(array.append(member))))
}

fn fn_subarray<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let array = single_array(&args[0])?;
    let start = integer_arg(&args[1], "array:subarray")?;
    let length = args
        .get(2)
        .map(|length| integer_arg(length, "array:subarray"))
        .transpose()?;
    Ok(Sequence::of(Item::Array(array.subarray(start, length)?)))
}

fn fn_remove<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let array = single_array(&args[0])?;
    let positions: Vec<i64> = atomics(&args[1])?
        .iter()
        .filter_map(AtomicItem::as_i64)
        .collect();
    Ok(Sequence::of(Item::Array(array.remove(&positions)?)))
}

fn fn_insert_before<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let array = single_array(&args[0])?;
    let position = integer_arg(&args[1], "array:insert-before")?;
    let member = CollectionValue::from_sequence(args[2].clone())?;
    Ok(Sequence::of(Item::Array(array.insert_before(position, member)?)))
}

fn fn_join<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let arrays: Vec<ArrayItem<N>> = args[0]
        .items()?
        .iter()
        .filter_map(|item| item.as_array().cloned())
        .collect();
    Ok(Sequence::of(Item::Array(ArrayItem::join(&arrays))))
}

/// Replaces arrays by their members, recursively. Maps are left intact.
fn fn_flatten<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    fn flatten_into<N: MetapathNode>(item: &Item<N>, out: &mut Vec<Item<N>>) -> Result<(), MetapathError> {
        match item {
            Item::Array(array) => {
                for member in array.members() {
                    for nested in member.normalize_as_items()? {
                        flatten_into(&nested, out)?;
                    }
                }
            }
            other => out.push(other.clone()),
        }
        Ok(())
    }

    let mut result = Vec::new();
    for item in args[0].items()?.iter() {
        flatten_into(item, &mut result)?;
    }
    Ok(Sequence::from_items(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    fn int(value: i64) -> Sequence<SimpleNode> {
        Sequence::from_atomic(AtomicItem::Integer(value))
    }

    fn array(values: &[i64]) -> Sequence<SimpleNode> {
        Sequence::of(Item::Array(ArrayItem::from_items(
            values.iter().map(|v| Item::Atomic(AtomicItem::Integer(*v))),
        )))
    }

    fn call(name: &str, args: Vec<Sequence<SimpleNode>>) -> FunctionResult<SimpleNode> {
        let library = FunctionLibrary::builtin();
        let ctx = DynamicContext::new(Arc::new(StaticContext::new()));
        library
            .resolve(ARRAY_NS, name, args.len())
            .unwrap()
            .invoke(args, &ctx, &Sequence::empty())
    }

    #[test]
    fn test_get_bounds() {
        let input = array(&[10, 20, 30]);
        assert_eq!(call("get", vec![input.clone(), int(1)]).unwrap(), int(10));
        assert_eq!(call("get", vec![input.clone(), int(3)]).unwrap(), int(30));
        assert!(matches!(
            call("get", vec![input.clone(), int(0)]),
            Err(MetapathError::ArrayIndexOutOfBounds { index: 0, size: 3 })
        ));
        assert!(matches!(
            call("get", vec![input, int(4)]),
            Err(MetapathError::ArrayIndexOutOfBounds { index: 4, size: 3 })
        ));
    }

    #[test]
    fn test_insert_before_allows_end() {
        let input = array(&[1, 2]);
        let result = call("insert-before", vec![input.clone(), int(3), int(9)]).unwrap();
        assert_eq!(result, array(&[1, 2, 9]));
        assert!(call("insert-before", vec![input, int(4), int(9)]).is_err());
    }

    #[test]
    fn test_derivations() {
        let input = array(&[1, 2, 3]);
        assert_eq!(call("size", vec![input.clone()]).unwrap(), int(3));
        assert_eq!(call("put", vec![input.clone(), int(2), int(7)]).unwrap(), array(&[1, 7, 3]));
        assert_eq!(call("append", vec![input.clone(), int(4)]).unwrap(), array(&[1, 2, 3, 4]));
        assert_eq!(call("subarray", vec![input.clone(), int(2), int(1)]).unwrap(), array(&[2]));
        assert_eq!(call("reverse", vec![input.clone()]).unwrap(), array(&[3, 2, 1]));
        assert_eq!(call("head", vec![input.clone()]).unwrap(), int(1));
        assert_eq!(call("tail", vec![input.clone()]).unwrap(), array(&[2, 3]));
        let positions = Sequence::from_items(vec![AtomicItem::Integer(1).into(), AtomicItem::Integer(3).into()]);
        assert_eq!(call("remove", vec![input, positions]).unwrap(), array(&[2]));
        assert!(matches!(call("head", vec![array(&[])]), Err(MetapathError::EmptyArray)));
    }

    #[test]
    fn test_join_and_flatten() {
        let arrays = Sequence::concat([array(&[1]), array(&[2, 3])]).unwrap();
        assert_eq!(call("join", vec![arrays.clone()]).unwrap(), array(&[1, 2, 3]));
        let flat = call("flatten", vec![arrays]).unwrap();
        assert_eq!(flat.len().unwrap(), 3);
    }
}
