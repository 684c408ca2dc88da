use super::{
    Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, atomic, atomics,
    boolean, required_atomic,
};
use crate::context::{DynamicContext, MAP_NS};
use crate::error::MetapathError;
use crate::types::{ArrayItem, AtomicItem, CollectionValue, DuplicateKeyPolicy, Item, MapItem, Sequence};
use metaschema_node::MetapathNode;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    let map = || Argument::one("map", ItemKind::Map);
    let key = || Argument::one("key", ItemKind::AnyAtomic);
    let returns_map = (ItemKind::Map, Occurrence::One);

    library.register(
        FunctionSignature::builder(MAP_NS, "merge")
            .argument(Argument::zero_or_more("maps", ItemKind::Map))
            .returns(returns_map.0, returns_map.1)
            .handler(fn_merge),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "merge")
            .argument(Argument::zero_or_more("maps", ItemKind::Map))
            .argument(Argument::one("options", ItemKind::Map))
            .returns(returns_map.0, returns_map.1)
            .handler(fn_merge),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "size")
            .argument(map())
            .returns(ItemKind::Integer, Occurrence::One)
            .handler(fn_size),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "keys")
            .argument(map())
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrMore)
            .handler(fn_keys),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "contains")
            .argument(map())
            .argument(key())
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(fn_contains),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "get")
            .argument(map())
            .argument(key())
            .handler(fn_get),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "find")
            .argument(Argument::zero_or_more("input", ItemKind::Any))
            .argument(key())
            .returns(ItemKind::Array, Occurrence::One)
            .handler(fn_find),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "put")
            .argument(map())
            .argument(key())
            .argument(Argument::zero_or_more("value", ItemKind::Any))
            .returns(returns_map.0, returns_map.1)
            .handler(fn_put),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "entry")
            .argument(key())
            .argument(Argument::zero_or_more("value", ItemKind::Any))
            .returns(returns_map.0, returns_map.1)
            .handler(fn_entry),
    );
    library.register(
        FunctionSignature::builder(MAP_NS, "remove")
            .argument(map())
            .argument(Argument::zero_or_more("keys", ItemKind::AnyAtomic))
            .returns(returns_map.0, returns_map.1)
            .handler(fn_remove),
    );
}

fn single_map<N: MetapathNode>(arg: &Sequence<N>) -> Result<MapItem<N>, MetapathError> {
    match arg.exactly_one("map argument")? {
        Item::Map(map) => Ok(map),
        other => Err(MetapathError::dynamic_type("expected a map", other.type_name())),
    }
}

/// Reads the `duplicates` option, defaulting to use-first.
fn duplicates_policy<N: MetapathNode>(options: &MapItem<N>) -> Result<DuplicateKeyPolicy, MetapathError> {
    let Some(value) = options.get(&AtomicItem::string("duplicates")) else {
        return Ok(DuplicateKeyPolicy::default());
    };
    let name = match value.normalize_as_items()?.as_slice() {
        [Item::Atomic(atomic)] => atomic.as_string(),
        _ => String::new(),
    };
    DuplicateKeyPolicy::from_name(&name).ok_or_else(|| {
        MetapathError::function("map:merge", format!("invalid duplicates option '{name}'"))
    })
}

fn fn_merge<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let maps: Vec<MapItem<N>> = args[0]
        .items()?
        .iter()
        .filter_map(|item| item.as_map().cloned())
        .collect();
    let policy = match args.get(1) {
        Some(options) => duplicates_policy(&single_map(options)?)?,
        None => DuplicateKeyPolicy::default(),
    };
    Ok(Sequence::of(Item::Map(MapItem::merge(&maps, policy)?)))
}

fn fn_size<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let size = single_map(&args[0])?.size();
    Ok(atomic(AtomicItem::Integer(
        i64::try_from(size).map_err(|_| MetapathError::Overflow)?,
    )))
}

fn fn_keys<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let map = single_map(&args[0])?;
    Ok(Sequence::from_items(
        map.keys().cloned().map(Item::Atomic).collect(),
    ))
}

fn fn_contains<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let map = single_map(&args[0])?;
    let key = required_atomic(&args[1], "map:contains")?;
    Ok(boolean(map.contains(&key)))
}

fn fn_get<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let map = single_map(&args[0])?;
    let key = required_atomic(&args[1], "map:get")?;
    Ok(map.get(&key).map(CollectionValue::as_sequence).unwrap_or_default())
}

/// Every value stored under `key` in any map reachable from the input,
/// searching through arrays and map values.
fn fn_find<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    fn search<N: MetapathNode>(
        item: &Item<N>,
        key: &AtomicItem,
        found: &mut Vec<CollectionValue<N>>,
    ) -> Result<(), MetapathError> {
        match item {
            Item::Map(map) => {
                for (entry_key, value) in map.entries() {
                    if entry_key == key {
                        found.push(value.clone());
                    }
                    for nested in value.normalize_as_items()? {
                        search(&nested, key, found)?;
                    }
                }
            }
            Item::Array(array) => {
                for member in array.members() {
                    for nested in member.normalize_as_items()? {
                        search(&nested, key, found)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    let key = required_atomic(&args[1], "map:find")?;
    let mut found = Vec::new();
    for item in args[0].items()?.iter() {
        search(item, &key, &mut found)?;
    }
    Ok(Sequence::of(Item::Array(ArrayItem::from_members(found))))
}

fn fn_put<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let map = single_map(&args[0])?;
    let key = required_atomic(&args[1], "map:put")?;
    let value = CollectionValue::from_sequence(args[2].clone())?;
    Ok(Sequence::of(Item::Map(map.put(key, value))))
}

fn fn_entry<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let key = required_atomic(&args[0], "map:entry")?;
    let value = CollectionValue::from_sequence(args[1].clone())?;
    Ok(Sequence::of(Item::Map(MapItem::new().put(key, value))))
}

fn fn_remove<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let map = single_map(&args[0])?;
    let keys = atomics(&args[1])?;
    Ok(Sequence::of(Item::Map(map.remove(&keys))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    fn s(value: &str) -> Sequence<SimpleNode> {
        Sequence::from_atomic(AtomicItem::string(value))
    }

    fn map(entries: &[(&str, i64)]) -> Sequence<SimpleNode> {
        let map = MapItem::from_entries(entries.iter().map(|(k, v)| {
            (
                AtomicItem::string(*k),
                CollectionValue::Item(Item::Atomic(AtomicItem::Integer(*v))),
            )
        }))
        .unwrap();
        Sequence::of(Item::Map(map))
    }

    fn call(name: &str, args: Vec<Sequence<SimpleNode>>) -> FunctionResult<SimpleNode> {
        let library = FunctionLibrary::builtin();
        let ctx = DynamicContext::new(Arc::new(StaticContext::new()));
        library
            .resolve(MAP_NS, name, args.len())
            .unwrap()
            .invoke(args, &ctx, &Sequence::empty())
    }

    #[test]
    fn test_merge_policies() {
        let maps = Sequence::concat([map(&[("a", 1), ("b", 2)]), map(&[("b", 3), ("c", 4)])]).unwrap();
        let merged = call("merge", vec![maps.clone()]).unwrap();
        assert_eq!(merged, map(&[("a", 1), ("b", 2), ("c", 4)]));

        let options = |policy: &str| {
            Sequence::of(Item::Map(
                MapItem::new().put(AtomicItem::string("duplicates"), Item::Atomic(AtomicItem::string(policy)).into()),
            ))
        };
        let merged = call("merge", vec![maps.clone(), options("use-last")]).unwrap();
        assert_eq!(merged, map(&[("a", 1), ("b", 3), ("c", 4)]));
        assert!(matches!(
            call("merge", vec![maps.clone(), options("reject")]),
            Err(MetapathError::DuplicateMapKey { .. })
        ));
        assert!(call("merge", vec![maps, options("bogus")]).is_err());
    }

    #[test]
    fn test_queries() {
        let input = map(&[("a", 1), ("b", 2)]);
        assert_eq!(call("size", vec![input.clone()]).unwrap(), atomic(AtomicItem::Integer(2)));
        assert_eq!(call("contains", vec![input.clone(), s("a")]).unwrap(), boolean(true));
        assert_eq!(call("get", vec![input.clone(), s("b")]).unwrap(), atomic(AtomicItem::Integer(2)));
        assert_eq!(call("get", vec![input.clone(), s("z")]).unwrap(), Sequence::empty());
        let keys = call("keys", vec![input]).unwrap();
        assert_eq!(keys, Sequence::concat([s("a"), s("b")]).unwrap());
    }

    #[test]
    fn test_put_preserves_order() {
        let input = map(&[("a", 1), ("b", 2)]);
        let updated = call("put", vec![input.clone(), s("a"), atomic(AtomicItem::Integer(9))]).unwrap();
        assert_eq!(updated, map(&[("a", 9), ("b", 2)]));
        let extended = call("put", vec![input.clone(), s("c"), atomic(AtomicItem::Integer(3))]).unwrap();
        let keys = call("keys", vec![extended]).unwrap();
        assert_eq!(keys, Sequence::concat([s("a"), s("b"), s("c")]).unwrap());
        let removed = call("remove", vec![input, s("a")]).unwrap();
        assert_eq!(removed, map(&[("b", 2)]));
    }

    #[test]
    fn test_entry_and_find() {
        let entry = call("entry", vec![s("k"), atomic(AtomicItem::Integer(1))]).unwrap();
        assert_eq!(entry, map(&[("k", 1)]));
        let nested = Sequence::concat([map(&[("k", 1)]), map(&[("j", 2), ("k", 3)])]).unwrap();
        let found = call("find", vec![nested, s("k")]).unwrap();
        let array = found.exactly_one("find").unwrap();
        assert_eq!(array.as_array().unwrap().size(), 2);
    }
}
