use super::{
    Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, atomic, optional,
    optional_atomic,
};
use crate::context::{DynamicContext, FN_NS};
use crate::datatype::temporal::Duration;
use crate::types::{AtomicItem, Item, Sequence};
use metaschema_node::MetapathNode;
use rust_decimal::Decimal;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    library.register(
        FunctionSignature::builder(FN_NS, "current-date-time")
            .returns(ItemKind::DateTime, Occurrence::One)
            .non_deterministic()
            .context_dependent()
            .handler(|_, ctx, _| Ok(atomic(AtomicItem::DateTime(*ctx.current_date_time())))),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "current-date")
            .returns(ItemKind::Date, Occurrence::One)
            .non_deterministic()
            .context_dependent()
            .handler(|_, ctx, _| Ok(atomic(AtomicItem::Date(ctx.current_date_time().to_date())))),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "implicit-timezone")
            .returns(ItemKind::Duration, Occurrence::One)
            .context_dependent()
            .handler(fn_implicit_timezone),
    );

    let components: [(&str, fn(&crate::datatype::temporal::Date) -> i64); 3] = [
        ("year-from-date", |date| i64::from(date.year())),
        ("month-from-date", |date| i64::from(date.month())),
        ("day-from-date", |date| i64::from(date.day())),
    ];
    for (name, component) in components {
        library.register(
            FunctionSignature::builder(FN_NS, name)
                .argument(Argument::zero_or_one("arg", ItemKind::Date))
                .returns(ItemKind::Integer, Occurrence::ZeroOrOne)
                .handler(move |args, _, _| {
                    Ok(optional(optional_atomic(&args[0])?.and_then(|value| match value {
                        AtomicItem::Date(date) => Some(AtomicItem::Integer(component(&date))),
                        _ => None,
                    })))
                }),
        );
    }
}

/// The offset of the evaluation's current date-time, UTC when it has none.
fn fn_implicit_timezone<N: MetapathNode>(
    _args: &[Sequence<N>],
    ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let seconds = ctx
        .current_date_time()
        .timezone()
        .map_or(0, |offset| offset.local_minus_utc());
    Ok(atomic(AtomicItem::Duration(Duration::from_seconds(Decimal::from(seconds)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::datatype::temporal::DateTime;
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    fn context() -> DynamicContext<SimpleNode> {
        DynamicContext::builder(Arc::new(StaticContext::new()))
            .current_date_time(DateTime::parse("2024-05-17T10:30:00-05:00").unwrap())
            .build()
    }

    fn call(name: &str, args: Vec<Sequence<SimpleNode>>) -> Sequence<SimpleNode> {
        let ctx = context();
        ctx.static_context()
            .functions()
            .resolve(FN_NS, name, args.len())
            .unwrap()
            .invoke(args, &ctx, &Sequence::empty())
            .unwrap()
    }

    #[test]
    fn test_current_date_time_is_fixed() {
        let result = call("current-date-time", vec![]);
        assert_eq!(
            result.exactly_one("test").unwrap().string_value().unwrap(),
            "2024-05-17T10:30:00-05:00"
        );
        let date = call("current-date", vec![]);
        assert_eq!(date.exactly_one("test").unwrap().string_value().unwrap(), "2024-05-17-05:00");
        let timezone = call("implicit-timezone", vec![]);
        assert_eq!(timezone.exactly_one("test").unwrap().string_value().unwrap(), "-PT5H");
    }

    #[test]
    fn test_date_components() {
        let date = Sequence::from_atomic(AtomicItem::Date(
            crate::datatype::temporal::Date::parse("2024-02-29").unwrap(),
        ));
        assert_eq!(call("year-from-date", vec![date.clone()]), atomic(AtomicItem::Integer(2024)));
        assert_eq!(call("month-from-date", vec![date.clone()]), atomic(AtomicItem::Integer(2)));
        assert_eq!(call("day-from-date", vec![date]), atomic(AtomicItem::Integer(29)));
        assert_eq!(call("day-from-date", vec![Sequence::empty()]), Sequence::empty());
    }
}
