//! Metaschema extension functions.

use super::{Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, string_arg};
use crate::context::{DynamicContext, META_NS};
use crate::error::MetapathError;
use crate::expression::MetapathExpression;
use crate::types::{Item, Sequence};
use metaschema_node::MetapathNode;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    library.register(
        FunctionSignature::builder(META_NS, "recurse-depth")
            .argument(Argument::one("recursion-path", ItemKind::String))
            .returns(ItemKind::Any, Occurrence::ZeroOrMore)
            .focus_dependent()
            .context_dependent()
            .handler(fn_recurse_depth_focus),
    );
    library.register(
        FunctionSignature::builder(META_NS, "recurse-depth")
            .argument(Argument::zero_or_more("context", ItemKind::Any))
            .argument(Argument::one("recursion-path", ItemKind::String))
            .returns(ItemKind::Any, Occurrence::ZeroOrMore)
            .context_dependent()
            .handler(fn_recurse_depth),
    );
}

fn fn_recurse_depth_focus<N: MetapathNode>(
    args: &[Sequence<N>],
    ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    recurse_depth(focus.cloned().into_iter().collect(), &string_arg(&args[0])?, ctx)
}

fn fn_recurse_depth<N: MetapathNode>(
    args: &[Sequence<N>],
    ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    recurse_depth(args[0].to_vec()?, &string_arg(&args[1])?, ctx)
}

/// Deepest nesting `meta:recurse-depth` follows before giving up.
const MAX_RECURSION_DEPTH: usize = 256;

/// Emits each item followed, depth-first, by everything reachable from it
/// through repeated application of `path`. A node already on the current
/// recursion path is not visited again.
fn recurse_depth<N: MetapathNode>(
    items: Vec<Item<N>>,
    path: &str,
    ctx: &DynamicContext<N>,
) -> FunctionResult<N> {
    let expression = MetapathExpression::compile(path, ctx.static_context())?;
    let mut results = Vec::new();
    let mut ancestry = Vec::new();
    for item in items {
        visit(item, &expression, ctx, &mut ancestry, &mut results)?;
    }
    Ok(Sequence::from_items(results))
}

fn visit<N: MetapathNode>(
    item: Item<N>,
    expression: &MetapathExpression,
    ctx: &DynamicContext<N>,
    ancestry: &mut Vec<Item<N>>,
    results: &mut Vec<Item<N>>,
) -> Result<(), MetapathError> {
    if let Item::Node(node) = &item
        && ancestry.iter().any(|seen| seen.as_node() == Some(node))
    {
        log::trace!("recurse-depth: {} is already on the path", node.path());
        return Ok(());
    }
    if ancestry.len() >= MAX_RECURSION_DEPTH {
        return Err(MetapathError::function(
            "recurse-depth",
            format!(
                "'{}' recursed more than {MAX_RECURSION_DEPTH} levels deep",
                expression.text()
            ),
        ));
    }

    let next = expression.evaluate(Some(item.clone()), ctx)?;
    results.push(item.clone());
    ancestry.push(item);
    for child in next.items()?.iter() {
        visit(child.clone(), expression, ctx, ancestry, results)?;
    }
    ancestry.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::context::{DynamicContext, StaticContext};
    use crate::error::MetapathError;
    use crate::expression::MetapathExpression;
    use crate::types::{Item, Sequence};
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    fn catalog() -> SimpleNode {
        SimpleNode::document()
            .child(
                SimpleNode::assembly("catalog")
                    .child(
                        SimpleNode::assembly("group")
                            .flag("id", "a")
                            .child(
                                SimpleNode::assembly("group")
                                    .flag("id", "a.1")
                                    .child(SimpleNode::assembly("group").flag("id", "a.1.1")),
                            ),
                    )
                    .child(SimpleNode::assembly("group").flag("id", "b")),
            )
            .build()
    }

    fn ids(text: &str) -> Vec<String> {
        let statics = Arc::new(StaticContext::new());
        let expression = MetapathExpression::compile(text, &statics).unwrap();
        let result: Sequence<SimpleNode> = expression
            .evaluate(Some(Item::Node(catalog())), &DynamicContext::new(statics))
            .unwrap();
        result
            .items()
            .unwrap()
            .iter()
            .map(|item| item.string_value().unwrap())
            .collect()
    }

    #[test]
    fn test_recurse_depth_from_focus() {
        assert_eq!(
            ids("/catalog/meta:recurse-depth('group')/@id"),
            ["a", "a.1", "a.1.1", "b"]
        );
        assert_eq!(ids("count(/catalog/meta:recurse-depth('group'))"), ["5"]);
    }

    #[test]
    fn test_recurse_depth_with_explicit_items() {
        assert_eq!(
            ids("meta:recurse-depth(/catalog/group, 'group') ! string(@id)"),
            ["a", "a.1", "a.1.1", "b"]
        );
        assert!(ids("meta:recurse-depth((), 'group')").is_empty());
    }

    #[test]
    fn test_recurse_depth_stops_at_nodes_on_the_path() {
        assert_eq!(ids("count(meta:recurse-depth(., '.'))"), ["1"]);
        assert_eq!(
            ids("meta:recurse-depth(/catalog/group[1], '(group, ..)') ! local-name()"),
            ["group", "group", "group", "catalog", "group", ""]
        );
    }

    #[test]
    fn test_recurse_depth_limits_atomic_recursion() {
        let statics = Arc::new(StaticContext::new());
        let expression = MetapathExpression::compile("meta:recurse-depth(1, '. + 1')", &statics).unwrap();
        let err = expression
            .evaluate(None, &DynamicContext::<SimpleNode>::new(statics))
            .unwrap_err();
        assert!(matches!(err, MetapathError::Function { ref function, .. } if function == "recurse-depth"));
    }

    #[test]
    fn test_recurse_depth_rejects_bad_path() {
        let statics = Arc::new(StaticContext::new());
        let expression =
            MetapathExpression::compile("meta:recurse-depth(/catalog, 'group[')", &statics).unwrap();
        let err = expression
            .evaluate(Some(Item::Node(catalog())), &DynamicContext::<SimpleNode>::new(statics))
            .unwrap_err();
        assert!(err.is_static());
    }
}
