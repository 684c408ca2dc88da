//! Node accessors and document access.

use super::{
    Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, atomic, boolean,
    optional, optional_atomic, string_arg,
};
use crate::context::{DynamicContext, FN_NS};
use crate::error::MetapathError;
use crate::types::{AtomicItem, Item, Sequence};
use metaschema_node::MetapathNode;
use url::Url;

type Handler<N> = fn(&[Sequence<N>], &DynamicContext<N>, Option<&Item<N>>) -> FunctionResult<N>;

/// Registers `name#0`, reading the focus, and `name#1` taking the item
/// explicitly.
fn register_focus_pair<N: MetapathNode>(
    library: &mut FunctionLibrary<N>,
    name: &str,
    argument: ItemKind,
    returns: (ItemKind, Occurrence),
    handler: Handler<N>,
) {
    library.register(
        FunctionSignature::builder(FN_NS, name)
            .returns(returns.0, returns.1)
            .focus_dependent()
            .handler(handler),
    );
    library.register(
        FunctionSignature::builder(FN_NS, name)
            .argument(Argument::zero_or_one("arg", argument))
            .returns(returns.0, returns.1)
            .handler(handler),
    );
}

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    let string = (ItemKind::String, Occurrence::One);
    let optional_node = (ItemKind::Node, Occurrence::ZeroOrOne);
    let optional_uri = (ItemKind::String, Occurrence::ZeroOrOne);

    register_focus_pair(library, "string", ItemKind::Any, string, fn_string);
    register_focus_pair(library, "name", ItemKind::Node, string, fn_name);
    register_focus_pair(library, "local-name", ItemKind::Node, string, fn_local_name);
    register_focus_pair(library, "root", ItemKind::Node, optional_node, fn_root);
    register_focus_pair(library, "path", ItemKind::Node, optional_uri, fn_path);
    register_focus_pair(
        library,
        "has-children",
        ItemKind::Node,
        (ItemKind::Boolean, Occurrence::One),
        fn_has_children,
    );
    register_focus_pair(library, "document-uri", ItemKind::Node, optional_uri, fn_document_uri);
    register_focus_pair(library, "base-uri", ItemKind::Node, optional_uri, fn_base_uri);

    library.register(
        FunctionSignature::builder(FN_NS, "data")
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrMore)
            .focus_dependent()
            .handler(fn_data),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "data")
            .argument(Argument::zero_or_more("arg", ItemKind::Any))
            .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrMore)
            .handler(fn_data),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "doc")
            .argument(Argument::zero_or_one("uri", ItemKind::String))
            .returns(ItemKind::Node, Occurrence::ZeroOrOne)
            .context_dependent()
            .handler(fn_doc),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "static-base-uri")
            .returns(ItemKind::String, Occurrence::ZeroOrOne)
            .context_dependent()
            .handler(fn_static_base_uri),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "resolve-uri")
            .argument(Argument::zero_or_one("relative", ItemKind::String))
            .returns(ItemKind::String, Occurrence::ZeroOrOne)
            .context_dependent()
            .handler(fn_resolve_uri),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "resolve-uri")
            .argument(Argument::zero_or_one("relative", ItemKind::String))
            .argument(Argument::one("base", ItemKind::String))
            .returns(ItemKind::String, Occurrence::ZeroOrOne)
            .handler(fn_resolve_uri),
    );
}

/// The explicit argument if there is one, otherwise the focus.
fn target<N: MetapathNode>(
    args: &[Sequence<N>],
    focus: Option<&Item<N>>,
) -> Result<Option<Item<N>>, MetapathError> {
    match args.first() {
        Some(arg) => arg.first_item(false),
        None => Ok(focus.cloned()),
    }
}

fn target_node<N: MetapathNode>(
    args: &[Sequence<N>],
    focus: Option<&Item<N>>,
    function: &str,
) -> Result<Option<N>, MetapathError> {
    match target(args, focus)? {
        None => Ok(None),
        Some(Item::Node(node)) => Ok(Some(node)),
        Some(other) => Err(MetapathError::dynamic_type(
            format!("fn:{function} requires a node"),
            other.type_name(),
        )),
    }
}

fn fn_string<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let value = match target(args, focus)? {
        Some(item) => item.string_value()?,
        None => String::new(),
    };
    Ok(atomic(AtomicItem::String(value)))
}

fn fn_data<N: MetapathNode>(
    args: &[Sequence<N>],
    ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let input = match (args.first(), focus) {
        (Some(arg), _) => arg.clone(),
        (None, Some(item)) => Sequence::of(item.clone()),
        (None, None) => Sequence::empty(),
    };
    Ok(Sequence::from_items(
        input
            .atomize(ctx.types())?
            .into_iter()
            .map(Item::Atomic)
            .collect(),
    ))
}

fn fn_name<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let name = target_node(args, focus, "name")?
        .and_then(|node| node.name())
        .map(|name| name.to_string())
        .unwrap_or_default();
    Ok(atomic(AtomicItem::String(name)))
}

fn fn_local_name<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let name = target_node(args, focus, "local-name")?
        .and_then(|node| node.name())
        .map(|name| name.local)
        .unwrap_or_default();
    Ok(atomic(AtomicItem::String(name)))
}

fn fn_root<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(Sequence::from_nodes(
        target_node(args, focus, "root")?.map(|node| node.root()),
    ))
}

fn fn_path<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(optional(
        target_node(args, focus, "path")?.map(|node| AtomicItem::String(node.path())),
    ))
}

fn fn_has_children<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let node = target_node(args, focus, "has-children")?;
    Ok(boolean(node.is_some_and(|node| !node.children().is_empty())))
}

fn fn_document_uri<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(optional(
        target_node(args, focus, "document-uri")?
            .and_then(|node| node.document_uri())
            .map(AtomicItem::Uri),
    ))
}

fn fn_base_uri<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(optional(
        target_node(args, focus, "base-uri")?
            .and_then(|node| node.base_uri())
            .map(AtomicItem::Uri),
    ))
}

fn fn_static_base_uri<N: MetapathNode>(
    _args: &[Sequence<N>],
    ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(optional(
        ctx.static_context()
            .base_uri()
            .map(|uri| AtomicItem::Uri(uri.to_string())),
    ))
}

fn resolve(relative: &str, base: Option<&Url>) -> Result<Url, MetapathError> {
    let invalid = |err: url::ParseError| MetapathError::function("resolve-uri", format!("'{relative}': {err}"));
    match Url::parse(relative) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(relative).map_err(invalid),
            None => Err(MetapathError::function(
                "resolve-uri",
                format!("no base URI to resolve '{relative}' against"),
            )),
        },
        Err(err) => Err(invalid(err)),
    }
}

fn fn_resolve_uri<N: MetapathNode>(
    args: &[Sequence<N>],
    ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let Some(relative) = optional_atomic(&args[0])? else {
        return Ok(Sequence::empty());
    };
    let explicit_base = match args.get(1) {
        Some(base) => {
            let text = string_arg(base)?;
            Some(Url::parse(&text).map_err(|err| {
                MetapathError::function("resolve-uri", format!("invalid base URI '{text}': {err}"))
            })?)
        }
        None => None,
    };
    let base = explicit_base.as_ref().or(ctx.static_context().base_uri());
    let resolved = resolve(&relative.as_string(), base)?;
    Ok(atomic(AtomicItem::Uri(resolved.to_string())))
}

fn fn_doc<N: MetapathNode>(
    args: &[Sequence<N>],
    ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let Some(uri) = optional_atomic(&args[0])? else {
        return Ok(Sequence::empty());
    };
    let uri = resolve(&uri.as_string(), ctx.static_context().base_uri())?;
    let document = ctx.load_document(&uri)?;
    Ok(Sequence::of(Item::Node(document)))
}
