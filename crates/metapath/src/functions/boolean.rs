use super::{Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, boolean};
use crate::context::{DynamicContext, FN_NS};
use crate::types::{Item, Sequence};
use metaschema_node::MetapathNode;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    library.register(
        FunctionSignature::builder(FN_NS, "true")
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(|_, _, _| Ok(boolean(true))),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "false")
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(|_, _, _| Ok(boolean(false))),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "not")
            .argument(Argument::zero_or_more("arg", ItemKind::Any))
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(fn_not),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "boolean")
            .argument(Argument::zero_or_more("arg", ItemKind::Any))
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(fn_boolean),
    );
}

fn fn_not<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(boolean(!args[0].effective_boolean_value()?))
}

fn fn_boolean<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    Ok(boolean(args[0].effective_boolean_value()?))
}
