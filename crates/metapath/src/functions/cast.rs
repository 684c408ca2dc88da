//! One `meta:<type>` constructor function per registered data type.

use super::{Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, optional, optional_atomic};
use crate::context::{DynamicContext, META_NS};
use crate::datatype::TypeRegistry;
use crate::error::MetapathError;
use crate::types::Sequence;
use metaschema_node::MetapathNode;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    for adapter in TypeRegistry::builtin().adapters() {
        let name = adapter.name();
        library.register(
            FunctionSignature::builder(META_NS, name)
                .argument(Argument::zero_or_one("arg", ItemKind::AnyAtomic))
                .returns(ItemKind::AnyAtomic, Occurrence::ZeroOrOne)
                .context_dependent()
                .handler(move |args, ctx, _| cast_to(name, &args[0], ctx)),
        );
    }
}

/// Casts through the adapter the dynamic context's registry holds under
/// `name`, so replacing an adapter also changes its constructor function.
pub(crate) fn cast_to<N: MetapathNode>(
    name: &str,
    arg: &Sequence<N>,
    ctx: &DynamicContext<N>,
) -> FunctionResult<N> {
    let Some(value) = optional_atomic(arg)? else {
        return Ok(Sequence::empty());
    };
    let adapter = ctx
        .types()
        .get(name)
        .ok_or_else(|| MetapathError::function(format!("meta:{name}"), "unknown data type"))?;
    Ok(optional(Some(adapter.cast(&value)?)))
}
