//! Function signatures, argument conversion and the built-in library.
//!
//! Functions are keyed by namespace, local name and arity. Before a handler
//! runs, [`FunctionSignature::invoke`] applies the function conversion rules
//! to every argument: atomic parameters are atomized and untyped values are
//! cast to the declared type, then each argument's cardinality and item kind
//! are checked. Handlers can therefore rely on the shape of their inputs.

mod array;
mod boolean;
mod cast;
mod datetime;
mod map;
mod metapath;
mod node;
mod numeric;
mod sequence;
mod string;

use crate::context::DynamicContext;
use crate::error::MetapathError;
use crate::types::{AtomicItem, Item, Sequence};
use metaschema_node::MetapathNode;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type FunctionResult<N> = Result<Sequence<N>, MetapathError>;

/// A function implementation: converted arguments, the dynamic context and,
/// for focus-dependent functions only, the focus item.
pub type FunctionHandler<N> = Arc<
    dyn Fn(&[Sequence<N>], &DynamicContext<N>, Option<&Item<N>>) -> FunctionResult<N> + Send + Sync,
>;

/// How many items an argument or result may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn matches(&self, count: usize) -> bool {
        match self {
            Occurrence::One => count == 1,
            Occurrence::ZeroOrOne => count <= 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => count >= 1,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Occurrence::One => "exactly one",
            Occurrence::ZeroOrOne => "zero or one",
            Occurrence::ZeroOrMore => "zero or more",
            Occurrence::OneOrMore => "one or more",
        }
    }
}

/// The item type an argument or result is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Any,
    AnyAtomic,
    Numeric,
    String,
    Boolean,
    Integer,
    Decimal,
    Date,
    DateTime,
    Duration,
    Node,
    Array,
    Map,
}

impl ItemKind {
    pub fn is_atomic(&self) -> bool {
        !matches!(
            self,
            ItemKind::Any | ItemKind::Node | ItemKind::Array | ItemKind::Map
        )
    }

    pub fn matches<N: MetapathNode>(&self, item: &Item<N>) -> bool {
        match (self, item) {
            (ItemKind::Any, _) => true,
            (ItemKind::Node, Item::Node(_)) => true,
            (ItemKind::Array, Item::Array(_)) => true,
            (ItemKind::Map, Item::Map(_)) => true,
            (kind, Item::Atomic(atomic)) => kind.matches_atomic(atomic),
            _ => false,
        }
    }

    fn matches_atomic(&self, atomic: &AtomicItem) -> bool {
        match self {
            ItemKind::AnyAtomic => true,
            ItemKind::Numeric => atomic.is_numeric(),
            ItemKind::String => atomic.is_string_like(),
            ItemKind::Boolean => matches!(atomic, AtomicItem::Boolean(_)),
            ItemKind::Integer => atomic.is_integer(),
            ItemKind::Decimal => atomic.is_integer() || matches!(atomic, AtomicItem::Decimal(_)),
            ItemKind::Date => matches!(atomic, AtomicItem::Date(_)),
            ItemKind::DateTime => matches!(atomic, AtomicItem::DateTime(_)),
            ItemKind::Duration => matches!(atomic, AtomicItem::Duration(_)),
            _ => false,
        }
    }

    /// The adapter untyped arguments are cast through.
    fn untyped_target(&self) -> Option<&'static str> {
        match self {
            ItemKind::Numeric => Some("double"),
            ItemKind::String => Some("string"),
            ItemKind::Boolean => Some("boolean"),
            ItemKind::Integer => Some("integer"),
            ItemKind::Decimal => Some("decimal"),
            ItemKind::Date => Some("date"),
            ItemKind::DateTime => Some("date-time"),
            ItemKind::Duration => Some("duration"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Any => "item()",
            ItemKind::AnyAtomic => "any-atomic",
            ItemKind::Numeric => "numeric",
            ItemKind::String => "string",
            ItemKind::Boolean => "boolean",
            ItemKind::Integer => "integer",
            ItemKind::Decimal => "decimal",
            ItemKind::Date => "date",
            ItemKind::DateTime => "date-time",
            ItemKind::Duration => "duration",
            ItemKind::Node => "node()",
            ItemKind::Array => "array(*)",
            ItemKind::Map => "map(*)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub kind: ItemKind,
    pub occurrence: Occurrence,
}

impl Argument {
    pub fn new(name: impl Into<String>, kind: ItemKind, occurrence: Occurrence) -> Self {
        Self {
            name: name.into(),
            kind,
            occurrence,
        }
    }

    pub fn one(name: impl Into<String>, kind: ItemKind) -> Self {
        Self::new(name, kind, Occurrence::One)
    }

    pub fn zero_or_one(name: impl Into<String>, kind: ItemKind) -> Self {
        Self::new(name, kind, Occurrence::ZeroOrOne)
    }

    pub fn zero_or_more(name: impl Into<String>, kind: ItemKind) -> Self {
        Self::new(name, kind, Occurrence::ZeroOrMore)
    }

    pub fn one_or_more(name: impl Into<String>, kind: ItemKind) -> Self {
        Self::new(name, kind, Occurrence::OneOrMore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionProperties {
    pub deterministic: bool,
    pub context_dependent: bool,
    pub focus_dependent: bool,
}

impl Default for FunctionProperties {
    fn default() -> Self {
        Self {
            deterministic: true,
            context_dependent: false,
            focus_dependent: false,
        }
    }
}

pub struct FunctionSignature<N> {
    namespace: String,
    name: String,
    arguments: Vec<Argument>,
    return_kind: ItemKind,
    return_occurrence: Occurrence,
    properties: FunctionProperties,
    handler: FunctionHandler<N>,
}

impl<N: MetapathNode> FunctionSignature<N> {
    pub fn builder(namespace: impl Into<String>, name: impl Into<String>) -> SignatureBuilder<N> {
        SignatureBuilder {
            namespace: namespace.into(),
            name: name.into(),
            arguments: Vec::new(),
            return_kind: ItemKind::Any,
            return_occurrence: Occurrence::ZeroOrMore,
            properties: FunctionProperties::default(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn return_kind(&self) -> ItemKind {
        self.return_kind
    }

    pub fn return_occurrence(&self) -> Occurrence {
        self.return_occurrence
    }

    pub fn properties(&self) -> FunctionProperties {
        self.properties
    }

    pub fn is_deterministic(&self) -> bool {
        self.properties.deterministic
    }

    pub fn is_context_dependent(&self) -> bool {
        self.properties.context_dependent
    }

    pub fn is_focus_dependent(&self) -> bool {
        self.properties.focus_dependent
    }

    /// `name#arity`, as used in error messages.
    pub fn display_name(&self) -> String {
        format!("{}#{}", self.name, self.arity())
    }

    /// Converts the arguments, checks the focus and runs the handler.
    pub fn invoke(
        &self,
        arguments: Vec<Sequence<N>>,
        context: &DynamicContext<N>,
        focus: &Sequence<N>,
    ) -> FunctionResult<N> {
        if arguments.len() != self.arity() {
            return Err(MetapathError::function(
                self.display_name(),
                format!("expected {} arguments, got {}", self.arity(), arguments.len()),
            ));
        }
        let converted = self
            .arguments
            .iter()
            .zip(arguments)
            .map(|(argument, value)| self.convert_argument(argument, value, context))
            .collect::<Result<Vec<_>, _>>()?;

        let focus_item = if self.properties.focus_dependent {
            let items = focus.items()?;
            match &items[..] {
                [] => return Err(MetapathError::focus_required(self.display_name())),
                [item] => Some(item.clone()),
                _ => {
                    return Err(MetapathError::cardinality(
                        format!("focus of {}", self.display_name()),
                        "exactly one",
                        items.len(),
                    ));
                }
            }
        } else {
            None
        };

        log::trace!("Invoking {}{{{}}}", self.display_name(), self.namespace);
        (self.handler)(&converted, context, focus_item.as_ref())
    }

    fn convert_argument(
        &self,
        argument: &Argument,
        value: Sequence<N>,
        context: &DynamicContext<N>,
    ) -> FunctionResult<N> {
        let items: Vec<Item<N>> = if argument.kind.is_atomic() {
            value
                .atomize(context.types())?
                .into_iter()
                .map(|atomic| self.convert_untyped(argument, atomic, context).map(Item::Atomic))
                .collect::<Result<_, _>>()?
        } else {
            value.to_vec()?
        };

        if !argument.occurrence.matches(items.len()) {
            return Err(MetapathError::cardinality(
                format!("argument ${} of {}", argument.name, self.display_name()),
                argument.occurrence.description(),
                items.len(),
            ));
        }
        if let Some(item) = items.iter().find(|item| !argument.kind.matches(*item)) {
            return Err(MetapathError::dynamic_type(
                format!(
                    "argument ${} of {} expects {}",
                    argument.name,
                    self.display_name(),
                    argument.kind.as_str()
                ),
                item.type_name(),
            ));
        }
        Ok(Sequence::from_items(items))
    }

    fn convert_untyped(
        &self,
        argument: &Argument,
        atomic: AtomicItem,
        context: &DynamicContext<N>,
    ) -> Result<AtomicItem, MetapathError> {
        if !atomic.is_untyped() {
            return Ok(atomic);
        }
        let adapter = argument
            .kind
            .untyped_target()
            .and_then(|name| context.types().get(name));
        match adapter {
            Some(adapter) => adapter.cast(&atomic),
            None => Ok(atomic),
        }
    }
}

impl<N> fmt::Debug for FunctionSignature<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSignature")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("return_kind", &self.return_kind)
            .field("return_occurrence", &self.return_occurrence)
            .field("properties", &self.properties)
            .finish()
    }
}

pub struct SignatureBuilder<N> {
    namespace: String,
    name: String,
    arguments: Vec<Argument>,
    return_kind: ItemKind,
    return_occurrence: Occurrence,
    properties: FunctionProperties,
    _marker: std::marker::PhantomData<fn() -> N>,
}

impl<N: MetapathNode> SignatureBuilder<N> {
    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn returns(mut self, kind: ItemKind, occurrence: Occurrence) -> Self {
        self.return_kind = kind;
        self.return_occurrence = occurrence;
        self
    }

    pub fn non_deterministic(mut self) -> Self {
        self.properties.deterministic = false;
        self
    }

    pub fn context_dependent(mut self) -> Self {
        self.properties.context_dependent = true;
        self
    }

    pub fn focus_dependent(mut self) -> Self {
        self.properties.focus_dependent = true;
        self
    }

    pub fn handler<F>(self, handler: F) -> FunctionSignature<N>
    where
        F: Fn(&[Sequence<N>], &DynamicContext<N>, Option<&Item<N>>) -> FunctionResult<N>
            + Send
            + Sync
            + 'static,
    {
        FunctionSignature {
            namespace: self.namespace,
            name: self.name,
            arguments: self.arguments,
            return_kind: self.return_kind,
            return_occurrence: self.return_occurrence,
            properties: self.properties,
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionKey {
    namespace: String,
    name: String,
    arity: usize,
}

/// Functions resolvable by namespace, name and arity.
pub struct FunctionLibrary<N> {
    functions: HashMap<FunctionKey, Arc<FunctionSignature<N>>>,
}

impl<N: MetapathNode> FunctionLibrary<N> {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// A library holding every built-in function.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        register_builtin_functions(&mut library);
        library
    }

    /// Registers a function, returning the one with the same name and
    /// arity that it replaced.
    pub fn register(&mut self, signature: FunctionSignature<N>) -> Option<Arc<FunctionSignature<N>>> {
        let key = FunctionKey {
            namespace: signature.namespace.clone(),
            name: signature.name.clone(),
            arity: signature.arity(),
        };
        let previous = self.functions.insert(key, Arc::new(signature));
        if let Some(previous) = &previous {
            log::warn!(
                "Replacing function {} in namespace {}",
                previous.display_name(),
                previous.namespace
            );
        }
        previous
    }

    pub fn resolve(&self, namespace: &str, name: &str, arity: usize) -> Option<Arc<FunctionSignature<N>>> {
        let key = FunctionKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
            arity,
        };
        self.functions.get(&key).cloned()
    }

    /// Whether any arity of the function exists.
    pub fn has_name(&self, namespace: &str, name: &str) -> bool {
        self.functions
            .keys()
            .any(|key| key.namespace == namespace && key.name == name)
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Arc<FunctionSignature<N>>> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl<N: MetapathNode> Default for FunctionLibrary<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> fmt::Debug for FunctionLibrary<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionLibrary")
            .field("functions", &self.functions.len())
            .finish()
    }
}

pub fn register_builtin_functions<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    boolean::register(library);
    sequence::register(library);
    node::register(library);
    string::register(library);
    numeric::register(library);
    datetime::register(library);
    array::register(library);
    map::register(library);
    cast::register(library);
    metapath::register(library);
    log::debug!("Registered {} built-in functions", library.len());
}

// Accessors for converted arguments. Conversion has already checked
// cardinality and kind, so these only pick the shape apart.

pub(crate) fn atomics<N: MetapathNode>(arg: &Sequence<N>) -> Result<Vec<AtomicItem>, MetapathError> {
    Ok(arg
        .items()?
        .iter()
        .filter_map(|item| item.as_atomic().cloned())
        .collect())
}

pub(crate) fn optional_atomic<N: MetapathNode>(
    arg: &Sequence<N>,
) -> Result<Option<AtomicItem>, MetapathError> {
    Ok(arg.first_item(false)?.and_then(|item| item.as_atomic().cloned()))
}

pub(crate) fn required_atomic<N: MetapathNode>(
    arg: &Sequence<N>,
    function: &str,
) -> Result<AtomicItem, MetapathError> {
    optional_atomic(arg)?
        .ok_or_else(|| MetapathError::function(function, "missing required argument"))
}

/// A string argument, with the empty sequence read as "".
pub(crate) fn string_arg<N: MetapathNode>(arg: &Sequence<N>) -> Result<String, MetapathError> {
    Ok(optional_atomic(arg)?
        .map(|atomic| atomic.as_string())
        .unwrap_or_default())
}

pub(crate) fn integer_arg<N: MetapathNode>(arg: &Sequence<N>, function: &str) -> Result<i64, MetapathError> {
    required_atomic(arg, function)?
        .as_i64()
        .ok_or_else(|| MetapathError::function(function, "expected an integer argument"))
}

pub(crate) fn boolean<N: MetapathNode>(value: bool) -> Sequence<N> {
    Sequence::from_atomic(AtomicItem::Boolean(value))
}

pub(crate) fn atomic<N: MetapathNode>(value: AtomicItem) -> Sequence<N> {
    Sequence::from_atomic(value)
}

pub(crate) fn optional<N: MetapathNode>(value: Option<AtomicItem>) -> Sequence<N> {
    value.map(Sequence::from_atomic).unwrap_or_default()
}
