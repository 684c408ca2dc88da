//! The atomic type registry.
//!
//! Every atomic type is described by a [`DataTypeAdapter`] that knows how to
//! parse its lexical form, format a value, describe its JSON representation
//! and coerce values of other types into it. The registry is built once by
//! [`register_builtin_types`] and shared through the static context.

mod adapters;
pub mod temporal;

pub use adapters::{
    BooleanAdapter, DateAdapter, DateTimeAdapter, DecimalAdapter, DoubleAdapter, DurationAdapter,
    IntegerAdapter, NcNameAdapter, StringAdapter, UntypedAtomicAdapter, UriAdapter,
};

use crate::error::MetapathError;
use crate::types::AtomicItem;
use indexmap::IndexMap;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::sync::Arc;

/// Significant digits of the IEEE 754 decimal64 format.
pub const DECIMAL64_DIGITS: u32 = 16;

/// Rounds to decimal64 precision (half-even), leaving the scale of values
/// that already fit untouched so that `1.0` stays `1.0`.
pub fn to_decimal64(value: Decimal) -> Decimal {
    let digits = value
        .mantissa()
        .unsigned_abs()
        .checked_ilog10()
        .map_or(1, |log| log + 1);
    if digits <= DECIMAL64_DIGITS {
        return value;
    }
    value
        .round_sf_with_strategy(DECIMAL64_DIGITS, RoundingStrategy::MidpointNearestEven)
        .unwrap_or(value)
}

/// The JSON value kind a type serializes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    String,
    Number,
    Boolean,
}

pub trait DataTypeAdapter: fmt::Debug + Send + Sync {
    /// The type's name, also the local name of its cast function.
    fn name(&self) -> &'static str;

    fn json_type(&self) -> JsonType;

    fn parse(&self, text: &str) -> Result<AtomicItem, MetapathError>;

    fn format(&self, item: &AtomicItem) -> String {
        item.as_string()
    }

    fn is_instance(&self, item: &AtomicItem) -> bool {
        item.type_name() == self.name()
    }

    /// Casts `item` to this type. Instances are returned unchanged.
    fn cast(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        if self.is_instance(item) {
            return Ok(item.clone());
        }
        self.cast_from(item)
    }

    /// Coerces a value of a different type. By default only string-like
    /// values are accepted, by re-parsing their text.
    fn cast_from(&self, item: &AtomicItem) -> Result<AtomicItem, MetapathError> {
        if item.is_string_like() {
            return self
                .parse(&item.as_string())
                .map_err(|err| MetapathError::cast(item.type_name(), self.name(), err.to_string()));
        }
        Err(unsupported_cast(item, self.name()))
    }
}

pub(crate) fn unsupported_cast(item: &AtomicItem, target: &str) -> MetapathError {
    MetapathError::cast(
        item.type_name(),
        target,
        format!("unsupported item type '{}'", item.type_name()),
    )
}

/// Named data type adapters.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    adapters: IndexMap<&'static str, Arc<dyn DataTypeAdapter>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in type.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        register_builtin_types(&mut registry);
        registry
    }

    /// Registers an adapter, returning the one it replaced.
    pub fn register(&mut self, adapter: Arc<dyn DataTypeAdapter>) -> Option<Arc<dyn DataTypeAdapter>> {
        let previous = self.adapters.insert(adapter.name(), adapter);
        if let Some(previous) = &previous {
            log::warn!("Replacing data type adapter '{}'", previous.name());
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DataTypeAdapter>> {
        self.adapters.get(name)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn DataTypeAdapter>> {
        self.adapters.values()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

pub fn register_builtin_types(registry: &mut TypeRegistry) {
    registry.register(Arc::new(StringAdapter));
    registry.register(Arc::new(UntypedAtomicAdapter));
    registry.register(Arc::new(BooleanAdapter));
    registry.register(Arc::new(IntegerAdapter::integer()));
    registry.register(Arc::new(IntegerAdapter::non_negative()));
    registry.register(Arc::new(IntegerAdapter::positive()));
    registry.register(Arc::new(DecimalAdapter));
    registry.register(Arc::new(DoubleAdapter));
    registry.register(Arc::new(DateAdapter));
    registry.register(Arc::new(DateTimeAdapter));
    registry.register(Arc::new(DurationAdapter));
    registry.register(Arc::new(UriAdapter));
    registry.register(Arc::new(NcNameAdapter));
    log::debug!("Registered {} built-in data types", registry.len());
}
