use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetapathError {
    #[error("Syntax error in '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("Static type error: {0}")]
    StaticType(String),

    #[error("Function '{name}#{arity}' is not defined")]
    UnknownFunction { name: String, arity: usize },

    #[error("Namespace prefix '{prefix}' is not bound")]
    UnboundPrefix { prefix: String },

    #[error("Dynamic type error: {message} (item type: {item_type})")]
    DynamicType { message: String, item_type: String },

    #[error("Cardinality error in {context}: expected {expected}, got {actual} items")]
    Cardinality {
        context: String,
        expected: String,
        actual: usize,
    },

    #[error("Cannot cast {source_type} to {target_type}: {message}")]
    Cast {
        source_type: String,
        target_type: String,
        message: String,
    },

    #[error("Invalid {type_name} value '{value}'")]
    ParseValue { type_name: String, value: String },

    #[error("Variable '${name}' is not bound")]
    UnboundVariable { name: String },

    #[error("'{expression}' requires a focus item, but none is available")]
    FocusRequired { expression: String },

    #[error("Array index {index} out of bounds (size: {size})")]
    ArrayIndexOutOfBounds { index: i64, size: usize },

    #[error("Array is empty")]
    EmptyArray,

    #[error("Duplicate map key '{key}'")]
    DuplicateMapKey { key: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Decimal value '{value}' is outside the supported range")]
    DecimalOverflow { value: String },

    #[error("Sequence stream has already been consumed")]
    SequenceConsumed,

    #[error("Unable to load document '{uri}': {message}")]
    Document { uri: String, message: String },

    #[error("Function '{function}' error: {message}")]
    Function { function: String, message: String },
}

impl MetapathError {
    pub fn syntax(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Syntax {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn dynamic_type(message: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self::DynamicType {
            message: message.into(),
            item_type: item_type.into(),
        }
    }

    pub fn cardinality(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: usize,
    ) -> Self {
        Self::Cardinality {
            context: context.into(),
            expected: expected.into(),
            actual,
        }
    }

    pub fn cast(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Cast {
            source_type: source_type.into(),
            target_type: target_type.into(),
            message: message.into(),
        }
    }

    pub fn parse_value(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ParseValue {
            type_name: type_name.into(),
            value: value.into(),
        }
    }

    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn focus_required(expression: impl Into<String>) -> Self {
        Self::FocusRequired {
            expression: expression.into(),
        }
    }

    /// True for errors detected before evaluation starts.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::StaticType(_)
                | Self::UnknownFunction { .. }
                | Self::UnboundPrefix { .. }
        )
    }
}
