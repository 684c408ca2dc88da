use metaschema_metapath::MetapathError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error(transparent)]
    Evaluation(#[from] MetapathError),

    #[error("Key path '{target}' did not result in a single item (got {count})")]
    KeyCardinality { target: String, count: usize },

    #[error("Key field declares the pattern '{pattern}' which does not match the value '{value}' of '{target}'")]
    PatternMismatch {
        pattern: String,
        value: String,
        target: String,
    },

    #[error("Invalid key pattern '{pattern}': {message}")]
    InvalidKeyPattern { pattern: String, message: String },

    #[error("Duplicate key {key}")]
    DuplicateKey { key: String },

    #[error("Target '{target}' selected a non-node item of type {item_type}")]
    NonNodeTarget { target: String, item_type: String },
}
