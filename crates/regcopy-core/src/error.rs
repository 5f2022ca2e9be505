//! Error types for regcopy-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Registry error: {0}")]
    Registry(#[from] regcopy_registry::RegistryError),

    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Invalid tag pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Failed to copy tag '{tag}' ({} tag(s) already copied): {source}", .copied.len())]
    TagCopyFailed {
        tag: String,
        copied: Vec<String>,
        #[source]
        source: Box<CoreError>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
