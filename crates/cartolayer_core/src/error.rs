//! Scene configuration errors

use std::io;
use thiserror::Error;

/// Errors that can occur when loading or validating a scene
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error when reading the scene file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error
    #[error("scene parsing error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A layer refers to a source that is not declared
    #[error("layer {layer} refers to unknown source '{source_name}'")]
    UnknownSource { layer: usize, source_name: String },

    /// Two sources share a name
    #[error("source '{0}' is declared more than once")]
    DuplicateSource(String),

    /// A numeric layer setting is out of range
    #[error("layer {layer} has invalid {field}: {value}")]
    InvalidValue {
        layer: usize,
        field: &'static str,
        value: f64,
    },

    /// The view cannot be rendered
    #[error("invalid view: {0}")]
    InvalidView(String),
}

/// Result type for scene operations
pub type Result<T> = std::result::Result<T, ConfigError>;
