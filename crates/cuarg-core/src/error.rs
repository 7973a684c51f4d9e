//! Error types for parameter packing and attribute marshaling.

use crate::value::Value;

/// Broad class of a [`MarshalError`], used by language bindings to pick an
/// exception type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong type or unsupported type/attribute combination.
    Type,
    /// Malformed input that has the right type.
    InvalidArgument,
    /// The allocator returned null.
    OutOfMemory,
}

/// Marshaling errors.
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("Argument values and types must be the same length: got {values} values and {types} types")]
    LengthMismatch { values: usize, types: usize },

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Unsupported {family} attribute: {attribute}")]
    UnsupportedAttribute { family: &'static str, attribute: String },

    #[error("Expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Value {value} is out of range for {target}")]
    OutOfRange { value: String, target: String },

    #[error("Object of type {0} does not expose a contiguous buffer")]
    NotABuffer(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarshalError {
    /// Build a [`MarshalError::TypeMismatch`] naming the value's actual type.
    pub fn mismatch(expected: impl Into<String>, actual: &Value) -> Self {
        MarshalError::TypeMismatch {
            expected: expected.into(),
            actual: actual.type_name(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarshalError::LengthMismatch { .. }
            | MarshalError::UnsupportedType(_)
            | MarshalError::UnsupportedAttribute { .. }
            | MarshalError::TypeMismatch { .. } => ErrorKind::Type,
            MarshalError::OutOfRange { .. }
            | MarshalError::NotABuffer(_)
            | MarshalError::InvalidArgument(_)
            | MarshalError::Config(_) => ErrorKind::InvalidArgument,
            MarshalError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
        }
    }
}
