//! Error types for the conversion engine.

use thiserror::Error;

/// Result alias for engine operations.
pub type VcResult<T> = Result<T, VcError>;

/// Errors surfaced by the conversion engine.
///
/// Per-call errors never leave a [`ConversionState`](crate::stream_buffer::ConversionState)
/// half-updated: the caller's state is exactly what it was before the call.
#[derive(Error, Debug)]
pub enum VcError {
    /// Bad static configuration or missing/unparsable parameter files.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A precondition on the call arguments was violated.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Non-finite values surfaced from a model output.
    #[error("numeric instability: {0}")]
    NumericInstability(String),

    /// One of the external models failed.
    #[error("{model} inference failed: {source}")]
    ModelInference {
        model: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl VcError {
    pub fn config(msg: impl Into<String>) -> Self {
        VcError::Configuration(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        VcError::InvalidInput(msg.into())
    }

    pub fn model(model: &'static str, source: anyhow::Error) -> Self {
        VcError::ModelInference { model, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_names_model() {
        let err = VcError::model("decoder", anyhow::anyhow!("session closed"));
        let msg = err.to_string();
        assert!(msg.contains("decoder"));
        assert!(msg.contains("session closed"));
    }
}
