//! Layered error definitions
//!
//! Categorized by source: config / limits / payload

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Limit Errors =====
    /// A bounded string or topic does not fit its fixed buffer
    #[error("'{field}' is {len} bytes, limit is {max}")]
    LengthExceeded {
        field: String,
        len: usize,
        max: usize,
    },

    /// Serialized payload larger than the transport buffer
    #[error("payload is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    // ===== Payload Errors =====
    /// Payload could not be serialized
    #[error("payload encode error: {message}")]
    PayloadEncode { message: String },

    /// Payload received on a topic could not be decoded
    #[error("payload decode error on '{topic}': {message}")]
    PayloadDecode { topic: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create length exceeded error
    pub fn length_exceeded(field: impl Into<String>, len: usize, max: usize) -> Self {
        Self::LengthExceeded {
            field: field.into(),
            len,
            max,
        }
    }

    /// Create payload decode error
    pub fn payload_decode(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PayloadDecode {
            topic: topic.into(),
            message: message.into(),
        }
    }
}
