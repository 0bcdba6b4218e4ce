//! Compile-time resource ceilings.
//!
//! String limits are usable characters (the node's buffers reserve one byte
//! for a terminator). Every check rejects oversize input; nothing is truncated.

use crate::ContractError;

/// General strings: type tags, node name, sensor readings, correlation tokens
pub const MAX_GENERAL_STRING_LEN: usize = 19;

/// Short strings: unit, external sensor id, status labels
pub const MAX_SHORT_STRING_LEN: usize = 9;

/// Free-text channel description
pub const MAX_DESCRIPTION_LEN: usize = 49;

/// Any topic, inbound or outbound
pub const MAX_TOPIC_LEN: usize = 127;

/// Hardware address (12 hex digits)
pub const MAX_NODE_ID_LEN: usize = 12;

/// Channel table capacity
pub const MAX_CHANNEL_COUNT: usize = 4;

/// Serialized payload ceiling, equal to the transport buffer size
pub const MAX_PAYLOAD_SIZE: usize = 812;

/// Correlation tokens fill a general string exactly
pub const CORRELATION_TOKEN_LEN: usize = MAX_GENERAL_STRING_LEN;

/// Reject `value` if it does not fit in `max` bytes.
pub fn ensure_fits(field: &str, value: &str, max: usize) -> Result<(), ContractError> {
    if value.len() > max {
        return Err(ContractError::length_exceeded(field, value.len(), max));
    }
    Ok(())
}
