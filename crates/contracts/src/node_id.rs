//! NodeId - Cheap-to-clone node hardware address
//!
//! Uses Arc<str> internally for O(1) clone operations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::limits::MAX_NODE_ID_LEN;
use crate::ContractError;

/// Node hardware address.
///
/// Used verbatim as the transport client id and in the config-changed
/// notification topic, and lower-cased as a path segment everywhere else.
///
/// # Examples
/// ```
/// use contracts::NodeId;
///
/// let id: NodeId = "A4CF12B3D5E6".into();
/// assert_eq!(id.lowercase(), "a4cf12b3d5e6");
/// assert!(id.validate().is_ok());
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Create a new NodeId from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used in topic path segments
    pub fn lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Check the address is non-empty, ASCII alphanumeric and fits its buffer.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.0.is_empty() {
            return Err(ContractError::config_validation(
                "node.mac",
                "node id cannot be empty",
            ));
        }
        if self.0.len() > MAX_NODE_ID_LEN {
            return Err(ContractError::length_exceeded(
                "node.mac",
                self.0.len(),
                MAX_NODE_ID_LEN,
            ));
        }
        if !self.0.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ContractError::config_validation(
                "node.mac",
                format!("node id '{}' must be ASCII alphanumeric", self.0),
            ));
        }
        Ok(())
    }
}

impl Deref for NodeId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for NodeId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.0)
    }
}

impl PartialEq<str> for NodeId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for NodeId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
