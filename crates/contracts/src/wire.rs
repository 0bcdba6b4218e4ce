//! Wire payloads
//!
//! Field names are the backend contract and are kept verbatim via serde
//! renames. Inbound shapes are lenient (every field optional) because a
//! malformed configuration must degrade to "no configuration", not a decode
//! failure of the whole message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::limits::MAX_PAYLOAD_SIZE;
use crate::{ChannelId, ContractError, NodeId};

/// Outgoing request: where to answer, how to correlate, what is asked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestEnvelope<P> {
    pub response_topic: String,
    pub correlation_data: String,
    pub payload: P,
}

/// Command status carried by every response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CmdStatus {
    /// Accepted, final answer follows on the same topic
    Processing,
    /// Final answer
    Done,
    /// Any other status is an error reported by the peer
    Failed(String),
}

impl CmdStatus {
    /// Wire label
    pub fn as_str(&self) -> &str {
        match self {
            Self::Processing => "Processing",
            Self::Done => "Done",
            Self::Failed(s) => s,
        }
    }
}

impl From<String> for CmdStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Processing" => Self::Processing,
            "Done" => Self::Done,
            _ => Self::Failed(s),
        }
    }
}

impl From<CmdStatus> for String {
    fn from(status: CmdStatus) -> Self {
        match status {
            CmdStatus::Processing => "Processing".to_string(),
            CmdStatus::Done => "Done".to_string(),
            CmdStatus::Failed(s) => s,
        }
    }
}

/// Response from the backend to a correlation exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub correlation_data: Option<String>,

    #[serde(default)]
    pub cmd_status: Option<CmdStatus>,

    #[serde(default)]
    pub cmd_status_text: Option<String>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ResponseEnvelope {
    /// Intermediate acknowledgement; the final answer is still to come
    pub fn is_processing(&self) -> bool {
        matches!(self.cmd_status, Some(CmdStatus::Processing))
    }

    /// Final answer with a `Done` status
    pub fn is_done(&self) -> bool {
        matches!(self.cmd_status, Some(CmdStatus::Done))
    }

    /// Decode the opaque payload into a typed shape
    pub fn payload_as<T: DeserializeOwned>(&self, topic: &str) -> Result<T, ContractError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ContractError::payload_decode(topic, e.to_string()))
    }
}

/// Reply the node publishes when it is the one being asked
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplyEnvelope<P> {
    pub correlation_data: String,
    pub cmd_status: CmdStatus,
    pub cmd_status_text: String,
    pub payload: Option<P>,
}

/// Request the backend sends to the node (poll / assignment)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundRequest {
    #[serde(default)]
    pub response_topic: Option<String>,

    #[serde(default)]
    pub correlation_data: Option<String>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

// ===== Request payloads =====

/// `setnodestartupinfo` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupInfo {
    #[serde(rename = "NodeId")]
    pub node_id: NodeId,

    #[serde(rename = "Type")]
    pub node_type: String,
}

/// `setchannelproperties` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPropertiesRequest {
    #[serde(rename = "NodeId")]
    pub node_id: NodeId,

    #[serde(rename = "Channel")]
    pub channel: ChannelProperties,
}

/// Static properties of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProperties {
    #[serde(rename = "ChannelId")]
    pub channel_id: ChannelId,

    #[serde(rename = "Type")]
    pub channel_type: String,

    #[serde(rename = "MaxSampleRate")]
    pub max_sample_rate: f32,
}

/// `getchannelconfiguration` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfigRequest {
    #[serde(rename = "NodeId")]
    pub node_id: NodeId,

    #[serde(rename = "ChannelId")]
    pub channel_id: ChannelId,
}

// ===== Response payloads =====

/// Configuration answer (also the body of a pushed assignment)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfigPayload {
    #[serde(rename = "ChannelId", default)]
    pub channel_id: Option<i64>,

    #[serde(rename = "Configuration", default)]
    pub configuration: Option<ChannelConfiguration>,
}

impl ChannelConfigPayload {
    /// Publish topic, if present and non-empty
    pub fn publish_topic(&self) -> Option<&str> {
        self.configuration
            .as_ref()
            .and_then(|c| c.publish_topic.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Channel configuration as sent by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfiguration {
    #[serde(rename = "PublishTopic", default)]
    pub publish_topic: Option<String>,

    #[serde(rename = "SampleRate", default)]
    pub sample_rate: Option<f32>,

    #[serde(rename = "kValue", default)]
    pub k_value: Option<f32>,

    #[serde(rename = "mValue", default)]
    pub m_value: Option<f32>,

    #[serde(rename = "Unit", default)]
    pub unit: Option<String>,

    #[serde(rename = "Descriptor", default)]
    pub descriptor: Option<String>,

    #[serde(rename = "Sensor_ID", default)]
    pub sensor_id: Option<String>,
}

/// Identification poll answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityReply {
    #[serde(rename = "NodeName")]
    pub node_name: String,

    #[serde(rename = "MAC")]
    pub mac: NodeId,
}

/// Serialize a payload, rejecting anything larger than the transport buffer.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ContractError> {
    let bytes = serde_json::to_vec(value).map_err(|e| ContractError::PayloadEncode {
        message: e.to_string(),
    })?;
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(ContractError::PayloadTooLarge {
            size: bytes.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(bytes)
}

/// Decode a payload received on `topic`
pub fn decode_payload<T: DeserializeOwned>(topic: &str, bytes: &[u8]) -> Result<T, ContractError> {
    serde_json::from_slice(bytes).map_err(|e| ContractError::payload_decode(topic, e.to_string()))
}
