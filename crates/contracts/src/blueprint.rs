//! NodeBlueprint - Config Loader output
//!
//! Describes one node: identity, broker connection, and protocol timing.

use serde::{Deserialize, Serialize};

use crate::limits::MAX_PAYLOAD_SIZE;
use crate::{ConnectOptions, ContractError, NodeId};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Node identity
    pub node: NodeConfig,

    /// Broker connection
    pub broker: BrokerConfig,

    /// Protocol timing and namespace
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// Node identity section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hardware address, e.g. "A4CF12B3D5E6"
    pub mac: String,

    /// Human-readable name reported on identification polls
    #[serde(default)]
    pub name: String,

    /// Type tag reported at startup
    #[serde(default)]
    pub node_type: String,
}

/// Broker connection section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker host
    #[serde(default = "default_broker_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval (seconds)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_keep_alive() -> u16 {
    30
}

/// Protocol timing, all durations in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Topic namespace root
    pub namespace: String,

    /// Correlation exchange deadline
    pub response_timeout_ms: u32,

    /// Delay after (re)activation before a channel may publish
    pub settle_delay_ms: u32,

    /// Backoff between connect attempts during startup
    pub connect_backoff_ms: u32,

    /// Backoff between reconnect attempts in the runtime loop
    pub reconnect_backoff_ms: u32,

    /// Delay before the startup announcement is retried
    pub startup_retry_delay_ms: u32,

    /// Pause between transport drains while waiting
    pub poll_interval_ms: u32,

    /// Transport buffer to reserve before connecting (bytes)
    pub buffer_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            namespace: "rtl".to_string(),
            response_timeout_ms: 30_000,
            settle_delay_ms: 1_000,
            connect_backoff_ms: 2_000,
            reconnect_backoff_ms: 5_000,
            startup_retry_delay_ms: 10_000,
            poll_interval_ms: 10,
            buffer_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl ProtocolConfig {
    /// Check the timing and buffer values the engine relies on.
    ///
    /// Every duration must be > 0 and the poll interval must be shorter than
    /// the response timeout, otherwise a wait loop never advances toward its
    /// deadline.
    pub fn validate(&self) -> Result<(), ContractError> {
        let timings = [
            ("protocol.response_timeout_ms", self.response_timeout_ms),
            ("protocol.settle_delay_ms", self.settle_delay_ms),
            ("protocol.connect_backoff_ms", self.connect_backoff_ms),
            ("protocol.reconnect_backoff_ms", self.reconnect_backoff_ms),
            ("protocol.startup_retry_delay_ms", self.startup_retry_delay_ms),
            ("protocol.poll_interval_ms", self.poll_interval_ms),
        ];
        for (field, value) in timings {
            if value == 0 {
                return Err(ContractError::config_validation(field, "must be > 0"));
            }
        }

        if self.poll_interval_ms >= self.response_timeout_ms {
            return Err(ContractError::config_validation(
                "protocol.poll_interval_ms",
                format!(
                    "poll_interval_ms ({}) must be < response_timeout_ms ({})",
                    self.poll_interval_ms, self.response_timeout_ms
                ),
            ));
        }

        if self.buffer_size < MAX_PAYLOAD_SIZE {
            return Err(ContractError::config_validation(
                "protocol.buffer_size",
                format!(
                    "buffer_size ({}) must hold a {}-byte payload",
                    self.buffer_size, MAX_PAYLOAD_SIZE
                ),
            ));
        }

        Ok(())
    }
}

/// Immutable node identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub name: String,
    pub node_type: String,
}

/// Runtime settings derived from a blueprint
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub identity: NodeIdentity,
    pub connect: ConnectOptions,
    pub protocol: ProtocolConfig,
}

impl NodeSettings {
    /// Settings for `mac` with default broker and protocol values
    pub fn new(mac: &str) -> Self {
        NodeBlueprint {
            version: ConfigVersion::V1,
            node: NodeConfig {
                mac: mac.to_string(),
                name: String::new(),
                node_type: String::new(),
            },
            broker: BrokerConfig {
                host: default_broker_host(),
                port: default_broker_port(),
                username: None,
                password: None,
                keep_alive_secs: default_keep_alive(),
            },
            protocol: ProtocolConfig::default(),
        }
        .to_node_settings()
    }

    /// Set the human-readable name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.identity.name = name.into();
        self
    }

    /// Set the node type tag
    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.identity.node_type = node_type.into();
        self
    }

    /// Set broker credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.connect.username = Some(username.into());
        self.connect.password = Some(password.into());
        self
    }
}

impl NodeBlueprint {
    /// Build runtime settings. The MAC doubles as the transport client id.
    pub fn to_node_settings(&self) -> NodeSettings {
        let id = NodeId::new(&self.node.mac);
        NodeSettings {
            connect: ConnectOptions {
                host: self.broker.host.clone(),
                port: self.broker.port,
                client_id: id.to_string(),
                username: self.broker.username.clone(),
                password: self.broker.password.clone(),
                keep_alive_secs: self.broker.keep_alive_secs,
            },
            identity: NodeIdentity {
                id,
                name: self.node.name.clone(),
                node_type: self.node.node_type.clone(),
            },
            protocol: self.protocol.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_validate() {
        assert!(ProtocolConfig::default().validate().is_ok());

        let zero_poll = ProtocolConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        let err = zero_poll.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));

        let slow_poll = ProtocolConfig {
            poll_interval_ms: 30_000,
            ..Default::default()
        };
        assert!(slow_poll.validate().is_err());

        let small_buffer = ProtocolConfig {
            buffer_size: 256,
            ..Default::default()
        };
        assert!(small_buffer.validate().is_err());
    }

    #[test]
    fn node_settings_from_blueprint() {
        let blueprint = NodeBlueprint {
            version: ConfigVersion::V1,
            node: NodeConfig {
                mac: "A4CF12B3D5E6".into(),
                name: "boiler".into(),
                node_type: "esp32".into(),
            },
            broker: BrokerConfig {
                host: "broker.local".into(),
                port: 1884,
                username: Some("node".into()),
                password: Some("secret".into()),
                keep_alive_secs: 15,
            },
            protocol: ProtocolConfig::default(),
        };

        let settings = blueprint.to_node_settings();
        assert_eq!(settings.identity.id, "A4CF12B3D5E6");
        assert_eq!(settings.connect.client_id, "A4CF12B3D5E6");
        assert_eq!(settings.connect.port, 1884);
        assert_eq!(settings.connect.username.as_deref(), Some("node"));
        assert_eq!(settings.protocol.response_timeout_ms, 30_000);
    }

    #[test]
    fn node_settings_builder_defaults() {
        let settings = NodeSettings::new("ABC123")
            .with_name("pump")
            .with_node_type("mkr1010");
        assert_eq!(settings.identity.name, "pump");
        assert_eq!(settings.identity.node_type, "mkr1010");
        assert_eq!(settings.connect.host, "localhost");
        assert_eq!(settings.connect.port, 1883);
        assert_eq!(settings.connect.keep_alive_secs, 30);
        assert!(settings.connect.username.is_none());
        assert_eq!(settings.protocol.namespace, "rtl");
        assert_eq!(settings.protocol.settle_delay_ms, 1_000);
    }
}
