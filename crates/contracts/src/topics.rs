//! Topic scheme
//!
//! | Purpose                     | Topic                                          |
//! |-----------------------------|------------------------------------------------|
//! | Outgoing request            | `req/<ns>/dataaccess/<op>`                     |
//! | Response                    | `res/<ns>/<id-lower>/<op>`                     |
//! | Identification poll         | `req/<ns>/logger/identificationpoll`           |
//! | Node config assignment      | `req/<ns>/<id-lower>/identificationassignment` |
//! | Channel config assignment   | `req/<ns>/<id-lower>/setchannelconfiguration`  |
//! | Config-changed notification | `not/<id>/configuration`                       |

use std::fmt;

use crate::limits::{ensure_fits, MAX_TOPIC_LEN};
use crate::{ContractError, NodeId};

/// Backend operations the node requests through a correlation exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Announce node identity at startup
    SetNodeStartupInfo,
    /// Advertise one channel's static properties
    SetChannelProperties,
    /// Fetch one channel's configuration
    GetChannelConfiguration,
}

impl Operation {
    /// Every operation, in startup order
    pub const ALL: [Operation; 3] = [
        Operation::SetNodeStartupInfo,
        Operation::SetChannelProperties,
        Operation::GetChannelConfiguration,
    ];

    /// Parse a wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Wire name, used as the last topic segment
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetNodeStartupInfo => "setnodestartupinfo",
            Self::SetChannelProperties => "setchannelproperties",
            Self::GetChannelConfiguration => "getchannelconfiguration",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds every topic the node uses from its namespace and identity
#[derive(Debug, Clone)]
pub struct TopicScheme {
    namespace: String,
    node_id: NodeId,
    node_id_lower: String,
}

impl TopicScheme {
    /// Create a scheme for `node_id` under `namespace`.
    ///
    /// Fails if the namespace is empty or any derived topic would not fit
    /// the topic buffer.
    pub fn new(namespace: &str, node_id: &NodeId) -> Result<Self, ContractError> {
        if namespace.is_empty() {
            return Err(ContractError::config_validation(
                "protocol.namespace",
                "namespace cannot be empty",
            ));
        }

        let scheme = Self {
            namespace: namespace.to_string(),
            node_id: node_id.clone(),
            node_id_lower: node_id.lowercase(),
        };

        // Fail at construction rather than on first use
        scheme.inbound()?;
        for op in Operation::ALL {
            scheme.request(op)?;
            scheme.response(op)?;
        }

        Ok(scheme)
    }

    /// Topic namespace root
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `req/<ns>/dataaccess/<op>`
    pub fn request(&self, op: Operation) -> Result<String, ContractError> {
        bounded(format!("req/{}/dataaccess/{}", self.namespace, op))
    }

    /// `res/<ns>/<id-lower>/<op>`
    pub fn response(&self, op: Operation) -> Result<String, ContractError> {
        bounded(format!(
            "res/{}/{}/{}",
            self.namespace, self.node_id_lower, op
        ))
    }

    /// The four inbound topics the node subscribes to after announcing itself
    pub fn inbound(&self) -> Result<InboundTopics, ContractError> {
        Ok(InboundTopics {
            identification_poll: bounded(format!(
                "req/{}/logger/identificationpoll",
                self.namespace
            ))?,
            node_config_assignment: bounded(format!(
                "req/{}/{}/identificationassignment",
                self.namespace, self.node_id_lower
            ))?,
            channel_config_assignment: bounded(format!(
                "req/{}/{}/setchannelconfiguration",
                self.namespace, self.node_id_lower
            ))?,
            config_changed: bounded(format!("not/{}/configuration", self.node_id))?,
        })
    }
}

/// Registered inbound topic table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTopics {
    pub identification_poll: String,
    pub node_config_assignment: String,
    pub channel_config_assignment: String,
    pub config_changed: String,
}

impl InboundTopics {
    /// All topics, in subscription order
    pub fn all(&self) -> [&str; 4] {
        [
            &self.identification_poll,
            &self.node_config_assignment,
            &self.channel_config_assignment,
            &self.config_changed,
        ]
    }
}

fn bounded(topic: String) -> Result<String, ContractError> {
    ensure_fits("topic", &topic, MAX_TOPIC_LEN)?;
    Ok(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> TopicScheme {
        TopicScheme::new("rtl", &NodeId::new("A4CF12B3D5E6")).unwrap()
    }

    #[test]
    fn test_request_and_response_topics() {
        let s = scheme();
        assert_eq!(
            s.request(Operation::GetChannelConfiguration).unwrap(),
            "req/rtl/dataaccess/getchannelconfiguration"
        );
        assert_eq!(
            s.response(Operation::SetNodeStartupInfo).unwrap(),
            "res/rtl/a4cf12b3d5e6/setnodestartupinfo"
        );
    }

    #[test]
    fn test_inbound_topics() {
        let topics = scheme().inbound().unwrap();
        assert_eq!(
            topics.identification_poll,
            "req/rtl/logger/identificationpoll"
        );
        assert_eq!(
            topics.node_config_assignment,
            "req/rtl/a4cf12b3d5e6/identificationassignment"
        );
        assert_eq!(
            topics.channel_config_assignment,
            "req/rtl/a4cf12b3d5e6/setchannelconfiguration"
        );
        // Notification topic keeps the original casing
        assert_eq!(topics.config_changed, "not/A4CF12B3D5E6/configuration");
    }

    #[test]
    fn test_oversize_namespace_rejected() {
        let ns = "n".repeat(MAX_TOPIC_LEN);
        let err = TopicScheme::new(&ns, &NodeId::new("A4CF12B3D5E6")).unwrap_err();
        assert!(matches!(err, ContractError::LengthExceeded { .. }));
    }

    #[test]
    fn test_operation_from_wire() {
        assert_eq!(
            Operation::from_wire("getchannelconfiguration"),
            Some(Operation::GetChannelConfiguration)
        );
        assert_eq!(Operation::from_wire("GetChannelConfiguration"), None);
    }

    #[test]
    fn test_empty_namespace_rejected() {
        assert!(TopicScheme::new("", &NodeId::new("A4CF12B3D5E6")).is_err());
    }
}
