//! Node context
//!
//! [`Node`] owns everything the engine touches: identity, topic table,
//! channel registry, exchange slot, transport and clock. Protocol behaviour
//! is spread over `exchange`, `dispatch`, `sequencer` and `runtime`, each
//! adding an `impl` block.

use std::fmt;

use contracts::limits::{ensure_fits, MAX_GENERAL_STRING_LEN};
use contracts::{
    ChannelId, Clock, ConnectOptions, InboundTopics, NodeIdentity, NodeSettings, ProtocolConfig,
    TopicScheme, Transport,
};
use observability::{ExchangeMetricsAggregator, MetricsSummary};
use serde::Serialize;

use crate::channel::{Calibration, Channel, ChannelSnapshot, SensorReading};
use crate::error::{NodeError, Result};
use crate::exchange::ExchangeSlot;
use crate::registry::ChannelRegistry;
use crate::token::TokenGenerator;

/// Sequencer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Constructed, channels may still be registered
    Created,
    Connecting,
    AnnouncingStartup,
    PublishingChannelProperties(ChannelId),
    FetchingChannelConfig(ChannelId),
    Ready,
    Reconfiguring,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Connecting => f.write_str("connecting"),
            Self::AnnouncingStartup => f.write_str("announcing_startup"),
            Self::PublishingChannelProperties(id) => {
                write!(f, "publishing_channel_properties({id})")
            }
            Self::FetchingChannelConfig(id) => write!(f, "fetching_channel_config({id})"),
            Self::Ready => f.write_str("ready"),
            Self::Reconfiguring => f.write_str("reconfiguring"),
        }
    }
}

/// Telemetry node protocol engine
pub struct Node<T, C> {
    pub(crate) identity: NodeIdentity,
    pub(crate) connect: ConnectOptions,
    pub(crate) protocol: ProtocolConfig,
    pub(crate) topics: TopicScheme,
    pub(crate) inbound: InboundTopics,
    pub(crate) transport: T,
    pub(crate) clock: C,
    pub(crate) registry: ChannelRegistry,
    pub(crate) slot: ExchangeSlot,
    pub(crate) tokens: TokenGenerator,
    pub(crate) phase: Phase,
    /// Set by a config-changed notification, consumed by the runtime loop
    pub(crate) reconfigure_pending: bool,
    /// Inbound topics have been subscribed at least once
    pub(crate) inbound_subscribed: bool,
    pub(crate) stats: ExchangeMetricsAggregator,
}

impl<T: Transport, C: Clock> Node<T, C> {
    /// Create a node. Identity strings, protocol timings and every derived
    /// topic are checked here.
    pub fn new(settings: NodeSettings, transport: T, clock: C) -> Result<Self> {
        let NodeSettings {
            identity,
            connect,
            protocol,
        } = settings;

        protocol.validate()?;

        identity.id.validate()?;
        ensure_fits("node.name", &identity.name, MAX_GENERAL_STRING_LEN)?;
        ensure_fits("node.node_type", &identity.node_type, MAX_GENERAL_STRING_LEN)?;

        let topics = TopicScheme::new(&protocol.namespace, &identity.id)?;
        let inbound = topics.inbound()?;

        Ok(Self {
            registry: ChannelRegistry::new(protocol.settle_delay_ms),
            identity,
            connect,
            protocol,
            topics,
            inbound,
            transport,
            clock,
            slot: ExchangeSlot::new(),
            tokens: TokenGenerator::new(),
            phase: Phase::Created,
            reconfigure_pending: false,
            inbound_subscribed: false,
            stats: ExchangeMetricsAggregator::new(),
        })
    }

    /// Replace the token generator (deterministic tokens in tests)
    pub fn with_token_generator(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    /// Register a channel. Only allowed before [`Node::start`].
    pub fn add_channel<F>(
        &mut self,
        channel_type: &str,
        max_sample_rate: f32,
        sensor: F,
    ) -> Result<ChannelId>
    where
        F: FnMut(Calibration) -> SensorReading + Send + 'static,
    {
        if self.phase != Phase::Created {
            return Err(NodeError::RegistrationClosed);
        }
        let id = self
            .registry
            .register(channel_type, max_sample_rate, Box::new(sensor))?;
        tracing::info!(channel_id = id, channel_type, max_sample_rate, "channel added");
        Ok(id)
    }
}

impl<T, C> Node<T, C> {
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn inbound_topics(&self) -> &InboundTopics {
        &self.inbound
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.registry.get(id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.registry.iter()
    }

    /// A config-changed notification is waiting for the runtime loop
    pub fn is_reconfigure_pending(&self) -> bool {
        self.reconfigure_pending
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Exchange, publish and reconnect counters
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.stats.summary()
    }

    /// Read-only view for diagnostics
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            node_id: self.identity.id.to_string(),
            name: self.identity.name.clone(),
            node_type: self.identity.node_type.clone(),
            phase: self.phase,
            reconfigure_pending: self.reconfigure_pending,
            channels: self.registry.snapshots(),
        }
    }
}

/// Read-only view of the node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub name: String,
    pub node_type: String,
    pub phase: Phase,
    pub reconfigure_pending: bool,
    pub channels: Vec<ChannelSnapshot>,
}
