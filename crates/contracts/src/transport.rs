//! Transport trait - publish/subscribe adapter
//!
//! Abstracts the broker client the node talks through. The engine only ever
//! calls into it; integrators and tests provide the implementation.

use bytes::Bytes;
use thiserror::Error;

/// Message delivered by the broker on a subscribed topic
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Topic the message arrived on
    pub topic: String,

    /// Raw payload (zero-copy)
    pub payload: Bytes,
}

impl InboundMessage {
    /// Create a message from topic and payload
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Broker connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Client id (the node's hardware address)
    pub client_id: String,

    /// Optional credentials
    pub username: Option<String>,
    pub password: Option<String>,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

/// Transport-level failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not allocate its message buffer
    #[error("not enough memory for a {requested}-byte transport buffer")]
    BufferAllocation { requested: usize },

    /// Connect attempt failed
    #[error("connection to broker failed: {message}")]
    ConnectFailed { message: String },

    /// Operation requires a live connection
    #[error("transport not connected")]
    NotConnected,

    /// Broker or client rejected a publish
    #[error("publish to '{topic}' rejected: {message}")]
    PublishRejected { topic: String, message: String },

    /// Subscribe or unsubscribe failed
    #[error("subscription change for '{topic}' failed: {message}")]
    SubscriptionFailed { topic: String, message: String },
}

impl TransportError {
    /// Whether retrying can ever succeed
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BufferAllocation { .. })
    }
}

/// Publish/subscribe transport
///
/// Delivery semantics assumed by the engine: reliable once connected,
/// at-least-once, and only on currently subscribed topics.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Reserve the message buffer. Called once before the first connect.
    fn reserve_buffer(&mut self, bytes: usize) -> Result<(), TransportError>;

    /// Open a broker session
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), TransportError>;

    /// Whether the session is currently up
    fn is_connected(&self) -> bool;

    /// Subscribe to an exact topic
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Drop a subscription
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Publish raw bytes to a topic
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Service keep-alives and return every message delivered since the last call.
    async fn poll(&mut self) -> Result<Vec<InboundMessage>, TransportError>;
}
