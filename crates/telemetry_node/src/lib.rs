//! # Telemetry Node
//!
//! Client-side protocol engine of a telemetry node.
//!
//! Responsibilities:
//! - Register measurement channels and advertise them to the backend
//! - Negotiate channel configuration through correlation exchanges
//! - Publish sensor readings at each channel's sample rate
//! - Answer identification polls and configuration pushes
//! - Recover from transport disconnects
//!
//! The engine runs on a single logical thread. The [`Transport`] and
//! [`Clock`] are injected, so the same code runs against a real broker or
//! against [`MockTransport`] and [`ManualClock`] in tests.
//!
//! ```ignore
//! let clock = SystemClock::new();
//! let mut node = Node::new(blueprint.to_node_settings(), transport, clock)?;
//! node.add_channel("temperature", 10.0, |cal| SensorReading::new(format!("{:.1}", cal.k * read() + cal.m)))?;
//! node.run().await?;
//! ```

pub mod channel;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod mock_backend;
pub mod mock_transport;
pub mod node;
pub mod registry;
mod runtime;
mod sequencer;
pub mod token;

pub use channel::{
    Calibration, Channel, ChannelConfig, ChannelSnapshot, ChannelStatus, SensorFn, SensorReading,
};
pub use clock::{ManualClock, SystemClock};
pub use contracts::{Clock, NodeSettings, Transport};
pub use dispatch::Route;
pub use error::{NodeError, Result};
pub use exchange::{Exchange, ExchangeOutcome, ExchangeSlot};
pub use mock_backend::{RecordedRequest, RequestLog, ScriptedBackend};
pub use mock_transport::{
    MockConfig, MockTransport, PublishedMessage, Responder, ScheduledMessage, SubscriptionEvent,
};
pub use node::{Node, NodeSnapshot, Phase};
pub use registry::ChannelRegistry;
pub use token::TokenGenerator;
