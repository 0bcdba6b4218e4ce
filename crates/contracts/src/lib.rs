//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the node workspace:
//! wire payloads, the topic scheme, resource ceilings, and the `Transport` /
//! `Clock` seams the protocol engine is written against.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Node-local monotonic milliseconds held in a wrapping `u32` ([`Timestamp`])
//! - All elapsed-time comparisons use wrapping subtraction, so a clock rollover
//!   never stalls a deadline or a publish period

mod blueprint;
mod clock;
mod error;
pub mod limits;
mod node_id;
mod topics;
mod transport;
mod wire;

pub use blueprint::*;
pub use clock::{Clock, LocalClock, Timestamp};
pub use error::*;
pub use node_id::NodeId;
pub use topics::{InboundTopics, Operation, TopicScheme};
pub use transport::{ConnectOptions, InboundMessage, LocalTransport, Transport, TransportError};
pub use wire::*;

/// Channel identifier, assigned sequentially from 1 at registration
pub type ChannelId = u32;
