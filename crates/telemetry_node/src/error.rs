//! Telemetry node error types

use contracts::{ContractError, Operation, TransportError};
use thiserror::Error;

/// Node engine error
#[derive(Debug, Error)]
pub enum NodeError {
    /// Channel registry is full
    #[error("channel capacity exceeded: at most {capacity} channels can be registered")]
    CapacityExceeded { capacity: usize },

    /// Channels can only be added before `start`
    #[error("channel registration is closed once the node has started")]
    RegistrationClosed,

    /// `start` was called twice
    #[error("node already started")]
    AlreadyStarted,

    /// The runtime loop was ticked before `start` completed
    #[error("node not started")]
    NotStarted,

    /// A second exchange was requested while one is outstanding
    #[error("exchange '{requested}' refused: '{outstanding}' is still pending")]
    ExchangeBusy {
        requested: Operation,
        outstanding: Operation,
    },

    /// Transport buffer could not be reserved; the node cannot run
    #[error("transport buffer allocation of {requested} bytes failed")]
    BufferAllocation { requested: usize },

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl NodeError {
    /// Create an exchange-busy error
    pub fn exchange_busy(requested: Operation, outstanding: Operation) -> Self {
        Self::ExchangeBusy {
            requested,
            outstanding,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, NodeError>;
