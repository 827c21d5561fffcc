use crate::types::NodeAddress;
use crate::wire::MessageType;

/// Errors surfaced by the FRTA engine and runtime.
///
/// None of these are fatal to the engine: a failed decode drops one packet,
/// a missing route is reported to the caller and discovery continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrtaError {
    #[error("no route to host {destination}")]
    NoRouteToHost { destination: NodeAddress },

    #[error("empty control packet")]
    EmptyPacket,

    #[error("truncated {kind:?} header: need {needed} bytes, got {got}")]
    Truncated {
        kind: MessageType,
        needed: usize,
        got: usize,
    },

    #[error("engine is not running")]
    NotRunning,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for FrtaError {
    fn from(e: std::io::Error) -> Self {
        FrtaError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for FrtaError {
    fn from(e: serde_json::Error) -> Self {
        FrtaError::InvalidConfig(e.to_string())
    }
}
