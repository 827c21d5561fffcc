//! The FRTA routing engine: pure protocol logic, no I/O and no clock.
//!
//! Every entry point takes `now` (time since the node's timeline epoch) and
//! returns the [`EngineEffect`]s the caller must carry out: packets to
//! transmit, timers to arm, events to surface. The async runtime and the
//! discrete-event test harness are two such callers.
mod effect;
mod handlers;
mod state;

use std::time::Duration;

use serde::Serialize;

use crate::types::{InterfaceId, NodeAddress};

pub use effect::{EngineEffect, Timer};
pub use state::Engine;

/// Answer to "where do I hand a packet for this destination?".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub destination: NodeAddress,
    /// Neighbor to hand the packet to. Unspecified (`0.0.0.0`) for broadcast.
    pub next_hop: NodeAddress,
    pub interface: InterfaceId,
    /// Local address packets on this route originate from.
    pub source: NodeAddress,
    /// Whether the link to `next_hop` currently looks collision-prone.
    pub collision_risk: bool,
}

/// Outcome of [`Engine::route_input`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InputDecision {
    DeliveredLocally { interface: InterfaceId },
    Forwarded(Route),
    NotFound,
}

/// Protocol-level events the application may want to observe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A reply settled one of our pending discoveries.
    RouteDiscovered {
        destination: NodeAddress,
        next_hop: NodeAddress,
        trust: f64,
        hop_count: u32,
        elapsed: Duration,
    },
    /// No reply arrived within the request timeout.
    DiscoveryTimedOut { destination: NodeAddress },
    /// The cache sweep evicted a route.
    RouteExpired { destination: NodeAddress },
    /// A route was handed out over a link flagged as collision-prone.
    CollisionRisk {
        destination: NodeAddress,
        next_hop: NodeAddress,
    },
    /// An incoming control packet was discarded.
    MessageDropped { sender: NodeAddress, reason: String },
}
