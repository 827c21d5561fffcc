use std::time::Duration;

use crate::types::{NodeAddress, Target};
use crate::wire::ControlMessage;

use super::ProtocolEvent;

/// Intent produced by the engine's pure logic.
///
/// Every `Engine` entry point returns `Vec<EngineEffect>`; the caller executes
/// them in order against its transport and scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEffect {
    /// Put a control message on the medium now.
    Transmit {
        target: Target,
        packet: ControlMessage,
    },

    /// Call back into [`Engine::handle_timer`](super::Engine::handle_timer)
    /// with `timer` once `after` has elapsed.
    Schedule { after: Duration, timer: Timer },

    /// Surface an event to the application.
    Emit(ProtocolEvent),
}

/// Deferred work the engine asked to be woken up for.
#[derive(Debug, Clone, PartialEq)]
pub enum Timer {
    /// Give up on the discovery issued at `issued_at` if it is still pending.
    RequestTimeout {
        destination: NodeAddress,
        issued_at: Duration,
    },
    /// Jittered transmission of a forwarded request or a reply.
    DeferredSend {
        target: Target,
        packet: ControlMessage,
    },
    /// Periodic trust-update broadcast.
    RoutingUpdate { epoch: u64 },
    /// Periodic route advertisement.
    Advertise { epoch: u64 },
    /// Periodic route cache sweep.
    CacheSweep { epoch: u64 },
}

impl EngineEffect {
    pub fn transmit(target: Target, packet: ControlMessage) -> Self {
        EngineEffect::Transmit { target, packet }
    }

    pub fn schedule(after: Duration, timer: Timer) -> Self {
        EngineEffect::Schedule { after, timer }
    }
}
