//! Effect executor, the only place the runtime touches I/O.
//!
//! - Transmit -> transport.broadcast() / transport.send_to()
//! - Schedule -> a sleeping task that posts the timer back to the loop
//! - Emit -> event_tx.try_send()

use tokio::sync::mpsc;

use crate::engine::{EngineEffect, ProtocolEvent, Timer};
use crate::types::Target;
use crate::wire::ControlMessage;

use super::transport::Transport;

/// Execute `effects` in order.
pub(super) async fn execute_effects<T: Transport>(
    effects: Vec<EngineEffect>,
    transport: &T,
    timer_tx: &mpsc::Sender<Timer>,
    event_tx: &mpsc::Sender<ProtocolEvent>,
) {
    for effect in effects {
        match effect {
            EngineEffect::Transmit { target, packet } => {
                transmit(transport, target, &packet).await;
            }
            EngineEffect::Schedule { after, timer } => {
                let tx = timer_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    // The loop may be gone by now; a late timer is moot.
                    let _ = tx.send(timer).await;
                });
            }
            EngineEffect::Emit(event) => {
                // Never block the loop on a slow consumer.
                if event_tx.try_send(event).is_err() {
                    tracing::debug!("event channel full or closed, event dropped");
                }
            }
        }
    }
}

async fn transmit<T: Transport>(transport: &T, target: Target, packet: &ControlMessage) {
    let bytes = packet.to_bytes();
    let result = match target {
        Target::Broadcast => transport.broadcast(&bytes).await,
        Target::Unicast(neighbor) => transport.send_to(neighbor, &bytes).await,
    };
    if let Err(e) = result {
        tracing::warn!(%target, kind = ?packet.message_type(), "send failed: {e}");
    }
}
