//! Per-destination route-discovery bookkeeping.
//!
//! A destination moves `Idle -> RequestSent -> {ReplyReceived | TimedOut}`.
//! Whichever of reply or timeout arrives first settles it; the other is then
//! a no-op. Nodes that re-broadcast someone else's request also remember who
//! asked, so a reply passing back through them can be relayed onward.
use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::types::{NodeAddress, REQUEST_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DiscoveryState {
    Idle,
    RequestSent { issued_at: Duration },
    ReplyReceived { at: Duration },
    TimedOut { at: Duration },
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryTable {
    /// Destinations under discovery with the time their request went out.
    pending: BTreeMap<NodeAddress, Duration>,
    /// Last settled outcome per destination.
    outcomes: BTreeMap<NodeAddress, DiscoveryState>,
    /// target -> originator -> when we re-broadcast its request.
    relayed: BTreeMap<NodeAddress, BTreeMap<NodeAddress, Duration>>,
}

impl DiscoveryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, destination: NodeAddress) -> bool {
        self.pending.contains_key(&destination)
    }

    /// Mark `destination` pending. Returns `false` if it already was.
    pub fn begin(&mut self, destination: NodeAddress, now: Duration) -> bool {
        if self.is_pending(destination) {
            return false;
        }
        self.pending.insert(destination, now);
        true
    }

    /// Settle a pending discovery by reply. Returns the issue time if it was pending.
    pub fn complete(&mut self, destination: NodeAddress, now: Duration) -> Option<Duration> {
        let issued_at = self.pending.remove(&destination)?;
        self.outcomes
            .insert(destination, DiscoveryState::ReplyReceived { at: now });
        Some(issued_at)
    }

    /// Settle a pending discovery by timeout.
    ///
    /// Only the request issued at `issued_at` can time out; a later request
    /// for the same destination is left alone.
    pub fn expire(&mut self, destination: NodeAddress, issued_at: Duration, now: Duration) -> bool {
        if self.pending.get(&destination) != Some(&issued_at) {
            return false;
        }
        self.pending.remove(&destination);
        self.outcomes
            .insert(destination, DiscoveryState::TimedOut { at: now });
        true
    }

    pub fn state(&self, destination: NodeAddress) -> DiscoveryState {
        if let Some(issued_at) = self.pending.get(&destination) {
            return DiscoveryState::RequestSent {
                issued_at: *issued_at,
            };
        }
        self.outcomes
            .get(&destination)
            .copied()
            .unwrap_or(DiscoveryState::Idle)
    }

    pub fn pending(&self) -> impl Iterator<Item = (NodeAddress, Duration)> + '_ {
        self.pending.iter().map(|(d, t)| (*d, *t))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ── Relayed requests ────────────────────────────────────────────────

    /// Remember that we forwarded `originator`'s request for `target`.
    pub fn record_relay(&mut self, target: NodeAddress, originator: NodeAddress, now: Duration) {
        self.relayed
            .entry(target)
            .or_default()
            .insert(originator, now);
    }

    /// Originators still waiting on a reply for `target`, in address order.
    pub fn relay_originators(&self, target: NodeAddress, now: Duration) -> Vec<NodeAddress> {
        self.relayed
            .get(&target)
            .map(|by_origin| {
                by_origin
                    .iter()
                    .filter(|(_, at)| now.saturating_sub(**at) < REQUEST_TIMEOUT)
                    .map(|(origin, _)| *origin)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop relay records older than one request timeout.
    pub fn prune_relays(&mut self, now: Duration) {
        self.relayed.retain(|_, by_origin| {
            by_origin.retain(|_, at| now.saturating_sub(*at) < REQUEST_TIMEOUT);
            !by_origin.is_empty()
        });
    }

    /// Forget all in-flight state. Settled outcomes are kept.
    pub fn clear_in_flight(&mut self) {
        self.pending.clear();
        self.relayed.clear();
    }
}
