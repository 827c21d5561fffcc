use frta_metrics::{Counter, Gauge};
use serde::Serialize;

/// Protocol counters for one engine.
#[derive(Debug, Default, Clone, Serialize)]
#[non_exhaustive]
pub struct EngineMetrics {
    /// Route requests this node started.
    pub requests_originated: Counter,
    /// Route requests re-broadcast on behalf of others.
    pub requests_forwarded: Counter,
    /// Requests not forwarded because they reached the hop limit.
    pub requests_hop_limited: Counter,
    /// Replies generated here (as destination or from cache).
    pub replies_sent: Counter,
    pub replies_received: Counter,
    /// Replies passed on toward a requester.
    pub replies_relayed: Counter,
    pub advertisements_sent: Counter,
    pub advertisements_adopted: Counter,
    pub trust_updates_sent: Counter,
    pub trust_updates_received: Counter,
    /// Packets with an unknown type tag decoded as route requests.
    pub decode_fallbacks: Counter,
    /// Packets dropped as undecodable or as our own echo.
    pub packets_dropped: Counter,
    pub discoveries_completed: Counter,
    pub discoveries_timed_out: Counter,
    pub routes_expired: Counter,
    /// Route cache size after the last sweep or lookup.
    pub route_cache_size: Gauge,
    pub pending_discoveries: Gauge,
}

impl EngineMetrics {
    /// Independent copy of the current values.
    pub fn snapshot(&self) -> EngineMetrics {
        self.clone()
    }
}
