//! Destination-keyed route cache with lazy and swept expiry.
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::types::{clamp_trust, InterfaceId, NodeAddress, ROUTE_CACHE_TIMEOUT};

/// Best known way to reach one destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEntry {
    pub next_hop: NodeAddress,
    /// Always within `[0, 1]`.
    pub trust: f64,
    pub last_update: Duration,
    pub hop_count: u32,
    pub interface: InterfaceId,
    pub valid: bool,
}

impl RouteEntry {
    pub fn new(
        next_hop: NodeAddress,
        trust: f64,
        hop_count: u32,
        interface: InterfaceId,
        now: Duration,
    ) -> Self {
        Self {
            next_hop,
            trust: clamp_trust(trust, 0.0, 1.0),
            last_update: now,
            hop_count,
            interface,
            valid: true,
        }
    }

    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_update)
    }

    /// Valid and younger than the cache timeout.
    pub fn is_fresh(&self, now: Duration) -> bool {
        self.valid && self.age(now) < ROUTE_CACHE_TIMEOUT
    }
}

/// One entry per destination; the latest write wins.
#[derive(Debug, Clone, Default)]
pub struct RouteCache {
    entries: BTreeMap<NodeAddress, RouteEntry>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_update(&mut self, destination: NodeAddress, entry: RouteEntry) {
        self.entries.insert(destination, entry);
    }

    /// The entry for `destination` if it is still fresh at `now`.
    pub fn get(&self, now: Duration, destination: NodeAddress) -> Option<&RouteEntry> {
        self.entries
            .get(&destination)
            .filter(|entry| entry.is_fresh(now))
    }

    /// The stored entry regardless of age or validity.
    pub fn peek(&self, destination: NodeAddress) -> Option<&RouteEntry> {
        self.entries.get(&destination)
    }

    pub fn remove(&mut self, destination: NodeAddress) -> Option<RouteEntry> {
        self.entries.remove(&destination)
    }

    /// Mark the entry unusable without dropping it.
    pub fn invalidate(&mut self, destination: NodeAddress) -> bool {
        match self.entries.get_mut(&destination) {
            Some(entry) => {
                entry.valid = false;
                true
            }
            None => false,
        }
    }

    /// Drop every expired or invalidated entry. Returns the removed destinations.
    pub fn sweep(&mut self, now: Duration) -> Vec<NodeAddress> {
        let stale: Vec<NodeAddress> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(dest, _)| *dest)
            .collect();
        for dest in &stale {
            self.entries.remove(dest);
        }
        stale
    }

    /// Every stored destination, fresh or not, in address order.
    pub fn destinations(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeAddress, &RouteEntry)> + '_ {
        self.entries.iter().map(|(d, e)| (*d, e))
    }

    /// Fresh entries only.
    pub fn fresh(&self, now: Duration) -> impl Iterator<Item = (NodeAddress, &RouteEntry)> + '_ {
        self.iter().filter(move |(_, e)| e.is_fresh(now))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn table(&self, now: Duration) -> RouteTable {
        RouteTable {
            rows: self
                .iter()
                .map(|(destination, e)| RouteRow {
                    destination,
                    next_hop: e.next_hop,
                    trust: e.trust,
                    hop_count: e.hop_count,
                    interface: e.interface,
                    age_ms: e.age(now).as_millis() as u64,
                    fresh: e.is_fresh(now),
                })
                .collect(),
        }
    }
}

// ── Printable snapshot ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRow {
    pub destination: NodeAddress,
    pub next_hop: NodeAddress,
    pub trust: f64,
    pub hop_count: u32,
    pub interface: InterfaceId,
    pub age_ms: u64,
    pub fresh: bool,
}

/// Point-in-time copy of a node's route cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteTable {
    pub rows: Vec<RouteRow>,
}

impl RouteTable {
    pub fn get(&self, destination: NodeAddress) -> Option<&RouteRow> {
        self.rows.iter().find(|r| r.destination == destination)
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:<16} {:>6} {:>4} {:>3} {:>9}",
            "destination", "next hop", "trust", "hops", "if", "age(ms)"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<16} {:<16} {:>6.3} {:>4} {:>3} {:>9}{}",
                row.destination.to_string(),
                row.next_hop.to_string(),
                row.trust,
                row.hop_count,
                row.interface,
                row.age_ms,
                if row.fresh { "" } else { " (stale)" }
            )?;
        }
        Ok(())
    }
}
