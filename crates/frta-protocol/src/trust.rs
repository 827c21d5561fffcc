//! Per-node reputation, plus which nodes have been heard from.
//!
//! Two clamping regimes share one table:
//! - [`TrustTable::update`] is the protocol's smoothed update, clamped to
//!   `[0.1, 1.0]` so a node is never written off completely by message traffic;
//! - [`TrustTable::set`] and [`TrustTable::adjust`] are direct or path-feedback
//!   writes, clamped to `[0.0, 1.0]`.
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{clamp_trust, NodeAddress, DEFAULT_TRUST};

/// Weight of the new observation in the exponential smoothing.
pub const TRUST_ALPHA: f64 = 0.7;

/// Floor of smoothed protocol trust.
pub const TRUST_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Default)]
pub struct TrustTable {
    scores: BTreeMap<NodeAddress, f64>,
    active: BTreeSet<NodeAddress>,
}

impl TrustTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current trust for `node`, 0.5 if never observed.
    pub fn get(&self, node: NodeAddress) -> f64 {
        self.scores.get(&node).copied().unwrap_or(DEFAULT_TRUST)
    }

    pub fn contains(&self, node: NodeAddress) -> bool {
        self.scores.contains_key(&node)
    }

    /// Smooth `observed` into the node's trust and return the new value.
    ///
    /// A NaN observation leaves the current value in place (still clamped).
    pub fn update(&mut self, node: NodeAddress, observed: f64) -> f64 {
        let current = self.get(node);
        let observed = if observed.is_nan() { current } else { observed };
        let next = clamp_trust(
            TRUST_ALPHA * observed + (1.0 - TRUST_ALPHA) * current,
            TRUST_FLOOR,
            1.0,
        );
        self.scores.insert(node, next);
        next
    }

    /// Overwrite the node's trust, clamped to `[0, 1]`.
    pub fn set(&mut self, node: NodeAddress, value: f64) {
        self.scores.insert(node, clamp_trust(value, 0.0, 1.0));
    }

    /// Add `delta` to the node's trust, clamped to `[0, 1]`.
    pub fn adjust(&mut self, node: NodeAddress, delta: f64) -> f64 {
        let next = clamp_trust(self.get(node) + delta, 0.0, 1.0);
        self.scores.insert(node, next);
        next
    }

    pub fn remove(&mut self, node: NodeAddress) {
        self.scores.remove(&node);
        self.active.remove(&node);
    }

    // ── Activity ────────────────────────────────────────────────────────

    pub fn mark_active(&mut self, node: NodeAddress) {
        self.active.insert(node);
    }

    pub fn mark_inactive(&mut self, node: NodeAddress) {
        self.active.remove(&node);
    }

    pub fn is_active(&self, node: NodeAddress) -> bool {
        self.active.contains(&node)
    }

    /// Nodes heard from, in address order.
    pub fn active_nodes(&self) -> Vec<NodeAddress> {
        self.active.iter().copied().collect()
    }

    /// All scored nodes with their trust, in address order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeAddress, f64)> + '_ {
        self.scores.iter().map(|(n, t)| (*n, *t))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn node(last: u8) -> NodeAddress {
        Ipv4Addr::new(10, 1, 1, last)
    }

    #[test]
    fn test_unknown_node_defaults() {
        let table = TrustTable::new();
        assert_eq!(table.get(node(9)), 0.5);
        assert!(!table.contains(node(9)));
    }

    #[test]
    fn test_update_smooths_from_default() {
        let mut table = TrustTable::new();
        let v = table.update(node(2), 0.7);
        // 0.7 * 0.7 + 0.3 * 0.5
        assert!((v - 0.64).abs() < 1e-12);
        assert_eq!(table.get(node(2)), v);
    }

    #[test]
    fn test_update_clamps_to_floor() {
        let mut table = TrustTable::new();
        for _ in 0..20 {
            table.update(node(3), 0.0);
        }
        assert_eq!(table.get(node(3)), TRUST_FLOOR);
        table.update(node(3), -5.0);
        assert_eq!(table.get(node(3)), TRUST_FLOOR);
    }

    #[test]
    fn test_update_converges_to_one() {
        let mut table = TrustTable::new();
        let mut prev = table.get(node(4));
        for _ in 0..30 {
            let next = table.update(node(4), 1.0);
            assert!(next >= prev);
            assert!(next <= 1.0);
            prev = next;
        }
        assert!(1.0 - prev < 1e-9);
    }

    #[test]
    fn test_nan_observation_keeps_current() {
        let mut table = TrustTable::new();
        table.set(node(5), 0.8);
        let v = table.update(node(5), f64::NAN);
        assert!((v - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_set_and_adjust_use_full_range() {
        let mut table = TrustTable::new();
        table.set(node(6), 0.05);
        assert_eq!(table.get(node(6)), 0.05);
        assert_eq!(table.adjust(node(6), -0.2), 0.0);
        assert_eq!(table.adjust(node(6), 1.5), 1.0);
        table.set(node(6), 7.0);
        assert_eq!(table.get(node(6)), 1.0);
    }

    #[test]
    fn test_activity_tracking() {
        let mut table = TrustTable::new();
        table.mark_active(node(8));
        table.mark_active(node(2));
        assert!(table.is_active(node(2)));
        assert_eq!(table.active_nodes(), vec![node(2), node(8)]);
        table.mark_inactive(node(2));
        assert!(!table.is_active(node(2)));
        table.remove(node(8));
        assert!(table.active_nodes().is_empty());
    }
}
