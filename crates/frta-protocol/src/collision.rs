//! Collision-risk estimation.
//!
//! Every transmission outcome is folded into a per-node exponential moving
//! average and into global success/total counters. The per-node figures flag
//! risky links; the global figure scores whole paths.
use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::types::{NodeAddress, Path};

/// Smoothing factor of the per-node collision EMA.
pub const COLLISION_ALPHA: f64 = 0.1;

/// A sender that transmitted more recently than this is considered colliding.
pub const RECENT_TRANSMISSION_WINDOW: Duration = Duration::from_micros(100);

/// More recorded collisions than this on a link flag it as risky.
pub const LINK_COLLISION_LIMIT: u64 = 5;

/// Sender probability above which a link is flagged as risky.
pub const RISKY_PROBABILITY: f64 = 0.5;

/// Transmission history of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransmissionStats {
    pub last_transmission: Option<Duration>,
    pub packet_count: u64,
    pub collision_probability: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionDetector {
    stats: BTreeMap<NodeAddress, TransmissionStats>,
    link_collisions: BTreeMap<(NodeAddress, NodeAddress), u64>,
    success_count: u64,
    total_count: u64,
    /// Global probability, recomputed lazily after any update.
    cached: Cell<Option<f64>>,
}

impl CollisionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transmission outcome for `node` at `now`.
    pub fn update_transmission_stats(&mut self, now: Duration, node: NodeAddress, success: bool) {
        let stats = self.stats.entry(node).or_default();
        stats.last_transmission = Some(now);
        stats.packet_count += 1;
        let target = if success { 0.0 } else { 1.0 };
        stats.collision_probability =
            COLLISION_ALPHA * target + (1.0 - COLLISION_ALPHA) * stats.collision_probability;

        self.total_count += 1;
        if success {
            self.success_count += 1;
        }
        self.cached.set(None);
    }

    /// Count one collision on the ordered link `sender -> receiver`.
    pub fn record_link_collision(&mut self, sender: NodeAddress, receiver: NodeAddress) {
        *self.link_collisions.entry((sender, receiver)).or_insert(0) += 1;
    }

    pub fn link_collisions(&self, sender: NodeAddress, receiver: NodeAddress) -> u64 {
        self.link_collisions
            .get(&(sender, receiver))
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self, node: NodeAddress) -> Option<&TransmissionStats> {
        self.stats.get(&node)
    }

    /// Per-node smoothed collision probability, 0 if never observed.
    pub fn node_probability(&self, node: NodeAddress) -> f64 {
        self.stats
            .get(&node)
            .map_or(0.0, |s| s.collision_probability)
    }

    /// Whether sending from `sender` to `receiver` right now looks risky.
    pub fn detect_potential_collision(
        &self,
        now: Duration,
        sender: NodeAddress,
        receiver: NodeAddress,
    ) -> bool {
        let stats = self.stats.get(&sender);

        let recent = stats
            .and_then(|s| s.last_transmission)
            .is_some_and(|last| now.saturating_sub(last) < RECENT_TRANSMISSION_WINDOW);
        if recent {
            return true;
        }
        if self.link_collisions(sender, receiver) > LINK_COLLISION_LIMIT {
            return true;
        }
        stats.is_some_and(|s| s.collision_probability > RISKY_PROBABILITY)
    }

    /// Global collision probability: `1 - success / total`, 0 with no data.
    pub fn collision_probability(&self) -> f64 {
        if let Some(p) = self.cached.get() {
            return p;
        }
        let p = if self.total_count == 0 {
            0.0
        } else {
            1.0 - self.success_count as f64 / self.total_count as f64
        };
        self.cached.set(Some(p));
        p
    }

    /// Collision score of a whole path. Longer paths score worse.
    pub fn path_collision_probability(&self, path: &[NodeAddress]) -> f64 {
        if path.is_empty() {
            return 1.0;
        }
        let base = self.collision_probability();
        (base * (1.0 + (path.len() as f64).ln())).min(1.0)
    }

    /// The path with the lowest collision score; first wins on ties.
    pub fn get_optimal_path(&self, paths: &[Path]) -> Path {
        paths
            .iter()
            .map(|p| (self.path_collision_probability(p), p))
            .fold(None::<(f64, &Path)>, |best, (score, path)| match best {
                Some((b, _)) if b <= score => best,
                _ => Some((score, path)),
            })
            .map(|(_, p)| p.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn node(last: u8) -> NodeAddress {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_ema_toward_failure_and_success() {
        let mut det = CollisionDetector::new();
        det.update_transmission_stats(ms(1), node(1), false);
        assert!((det.node_probability(node(1)) - 0.1).abs() < 1e-12);
        det.update_transmission_stats(ms(2), node(1), false);
        assert!((det.node_probability(node(1)) - 0.19).abs() < 1e-12);
        det.update_transmission_stats(ms(3), node(1), true);
        assert!((det.node_probability(node(1)) - 0.171).abs() < 1e-12);
        assert_eq!(det.stats(node(1)).unwrap().packet_count, 3);
    }

    #[test]
    fn test_successes_strictly_decrease_positive_probability() {
        let mut det = CollisionDetector::new();
        for i in 0..5 {
            det.update_transmission_stats(ms(i), node(2), false);
        }
        let mut prev = det.node_probability(node(2));
        assert!(prev > 0.0);
        for i in 10..20 {
            det.update_transmission_stats(ms(i), node(2), true);
            let p = det.node_probability(node(2));
            assert!(p < prev);
            assert!(p >= 0.0);
            prev = p;
        }
    }

    #[test]
    fn test_successes_from_zero_stay_zero() {
        let mut det = CollisionDetector::new();
        for i in 0..10 {
            det.update_transmission_stats(ms(i), node(3), true);
            assert_eq!(det.node_probability(node(3)), 0.0);
        }
    }

    #[test]
    fn test_global_probability_is_cached_and_invalidated() {
        let mut det = CollisionDetector::new();
        assert_eq!(det.collision_probability(), 0.0);
        det.update_transmission_stats(ms(1), node(1), true);
        det.update_transmission_stats(ms(2), node(2), false);
        assert_eq!(det.collision_probability(), 0.5);
        assert_eq!(det.cached.get(), Some(0.5));
        det.update_transmission_stats(ms(3), node(2), true);
        assert_eq!(det.cached.get(), None);
        assert!((det.collision_probability() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_detect_recent_transmission() {
        let mut det = CollisionDetector::new();
        let t = Duration::from_micros(1_000);
        det.update_transmission_stats(t, node(1), true);
        assert!(det.detect_potential_collision(t + Duration::from_micros(50), node(1), node(2)));
        assert!(!det.detect_potential_collision(t + Duration::from_micros(100), node(1), node(2)));
        // Never-seen sender is not recent.
        assert!(!det.detect_potential_collision(Duration::ZERO, node(9), node(2)));
    }

    #[test]
    fn test_detect_link_collision_count() {
        let mut det = CollisionDetector::new();
        for _ in 0..5 {
            det.record_link_collision(node(1), node(2));
        }
        assert!(!det.detect_potential_collision(ms(10), node(1), node(2)));
        det.record_link_collision(node(1), node(2));
        assert!(det.detect_potential_collision(ms(10), node(1), node(2)));
        assert!(!det.detect_potential_collision(ms(10), node(2), node(1)));
    }

    #[test]
    fn test_detect_high_probability() {
        let mut det = CollisionDetector::new();
        for i in 0..10 {
            det.update_transmission_stats(ms(i), node(4), false);
        }
        // 1 - 0.9^10 ≈ 0.65
        assert!(det.node_probability(node(4)) > 0.5);
        assert!(det.detect_potential_collision(ms(100), node(4), node(5)));
    }

    #[test]
    fn test_optimal_path_prefers_shorter() {
        let mut det = CollisionDetector::new();
        det.update_transmission_stats(ms(1), node(1), false);
        det.update_transmission_stats(ms(2), node(1), true);
        let long = vec![node(1), node(2), node(3), node(4)];
        let short = vec![node(1), node(4)];
        assert_eq!(det.get_optimal_path(&[long.clone(), short.clone()]), short);
        assert!(det.get_optimal_path(&[]).is_empty());
    }

    #[test]
    fn test_optimal_path_ties_pick_first() {
        let det = CollisionDetector::new();
        // Global probability 0: every path scores 0.
        let a = vec![node(1), node(2), node(3)];
        let b = vec![node(1), node(3)];
        assert_eq!(det.get_optimal_path(&[a.clone(), b]), a);
    }

    #[test]
    fn test_empty_path_scores_one() {
        let det = CollisionDetector::new();
        assert_eq!(det.path_collision_probability(&[]), 1.0);
    }
}
