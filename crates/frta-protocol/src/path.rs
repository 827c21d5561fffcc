//! Multi-path enumeration and trust-based path selection.
//!
//! The adjacency used here is deliberately coarse: every destination present
//! in the route cache counts as a neighbor of every node. Enumeration is a
//! bounded depth-first search that stops after [`MAX_PATHS`] paths.
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::collision::CollisionDetector;
use crate::route_cache::RouteCache;
use crate::trust::TrustTable;
use crate::types::{NodeAddress, Path, MAX_HOP_COUNT, MAX_PATHS, MIN_PATH_TRUST, REQUEST_TIMEOUT};

/// Trust bonus per node after a successful delivery over a path.
pub const PATH_SUCCESS_BONUS: f64 = 0.1;

/// Trust penalty per node after a failed delivery over a path.
pub const PATH_FAILURE_PENALTY: f64 = 0.2;

/// Longest path the search will build, in nodes.
const MAX_PATH_NODES: usize = MAX_HOP_COUNT as usize + 1;

#[derive(Debug, Clone, Default)]
pub struct PathSelector {
    /// Memoized min-trust per path. Only `update_path_trust` refreshes a value.
    path_trust: BTreeMap<Path, f64>,
    /// Last enumeration per destination, with the time it was computed.
    candidates: BTreeMap<NodeAddress, (Duration, Vec<Path>)>,
}

impl PathSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate up to [`MAX_PATHS`] loop-free paths from `source` to `destination`.
    ///
    /// Results are reused for one request-timeout window per destination.
    pub fn find_all_paths(
        &mut self,
        now: Duration,
        cache: &RouteCache,
        source: NodeAddress,
        destination: NodeAddress,
    ) -> Vec<Path> {
        if let Some((computed_at, paths)) = self.candidates.get(&destination) {
            if now.saturating_sub(*computed_at) < REQUEST_TIMEOUT {
                return paths.clone();
            }
        }
        let paths = enumerate_paths(cache, source, destination);
        tracing::trace!(%destination, found = paths.len(), "enumerated candidate paths");
        self.candidates.insert(destination, (now, paths.clone()));
        paths
    }

    /// Minimum node trust along `path`. Unknown nodes count as 0.5, empty paths as 0.
    pub fn calculate_path_trust(&mut self, trust: &TrustTable, path: &[NodeAddress]) -> f64 {
        if path.is_empty() {
            return 0.0;
        }
        if let Some(cached) = self.path_trust.get(path) {
            return *cached;
        }
        let value = min_trust(trust, path);
        self.path_trust.insert(path.to_vec(), value);
        value
    }

    pub fn is_path_trusted(&mut self, trust: &TrustTable, path: &[NodeAddress]) -> bool {
        !path.is_empty() && self.calculate_path_trust(trust, path) >= MIN_PATH_TRUST
    }

    /// Fresh direct route first, otherwise the candidate with the highest
    /// minimum trust (first found wins ties). Empty if nothing is known.
    pub fn select_trusted_path(
        &mut self,
        now: Duration,
        cache: &RouteCache,
        trust: &TrustTable,
        source: NodeAddress,
        destination: NodeAddress,
    ) -> Path {
        if let Some(direct) = direct_path(now, cache, source, destination) {
            return direct;
        }
        let mut best: Option<(f64, Path)> = None;
        for path in self.find_all_paths(now, cache, source, destination) {
            let value = self.calculate_path_trust(trust, &path);
            match &best {
                Some((b, _)) if value <= *b => {}
                _ => best = Some((value, path)),
            }
        }
        best.map(|(_, p)| p).unwrap_or_default()
    }

    /// Like [`select_trusted_path`](Self::select_trusted_path), but only
    /// trusted candidates qualify and ties on trust go to the path with the
    /// lowest collision score.
    pub fn preferred_path(
        &mut self,
        now: Duration,
        cache: &RouteCache,
        trust: &TrustTable,
        collisions: &CollisionDetector,
        source: NodeAddress,
        destination: NodeAddress,
    ) -> Path {
        if let Some(direct) = direct_path(now, cache, source, destination) {
            return direct;
        }
        let scored: Vec<(f64, Path)> = self
            .find_all_paths(now, cache, source, destination)
            .into_iter()
            .map(|p| (self.calculate_path_trust(trust, &p), p))
            .filter(|(value, _)| *value >= MIN_PATH_TRUST)
            .collect();
        let Some(top) = scored.iter().map(|(v, _)| *v).reduce(f64::max) else {
            return Vec::new();
        };
        let best: Vec<Path> = scored
            .into_iter()
            .filter(|(v, _)| *v == top)
            .map(|(_, p)| p)
            .collect();
        match best.as_slice() {
            [only] => only.clone(),
            _ => collisions.get_optimal_path(&best),
        }
    }

    /// Feed a delivery outcome back into node trust and collision statistics,
    /// then recompute the path's memoized trust.
    pub fn update_path_trust(
        &mut self,
        now: Duration,
        trust: &mut TrustTable,
        collisions: &mut CollisionDetector,
        path: &[NodeAddress],
        success: bool,
    ) -> f64 {
        if path.is_empty() {
            return 0.0;
        }
        let delta = if success {
            PATH_SUCCESS_BONUS
        } else {
            -PATH_FAILURE_PENALTY
        };
        for node in path {
            trust.adjust(*node, delta);
            collisions.update_transmission_stats(now, *node, success);
        }
        if !success {
            for link in path.windows(2) {
                collisions.record_link_collision(link[0], link[1]);
            }
        }
        let value = min_trust(trust, path);
        self.path_trust.insert(path.to_vec(), value);
        value
    }

    pub fn clear(&mut self) {
        self.path_trust.clear();
        self.candidates.clear();
    }
}

fn min_trust(trust: &TrustTable, path: &[NodeAddress]) -> f64 {
    path.iter().map(|n| trust.get(*n)).fold(1.0, f64::min)
}

/// `[source, next_hop, destination]` through a fresh cache entry, with
/// repeated consecutive nodes collapsed.
fn direct_path(
    now: Duration,
    cache: &RouteCache,
    source: NodeAddress,
    destination: NodeAddress,
) -> Option<Path> {
    let entry = cache.get(now, destination)?;
    let mut path = vec![source, entry.next_hop, destination];
    path.dedup();
    Some(path)
}

/// Iterative DFS over the cache's destinations.
fn enumerate_paths(cache: &RouteCache, source: NodeAddress, destination: NodeAddress) -> Vec<Path> {
    if source == destination {
        return vec![vec![source]];
    }
    let neighbors: Vec<NodeAddress> = cache.destinations().collect();
    if !neighbors.contains(&destination) {
        return Vec::new();
    }

    let mut paths = Vec::new();
    let mut current: Path = vec![source];
    let mut visited: BTreeSet<NodeAddress> = BTreeSet::from([source]);
    // Next neighbor index to try, one frame per node in `current`.
    let mut cursors: Vec<usize> = vec![0];

    while let Some(cursor) = cursors.last_mut() {
        if paths.len() >= MAX_PATHS {
            break;
        }
        if *cursor >= neighbors.len() || current.len() >= MAX_PATH_NODES {
            cursors.pop();
            if let Some(node) = current.pop() {
                visited.remove(&node);
            }
            continue;
        }
        let next = neighbors[*cursor];
        *cursor += 1;
        if visited.contains(&next) {
            continue;
        }
        if next == destination {
            let mut found = current.clone();
            found.push(next);
            paths.push(found);
            continue;
        }
        current.push(next);
        visited.insert(next);
        cursors.push(0);
    }
    paths
}
