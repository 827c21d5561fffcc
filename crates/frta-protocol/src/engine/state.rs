use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::collision::CollisionDetector;
use crate::config::EngineConfig;
use crate::discovery::{DiscoveryState, DiscoveryTable};
use crate::error::FrtaError;
use crate::metrics::EngineMetrics;
use crate::path::PathSelector;
use crate::route_cache::{RouteCache, RouteEntry, RouteTable};
use crate::trust::TrustTable;
use crate::types::{
    InterfaceId, NodeAddress, Path, Target, REQUEST_TIMEOUT, ROUTE_CACHE_TIMEOUT, SELF_TRUST,
};
use crate::wire::{ControlMessage, RouteRequest};

use super::effect::{EngineEffect, Timer};
use super::{InputDecision, ProtocolEvent, Route};

#[derive(Debug, Clone, Default)]
pub(crate) struct Interface {
    pub(crate) up: bool,
    pub(crate) addresses: Vec<NodeAddress>,
}

/// One node's routing state.
///
/// Owns every table exclusively: route cache, trust, discovery bookkeeping,
/// path memo and collision statistics. Nothing here blocks or performs I/O.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) span: tracing::Span,
    pub(crate) running: bool,
    /// Bumped on every start; periodic timers from an older run are ignored.
    pub(crate) epoch: u64,
    pub(crate) interfaces: BTreeMap<InterfaceId, Interface>,

    pub(crate) cache: RouteCache,
    pub(crate) trust: TrustTable,
    pub(crate) discovery: DiscoveryTable,
    pub(crate) paths: PathSelector,
    pub(crate) collisions: CollisionDetector,
    pub(crate) metrics: EngineMetrics,
    rng: StdRng,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            span: tracing::info_span!("frta_engine", node = tracing::field::Empty),
            running: false,
            epoch: 0,
            interfaces: BTreeMap::new(),
            cache: RouteCache::new(),
            trust: TrustTable::new(),
            discovery: DiscoveryTable::new(),
            paths: PathSelector::new(),
            collisions: CollisionDetector::new(),
            metrics: EngineMetrics::default(),
            rng,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start the protocol: seed self-routes, send a routing update right away
    /// and arm the periodic update, advertisement and sweep timers.
    pub fn start(&mut self, now: Duration) -> Vec<EngineEffect> {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.running {
            return Vec::new();
        }
        self.running = true;
        self.epoch += 1;
        self.install_self_routes(now);
        tracing::info!(epoch = self.epoch, routes = self.cache.len(), "engine started");

        let epoch = self.epoch;
        let interval = self.config.update_interval;
        let mut effects = self.routing_update(now);
        effects.push(EngineEffect::schedule(interval, Timer::RoutingUpdate { epoch }));
        effects.push(EngineEffect::schedule(interval, Timer::Advertise { epoch }));
        effects.push(EngineEffect::schedule(
            ROUTE_CACHE_TIMEOUT,
            Timer::CacheSweep { epoch },
        ));
        effects
    }

    /// Stop the protocol. In-flight discoveries are forgotten; learned routes
    /// and trust are kept for a later restart.
    pub fn stop(&mut self, _now: Duration) {
        let _enter = self.span.enter();
        if !self.running {
            return;
        }
        self.running = false;
        self.discovery.clear_in_flight();
        tracing::info!("engine stopped");
    }

    pub fn interface_up(&mut self, now: Duration, interface: InterfaceId) {
        let span = self.span.clone();
        let _enter = span.enter();
        self.interfaces.entry(interface).or_default().up = true;
        tracing::debug!(interface, "interface up");
        self.install_self_routes(now);
    }

    /// Invalidate the self-routes of `interface`.
    pub fn interface_down(&mut self, now: Duration, interface: InterfaceId) {
        let span = self.span.clone();
        let _enter = span.enter();
        let Some(iface) = self.interfaces.get_mut(&interface) else {
            return;
        };
        iface.up = false;
        for addr in iface.addresses.clone() {
            self.cache.invalidate(addr);
        }
        tracing::debug!(interface, "interface down");
        self.install_self_routes(now);
    }

    pub fn add_address(&mut self, now: Duration, interface: InterfaceId, address: NodeAddress) {
        let span = self.span.clone();
        let _enter = span.enter();
        let iface = self.interfaces.entry(interface).or_default();
        if !iface.addresses.contains(&address) {
            iface.addresses.push(address);
        }
        tracing::debug!(interface, %address, "address added");
        self.install_self_routes(now);
    }

    pub fn remove_address(&mut self, now: Duration, interface: InterfaceId, address: NodeAddress) {
        let span = self.span.clone();
        let _enter = span.enter();
        if let Some(iface) = self.interfaces.get_mut(&interface) {
            iface.addresses.retain(|a| *a != address);
        }
        self.cache.remove(address);
        tracing::debug!(interface, %address, "address removed");
        self.install_self_routes(now);
    }

    // ── Forwarding decisions ────────────────────────────────────────────

    /// Pick the neighbor to hand a locally originated packet to.
    ///
    /// A miss starts discovery (unless one is already pending) and reports
    /// `NoRouteToHost`; the caller retries once a route has been discovered.
    pub fn route_output(
        &mut self,
        now: Duration,
        destination: NodeAddress,
    ) -> (Result<Route, FrtaError>, Vec<EngineEffect>) {
        let span = self.span.clone();
        let _enter = span.enter();
        let (interface, source) = self.primary().unwrap_or((0, Ipv4Addr::UNSPECIFIED));

        if destination.is_broadcast() {
            let route = Route {
                destination,
                next_hop: Ipv4Addr::UNSPECIFIED,
                interface,
                source,
                collision_risk: false,
            };
            return (Ok(route), Vec::new());
        }

        if let Some(entry) = self.cache.get(now, destination) {
            let next_hop = entry.next_hop;
            let collision_risk = self
                .collisions
                .detect_potential_collision(now, source, next_hop);
            let route = Route {
                destination,
                next_hop,
                interface: entry.interface,
                source,
                collision_risk,
            };
            let mut effects = Vec::new();
            if collision_risk {
                tracing::debug!(%destination, %next_hop, "route handed out over risky link");
                effects.push(EngineEffect::Emit(ProtocolEvent::CollisionRisk {
                    destination,
                    next_hop,
                }));
            }
            return (Ok(route), effects);
        }

        let effects = self.begin_discovery(now, destination);
        (Err(FrtaError::NoRouteToHost { destination }), effects)
    }

    /// Decide what to do with a packet arriving for `destination`.
    pub fn route_input(&mut self, now: Duration, destination: NodeAddress) -> InputDecision {
        let (primary_if, source) = self.primary().unwrap_or((0, Ipv4Addr::UNSPECIFIED));
        if destination.is_broadcast() {
            return InputDecision::DeliveredLocally {
                interface: primary_if,
            };
        }
        if let Some(interface) = self.interface_of(destination) {
            return InputDecision::DeliveredLocally { interface };
        }
        match self.cache.get(now, destination) {
            Some(entry) => InputDecision::Forwarded(Route {
                destination,
                next_hop: entry.next_hop,
                interface: entry.interface,
                source,
                collision_risk: self
                    .collisions
                    .detect_potential_collision(now, source, entry.next_hop),
            }),
            None => InputDecision::NotFound,
        }
    }

    // ── Paths ───────────────────────────────────────────────────────────

    pub fn find_all_paths(&mut self, now: Duration, destination: NodeAddress) -> Vec<Path> {
        let source = self.primary_address().unwrap_or(Ipv4Addr::UNSPECIFIED);
        self.paths
            .find_all_paths(now, &self.cache, source, destination)
    }

    pub fn select_trusted_path(&mut self, now: Duration, destination: NodeAddress) -> Path {
        let source = self.primary_address().unwrap_or(Ipv4Addr::UNSPECIFIED);
        self.paths
            .select_trusted_path(now, &self.cache, &self.trust, source, destination)
    }

    /// Best path by trust, with collision scoring breaking ties.
    pub fn preferred_path(&mut self, now: Duration, destination: NodeAddress) -> Path {
        let source = self.primary_address().unwrap_or(Ipv4Addr::UNSPECIFIED);
        self.paths.preferred_path(
            now,
            &self.cache,
            &self.trust,
            &self.collisions,
            source,
            destination,
        )
    }

    pub fn calculate_path_trust(&mut self, path: &[NodeAddress]) -> f64 {
        self.paths.calculate_path_trust(&self.trust, path)
    }

    pub fn is_path_trusted(&mut self, path: &[NodeAddress]) -> bool {
        self.paths.is_path_trusted(&self.trust, path)
    }

    /// Record whether a delivery over `path` succeeded.
    pub fn update_path_trust(&mut self, now: Duration, path: &[NodeAddress], success: bool) -> f64 {
        let value = self.paths.update_path_trust(
            now,
            &mut self.trust,
            &mut self.collisions,
            path,
            success,
        );
        tracing::debug!(parent: &self.span, ?path, success, trust = value, "path outcome recorded");
        value
    }

    pub fn detect_potential_collision(
        &self,
        now: Duration,
        sender: NodeAddress,
        receiver: NodeAddress,
    ) -> bool {
        self.collisions
            .detect_potential_collision(now, sender, receiver)
    }

    // ── Introspection ───────────────────────────────────────────────────

    pub fn route_table(&self, now: Duration) -> RouteTable {
        self.cache.table(now)
    }

    /// Fresh cache entry for `destination`, if any.
    pub fn route(&self, now: Duration, destination: NodeAddress) -> Option<&RouteEntry> {
        self.cache.get(now, destination)
    }

    pub fn trust_of(&self, node: NodeAddress) -> f64 {
        self.trust.get(node)
    }

    pub fn trust_table(&self) -> &TrustTable {
        &self.trust
    }

    pub fn collisions(&self) -> &CollisionDetector {
        &self.collisions
    }

    pub fn discovery_state(&self, destination: NodeAddress) -> DiscoveryState {
        self.discovery.state(destination)
    }

    pub fn is_pending(&self, destination: NodeAddress) -> bool {
        self.discovery.is_pending(destination)
    }

    /// Nodes this engine has received control traffic from.
    pub fn active_nodes(&self) -> Vec<NodeAddress> {
        self.trust.active_nodes()
    }

    pub fn is_node_active(&self, node: NodeAddress) -> bool {
        self.trust.is_active(node)
    }

    pub fn metrics(&self) -> &EngineMetrics {
        self.metrics.route_cache_size.set(self.cache.len() as u64);
        self.metrics
            .pending_discoveries
            .set(self.discovery.pending_count() as u64);
        &self.metrics
    }

    // ── Addresses ───────────────────────────────────────────────────────

    /// First non-loopback address of the first interface that is up.
    pub fn primary_address(&self) -> Option<NodeAddress> {
        self.primary().map(|(_, addr)| addr)
    }

    pub(crate) fn primary(&self) -> Option<(InterfaceId, NodeAddress)> {
        self.interfaces
            .iter()
            .filter(|(_, iface)| iface.up)
            .find_map(|(id, iface)| {
                iface
                    .addresses
                    .iter()
                    .find(|a| !a.is_loopback())
                    .map(|a| (*id, *a))
            })
    }

    pub fn is_local(&self, address: NodeAddress) -> bool {
        self.interface_of(address).is_some()
    }

    fn interface_of(&self, address: NodeAddress) -> Option<InterfaceId> {
        self.interfaces
            .iter()
            .find(|(_, iface)| iface.addresses.contains(&address))
            .map(|(id, _)| *id)
    }

    /// (Re)install hop-0 routes to every non-loopback address on an up interface.
    pub(crate) fn install_self_routes(&mut self, now: Duration) {
        let local: Vec<(InterfaceId, NodeAddress)> = self
            .interfaces
            .iter()
            .filter(|(_, iface)| iface.up)
            .flat_map(|(id, iface)| iface.addresses.iter().map(move |a| (*id, *a)))
            .filter(|(_, a)| !a.is_loopback())
            .collect();
        for (interface, addr) in local {
            self.cache.add_or_update(
                addr,
                RouteEntry::new(addr, SELF_TRUST, 0, interface, now),
            );
            self.trust.set(addr, SELF_TRUST);
        }
        if let Some(primary) = self.primary_address() {
            self.span.record("node", tracing::field::display(primary));
        }
    }

    // ── Discovery ───────────────────────────────────────────────────────

    /// Broadcast a hop-0 request for `destination` unless one is pending.
    pub(crate) fn begin_discovery(
        &mut self,
        now: Duration,
        destination: NodeAddress,
    ) -> Vec<EngineEffect> {
        if !self.running {
            tracing::debug!(%destination, "no route and engine stopped");
            return Vec::new();
        }
        let Some(source) = self.primary_address() else {
            tracing::debug!(%destination, "no route and no local address");
            return Vec::new();
        };
        if !self.discovery.begin(destination, now) {
            return Vec::new();
        }
        tracing::debug!(%destination, "starting route discovery");
        self.metrics.requests_originated.inc();
        let request = RouteRequest {
            destination,
            source,
            hop_count: 0,
        };
        vec![
            EngineEffect::transmit(Target::Broadcast, ControlMessage::RouteRequest(request)),
            EngineEffect::schedule(
                REQUEST_TIMEOUT,
                Timer::RequestTimeout {
                    destination,
                    issued_at: now,
                },
            ),
        ]
    }

    /// Schedule `packet` after a uniform random delay in `[0, jitter_max]`.
    pub(crate) fn send_jittered(&mut self, target: Target, packet: ControlMessage) -> EngineEffect {
        let max_us = self.config.jitter_max.as_micros() as u64;
        let delay = Duration::from_micros(self.rng.random_range(0..=max_us));
        EngineEffect::schedule(delay, Timer::DeferredSend { target, packet })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
