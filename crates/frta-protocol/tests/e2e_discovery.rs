/// Multi-node route discovery over the simulated medium.
///
/// Topologies are lines: without duplicate-request suppression every cycle
/// turns a single request into a storm bounded only by the hop limit.
mod common;

use std::time::Duration;

use common::{addr, init_tracing, Simulation, IF};
use frta_protocol::{
    DiscoveryState, EngineConfig, FrtaError, ProtocolEvent, REQUEST_TIMEOUT, ROUTE_CACHE_TIMEOUT,
};

fn discovered(events: &[ProtocolEvent], destination: std::net::Ipv4Addr) -> bool {
    events.iter().any(|e| {
        matches!(e, ProtocolEvent::RouteDiscovered { destination: d, .. } if *d == destination)
    })
}

#[test]
fn three_node_line_discovers_route_through_relay() {
    init_tracing();
    let mut sim = Simulation::line(3, EngineConfig::new());
    sim.run_for(Duration::from_secs(1));

    // ── S asks for D: miss, discovery starts ───────────────────────────
    let err = sim.route_output(addr(1), addr(3)).unwrap_err();
    assert_eq!(err, FrtaError::NoRouteToHost { destination: addr(3) });
    assert!(sim.engine(addr(1)).is_pending(addr(3)));

    sim.run_for(Duration::from_millis(100));

    // ── S learned D through I ──────────────────────────────────────────
    assert!(discovered(&sim.events(addr(1)), addr(3)));
    assert!(matches!(
        sim.engine(addr(1)).discovery_state(addr(3)),
        DiscoveryState::ReplyReceived { .. }
    ));
    let route = sim.route_output(addr(1), addr(3)).unwrap();
    assert_eq!(route.next_hop, addr(2));
    assert_eq!(route.source, addr(1));
    assert_eq!(route.interface, IF);

    let now = sim.now();
    let entry = sim.engine(addr(1)).route(now, addr(3)).unwrap();
    assert!(entry.trust > 0.0 && entry.trust <= 1.0);

    // ── Intermediate and destination state ─────────────────────────────
    let relay = sim.engine(addr(2));
    assert_eq!(relay.route(now, addr(3)).unwrap().next_hop, addr(3));
    assert_eq!(relay.route(now, addr(1)).unwrap().next_hop, addr(1));
    assert_eq!(relay.metrics().requests_forwarded.get(), 1);
    assert!(relay.metrics().replies_relayed.get() >= 1);

    let dest = sim.engine(addr(3));
    let reverse = dest.route(now, addr(1)).unwrap();
    assert_eq!(reverse.next_hop, addr(2));
    assert_eq!(reverse.hop_count, 2);
    assert_eq!(dest.metrics().replies_sent.get(), 1);
    assert!(dest.is_node_active(addr(2)));
}

#[test]
fn four_node_line_resolves_within_retries() {
    init_tracing();
    let mut sim = Simulation::line(4, EngineConfig::new());
    sim.run_for(Duration::from_secs(1));

    let route = sim.resolve(addr(1), addr(4), 3).unwrap();
    assert_eq!(route.next_hop, addr(2));

    // The request must have crossed both intermediate nodes.
    assert!(sim.engine(addr(2)).metrics().requests_forwarded.get() >= 1);
    assert!(sim.engine(addr(3)).metrics().requests_forwarded.get() >= 1);
    assert!(sim.engine(addr(4)).metrics().replies_sent.get() >= 1);
}

#[test]
fn intermediate_cache_answers_later_requests() {
    init_tracing();
    let mut sim = Simulation::line(3, EngineConfig::new());
    sim.run_for(Duration::from_secs(1));

    // Node 2 learns its neighbor first.
    assert!(sim.route_output(addr(2), addr(3)).is_err());
    sim.run_for(Duration::from_millis(100));
    assert!(sim.route_output(addr(2), addr(3)).is_ok());
    assert_eq!(sim.engine(addr(3)).metrics().replies_sent.get(), 1);

    // Node 1's request stops at node 2, which answers from its cache.
    assert!(sim.route_output(addr(1), addr(3)).is_err());
    sim.run_for(Duration::from_millis(100));

    let route = sim.route_output(addr(1), addr(3)).unwrap();
    assert_eq!(route.next_hop, addr(2));
    assert_eq!(sim.engine(addr(2)).metrics().replies_sent.get(), 1);
    assert_eq!(sim.engine(addr(3)).metrics().replies_sent.get(), 1);
}

#[test]
fn unreachable_destination_times_out() {
    init_tracing();
    let mut sim = Simulation::line(2, EngineConfig::new());
    sim.run_for(Duration::from_secs(1));

    assert!(sim.route_output(addr(1), addr(9)).is_err());
    sim.run_for(REQUEST_TIMEOUT + Duration::from_millis(10));

    let events = sim.events(addr(1));
    assert!(events.contains(&ProtocolEvent::DiscoveryTimedOut { destination: addr(9) }));
    assert!(matches!(
        sim.engine(addr(1)).discovery_state(addr(9)),
        DiscoveryState::TimedOut { .. }
    ));
    assert_eq!(sim.engine(addr(1)).metrics().discoveries_timed_out.get(), 1);
    // The neighbor relayed once; its echo back to us was ignored.
    assert_eq!(sim.engine(addr(2)).metrics().requests_forwarded.get(), 1);
}

#[test]
fn cut_link_prevents_discovery() {
    init_tracing();
    let mut sim = Simulation::line(3, EngineConfig::new());
    sim.unlink(addr(2), addr(3));
    sim.run_for(Duration::from_secs(1));

    assert!(sim.route_output(addr(1), addr(3)).is_err());
    sim.run_for(REQUEST_TIMEOUT * 2);

    assert!(!discovered(&sim.events(addr(1)), addr(3)));
    assert!(sim.route_output(addr(1), addr(3)).is_err());
}

#[test]
fn learned_route_expires_from_cache() {
    init_tracing();
    let mut sim = Simulation::line(3, EngineConfig::new());
    sim.run_for(Duration::from_secs(1));
    assert!(sim.route_output(addr(1), addr(3)).is_err());
    sim.run_for(Duration::from_millis(100));

    let learned_at = sim.now();
    assert!(sim.engine(addr(1)).route(learned_at, addr(3)).is_some());

    // Lazily stale once the cache timeout has passed.
    sim.run_until(learned_at + ROUTE_CACHE_TIMEOUT + Duration::from_secs(1));
    let now = sim.now();
    assert!(sim.engine(addr(1)).route(now, addr(3)).is_none());

    // And actively evicted by the next sweep.
    sim.run_until(Duration::from_secs(61));
    let events = sim.events(addr(1));
    assert!(events.contains(&ProtocolEvent::RouteExpired { destination: addr(3) }));
    assert!(sim.engine(addr(1)).metrics().routes_expired.get() >= 1);
}

#[test]
fn advertisements_propagate_one_hop_per_interval() {
    init_tracing();
    let interval = Duration::from_secs(10);
    let mut sim = Simulation::line(3, EngineConfig::new().update_interval(interval));

    sim.run_until(interval + Duration::from_millis(500));
    let now = sim.now();
    let neighbor = sim.engine(addr(1)).route(now, addr(2)).unwrap();
    assert_eq!(neighbor.next_hop, addr(2));
    assert_eq!(neighbor.hop_count, 1);
    assert!(sim.engine(addr(1)).route(now, addr(3)).is_none());

    sim.run_until(interval * 2 + Duration::from_millis(500));
    let now = sim.now();
    let far = sim.engine(addr(1)).route(now, addr(3)).unwrap();
    assert_eq!(far.next_hop, addr(2));
    assert_eq!(far.hop_count, 2);
    assert!(sim.engine(addr(1)).metrics().advertisements_adopted.get() >= 2);

    // No discovery was ever needed.
    assert_eq!(sim.engine(addr(1)).metrics().requests_originated.get(), 0);
}

#[test]
fn periodic_trust_updates_reach_neighbors() {
    init_tracing();
    let mut sim = Simulation::line(2, EngineConfig::new());
    sim.run_for(Duration::from_millis(10));

    // Each start broadcast one trust update per cached destination (its
    // own self-route, carrying full trust).
    let engine = sim.engine(addr(1));
    assert_eq!(engine.metrics().trust_updates_received.get(), 1);
    assert!(engine.trust_of(addr(2)) > 0.5);
    assert!(engine.is_node_active(addr(2)));
}

#[test]
fn stopped_node_stays_silent() {
    init_tracing();
    let mut sim = Simulation::line(3, EngineConfig::new());
    sim.run_for(Duration::from_secs(1));
    let now = sim.now();
    sim.engine_mut(addr(2)).stop(now);

    assert!(sim.route_output(addr(1), addr(3)).is_err());
    sim.run_for(REQUEST_TIMEOUT * 2);

    assert!(!discovered(&sim.events(addr(1)), addr(3)));
    assert_eq!(sim.engine(addr(2)).metrics().requests_forwarded.get(), 0);
    assert_eq!(sim.engine(addr(3)).metrics().replies_sent.get(), 0);
}
