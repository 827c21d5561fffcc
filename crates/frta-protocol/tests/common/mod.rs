//! Deterministic discrete-event harness for multi-node scenarios.
//!
//! Every node is one [`Engine`] with a single address on interface 1. The
//! medium is an undirected adjacency set: a broadcast reaches every current
//! neighbor, a unicast only reaches its target if it is a neighbor, anything
//! else is lost. Each hop takes [`LINK_DELAY`]. Events fire in `(time, seq)`
//! order so runs are reproducible.
#![allow(dead_code)]

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::net::Ipv4Addr;
use std::time::Duration;

use frta_protocol::{
    Engine, EngineConfig, EngineEffect, FrtaError, NodeAddress, ProtocolEvent, Route, Target,
    Timer, REQUEST_TIMEOUT,
};

pub const IF: u32 = 1;
pub const LINK_DELAY: Duration = Duration::from_millis(1);

pub fn addr(n: u8) -> NodeAddress {
    Ipv4Addr::new(10, 0, 0, n)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

enum Action {
    Deliver {
        to: NodeAddress,
        from: NodeAddress,
        bytes: Vec<u8>,
    },
    Fire {
        node: NodeAddress,
        timer: Timer,
    },
}

struct Scheduled {
    at: Duration,
    seq: u64,
    action: Action,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

pub struct Simulation {
    now: Duration,
    seq: u64,
    queue: BinaryHeap<Reverse<Scheduled>>,
    nodes: BTreeMap<NodeAddress, Engine>,
    links: BTreeSet<(NodeAddress, NodeAddress)>,
    events: Vec<(Duration, NodeAddress, ProtocolEvent)>,
    /// Packets put on the medium, counting each receiving neighbor once.
    pub deliveries: usize,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            seq: 0,
            queue: BinaryHeap::new(),
            nodes: BTreeMap::new(),
            links: BTreeSet::new(),
            events: Vec::new(),
            deliveries: 0,
        }
    }

    /// `n` started nodes `10.0.0.1 ..= 10.0.0.n`, each linked to the next.
    pub fn line(n: u8, config: EngineConfig) -> Self {
        let mut sim = Self::new();
        for i in 1..=n {
            sim.add_node(addr(i), config.clone().rng_seed(u64::from(i)));
        }
        for i in 1..n {
            sim.link(addr(i), addr(i + 1));
        }
        for i in 1..=n {
            sim.start(addr(i));
        }
        sim
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn add_node(&mut self, address: NodeAddress, config: EngineConfig) {
        let mut engine = Engine::new(config);
        engine.interface_up(self.now, IF);
        engine.add_address(self.now, IF, address);
        self.nodes.insert(address, engine);
    }

    pub fn start(&mut self, node: NodeAddress) {
        let now = self.now;
        let effects = self.engine_mut(node).start(now);
        self.apply(node, effects);
    }

    pub fn link(&mut self, a: NodeAddress, b: NodeAddress) {
        self.links.insert((a.min(b), a.max(b)));
    }

    pub fn unlink(&mut self, a: NodeAddress, b: NodeAddress) {
        self.links.remove(&(a.min(b), a.max(b)));
    }

    pub fn neighbors(&self, node: NodeAddress) -> Vec<NodeAddress> {
        self.links
            .iter()
            .filter_map(|&(a, b)| match node {
                n if n == a => Some(b),
                n if n == b => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn engine(&self, node: NodeAddress) -> &Engine {
        &self.nodes[&node]
    }

    pub fn engine_mut(&mut self, node: NodeAddress) -> &mut Engine {
        self.nodes
            .get_mut(&node)
            .unwrap_or_else(|| panic!("unknown node {node}"))
    }

    /// Ask `node` for a route, executing whatever the engine asks for.
    pub fn route_output(
        &mut self,
        node: NodeAddress,
        destination: NodeAddress,
    ) -> Result<Route, FrtaError> {
        let now = self.now;
        let (result, effects) = self.engine_mut(node).route_output(now, destination);
        self.apply(node, effects);
        result
    }

    /// Up to `attempts` discoveries, each given a full request timeout.
    pub fn resolve(
        &mut self,
        node: NodeAddress,
        destination: NodeAddress,
        attempts: usize,
    ) -> Result<Route, FrtaError> {
        for _ in 0..attempts {
            if let Ok(route) = self.route_output(node, destination) {
                return Ok(route);
            }
            self.run_for(REQUEST_TIMEOUT + Duration::from_millis(100));
        }
        self.route_output(node, destination)
    }

    /// Events emitted by `node`, oldest first.
    pub fn events(&self, node: NodeAddress) -> Vec<ProtocolEvent> {
        self.events
            .iter()
            .filter(|(_, n, _)| *n == node)
            .map(|(_, _, e)| e.clone())
            .collect()
    }

    pub fn run_for(&mut self, span: Duration) {
        let until = self.now + span;
        self.run_until(until);
    }

    pub fn run_until(&mut self, until: Duration) {
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.at > until {
                break;
            }
            let Some(Reverse(next)) = self.queue.pop() else {
                break;
            };
            self.now = next.at;
            match next.action {
                Action::Deliver { to, from, bytes } => {
                    let now = self.now;
                    let effects = self.engine_mut(to).handle_packet(now, from, &bytes);
                    self.apply(to, effects);
                }
                Action::Fire { node, timer } => {
                    let now = self.now;
                    let effects = self.engine_mut(node).handle_timer(now, timer);
                    self.apply(node, effects);
                }
            }
        }
        self.now = until;
    }

    fn push(&mut self, at: Duration, action: Action) {
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            at,
            seq: self.seq,
            action,
        }));
    }

    fn apply(&mut self, node: NodeAddress, effects: Vec<EngineEffect>) {
        for effect in effects {
            match effect {
                EngineEffect::Transmit { target, packet } => {
                    let bytes = packet.to_bytes();
                    let receivers = match target {
                        Target::Broadcast => self.neighbors(node),
                        Target::Unicast(to) if self.neighbors(node).contains(&to) => vec![to],
                        Target::Unicast(_) => Vec::new(),
                    };
                    for to in receivers {
                        self.deliveries += 1;
                        let action = Action::Deliver {
                            to,
                            from: node,
                            bytes: bytes.clone(),
                        };
                        self.push(self.now + LINK_DELAY, action);
                    }
                }
                EngineEffect::Schedule { after, timer } => {
                    self.push(self.now + after, Action::Fire { node, timer });
                }
                EngineEffect::Emit(event) => {
                    self.events.push((self.now, node, event));
                }
            }
        }
    }
}
