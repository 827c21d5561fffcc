//! FRTA protocol layer.
//!
//! Trust-weighted, on-demand route discovery for ad-hoc wireless networks.
//! Nodes flood route requests, answer with trust-annotated replies, cache
//! the routes they learn for a bounded time and keep a per-neighbor trust
//! score fed by observed behavior.
//!
//! The [`Engine`] is pure logic (explicit time, effects out). The
//! [`runtime`] module drives it over a [`Transport`] on a tokio task.
//!
//! Wire format: fixed-size big-endian headers, one-byte type tag.
//!
//! ```
//! use std::time::Duration;
//! use frta_protocol::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::new().rng_seed(1));
//! engine.interface_up(Duration::ZERO, 1);
//! engine.add_address(Duration::ZERO, 1, "10.0.0.1".parse().unwrap());
//! let _effects = engine.start(Duration::ZERO);
//! assert!(engine.is_running());
//! ```

pub mod collision;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod path;
pub mod route_cache;
pub mod runtime;
pub mod trust;
pub mod types;
pub mod wire;

pub use collision::{CollisionDetector, TransmissionStats};
pub use config::EngineConfig;
pub use discovery::{DiscoveryState, DiscoveryTable};
pub use engine::{Engine, EngineEffect, InputDecision, ProtocolEvent, Route, Timer};
pub use error::FrtaError;
pub use metrics::EngineMetrics;
pub use path::PathSelector;
pub use route_cache::{RouteCache, RouteEntry, RouteRow, RouteTable};
pub use runtime::{
    ProtocolRuntime, RuntimeChannels, RuntimeCommand, RuntimeConfig, RuntimeHandle, Transport,
    UdpTransport,
};
pub use trust::TrustTable;
pub use types::{
    InterfaceId, NodeAddress, Path, Target, ADVERTISE_MIN_TRUST, DEFAULT_TRUST, MAX_HOP_COUNT,
    MAX_PATHS, MIN_PATH_TRUST, REQUEST_TIMEOUT, REVERSE_ROUTE_TRUST, ROUTE_CACHE_TIMEOUT,
};
pub use wire::{ControlMessage, MessageType, RouteAdvertisement, RouteReply, RouteRequest, TrustTag};
