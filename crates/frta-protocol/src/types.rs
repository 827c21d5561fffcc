use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Address of a node on the ad-hoc network.
pub type NodeAddress = Ipv4Addr;

/// Index of a network interface on the local node.
pub type InterfaceId = u32;

/// Ordered node sequence from source to destination.
pub type Path = Vec<NodeAddress>;

/// How long a route request stays pending before it is abandoned.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifetime of a route cache entry since its last update.
pub const ROUTE_CACHE_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests carrying this hop count are no longer re-broadcast.
pub const MAX_HOP_COUNT: u32 = 10;

/// Minimum path trust for a path to count as trusted.
pub const MIN_PATH_TRUST: f64 = 0.5;

/// Upper bound on enumerated candidate paths per destination.
pub const MAX_PATHS: usize = 5;

/// Trust assumed for a node never observed.
pub const DEFAULT_TRUST: f64 = 0.5;

/// Trust given to a reverse route learned from a route request.
pub const REVERSE_ROUTE_TRUST: f64 = 0.7;

/// Routes must be strictly above this trust to be advertised.
pub const ADVERTISE_MIN_TRUST: f64 = 0.5;

/// Trust of a node's routes to its own addresses.
pub const SELF_TRUST: f64 = 1.0;

/// Default period of routing updates and advertisements.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Well-known UDP port for FRTA control traffic.
pub const DEFAULT_CONTROL_PORT: u16 = 9;

/// Upper bound of the uniform random delay before forwarding or replying.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_micros(1000);

/// Where a control packet goes on the shared medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Every neighbor in radio range.
    Broadcast,
    /// A single neighbor.
    Unicast(NodeAddress),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Broadcast => write!(f, "broadcast"),
            Target::Unicast(addr) => write!(f, "{addr}"),
        }
    }
}

/// Clamp a trust value into `[lo, hi]`, mapping NaN to `lo`.
pub(crate) fn clamp_trust(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}
