use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FrtaError;
use crate::types::{DEFAULT_CONTROL_PORT, DEFAULT_JITTER_MAX, DEFAULT_UPDATE_INTERVAL};

/// Tunables of one FRTA engine.
///
/// Protocol timeouts (request timeout, cache lifetime, hop limit) are fixed
/// constants in [`types`](crate::types); only the knobs below vary per node.
///
/// ```rust
/// use std::time::Duration;
/// use frta_protocol::EngineConfig;
///
/// let config = EngineConfig::new()
///     .update_interval(Duration::from_secs(10))
///     .rng_seed(7);
/// assert_eq!(config.control_port, 9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period of routing updates and route advertisements.
    #[serde(with = "duration_ms", rename = "update_interval_ms")]
    pub update_interval: Duration,
    /// UDP port control traffic is exchanged on.
    pub control_port: u16,
    /// Upper bound of the uniform delay applied before forwarding or replying.
    #[serde(with = "duration_us", rename = "jitter_max_us")]
    pub jitter_max: Duration,
    /// Fixed seed for the jitter generator. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            control_port: DEFAULT_CONTROL_PORT,
            jitter_max: DEFAULT_JITTER_MAX,
            rng_seed: None,
        }
    }

    /// Set the routing update / advertisement period (default: 30 s).
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the control port (default: 9).
    pub fn control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// Set the maximum forwarding jitter (default: 1000 µs).
    pub fn jitter_max(mut self, jitter: Duration) -> Self {
        self.jitter_max = jitter;
        self
    }

    /// Make jitter reproducible.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), FrtaError> {
        if self.update_interval.is_zero() {
            return Err(FrtaError::InvalidConfig(
                "update_interval must be positive".into(),
            ));
        }
        if self.control_port == 0 {
            return Err(FrtaError::InvalidConfig(
                "control_port must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, FrtaError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod duration_us {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_micros(u64::deserialize(d)?))
    }
}
