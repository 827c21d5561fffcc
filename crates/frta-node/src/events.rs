use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};

use frta_protocol::{EngineMetrics, Route};
use serde::Serialize;

/// Emit one JSON line on stdout, flushed for piped output.
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub address: Ipv4Addr,
    pub bind: SocketAddr,
    pub mode: &'static str,
}

impl EventStarted {
    pub fn new(address: Ipv4Addr, bind: SocketAddr, mode: &'static str) -> Self {
        Self {
            event: "started",
            address,
            bind,
            mode,
        }
    }
}

#[derive(Serialize)]
pub struct EventResolved<'a> {
    pub event: &'static str,
    #[serde(flatten)]
    pub route: &'a Route,
    pub attempts: u32,
    pub elapsed_ms: f64,
}

impl<'a> EventResolved<'a> {
    pub fn new(route: &'a Route, attempts: u32, elapsed_ms: f64) -> Self {
        Self {
            event: "resolved",
            route,
            attempts,
            elapsed_ms,
        }
    }
}

#[derive(Serialize)]
pub struct EventSummary<'a> {
    pub event: &'static str,
    pub metrics: &'a EngineMetrics,
}

impl<'a> EventSummary<'a> {
    pub fn new(metrics: &'a EngineMetrics) -> Self {
        Self {
            event: "summary",
            metrics,
        }
    }
}
