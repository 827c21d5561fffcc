//! Async runtime: drives one [`Engine`](crate::engine::Engine) over a real
//! (or mocked) medium.
//!
//! The runtime owns a [`Transport`] and the engine. It exposes a channel-based
//! API so the application never touches raw packets or protocol timers.
mod executor;
mod r#loop;
mod transport;

use tokio::sync::{mpsc, oneshot};

use crate::config::EngineConfig;
use crate::engine::{InputDecision, ProtocolEvent, Route};
use crate::error::FrtaError;
use crate::metrics::EngineMetrics;
use crate::route_cache::RouteTable;
use crate::types::{InterfaceId, NodeAddress, Path};

#[cfg(test)]
pub use transport::mock;
pub use transport::{Transport, UdpTransport};

// ── Configuration ─────────────────────────────────────────────────────

/// Channel sizing for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Queued application commands.
    pub command_capacity: usize,
    /// Queued protocol events; overflow is dropped, never awaited.
    pub event_capacity: usize,
    /// Fired timers waiting for the loop.
    pub timer_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            event_capacity: 256,
            timer_capacity: 1024,
        }
    }
}

// ── Commands (app → runtime) ──────────────────────────────────────────

/// Commands the application sends to the runtime loop.
pub enum RuntimeCommand {
    /// Resolve the next hop for a locally originated packet.
    RouteOutput {
        destination: NodeAddress,
        reply: oneshot::Sender<Result<Route, FrtaError>>,
    },
    /// Decide what to do with a packet that arrived for `destination`.
    RouteInput {
        destination: NodeAddress,
        reply: oneshot::Sender<InputDecision>,
    },
    InterfaceUp {
        interface: InterfaceId,
    },
    InterfaceDown {
        interface: InterfaceId,
    },
    AddAddress {
        interface: InterfaceId,
        address: NodeAddress,
    },
    RemoveAddress {
        interface: InterfaceId,
        address: NodeAddress,
    },
    /// Feed a delivery outcome over `path` back into trust and collision state.
    ReportDelivery {
        path: Path,
        success: bool,
        reply: oneshot::Sender<f64>,
    },
    GetRouteTable {
        reply: oneshot::Sender<RouteTable>,
    },
    GetMetrics {
        reply: oneshot::Sender<EngineMetrics>,
    },
    /// Stop the engine and end the loop.
    Shutdown,
}

// ── RuntimeHandle (app-facing API) ───────────────────────────────────

/// Handle to a running [`ProtocolRuntime`].
///
/// Cheap to clone. Every method fails with [`FrtaError::NotRunning`] once the
/// loop has shut down.
#[derive(Clone)]
pub struct RuntimeHandle {
    cmd_tx: mpsc::Sender<RuntimeCommand>,
}

impl RuntimeHandle {
    async fn send(&self, cmd: RuntimeCommand) -> Result<(), FrtaError> {
        self.cmd_tx.send(cmd).await.map_err(|_| FrtaError::NotRunning)
    }

    async fn request<R>(
        &self,
        cmd: impl FnOnce(oneshot::Sender<R>) -> RuntimeCommand,
    ) -> Result<R, FrtaError> {
        let (tx, rx) = oneshot::channel();
        self.send(cmd(tx)).await?;
        rx.await.map_err(|_| FrtaError::NotRunning)
    }

    /// Next hop for a packet we originate. A miss starts discovery and
    /// returns [`FrtaError::NoRouteToHost`].
    pub async fn route_output(&self, destination: NodeAddress) -> Result<Route, FrtaError> {
        self.request(|reply| RuntimeCommand::RouteOutput { destination, reply })
            .await?
    }

    pub async fn route_input(&self, destination: NodeAddress) -> Result<InputDecision, FrtaError> {
        self.request(|reply| RuntimeCommand::RouteInput { destination, reply })
            .await
    }

    pub async fn interface_up(&self, interface: InterfaceId) -> Result<(), FrtaError> {
        self.send(RuntimeCommand::InterfaceUp { interface }).await
    }

    pub async fn interface_down(&self, interface: InterfaceId) -> Result<(), FrtaError> {
        self.send(RuntimeCommand::InterfaceDown { interface }).await
    }

    pub async fn add_address(
        &self,
        interface: InterfaceId,
        address: NodeAddress,
    ) -> Result<(), FrtaError> {
        self.send(RuntimeCommand::AddAddress { interface, address })
            .await
    }

    pub async fn remove_address(
        &self,
        interface: InterfaceId,
        address: NodeAddress,
    ) -> Result<(), FrtaError> {
        self.send(RuntimeCommand::RemoveAddress { interface, address })
            .await
    }

    /// Report whether a packet made it over `path`; returns the path's new trust.
    pub async fn report_delivery(&self, path: Path, success: bool) -> Result<f64, FrtaError> {
        self.request(|reply| RuntimeCommand::ReportDelivery {
            path,
            success,
            reply,
        })
        .await
    }

    pub async fn route_table(&self) -> Result<RouteTable, FrtaError> {
        self.request(|reply| RuntimeCommand::GetRouteTable { reply })
            .await
    }

    pub async fn metrics(&self) -> Result<EngineMetrics, FrtaError> {
        self.request(|reply| RuntimeCommand::GetMetrics { reply })
            .await
    }

    /// Graceful shutdown. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(RuntimeCommand::Shutdown).await;
    }
}

// ── RuntimeChannels ──────────────────────────────────────────────────

/// Channels returned to the application when the runtime starts.
pub struct RuntimeChannels {
    pub handle: RuntimeHandle,
    /// Protocol events (discoveries, timeouts, expiries, drops).
    pub events: mpsc::Receiver<ProtocolEvent>,
}

// ── ProtocolRuntime ──────────────────────────────────────────────────

/// Spawn it and talk to it through [`RuntimeChannels`].
pub struct ProtocolRuntime;

impl ProtocolRuntime {
    /// Start the engine on `transport` in a new tokio task.
    ///
    /// The engine starts with no interfaces; register them through the handle.
    pub fn spawn<T: Transport + 'static>(
        transport: T,
        engine_config: EngineConfig,
        config: RuntimeConfig,
    ) -> RuntimeChannels {
        let (cmd_tx, cmd_rx) = mpsc::channel::<RuntimeCommand>(config.command_capacity);
        let (event_tx, event_rx) = mpsc::channel::<ProtocolEvent>(config.event_capacity);

        tokio::spawn(r#loop::runtime_loop(
            transport,
            engine_config,
            config,
            cmd_rx,
            event_tx,
        ));

        RuntimeChannels {
            handle: RuntimeHandle { cmd_tx },
            events: event_rx,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
