//! The runtime event loop.
//!
//! A single task that owns the engine and multiplexes application commands,
//! received packets and fired timers. Engine time is the elapsed time since
//! the loop started.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::engine::{Engine, ProtocolEvent, Timer};

use super::executor::execute_effects;
use super::transport::Transport;
use super::{RuntimeCommand, RuntimeConfig};

pub(super) async fn runtime_loop<T: Transport>(
    transport: T,
    engine_config: EngineConfig,
    config: RuntimeConfig,
    mut cmd_rx: mpsc::Receiver<RuntimeCommand>,
    event_tx: mpsc::Sender<ProtocolEvent>,
) {
    let started = Instant::now();
    let now = || started.elapsed();

    let mut engine = Engine::new(engine_config);
    let (timer_tx, mut timer_rx) = mpsc::channel::<Timer>(config.timer_capacity);

    let effects = engine.start(Duration::ZERO);
    execute_effects(effects, &transport, &timer_tx, &event_tx).await;

    loop {
        tokio::select! {
            // ── 1. Commands from the application ─────────────────
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::debug!("all handles dropped, stopping runtime");
                    break;
                };
                match cmd {
                    RuntimeCommand::RouteOutput { destination, reply } => {
                        let (result, effects) = engine.route_output(now(), destination);
                        execute_effects(effects, &transport, &timer_tx, &event_tx).await;
                        let _ = reply.send(result);
                    }
                    RuntimeCommand::RouteInput { destination, reply } => {
                        let _ = reply.send(engine.route_input(now(), destination));
                    }
                    RuntimeCommand::InterfaceUp { interface } => {
                        engine.interface_up(now(), interface);
                    }
                    RuntimeCommand::InterfaceDown { interface } => {
                        engine.interface_down(now(), interface);
                    }
                    RuntimeCommand::AddAddress { interface, address } => {
                        engine.add_address(now(), interface, address);
                    }
                    RuntimeCommand::RemoveAddress { interface, address } => {
                        engine.remove_address(now(), interface, address);
                    }
                    RuntimeCommand::ReportDelivery { path, success, reply } => {
                        let trust = engine.update_path_trust(now(), &path, success);
                        let _ = reply.send(trust);
                    }
                    RuntimeCommand::GetRouteTable { reply } => {
                        let _ = reply.send(engine.route_table(now()));
                    }
                    RuntimeCommand::GetMetrics { reply } => {
                        let _ = reply.send(engine.metrics().snapshot());
                    }
                    RuntimeCommand::Shutdown => {
                        tracing::info!("runtime shutdown requested");
                        break;
                    }
                }
            }

            // ── 2. Packets from the medium ──────────────────────
            result = transport.recv() => {
                match result {
                    Ok((sender, data)) => {
                        let effects = engine.handle_packet(now(), sender, &data);
                        execute_effects(effects, &transport, &timer_tx, &event_tx).await;
                    }
                    Err(e) => {
                        tracing::debug!("recv failed: {e}");
                    }
                }
            }

            // ── 3. Timers ───────────────────────────────────────
            Some(timer) = timer_rx.recv() => {
                let effects = engine.handle_timer(now(), timer);
                execute_effects(effects, &transport, &timer_tx, &event_tx).await;
            }
        }
    }

    engine.stop(now());
}
