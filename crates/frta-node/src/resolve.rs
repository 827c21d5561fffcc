use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use frta_protocol::{FrtaError, ProtocolEvent, RuntimeChannels};
use tokio::sync::mpsc;

use crate::events::{emit, EventResolved};

pub struct ResolveConfig {
    pub target: Ipv4Addr,
    /// Wait per discovery attempt.
    pub timeout: Duration,
    pub attempts: u32,
}

pub async fn run(channels: RuntimeChannels, config: ResolveConfig) -> anyhow::Result<()> {
    let RuntimeChannels { handle, mut events } = channels;
    let start = Instant::now();

    for attempt in 1..=config.attempts.max(1) {
        match handle.route_output(config.target).await {
            Ok(route) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                emit(&EventResolved::new(&route, attempt, elapsed_ms));
                handle.shutdown().await;
                return Ok(());
            }
            Err(FrtaError::NoRouteToHost { .. }) => {
                tracing::debug!(attempt, target = %config.target, "discovery in flight");
                wait_for_outcome(&mut events, config.target, config.timeout).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    // The last wait may have ended with a discovery.
    if let Ok(route) = handle.route_output(config.target).await {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        emit(&EventResolved::new(&route, config.attempts, elapsed_ms));
        handle.shutdown().await;
        return Ok(());
    }
    handle.shutdown().await;
    anyhow::bail!(
        "no route to {} after {} attempt(s)",
        config.target,
        config.attempts
    )
}

/// Block until the discovery for `target` settles or `timeout` passes.
/// Other events are echoed as they arrive.
async fn wait_for_outcome(
    events: &mut mpsc::Receiver<ProtocolEvent>,
    target: Ipv4Addr,
    timeout: Duration,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) | Err(_) => return,
        };
        emit(&event);
        match event {
            ProtocolEvent::RouteDiscovered { destination, .. }
            | ProtocolEvent::DiscoveryTimedOut { destination }
                if destination == target =>
            {
                return;
            }
            _ => {}
        }
    }
}
