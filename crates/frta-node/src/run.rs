use std::time::Duration;

use frta_protocol::RuntimeChannels;

use crate::events::{emit, EventSummary};

pub async fn run(channels: RuntimeChannels, table_interval: u64) -> anyhow::Result<()> {
    let RuntimeChannels { handle, mut events } = channels;
    eprintln!("Press Ctrl+C to stop.\n");

    let period = Duration::from_secs(table_interval.max(1));
    let mut table_tick = tokio::time::interval(period);
    // Skip the immediate first tick
    table_tick.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nCtrl+C received, shutting down...");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                emit(&event);
            }
            _ = table_tick.tick(), if table_interval > 0 => {
                let table = handle.route_table().await?;
                eprintln!("{table}");
            }
        }
    }

    let metrics = handle.metrics().await?;
    emit(&EventSummary::new(&metrics));
    handle.shutdown().await;
    Ok(())
}
