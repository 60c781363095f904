//! `rackshare peers`: roll-call and print who answered.

use super::runtime;
use crate::arb::{BeaconDirectory, PeerBeacon};
use crate::cli::PeersArgs;
use crate::config::Config;
use crate::error::{RackError, Result};
use serde_json::json;
use std::time::Duration;

pub fn cmd_peers(config: &Config, args: PeersArgs) -> Result<()> {
    let mut settings = config.directory_settings();
    if let Some(ms) = args.timeout_ms {
        settings.discovery_timeout = Duration::from_millis(ms);
    }
    let timeout = settings.discovery_timeout;

    let peers = runtime()?.block_on(async move {
        let mut directory = BeaconDirectory::bind(settings).await?;
        directory.refresh(timeout).await
    })?;

    if args.json {
        println!("{}", render_json(&peers)?);
        return Ok(());
    }

    if peers.is_empty() {
        println!("No peers answered within {}ms.", timeout.as_millis());
        return Ok(());
    }

    println!("{:<40} {:>11}  LAST BEACON", "ADDRESS", "ACTIVE RUNS");
    for peer in &peers {
        println!(
            "{:<40} {:>11}  {}",
            peer.ip,
            peer.active_runs,
            peer.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

fn render_json(peers: &[PeerBeacon]) -> Result<String> {
    let items: Vec<_> = peers
        .iter()
        .map(|p| {
            json!({
                "ip": p.ip.to_string(),
                "active_runs": p.active_runs,
                "timestamp": p.timestamp.to_rfc3339(),
                "checksum_valid": p.checksum_valid(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&items)
        .map_err(|e| RackError::ProtocolError(format!("failed to serialize peers: {}", e)))
}
