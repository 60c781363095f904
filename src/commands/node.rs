//! `rackshare node serve`: advertise this node and answer commands.
//!
//! Runs on this machine report in through the `start_run` / `finish_run`
//! commands (see `lock run --report-to`), which drives both the beacon's run
//! count and `view_running_tasks()`.

use super::runtime;
use crate::arb::{BeaconAdvertiser, CommandServer, CommandTable, NodeState};
use crate::cli::ServeArgs;
use crate::config::Config;
use crate::error::{RackError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use tracing::{info, warn};

pub fn cmd_serve(config: &Config, args: ServeArgs) -> Result<()> {
    let bind = bind_addr(config, args.bind.as_deref())?;
    runtime()?.block_on(serve(config, bind, !args.no_advertise))
}

async fn serve(config: &Config, bind: SocketAddr, advertise: bool) -> Result<()> {
    let node = RunningNode::launch(config, bind, advertise).await?;
    println!("Serving commands on {}", node.server.local_addr());
    if let Some(advertiser) = &node.advertiser {
        println!(
            "Advertising {} on group {}",
            advertiser.advertised_ip(),
            config.beacon.group
        );
    }

    let stopped = node.server.shutdown_token();
    tokio::select! {
        _ = stopped.cancelled() => info!("stopping after shutdown() request"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("interrupted, stopping"),
            Err(e) => warn!(error = %e, "failed to listen for interrupt, stopping"),
        },
    }

    node.shutdown().await;
    Ok(())
}

/// Command server and advertiser sharing one run registry.
struct RunningNode {
    state: NodeState,
    server: CommandServer,
    advertiser: Option<BeaconAdvertiser>,
}

impl RunningNode {
    async fn launch(config: &Config, bind: SocketAddr, advertise: bool) -> Result<Self> {
        let state = NodeState::new();
        let table = CommandTable::builtin(state.clone());
        let server = CommandServer::bind(bind, table, config.max_request_bytes).await?;

        let advertiser = if advertise {
            match BeaconAdvertiser::start(config.advertiser_settings(), state.clone()).await {
                Ok(advertiser) => Some(advertiser),
                Err(e) => {
                    server.stop().await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            state,
            server,
            advertiser,
        })
    }

    async fn shutdown(self) {
        if let Some(advertiser) = self.advertiser
            && let Err(e) = advertiser.stop().await
        {
            warn!(error = %e, "advertiser did not stop cleanly");
        }
        let unfinished = self.state.active_runs();
        if unfinished > 0 {
            warn!(runs = unfinished, "stopping with runs still registered");
        }
        self.server.stop().await;
    }
}

fn bind_addr(config: &Config, explicit: Option<&str>) -> Result<SocketAddr> {
    match explicit {
        Some(raw) => raw
            .parse()
            .map_err(|_| RackError::UserError(format!("invalid --bind address '{}'", raw))),
        None => Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.command_port))),
    }
}
