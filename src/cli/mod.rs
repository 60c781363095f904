//! CLI argument parsing for rackshare.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Rackshare: shared-resource arbitration and peer discovery for test racks.
#[derive(Parser, Debug)]
#[command(name = "rackshare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to ./rackshare.yaml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for rackshare.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Shared resource queues.
    ///
    /// Inspect a resource's queue, run a command while holding it, or repair
    /// a queue left behind by a crashed participant.
    Lock(LockCommand),

    /// Run this machine as a rack node.
    Node(NodeCommand),

    /// List nodes that answer a roll-call.
    Peers(PeersArgs),

    /// Invoke a command on a node, e.g. `call 10.0.0.7 'view_running_tasks()'`.
    Call(CallArgs),
}

/// Lock management commands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Show the holder and waiters of a resource.
    Status(LockStatusArgs),

    /// Wait for a resource, run a command while holding it, then release.
    Run(LockRunArgs),

    /// Release a resource on behalf of a participant.
    Release(LockReleaseArgs),

    /// Remove a leftover mutex file.
    ClearMutex(ClearMutexArgs),
}

#[derive(Parser, Debug)]
pub struct LockStatusArgs {
    /// Resource name, e.g. /dev/ttyUSB0.
    pub resource: String,

    /// Print the raw queue document as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct LockRunArgs {
    /// Resource name, e.g. /dev/ttyUSB0.
    pub resource: String,

    /// Participant id (defaults to user@host:pid).
    #[arg(long)]
    pub id: Option<String>,

    /// Seconds to wait for the resource before giving up.
    #[arg(long, default_value_t = 300)]
    pub wait_secs: u64,

    /// Register the run with a node (ip or ip:port) so its beacons and
    /// `view_running_tasks()` include it.
    #[arg(long)]
    pub report_to: Option<String>,

    /// Command line to run, split with shell quoting rules.
    #[arg(long, conflicts_with = "command")]
    pub exec: Option<String>,

    /// Command to run, given after `--`.
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct LockReleaseArgs {
    /// Resource name.
    pub resource: String,

    /// Participant currently holding the resource.
    #[arg(long)]
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct ClearMutexArgs {
    /// Resource name.
    pub resource: String,

    /// Required: confirms the mutex owner has crashed.
    #[arg(long)]
    pub force: bool,
}

/// Node commands.
#[derive(Parser, Debug)]
pub struct NodeCommand {
    #[command(subcommand)]
    pub action: NodeAction,
}

#[derive(Subcommand, Debug)]
pub enum NodeAction {
    /// Advertise this node and serve commands until interrupted.
    Serve(ServeArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to accept commands on (defaults to 0.0.0.0:<command_port>).
    #[arg(long)]
    pub bind: Option<String>,

    /// Serve commands without answering roll-calls.
    #[arg(long)]
    pub no_advertise: bool,
}

#[derive(Parser, Debug)]
pub struct PeersArgs {
    /// How long to collect answers, overriding `discovery_timeout_ms`.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print peers as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct CallArgs {
    /// Node address as ip or ip:port (port defaults to `command_port`).
    pub addr: String,

    /// Method call, e.g. `get_response(hello)`.
    pub request: String,

    /// Seconds to wait for the reply.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}
