//! Command implementations for rackshare.
//!
//! The dispatcher routes parsed CLI commands to their handlers. Handlers
//! return the process exit code on success; failures propagate as
//! [`RackError`](crate::error::RackError) and are mapped by `main`.

mod call;
mod lock;
mod node;
mod peers;

use crate::cli::{Cli, Command, LockAction, LockCommand, NodeAction, NodeCommand};
use crate::config::Config;
use crate::error::{RackError, Result};
use crate::exit_codes;

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Lock(lock_cmd) => dispatch_lock(&config, lock_cmd),
        Command::Node(node_cmd) => dispatch_node(&config, node_cmd),
        Command::Peers(args) => {
            peers::cmd_peers(&config, args)?;
            Ok(exit_codes::SUCCESS)
        }
        Command::Call(args) => {
            call::cmd_call(&config, args)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn dispatch_lock(config: &Config, lock_cmd: LockCommand) -> Result<i32> {
    match lock_cmd.action {
        LockAction::Status(args) => lock::cmd_lock_status(config, args).map(|_| exit_codes::SUCCESS),
        LockAction::Run(args) => lock::cmd_lock_run(config, args),
        LockAction::Release(args) => {
            lock::cmd_lock_release(config, args).map(|_| exit_codes::SUCCESS)
        }
        LockAction::ClearMutex(args) => {
            lock::cmd_lock_clear_mutex(config, args).map(|_| exit_codes::SUCCESS)
        }
    }
}

fn dispatch_node(config: &Config, node_cmd: NodeCommand) -> Result<i32> {
    match node_cmd.action {
        NodeAction::Serve(args) => node::cmd_serve(config, args).map(|_| exit_codes::SUCCESS),
    }
}

/// Multi-threaded runtime for the network commands.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| RackError::NetworkError(format!("failed to start async runtime: {}", e)))
}
