//! `rackshare lock ...`: inspect and use shared resource queues.

use super::call::parse_node_addr;
use super::runtime;
use crate::arb::{CommandClient, Reply, quote_str};
use crate::arbiter::ResourceArbiter;
use crate::cli::{ClearMutexArgs, LockReleaseArgs, LockRunArgs, LockStatusArgs};
use crate::config::Config;
use crate::error::{RackError, Result};
use crate::exit_codes;
use crate::locks::{EntryStatus, LockfileStore, get_owner_string};
use chrono::Utc;
use std::net::SocketAddr;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long `--report-to` waits on the node.
const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

fn arbiter_for(config: &Config, resource: &str) -> ResourceArbiter {
    let store = Arc::new(LockfileStore::new(&config.lock_dir, config.store_settings()));
    ResourceArbiter::new(store, resource, config.arbiter_settings())
}

pub fn cmd_lock_status(config: &Config, args: LockStatusArgs) -> Result<()> {
    let arbiter = arbiter_for(config, &args.resource);
    let queue = arbiter.snapshot()?;

    if args.json {
        let json = serde_json::to_string_pretty(&queue)
            .map_err(|e| RackError::StorageError(format!("failed to serialize queue: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    if queue.is_empty() {
        println!("{}: free", args.resource);
        return Ok(());
    }

    let now = Utc::now();
    let stale_after = arbiter.settings().stale_after();
    println!("{} ({} in queue):", args.resource, queue.len());
    for (position, entry) in queue.stack.iter().enumerate() {
        let status = match entry.status {
            EntryStatus::Active => "ACTIVE",
            EntryStatus::Queued => "queued",
        };
        let stale = if entry.is_stale(now, stale_after) {
            "  STALE"
        } else {
            ""
        };
        println!(
            "  {:>2}. {:<6} {}  (refreshed {}s ago){}",
            position,
            status,
            entry.id,
            entry.age(now).as_secs(),
            stale
        );
    }
    Ok(())
}

/// Hold the resource for the lifetime of a child process.
///
/// Returns the child's exit code, or `WAIT_TIMEOUT` if the resource never
/// became available.
pub fn cmd_lock_run(config: &Config, args: LockRunArgs) -> Result<i32> {
    let argv = command_line(&args)?;
    let id = args
        .id
        .unwrap_or_else(|| format!("{}:{}", get_owner_string(), std::process::id()));
    let report_addr = args
        .report_to
        .as_deref()
        .map(|node| parse_node_addr(node, config.command_port))
        .transpose()?;
    let arbiter = arbiter_for(config, &args.resource);

    if !arbiter.acquire(&id, Duration::from_secs(args.wait_secs))? {
        eprintln!(
            "Timed out after {}s waiting for '{}'",
            args.wait_secs, args.resource
        );
        return Ok(exit_codes::WAIT_TIMEOUT);
    }

    let run_name = format!("{}: {}", args.resource, argv.join(" "));
    let report = report_addr.and_then(|addr| RunReport::start(addr, &run_name));

    let status = Command::new(&argv[0]).args(&argv[1..]).status();
    if let Some(report) = report {
        report.finish();
    }
    arbiter.release(&id)?;

    let status = status.map_err(|e| {
        RackError::UserError(format!("failed to run '{}': {}", argv[0], e))
    })?;
    Ok(status.code().unwrap_or(exit_codes::USER_ERROR))
}

/// A run registered with a node for the lifetime of the child process.
///
/// Reporting is advisory: a node that cannot be reached is logged and the
/// run goes ahead unreported.
struct RunReport {
    runtime: tokio::runtime::Runtime,
    client: CommandClient,
    run_id: Option<String>,
}

impl RunReport {
    fn start(addr: SocketAddr, name: &str) -> Option<Self> {
        let runtime = match runtime() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(%addr, error = %e, "could not report run to node");
                return None;
            }
        };
        let client = CommandClient::new(addr).with_timeout(REPORT_TIMEOUT);

        let request = format!("start_run({})", quote_str(name));
        let run_id = match runtime.block_on(client.call(&request)) {
            Ok(Reply::Payload(text)) if text.parse::<u64>().is_ok() => {
                debug!(%addr, run_id = %text, "registered run with node");
                Some(text)
            }
            Ok(reply) => {
                warn!(%addr, reply = %reply.into_text(), "node refused run registration");
                None
            }
            Err(e) => {
                warn!(%addr, error = %e, "could not register run with node");
                None
            }
        };

        Some(Self {
            runtime,
            client,
            run_id,
        })
    }

    fn finish(self) {
        let Some(run_id) = self.run_id else {
            return;
        };
        let request = format!("finish_run({})", run_id);
        match self.runtime.block_on(self.client.call(&request)) {
            Ok(Reply::Payload(text)) if text == "OK" => {}
            Ok(reply) => {
                warn!(run_id = %run_id, reply = %reply.into_text(), "node did not finish run")
            }
            Err(e) => warn!(run_id = %run_id, error = %e, "could not finish run on node"),
        }
    }
}

fn command_line(args: &LockRunArgs) -> Result<Vec<String>> {
    let argv = match &args.exec {
        Some(line) => shell_words::split(line)
            .map_err(|e| RackError::UserError(format!("invalid --exec command line: {}", e)))?,
        None => args.command.clone(),
    };
    if argv.is_empty() {
        return Err(RackError::UserError(
            "no command given.\n\n\
             Pass it after `--` or with --exec, e.g.:\n  rackshare lock run /dev/ttyUSB0 -- flash.sh"
                .to_string(),
        ));
    }
    Ok(argv)
}

pub fn cmd_lock_release(config: &Config, args: LockReleaseArgs) -> Result<()> {
    arbiter_for(config, &args.resource).release(&args.id)?;
    println!("Released '{}' held by '{}'", args.resource, args.id);
    Ok(())
}

pub fn cmd_lock_clear_mutex(config: &Config, args: ClearMutexArgs) -> Result<()> {
    if !args.force {
        return Err(RackError::UserError(format!(
            "refusing to clear mutex without --force flag.\n\n\
             Clearing a live mutex lets two processes edit the queue at once.\n\
             Only clear it if its owner has crashed.\n\n\
             To clear the mutex, run:\n  rackshare lock clear-mutex {} --force",
            args.resource
        )));
    }

    let store = LockfileStore::new(&config.lock_dir, config.store_settings());
    let path = store.mutex_path(&args.resource);
    if !path.exists() {
        println!("No mutex file for '{}'", args.resource);
        return Ok(());
    }

    match store.clear_mutex(&args.resource)? {
        Some(meta) => println!("Cleared mutex for '{}' held by {}", args.resource, meta),
        None => println!("Cleared mutex for '{}'", args.resource),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            lock_dir: dir.path().to_path_buf(),
            refresh_interval_ms: 50,
            ..Config::default()
        }
    }

    fn run_args(resource: &str, exec: Option<&str>, command: &[&str]) -> LockRunArgs {
        LockRunArgs {
            resource: resource.to_string(),
            id: Some("cli-test".to_string()),
            wait_secs: 5,
            report_to: None,
            exec: exec.map(str::to_string),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn exec_is_split_with_shell_rules() {
        let args = run_args("r", Some("echo 'two words' three"), &[]);
        assert_eq!(command_line(&args).unwrap(), vec!["echo", "two words", "three"]);
    }

    #[test]
    fn missing_command_is_user_error() {
        let err = command_line(&run_args("r", None, &[])).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[cfg(unix)]
    #[test]
    fn run_releases_and_forwards_exit_code() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let code = cmd_lock_run(&config, run_args("/dev/ttyUSB0", Some("sh -c 'exit 3'"), &[]))
            .unwrap();
        assert_eq!(code, 3);

        let arbiter = arbiter_for(&config, "/dev/ttyUSB0");
        assert!(arbiter.snapshot().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn run_releases_when_command_cannot_start() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let err = cmd_lock_run(
            &config,
            run_args("relay", None, &["/nonexistent/rackshare-test-binary"]),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert!(arbiter_for(&config, "relay").snapshot().unwrap().is_empty());
    }

    #[test]
    fn clear_mutex_requires_force() {
        let dir = TempDir::new().unwrap();
        let args = ClearMutexArgs {
            resource: "relay".to_string(),
            force: false,
        };
        let err = cmd_lock_clear_mutex(&config_in(&dir), args).unwrap_err();
        assert!(err.to_string().contains("--force"));
    }

    #[test]
    fn clear_mutex_removes_leftover_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let store = LockfileStore::new(&config.lock_dir, config.store_settings());
        let guard = store.with_lock("relay").unwrap();
        std::mem::forget(guard);
        assert!(store.mutex_path("relay").exists());

        let args = ClearMutexArgs {
            resource: "relay".to_string(),
            force: true,
        };
        cmd_lock_clear_mutex(&config, args).unwrap();
        assert!(!store.mutex_path("relay").exists());
    }

    #[test]
    fn release_by_non_holder_fails() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let arbiter = arbiter_for(&config, "relay");
        assert!(arbiter.acquire("bench-a", Duration::from_secs(1)).unwrap());

        let args = LockReleaseArgs {
            resource: "relay".to_string(),
            id: "bench-b".to_string(),
        };
        let err = cmd_lock_release(&config, args).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::ARBITER_FAILURE);

        arbiter.release("bench-a").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn run_is_reported_to_node_while_child_runs() {
        use crate::arb::{CommandServer, CommandTable, Literal};
        use std::sync::Mutex;

        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = CommandTable::new();
        let starts = Arc::clone(&log);
        table.register("start_run", 1, move |args| {
            starts.lock().unwrap().push(format!("start {}", args[0]));
            Ok("7".to_string())
        });
        let finishes = Arc::clone(&log);
        table.register("finish_run", 1, move |args| {
            assert_eq!(args[0], Literal::Int(7));
            finishes.lock().unwrap().push("finish 7".to_string());
            Ok("OK".to_string())
        });

        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt
            .block_on(CommandServer::bind(
                SocketAddr::from(([127, 0, 0, 1], 0)),
                table,
                4096,
            ))
            .unwrap();

        let mut args = run_args("/dev/ttyUSB0", Some("sh -c 'exit 0'"), &[]);
        args.report_to = Some(server.local_addr().to_string());
        assert_eq!(cmd_lock_run(&config, args).unwrap(), 0);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start /dev/ttyUSB0: sh -c exit 0".to_string(),
                "finish 7".to_string()
            ]
        );
        rt.block_on(server.stop());
    }

    #[cfg(unix)]
    #[test]
    fn unreachable_node_does_not_block_run() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let closed = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap();

        let mut args = run_args("relay", Some("sh -c 'exit 0'"), &[]);
        args.report_to = Some(closed.to_string());
        assert_eq!(cmd_lock_run(&config, args).unwrap(), 0);
        assert!(arbiter_for(&config, "relay").snapshot().unwrap().is_empty());
    }

    #[test]
    fn bad_report_address_is_user_error() {
        let dir = TempDir::new().unwrap();
        let mut args = run_args("relay", Some("true"), &[]);
        args.report_to = Some("rack-7.local".to_string());
        let config = config_in(&dir);
        let err = cmd_lock_run(&config, args).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert!(arbiter_for(&config, "relay").snapshot().unwrap().is_empty());
    }
}
