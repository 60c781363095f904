//! `rackshare call`: invoke one command on a node.

use super::runtime;
use crate::arb::{CommandClient, Reply};
use crate::cli::CallArgs;
use crate::config::Config;
use crate::error::{RackError, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub fn cmd_call(config: &Config, args: CallArgs) -> Result<()> {
    let addr = parse_node_addr(&args.addr, config.command_port)?;
    let client = CommandClient::new(addr).with_timeout(Duration::from_secs(args.timeout_secs));

    match runtime()?.block_on(client.call(&args.request))? {
        Reply::Payload(text) => println!("{}", text),
        Reply::Dying => println!("{} is shutting down", addr),
    }
    Ok(())
}

/// `ip:port`, or a bare `ip` on the default command port.
pub(super) fn parse_node_addr(raw: &str, default_port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| {
            RackError::UserError(format!(
                "invalid node address '{}': expected ip or ip:port",
                raw
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ip_gets_default_port() {
        let addr = parse_node_addr("10.0.0.7", 10773).unwrap();
        assert_eq!(addr, "10.0.0.7:10773".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn explicit_port_wins() {
        let addr = parse_node_addr("10.0.0.7:4000", 10773).unwrap();
        assert_eq!(addr.port(), 4000);
    }

    #[test]
    fn hostnames_are_rejected() {
        assert!(parse_node_addr("rack-7.local", 10773).is_err());
    }
}
