// Neutron Probe: API and Scenario Tests for OpenStack Networking
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Remote commands
//!
//! Test servers are controlled through the system `ssh` binary. The private key of the test key
//! pair is written into a temporary file, which is removed once the last client using it is
//! dropped. Servers without a floating IP are reached through a proxy server (one level only).

use crate::waiter::{wait_until, Waited};
use crate::{Error, Result};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::io::Write;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

lazy_static! {
    static ref PACKET_LOSS_RE: Regex = Regex::new(r"(\d+(?:\.\d+)?)% packet loss").unwrap();
}

/// Number of echo requests sent per connectivity probe
const PING_COUNT: u32 = 3;

/// Client executing commands on a test server
#[derive(Debug, Clone)]
pub struct SshClient {
    host: String,
    user: String,
    key: Arc<NamedTempFile>,
    proxy: Option<Box<SshClient>>,
    connect_timeout: Duration,
}

impl SshClient {
    /// Create a new client. No connection is made until the first command is executed.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        private_key: &str,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut key = tempfile::Builder::new().prefix("neutron-probe-key-").tempfile()?;
        key.write_all(private_key.as_bytes())?;
        key.flush()?;
        Ok(Self {
            host: host.into(),
            user: user.into(),
            key: Arc::new(key),
            proxy: None,
            connect_timeout,
        })
    }

    /// Reach the server through `proxy`
    pub fn with_proxy(mut self, proxy: SshClient) -> Self {
        self.proxy = Some(Box::new(proxy));
        self
    }

    /// Address of the server
    pub fn host(&self) -> &str {
        &self.host
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn options(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-i".to_string(),
            self.key.path().to_string_lossy().to_string(),
        ]
    }

    /// Arguments passed to `ssh` to execute `command` on the server
    pub fn args(&self, command: &str) -> Vec<String> {
        let mut args = self.options();
        if let Some(proxy) = self.proxy.as_ref() {
            args.push("-o".to_string());
            args.push(format!(
                "ProxyCommand=ssh {} -W %h:%p {}",
                proxy.options().join(" "),
                proxy.destination()
            ));
        }
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    /// Execute `command` on the server and return its standard output. A non-zero exit status is
    /// returned as [`Error::Ssh`].
    pub fn exec(&self, command: &str) -> Result<String> {
        trace!("[{}] $ {}", self.host, command);
        let output = Command::new("ssh").args(self.args(command)).output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(Error::Ssh(format!(
                "`{}` on {} failed ({}): {}",
                command,
                self.host,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Wait until the server accepts SSH connections.
pub fn wait_for_ssh(ssh: &SshClient, timeout: Duration, interval: Duration) -> Result<Waited> {
    wait_until(format!("SSH on {}", ssh.host()), timeout, interval, || {
        Ok(ssh.exec("true").is_ok())
    })
}

/// Command pinging `target`, using `ping6` for IPv6 addresses.
pub fn ping_command(target: &str, count: u32) -> String {
    let ping = if target.contains(':') { "ping6" } else { "ping" };
    format!("{} -c {} -w {} {}", ping, count, count * 2, target)
}

/// Extract the packet loss in percent from the output of `ping`.
pub fn packet_loss(output: &str) -> Option<f64> {
    PACKET_LOSS_RE.captures(output).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok())
}

/// Wait until `target` answers pings sent from the server behind `ssh`.
pub fn check_remote_connectivity(
    ssh: &SshClient,
    target: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let command = ping_command(target, PING_COUNT);
    let what = format!("{} to answer pings from {}", target, ssh.host());
    let waited = wait_until(what, timeout, interval, || match ssh.exec(&command) {
        Ok(output) => Ok(packet_loss(&output).map(|loss| loss < 100.0).unwrap_or(false)),
        Err(Error::Ssh(e)) => {
            debug!("ping failed: {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    })?;
    info!("{} reaches {} after {:?}", ssh.host(), target, waited.elapsed);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loss() {
        let output = "PING 10.0.0.5 (10.0.0.5): 56 data bytes\n\
                      --- 10.0.0.5 ping statistics ---\n\
                      3 packets transmitted, 2 packets received, 33% packet loss\n";
        assert_eq!(packet_loss(output), Some(33.0));
        let output = "3 packets transmitted, 3 received, 0.0% packet loss, time 2003ms";
        assert_eq!(packet_loss(output), Some(0.0));
        assert_eq!(packet_loss("ping: bad address"), None);
    }

    #[test]
    fn ping() {
        assert_eq!(ping_command("10.0.0.5", 3), "ping -c 3 -w 6 10.0.0.5");
        assert_eq!(ping_command("2001:db8::5", 1), "ping6 -c 1 -w 2 2001:db8::5");
    }

    #[test]
    fn proxy_args() {
        let timeout = Duration::from_secs(10);
        let proxy = SshClient::new("172.24.4.10", "cirros", "KEY", timeout).unwrap();
        let client = SshClient::new("10.0.0.5", "cirros", "KEY", timeout).unwrap();
        let client = client.with_proxy(proxy);
        let args = client.args("hostname");
        assert_eq!(args.last().unwrap(), "hostname");
        assert_eq!(args[args.len() - 2], "cirros@10.0.0.5");
        let proxy_command = args.iter().find(|a| a.starts_with("ProxyCommand=")).unwrap();
        assert!(proxy_command.ends_with("-W %h:%p cirros@172.24.4.10"));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
    }

    #[test]
    fn key_file() {
        let timeout = Duration::from_secs(1);
        let client = SshClient::new("10.0.0.5", "cirros", "PRIVATE", timeout).unwrap();
        let path = client.key.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "PRIVATE");
        let copy = client.clone();
        drop(client);
        assert!(path.exists());
        drop(copy);
        assert!(!path.exists());
    }
}
