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

//! # Bandwidth measurement
//!
//! The test server serves a file of zeros with `nc`, which is downloaded over a plain TCP
//! connection. The limit is enforced if the measured rate does not exceed the configured limit
//! multiplied by the tolerance factor.

use crate::config::QosConfig;
use crate::ssh::SshClient;
use crate::waiter::wait_until;
use crate::{Error, Result};

use log::*;
use std::io::{self, ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Chunk size used both to create and to download the test file
pub const BUFFER_SIZE: usize = 512;
/// Location of the test file on the server
pub const FILE_PATH: &str = "/tmp/img";

const KILL_NC: &str = "killall -q nc || true";

/// Measures the rate at which a test server can send data.
#[derive(Debug, Clone)]
pub struct BandwidthProbe {
    port: u16,
    file_size: u64,
    tolerance_factor: f64,
    check_timeout: Duration,
}

impl BandwidthProbe {
    /// Create a probe with the parameters from the configuration
    pub fn from_config(qos: &QosConfig) -> Self {
        Self {
            port: qos.nc_port,
            file_size: qos.file_size,
            tolerance_factor: qos.tolerance_factor,
            check_timeout: Duration::from_secs(qos.bw_check_timeout),
        }
    }

    /// Highest accepted rate in bytes per second for a limit given in kilobits per second
    pub fn accepted_bytes_per_second(&self, limit_kbps: u64) -> f64 {
        limit_kbps as f64 * 1000.0 / 8.0 * self.tolerance_factor
    }

    /// Time after which a download at the limit must have finished
    pub fn socket_timeout(&self, limit_kbps: u64) -> Duration {
        let rate = self.accepted_bytes_per_second(limit_kbps).max(1.0);
        Duration::from_secs_f64(self.file_size as f64 * self.tolerance_factor / rate)
    }

    /// Write the test file on the server.
    pub fn create_file(&self, ssh: &SshClient) -> Result<()> {
        let count = (self.file_size / BUFFER_SIZE as u64).max(1);
        ssh.exec(&format!(
            "(dd if=/dev/zero bs={} count={} of={}) 2>&1",
            BUFFER_SIZE, count, FILE_PATH
        ))?;
        Ok(())
    }

    /// Download the test file once from `host` and check the rate against `limit_kbps`.
    ///
    /// Returns `Ok(false)` if the rate is too high or the server did not accept the connection.
    pub fn check(&self, ssh: &SshClient, host: &str, limit_kbps: u64) -> Result<bool> {
        ssh.exec(KILL_NC)?;
        ssh.exec(&format!("(nc -ll -p {} < {} > /dev/null &)", self.port, FILE_PATH))?;
        let result = self.download(host, limit_kbps);
        ssh.exec(KILL_NC)?;
        result
    }

    /// Repeat [`BandwidthProbe::check`] until the limit is enforced or the check timeout passed.
    pub fn wait_for_limit(&self, ssh: &SshClient, host: &str, limit_kbps: u64) -> Result<()> {
        let what = format!("{} kbps to be enforced on {}", limit_kbps, host);
        wait_until(what, self.check_timeout, Duration::from_secs(1), || {
            self.check(ssh, host, limit_kbps)
        })?;
        Ok(())
    }

    fn download(&self, host: &str, limit_kbps: u64) -> Result<bool> {
        let accepted = self.accepted_bytes_per_second(limit_kbps);
        let timeout = self.socket_timeout(limit_kbps);
        let addr = (host, self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Assertion(format!("cannot resolve {}", host)))?;
        let start = Instant::now();
        let mut stream = match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => stream,
            Err(e) if is_transient(&e) => {
                debug!("connection to {} failed: {}", addr, e);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        stream.set_read_timeout(Some(timeout))?;
        match measure(&mut stream, start) {
            Ok((bytes, rate)) => {
                debug!("received {} bytes at {:.0} B/s (accepted: {:.0})", bytes, rate, accepted);
                Ok(bytes > 0 && rate <= accepted)
            }
            Err(e) if is_transient(&e) => {
                warn!("download from {} failed: {}", addr, e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

/// Read `reader` to its end and return the number of bytes and the rate in bytes per second
/// since `start`.
pub fn measure<R: Read>(reader: &mut R, start: Instant) -> io::Result<(u64, f64)> {
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total: u64 = 0;
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => total += n as u64,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
    Ok((total, total as f64 / elapsed))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn probe() -> BandwidthProbe {
        BandwidthProbe {
            port: 1234,
            file_size: 1024 * 1024,
            tolerance_factor: 1.5,
            check_timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn accepted_rate() {
        assert_eq!(probe().accepted_bytes_per_second(1000), 187_500.0);
        assert_eq!(probe().accepted_bytes_per_second(0), 0.0);
    }

    #[test]
    fn timeout() {
        let timeout = probe().socket_timeout(1000);
        assert!(timeout > Duration::from_secs(8));
        assert!(timeout < Duration::from_secs(9));
    }

    #[test]
    fn measure_reads_everything() {
        let mut data = Cursor::new(vec![0u8; 4 * BUFFER_SIZE + 17]);
        let (bytes, rate) = measure(&mut data, Instant::now()).unwrap();
        assert_eq!(bytes, 4 * BUFFER_SIZE as u64 + 17);
        assert!(rate > 0.0);
    }
}
