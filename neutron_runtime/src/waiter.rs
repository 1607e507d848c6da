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

//! # Conditional Waiter
//!
//! Poll a predicate at a fixed interval until it holds, or until the timeout expires. The
//! predicate usually performs a live read against the deployment, so a single probe may take a
//! while. The waiter blocks the calling thread.

use crate::{Error, Result};

use log::*;
use neutron_client::{ComputeClient, Server, ServerStatus};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Statistics of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waited {
    /// Time until the predicate returned true
    pub elapsed: Duration,
    /// Number of probes, including the successful one
    pub attempts: usize,
}

/// Evaluate `predicate` every `interval` until it returns `true`. If it still returns `false`
/// once `timeout` has elapsed, [`Error::Timeout`] is returned. An error of the predicate is
/// returned immediately.
///
/// An interval of zero probes as fast as the predicate allows.
pub fn wait_until<F>(
    what: impl AsRef<str>,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<Waited>
where
    F: FnMut() -> Result<bool>,
{
    let start = Instant::now();
    let mut attempts = 0;
    loop {
        attempts += 1;
        if predicate()? {
            let elapsed = start.elapsed();
            trace!("{} after {:?} ({} attempts)", what.as_ref(), elapsed, attempts);
            return Ok(Waited { elapsed, attempts });
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(Error::Timeout { what: what.as_ref().to_string(), elapsed, attempts });
        }
        sleep(interval);
    }
}

/// Same as [`wait_until`], for a predicate that cannot fail.
pub fn wait_until_true<F>(
    what: impl AsRef<str>,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<Waited>
where
    F: FnMut() -> bool,
{
    wait_until(what, timeout, interval, || Ok(predicate()))
}

/// Wait until the server reaches `status`. Fails immediately with [`Error::ServerFault`] if the
/// server goes into the `ERROR` state instead.
pub fn wait_for_server_status(
    compute: &ComputeClient,
    server_id: &str,
    status: ServerStatus,
    timeout: Duration,
    interval: Duration,
) -> Result<Server> {
    let mut last = None;
    let what = format!("server {} to be {}", server_id, status);
    let waited = wait_until(what, timeout, interval, || {
        let server = compute.show_server(server_id)?;
        let current = server.status;
        last = Some(server);
        match current {
            Some(s) if s == status => Ok(true),
            Some(s) if s.is_error() => Err(Error::ServerFault(server_id.to_string())),
            _ => Ok(false),
        }
    })?;
    debug!("server {} is {} after {:?}", server_id, status, waited.elapsed);
    last.ok_or_else(|| Error::ServerFault(server_id.to_string()))
}

/// Wait until `probe` answers with "not found".
pub fn wait_for_deletion<T, F>(
    what: impl AsRef<str>,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<Waited>
where
    F: FnMut() -> neutron_client::Result<T>,
{
    let what = format!("{} to be deleted", what.as_ref());
    wait_until(what, timeout, interval, || match probe() {
        Ok(_) => Ok(false),
        Err(e) if e.is_not_found() => Ok(true),
        Err(e) => Err(e.into()),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(50);

    #[test]
    fn third_probe() {
        let mut calls = 0;
        let waited = wait_until_true("third probe", INTERVAL * 10, INTERVAL, || {
            calls += 1;
            calls == 3
        })
        .unwrap();
        assert_eq!(waited.attempts, 3);
        assert!(waited.elapsed >= INTERVAL * 2);
        assert!(waited.elapsed < INTERVAL * 10);
    }

    #[test]
    fn timeout() {
        let start = Instant::now();
        let result = wait_until_true("never", INTERVAL * 2, INTERVAL, || false);
        let total = start.elapsed();
        match result {
            Err(Error::Timeout { what, elapsed, attempts }) => {
                assert_eq!(what, "never");
                assert!(elapsed >= INTERVAL * 2);
                assert!(attempts >= 3);
            }
            r => panic!("expected a timeout, got {:?}", r),
        }
        assert!(total >= INTERVAL * 2);
        assert!(total < INTERVAL * 4);
    }

    #[test]
    fn immediate() {
        let waited = wait_until_true("now", Duration::from_secs(0), Duration::from_secs(0), || true)
            .unwrap();
        assert_eq!(waited.attempts, 1);
    }

    #[test]
    fn probe_error_is_not_a_timeout() {
        let result = wait_until("failing probe", INTERVAL * 4, INTERVAL, || {
            Err(Error::Assertion("wrong value".to_string()))
        });
        assert!(matches!(result, Err(Error::Assertion(_))));
    }

    #[test]
    fn deletion() {
        let mut remaining = 2;
        let waited = wait_for_deletion("port p", INTERVAL * 10, INTERVAL, || {
            if remaining == 0 {
                Err(neutron_client::Error::NotFound("port p".to_string()))
            } else {
                remaining -= 1;
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(waited.attempts, 3);

        let result = wait_for_deletion("port q", INTERVAL * 10, INTERVAL, || {
            Err::<(), _>(neutron_client::Error::Forbidden("no".to_string()))
        });
        assert!(result.unwrap_err().is_forbidden());
    }
}
