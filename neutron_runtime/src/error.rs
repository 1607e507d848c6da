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

//! # Error types

use crate::config::ConfigError;
use crate::registry::CleanupReport;
use crate::scenario::ScenarioError;

use std::time::Duration;
use thiserror::Error;

/// Error of a test body, a fixture or a probe.
///
/// The variants are kept apart such that the outcome of a test can tell an assertion failure from
/// a timeout or a skip.
#[derive(Debug, Error)]
pub enum Error {
    /// The REST client failed, or the server answered with an error
    #[error("Client Error: {0}")]
    Client(#[from] neutron_client::Error),
    /// The observed state diverges from the expected one
    #[error("Assertion failed: {0}")]
    Assertion(String),
    /// A wait condition never became true
    #[error("Timed out after {elapsed:?} ({attempts} attempts) waiting for {what}")]
    Timeout {
        /// Description of the awaited condition
        what: String,
        /// Time elapsed until the waiter gave up
        elapsed: Duration,
        /// Number of times the condition was probed
        attempts: usize,
    },
    /// A server went into the `ERROR` state while waiting for it
    #[error("Server {0} entered the ERROR state")]
    ServerFault(String),
    /// The test cannot run on this deployment
    #[error("Skipped: {0}")]
    Skip(String),
    /// A remote command failed
    #[error("SSH Error: {0}")]
    Ssh(String),
    /// The scenario axes are inconsistent
    #[error("Scenario Error: {0}")]
    Scenario(#[from] ScenarioError),
    /// The configuration is invalid
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),
    /// IO Error
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// Some resources could not be removed
    #[error("{0}")]
    Cleanup(#[from] CleanupReport),
}

impl Error {
    /// Returns true if the error is a "not found" answer of the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_not_found())
    }

    /// Returns true if the error is a "conflict" answer of the server.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_conflict())
    }

    /// Returns true if the error is a "forbidden" answer of the server.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_forbidden())
    }

    /// Returns true if the error is a "bad request" answer of the server.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_bad_request())
    }

    /// Returns true if the error is a timeout of a wait condition
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type of the runtime
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classification() {
        let e: Error = neutron_client::Error::NotFound("gone".to_string()).into();
        assert!(e.is_not_found());
        assert!(!e.is_conflict());
        let e: Error = neutron_client::Error::Conflict("in use".to_string()).into();
        assert!(e.is_conflict());
        assert!(!Error::Assertion("x".to_string()).is_not_found());
        let elapsed = Duration::from_secs(1);
        let e = Error::Timeout { what: "x".to_string(), elapsed, attempts: 2 };
        assert!(e.is_timeout());
    }
}
