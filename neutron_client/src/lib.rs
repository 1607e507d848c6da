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

//! # OpenStack Networking API
//!
//! This is a small, blocking client for the parts of Keystone, Neutron and Nova that are needed to
//! exercise a Neutron deployment: authenticating, creating networks, subnets, routers, ports,
//! floating IPs, QoS policies and rules, RBAC policies, key pairs and servers.
//!
//! ```no_run
//! use neutron_client::{ClientOptions, Credentials, NetworkClient, Query, Session};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let creds = Credentials {
//!         username: "demo".to_string(),
//!         password: "secret".to_string(),
//!         project_name: "demo".to_string(),
//!         user_domain_name: "Default".to_string(),
//!         project_domain_name: "Default".to_string(),
//!     };
//!     let session = Session::authenticate(
//!         "http://localhost/identity/v3",
//!         &creds,
//!         &ClientOptions::default(),
//!     )?;
//!     let client = NetworkClient::from_session(&session)?;
//!
//!     // create a network and look it up again
//!     let net = client.create_network(json!({ "name": "doc-network" }))?;
//!     assert!(client
//!         .list_networks(&Query::new().with("name", "doc-network"))?
//!         .iter()
//!         .any(|n| n.id == net.id));
//!
//!     client.delete_network(&net.id)?;
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

mod compute;
mod identity;
mod network;
mod query;
mod session;
mod transport;
mod types;
pub use compute::ComputeClient;
pub use identity::IdentityClient;
pub use network::NetworkClient;
pub use query::Query;
pub use session::{ClientOptions, Credentials, Session};
pub use types::*;

use thiserror::Error;

/// # Client Error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error during handling of the HTTP request
    #[allow(clippy::upper_case_acronyms)]
    #[error("HTTP Error: {0}")]
    HTTPError(#[from] isahc::Error),
    /// The request could not be built
    #[error("Cannot build the HTTP request: {0}")]
    HttpBuildError(#[from] isahc::http::Error),
    /// Cannot deserialize the response
    #[error("Cannot parse JSON response: {0}")]
    JsonError(#[from] serde_json::error::Error),
    /// IO Error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// The server rejected the request as malformed (400)
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// Authentication failed or the token expired (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// The caller is not allowed to perform the operation (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// The resource does not exist, or is not visible to the caller (404)
    #[error("Not Found: {0}")]
    NotFound(String),
    /// The request conflicts with the current state of the resource (409)
    #[error("Conflict: {0}")]
    Conflict(String),
    /// HTTP Response Error with any other status code
    #[error("HTTP Response Error: {0}. Message:\n{1}")]
    ResponseError(u16, String),
    /// The service catalog contains no usable endpoint
    #[error("No {interface} endpoint for service {service} in the catalog")]
    NoEndpoint {
        /// Service type, like `network` or `compute`
        service: String,
        /// Requested interface
        interface: String,
    },
    /// Keystone did not return a token
    #[error("Keystone did not return a token!")]
    MissingToken,
    /// The response does not contain the expected top-level field
    #[error("Response is missing the field {0}")]
    MissingField(String),
}

impl Error {
    /// Returns true if the server answered with "not found". A delete that fails with this error
    /// has nothing left to remove.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if the server answered with "conflict"
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if the server answered with "forbidden"
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }

    /// Returns true if the server answered with "bad request"
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }

    /// Build the error matching the status code of a failed response.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let message = transport::error_message(body);
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            s => Self::ResponseError(s, message),
        }
    }
}

/// Client Result type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(Error::from_status(404, "").is_not_found());
        assert!(Error::from_status(409, "").is_conflict());
        assert!(Error::from_status(403, "").is_forbidden());
        assert!(Error::from_status(400, "").is_bad_request());
        assert!(matches!(Error::from_status(401, ""), Error::Unauthorized(_)));
        assert!(matches!(Error::from_status(503, "down"), Error::ResponseError(503, _)));
    }

    #[test]
    fn neutron_error_message() {
        let body = r#"{"NeutronError": {"type": "QosPolicyNotFound",
            "message": "QoS policy abc could not be found.", "detail": ""}}"#;
        match Error::from_status(404, body) {
            Error::NotFound(msg) => assert_eq!(msg, "QoS policy abc could not be found."),
            e => panic!("unexpected error: {}", e),
        }
    }
}
