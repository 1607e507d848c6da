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

//! # Compute Client
//!
//! The few Nova operations needed to boot test servers: key pairs and servers.

use crate::query::Query;
use crate::transport::{take, Transport};
use crate::types::{Keypair, Server};
use crate::{Result, Session};

use serde_json::{json, Value};

/// Client for the compute service
#[derive(Debug, Clone)]
pub struct ComputeClient {
    transport: Transport,
    project_id: String,
}

impl ComputeClient {
    /// Create a new client from an authenticated session, using the `compute` endpoint of the
    /// service catalog.
    pub fn from_session(session: &Session) -> Result<Self> {
        Ok(Self {
            transport: session.transport(session.endpoint("compute")?),
            project_id: session.project_id().to_string(),
        })
    }

    /// Project the client acts on
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Generate a new key pair. The private key is only returned by this call.
    pub fn create_keypair(&self, name: impl AsRef<str>) -> Result<Keypair> {
        let body = json!({ "keypair": { "name": name.as_ref() } });
        take(self.transport.post::<Value>("os-keypairs", &body)?, "keypair")
    }

    /// Delete a key pair
    pub fn delete_keypair(&self, name: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("os-keypairs/{}", name.as_ref()))
    }

    /// Boot a server. `attrs` is the body of the `server` object, for instance:
    ///
    /// ```json
    /// {"name": "vm", "flavorRef": "1", "imageRef": "...", "networks": [{"port": "..."}]}
    /// ```
    pub fn create_server(&self, attrs: Value) -> Result<Server> {
        take(self.transport.post::<Value>("servers", &json!({ "server": attrs }))?, "server")
    }

    /// Get a server
    pub fn show_server(&self, id: impl AsRef<str>) -> Result<Server> {
        take(self.transport.get::<Value>(format!("servers/{}", id.as_ref()))?, "server")
    }

    /// List servers
    pub fn list_servers(&self, query: &Query) -> Result<Vec<Server>> {
        take(self.transport.get::<Value>(query.apply("servers"))?, "servers")
    }

    /// Delete a server. The server is removed asynchronously, use `show_server` to wait until it
    /// is gone.
    pub fn delete_server(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("servers/{}", id.as_ref()))
    }
}
