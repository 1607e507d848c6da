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

//! # Identity Client

use crate::transport::{take, Transport};
use crate::types::Project;
use crate::{Result, Session};

use serde_json::{json, Value};

/// Client for the Keystone v3 API, used to create throw-away projects. Requires admin
/// credentials.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    transport: Transport,
    project_id: String,
}

impl IdentityClient {
    /// Create a new client from an authenticated session. The identity endpoint is the one the
    /// session authenticated against.
    pub fn from_session(session: &Session) -> Self {
        Self {
            transport: session.identity_transport(),
            project_id: session.project_id().to_string(),
        }
    }

    /// Project the session is scoped to
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Create a project in the given domain.
    pub fn create_project(
        &self,
        name: impl AsRef<str>,
        domain_id: impl AsRef<str>,
        description: impl AsRef<str>,
    ) -> Result<Project> {
        let body = json!({
            "project": {
                "name": name.as_ref(),
                "domain_id": domain_id.as_ref(),
                "description": description.as_ref(),
            }
        });
        take(self.transport.post::<Value>("projects", &body)?, "project")
    }

    /// Get a project
    pub fn show_project(&self, id: impl AsRef<str>) -> Result<Project> {
        take(self.transport.get::<Value>(format!("projects/{}", id.as_ref()))?, "project")
    }

    /// Delete a project
    pub fn delete_project(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("projects/{}", id.as_ref()))
    }
}
