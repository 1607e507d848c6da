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

//! # Keystone Session

use crate::transport::Transport;
use crate::{Error, Result};

use isahc::config::{CaCertificate, Configurable, SslOption};
use isahc::HttpClient;
use log::*;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Password credentials of a single user, scoped to a project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Name of the user
    pub username: String,
    /// Password of the user
    pub password: String,
    /// Name of the project to scope the token to
    pub project_name: String,
    /// Domain of the user
    #[serde(default = "default_domain")]
    pub user_domain_name: String,
    /// Domain of the project
    #[serde(default = "default_domain")]
    pub project_domain_name: String,
}

fn default_domain() -> String {
    String::from("Default")
}

/// Options shared by every HTTP request of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Timeout of a single request
    pub timeout: Duration,
    /// Skip TLS certificate validation
    pub disable_ssl_certificate_validation: bool,
    /// CA bundle to validate the server certificates against
    pub ca_certificates_file: Option<PathBuf>,
    /// Endpoint interface to pick from the catalog (`public`, `internal` or `admin`)
    pub endpoint_type: String,
    /// Region to pick from the catalog. If `None`, the first matching endpoint is used.
    pub region: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            disable_ssl_certificate_validation: false,
            ca_certificates_file: None,
            endpoint_type: String::from("public"),
            region: None,
        }
    }
}

impl ClientOptions {
    fn build_http_client(&self) -> Result<HttpClient> {
        let mut builder = HttpClient::builder().timeout(self.timeout);
        if self.disable_ssl_certificate_validation {
            builder = builder.ssl_options(
                SslOption::DANGER_ACCEPT_INVALID_CERTS | SslOption::DANGER_ACCEPT_INVALID_HOSTS,
            );
        }
        if let Some(ca) = self.ca_certificates_file.as_ref() {
            builder = builder.ssl_ca_certificate(CaCertificate::file(ca));
        }
        Ok(builder.build()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TokenBody {
    token: Token,
}

#[derive(Debug, Clone, Deserialize)]
struct Token {
    project: Option<IdRef>,
    user: IdRef,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    url: String,
}

/// # Authenticated Session
///
/// Holds a project scoped token and the service catalog that came with it. All service clients
/// are created from a session, and share its HTTP client.
#[derive(Debug, Clone)]
pub struct Session {
    http: Arc<HttpClient>,
    identity_uri: String,
    token: String,
    project_id: String,
    user_id: String,
    catalog: Vec<CatalogEntry>,
    options: ClientOptions,
}

impl Session {
    /// Authenticate against Keystone v3 using a password, scoped to the project of the
    /// credentials.
    pub fn authenticate(
        identity_uri: impl AsRef<str>,
        credentials: &Credentials,
        options: &ClientOptions,
    ) -> Result<Self> {
        let http = Arc::new(options.build_http_client()?);
        let identity_uri = identity_uri.as_ref().trim_end_matches('/').to_string();
        let transport = Transport::new(http.clone(), &identity_uri, None);
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": credentials.username,
                            "domain": { "name": credentials.user_domain_name },
                            "password": credentials.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": credentials.project_name,
                        "domain": { "name": credentials.project_domain_name },
                    }
                }
            }
        });
        let (response, text) = transport.post_raw("auth/tokens", &body)?;
        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::MissingToken)?
            .to_string();
        let body: TokenBody = serde_json::from_str(&text)?;
        let project_id = body.token.project.ok_or(Error::MissingToken)?.id;
        debug!("authenticated {} in project {}", credentials.username, project_id);

        Ok(Self {
            http,
            identity_uri,
            token,
            project_id,
            user_id: body.token.user.id,
            catalog: body.token.catalog,
            options: options.clone(),
        })
    }

    /// Create a session from a token issued earlier, with the service endpoints given as
    /// `(service_type, url)` pairs. No request is sent. The user of such a session is unknown, and
    /// [`Session::user_id`] is empty.
    pub fn from_token(
        identity_uri: impl AsRef<str>,
        token: impl Into<String>,
        project_id: impl Into<String>,
        endpoints: &[(&str, &str)],
        options: &ClientOptions,
    ) -> Result<Self> {
        let catalog = endpoints
            .iter()
            .map(|(service_type, url)| CatalogEntry {
                service_type: service_type.to_string(),
                endpoints: vec![CatalogEndpoint {
                    interface: options.endpoint_type.clone(),
                    region: options.region.clone(),
                    url: url.to_string(),
                }],
            })
            .collect();
        Ok(Self {
            http: Arc::new(options.build_http_client()?),
            identity_uri: identity_uri.as_ref().trim_end_matches('/').to_string(),
            token: token.into(),
            project_id: project_id.into(),
            user_id: String::new(),
            catalog,
            options: options.clone(),
        })
    }

    /// ID of the project the token is scoped to
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// ID of the authenticated user
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Lookup the endpoint url of a service type (like `network` or `compute`) in the catalog,
    /// using the configured interface and region.
    pub fn endpoint(&self, service_type: impl AsRef<str>) -> Result<String> {
        let service_type = service_type.as_ref();
        self.catalog
            .iter()
            .filter(|e| e.service_type == service_type)
            .flat_map(|e| e.endpoints.iter())
            .find(|e| {
                e.interface == self.options.endpoint_type
                    && match self.options.region.as_ref() {
                        Some(r) => e.region.as_ref() == Some(r),
                        None => true,
                    }
            })
            .map(|e| e.url.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::NoEndpoint {
                service: service_type.to_string(),
                interface: self.options.endpoint_type.clone(),
            })
    }

    pub(crate) fn transport(&self, base: impl AsRef<str>) -> Transport {
        Transport::new(self.http.clone(), base, Some(self.token.clone()))
    }

    pub(crate) fn identity_transport(&self) -> Transport {
        self.transport(&self.identity_uri)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn session_with_catalog(catalog: serde_json::Value, region: Option<&str>) -> Session {
        Session {
            http: Arc::new(HttpClient::new().unwrap()),
            identity_uri: "http://keystone/v3".to_string(),
            token: "t".to_string(),
            project_id: "p".to_string(),
            user_id: "u".to_string(),
            catalog: serde_json::from_value(catalog).unwrap(),
            options: ClientOptions {
                region: region.map(|r| r.to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn endpoint_lookup() {
        let catalog = serde_json::json!([
            {"type": "network", "endpoints": [
                {"interface": "internal", "region": "RegionOne", "url": "http://int:9696"},
                {"interface": "public", "region": "RegionOne", "url": "http://pub:9696/"},
                {"interface": "public", "region": "RegionTwo", "url": "http://two:9696"},
            ]},
            {"type": "compute", "endpoints": []},
        ]);
        let s = session_with_catalog(catalog.clone(), None);
        assert_eq!(s.endpoint("network").unwrap(), "http://pub:9696");
        let s = session_with_catalog(catalog, Some("RegionTwo"));
        assert_eq!(s.endpoint("network").unwrap(), "http://two:9696");
        assert!(matches!(s.endpoint("compute"), Err(Error::NoEndpoint { .. })));
    }

    #[test]
    fn pre_issued_token() {
        let options = ClientOptions { region: Some("RegionOne".to_string()), ..Default::default() };
        let endpoints = [("network", "http://net:9696/"), ("compute", "http://nova:8774/v2.1")];
        let s = Session::from_token("http://keystone/v3/", "t", "p", &endpoints, &options).unwrap();
        assert_eq!(s.project_id(), "p");
        assert_eq!(s.user_id(), "");
        assert_eq!(s.endpoint("network").unwrap(), "http://net:9696");
        assert_eq!(s.endpoint("compute").unwrap(), "http://nova:8774/v2.1");
        assert!(matches!(s.endpoint("identity"), Err(Error::NoEndpoint { .. })));
    }
}
