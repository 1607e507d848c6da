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

//! # Configuration
//!
//! The configuration is read once from a TOML file and passed by reference to everything that
//! needs it. All values except the credentials have defaults, such that a minimal file only
//! contains the identity endpoint and the `auth` section:
//!
//! ```toml
//! [identity]
//! uri = "http://controller/identity/v3"
//!
//! [auth.admin]
//! username = "admin"
//! password = "secret"
//! project_name = "admin"
//!
//! [auth.primary]
//! username = "demo"
//! password = "secret"
//! project_name = "demo"
//! ```

use crate::cidr::{Cidr, CidrError};

use neutron_client::{ClientOptions, Credentials};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file cannot be read
    #[error("Cannot read the configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML, or fields are missing
    #[error("Cannot parse the configuration: {0}")]
    Toml(#[from] toml::de::Error),
    /// An address pool is invalid
    #[error("Invalid address pool: {0}")]
    Cidr(#[from] CidrError),
    /// A value is out of range, or a required value is missing
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration of a test run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Keystone settings
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Credentials of the test users
    pub auth: AuthConfig,
    /// Networking service settings
    #[serde(default)]
    pub network: NetworkConfig,
    /// Compute service settings
    #[serde(default)]
    pub compute: ComputeConfig,
    /// Settings for logging into test servers
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Plugin specific feature switches
    #[serde(default)]
    pub neutron_plugin_options: PluginOptions,
    /// Bandwidth measurement
    #[serde(default)]
    pub qos: QosConfig,
}

/// `[identity]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Keystone v3 endpoint
    pub uri: String,
    /// Region used for the catalog lookup, unless the service overrides it
    pub region: Option<String>,
    /// Skip TLS certificate validation
    pub disable_ssl_certificate_validation: bool,
    /// CA bundle for TLS certificate validation
    pub ca_certificates_file: Option<PathBuf>,
    /// Domain in which scratch projects are created
    pub default_domain_id: String,
    /// Timeout of a single HTTP request, in seconds
    pub http_timeout: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            uri: String::from("http://localhost/identity/v3"),
            region: None,
            disable_ssl_certificate_validation: false,
            ca_certificates_file: None,
            default_domain_id: String::from("default"),
            http_timeout: 60,
        }
    }
}

/// `[auth]`: one set of credentials per role
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Administrator
    pub admin: Credentials,
    /// Regular user
    pub primary: Credentials,
    /// Second regular user in a different project. Tests that need it are skipped without.
    pub alt: Option<Credentials>,
}

/// `[network]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// External network to allocate floating IPs from, and to use as router gateway
    pub public_network_id: Option<String>,
    /// Pool from which IPv4 project subnets are taken
    pub project_network_cidr: String,
    /// Prefix length of IPv4 project subnets
    pub project_network_mask_bits: u8,
    /// Pool from which IPv6 project subnets are taken
    pub project_network_v6_cidr: String,
    /// Prefix length of IPv6 project subnets
    pub project_network_v6_mask_bits: u8,
    /// Enabled API extensions. `["all"]` enables every extension the deployment reports.
    pub api_extensions: Vec<String>,
    /// Endpoint interface (`public`, `internal` or `admin`)
    pub endpoint_type: String,
    /// Region of the networking endpoint
    pub region: Option<String>,
    /// Timeout in seconds for asynchronous networking operations
    pub build_timeout: u64,
    /// Poll interval in seconds for asynchronous networking operations
    pub build_interval: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            public_network_id: None,
            project_network_cidr: String::from("10.100.0.0/16"),
            project_network_mask_bits: 28,
            project_network_v6_cidr: String::from("2001:db8::/48"),
            project_network_v6_mask_bits: 64,
            api_extensions: vec![String::from("all")],
            endpoint_type: String::from("public"),
            region: None,
            build_timeout: 300,
            build_interval: 1,
        }
    }
}

/// `[compute]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Image to boot test servers from
    pub image_ref: String,
    /// Flavor of test servers
    pub flavor_ref: String,
    /// Timeout in seconds for a server to become active
    pub build_timeout: u64,
    /// Poll interval in seconds while waiting for a server
    pub build_interval: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            image_ref: String::new(),
            flavor_ref: String::from("1"),
            build_timeout: 300,
            build_interval: 1,
        }
    }
}

/// `[validation]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// User to log into test servers
    pub image_ssh_user: String,
    /// Timeout in seconds until a server accepts SSH connections
    pub ssh_timeout: u64,
    /// Timeout in seconds for a single SSH connection attempt
    pub connect_timeout: u64,
    /// Timeout in seconds for a remote address to answer pings
    pub ping_timeout: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            image_ssh_user: String::from("cirros"),
            ssh_timeout: 300,
            connect_timeout: 60,
            ping_timeout: 120,
        }
    }
}

/// `[neutron_plugin_options]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Whether the regular users may create shared resources
    pub create_shared_resources: bool,
}

/// `[qos]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Bandwidth limit applied in the bandwidth enforcement tests
    pub limit_kilo_bits_per_second: u64,
    /// Burst applied in the bandwidth enforcement tests
    pub limit_kilo_bytes: u64,
    /// Measured rates up to `limit * tolerance_factor` are accepted
    pub tolerance_factor: f64,
    /// Port on which the test server serves the file
    pub nc_port: u16,
    /// Size of the transferred file in bytes
    pub file_size: u64,
    /// Timeout in seconds until the limit must be enforced
    pub bw_check_timeout: u64,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            limit_kilo_bits_per_second: 1000,
            limit_kilo_bytes: 1000,
            tolerance_factor: 1.5,
            nc_port: 1234,
            file_size: 1024 * 1024,
            bw_check_timeout: 120,
        }
    }
}

impl Config {
    /// Read and validate the configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Parse and validate the configuration.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that serde cannot check. Configurations not read through
    /// [`Config::from_toml`] must be validated before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.project_network_pool(4)?;
        self.project_network_pool(6)?;
        if self.qos.tolerance_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "qos.tolerance_factor must be at least 1, not {}",
                self.qos.tolerance_factor
            )));
        }
        if self.network.api_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "network.api_extensions is empty, use [\"all\"] to enable everything".to_string(),
            ));
        }
        Ok(())
    }

    /// The address pool for project subnets and the prefix of a single subnet.
    pub fn project_network_pool(&self, ip_version: u8) -> Result<(Cidr, u8), ConfigError> {
        let (cidr, bits) = match ip_version {
            4 => (&self.network.project_network_cidr, self.network.project_network_mask_bits),
            6 => (&self.network.project_network_v6_cidr, self.network.project_network_v6_mask_bits),
            v => return Err(ConfigError::Invalid(format!("Unknown IP version {}", v))),
        };
        let pool = Cidr::try_from_str(cidr)?;
        if pool.ip_version() != ip_version {
            return Err(ConfigError::Invalid(format!("{} is not an IPv{} range", pool, ip_version)));
        }
        // make sure the pool can be split
        pool.subnets(bits)?;
        Ok((pool, bits))
    }

    /// HTTP options of the sessions. The endpoint interface and region of the networking
    /// service are used for the catalog lookup of all services.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.identity.http_timeout),
            disable_ssl_certificate_validation: self.identity.disable_ssl_certificate_validation,
            ca_certificates_file: self.identity.ca_certificates_file.clone(),
            endpoint_type: self.network.endpoint_type.clone(),
            region: self.network.region.clone().or_else(|| self.identity.region.clone()),
        }
    }

    /// Timeout and poll interval of networking operations
    pub fn network_timeouts(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.network.build_timeout),
            Duration::from_secs(self.network.build_interval),
        )
    }

    /// Timeout and poll interval of compute operations
    pub fn compute_timeouts(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.compute.build_timeout),
            Duration::from_secs(self.compute.build_interval),
        )
    }

    /// Returns true if the extension is enabled by the configuration. The deployment must still
    /// report it.
    pub fn extension_enabled(&self, alias: &str) -> bool {
        let extensions = &self.network.api_extensions;
        extensions.iter().any(|e| e == "all" || e == alias)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL: &str = r#"
        [identity]
        uri = "http://controller/identity/v3"

        [auth.admin]
        username = "admin"
        password = "secret"
        project_name = "admin"

        [auth.primary]
        username = "demo"
        password = "secret"
        project_name = "demo"
    "#;

    #[test]
    fn minimal() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.identity.uri, "http://controller/identity/v3");
        assert_eq!(config.auth.admin.user_domain_name, "Default");
        assert!(config.auth.alt.is_none());
        assert_eq!(config.network.project_network_mask_bits, 28);
        assert_eq!(config.validation.image_ssh_user, "cirros");
        assert!(!config.neutron_plugin_options.create_shared_resources);
        assert_eq!(config.qos.nc_port, 1234);
        assert!(config.extension_enabled("qos"));
        let (pool, bits) = config.project_network_pool(6).unwrap();
        assert_eq!(pool.to_string(), "2001:db8::/48");
        assert_eq!(bits, 64);
    }

    #[test]
    fn extension_filter() {
        let s = format!("{}\n[network]\napi_extensions = [\"qos\", \"router\"]\n", MINIMAL);
        let config = Config::from_toml(&s).unwrap();
        assert!(config.extension_enabled("qos"));
        assert!(!config.extension_enabled("qos-fip"));
    }

    #[test]
    fn missing_credentials() {
        let s = "[identity]\nuri = \"http://controller/identity/v3\"\n";
        assert!(matches!(Config::from_toml(s), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn invalid_pool() {
        let s = format!("{}\n[network]\nproject_network_cidr = \"2001:db8::/48\"\n", MINIMAL);
        assert!(matches!(Config::from_toml(&s), Err(ConfigError::Invalid(_))));
        let s = format!("{}\n[network]\nproject_network_mask_bits = 8\n", MINIMAL);
        assert!(matches!(Config::from_toml(&s), Err(ConfigError::Cidr(_))));
    }

    #[test]
    fn client_options() {
        let s = format!("{}\n[network]\nendpoint_type = \"internal\"\n", MINIMAL);
        let config = Config::from_toml(&s).unwrap();
        let options = config.client_options();
        assert_eq!(options.endpoint_type, "internal");
        assert_eq!(options.region, None);
        assert_eq!(options.timeout, Duration::from_secs(60));
    }

    #[test]
    fn validate_after_change() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        assert!(config.validate().is_ok());
        config.qos.tolerance_factor = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.qos.tolerance_factor = 1.5;
        config.network.api_extensions.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
