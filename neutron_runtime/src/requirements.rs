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

//! # Requirements
//!
//! Test classes and cases declare what they need from the deployment. Before a class or case
//! runs, its requirements are checked against the [`Capabilities`], which are fetched once at the
//! start of the run. An unmet requirement skips the test immediately. It never causes a retry.

use crate::config::Config;
use crate::Result;

use log::*;
use neutron_client::NetworkClient;
use std::collections::BTreeSet;
use std::fmt;

/// Something a test needs from the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// The API extension with this alias must be enabled
    Extension(&'static str),
    /// The QoS rule type must be supported by the loaded drivers
    QosRuleType(&'static str),
    /// Regular users must be allowed to create shared resources
    SharedResources,
    /// An external network must be configured
    PublicNetwork,
    /// Credentials for the `alt` role must be configured
    AltCredentials,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension(alias) => write!(f, "extension {}", alias),
            Self::QosRuleType(t) => write!(f, "QoS rule type {}", t),
            Self::SharedResources => write!(f, "creation of shared resources"),
            Self::PublicNetwork => write!(f, "public network"),
            Self::AltCredentials => write!(f, "alt credentials"),
        }
    }
}

/// Reason why a test is skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip(pub String);

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the deployment under test supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Aliases of the enabled API extensions (reported and configured)
    pub extensions: BTreeSet<String>,
    /// Supported QoS rule types
    pub qos_rule_types: BTreeSet<String>,
    /// Regular users may create shared resources
    pub create_shared_resources: bool,
    /// An external network is configured
    pub public_network: bool,
    /// The `alt` role is configured
    pub alt_credentials: bool,
}

impl Capabilities {
    /// Query the deployment for its extensions and rule types, and combine them with the
    /// configuration.
    pub fn discover(client: &NetworkClient, config: &Config) -> Result<Self> {
        let reported = client.list_extensions()?;
        let extensions: BTreeSet<String> = reported
            .into_iter()
            .map(|e| e.alias)
            .filter(|alias| config.extension_enabled(alias))
            .collect();
        let qos_rule_types = if extensions.contains("qos") {
            client.list_qos_rule_types()?.into_iter().map(|r| r.rule_type).collect()
        } else {
            BTreeSet::new()
        };
        info!(
            "Deployment supports {} extensions, QoS rule types: {:?}",
            extensions.len(),
            qos_rule_types
        );
        Ok(Self {
            extensions,
            qos_rule_types,
            create_shared_resources: config.neutron_plugin_options.create_shared_resources,
            public_network: config.network.public_network_id.is_some(),
            alt_credentials: config.auth.alt.is_some(),
        })
    }

    /// Returns true if the requirement holds
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        match requirement {
            Requirement::Extension(alias) => self.extensions.contains(*alias),
            Requirement::QosRuleType(t) => self.qos_rule_types.contains(*t),
            Requirement::SharedResources => self.create_shared_resources,
            Requirement::PublicNetwork => self.public_network,
            Requirement::AltCredentials => self.alt_credentials,
        }
    }

    /// Check all requirements. The first unmet one is returned as reason to skip.
    pub fn check(&self, requirements: &[Requirement]) -> std::result::Result<(), Skip> {
        match requirements.iter().find(|r| !self.satisfies(r)) {
            Some(r) => Err(Skip(format!("{} is not available", r))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreeset;

    fn caps() -> Capabilities {
        Capabilities {
            extensions: btreeset! {"qos".to_string(), "router".to_string()},
            qos_rule_types: btreeset! {"bandwidth_limit".to_string()},
            create_shared_resources: false,
            public_network: true,
            alt_credentials: true,
        }
    }

    #[test]
    fn satisfied() {
        let reqs = [
            Requirement::Extension("qos"),
            Requirement::QosRuleType("bandwidth_limit"),
            Requirement::PublicNetwork,
        ];
        assert_eq!(caps().check(&reqs), Ok(()));
        assert_eq!(caps().check(&[]), Ok(()));
    }

    #[test]
    fn first_unmet() {
        let reqs = [
            Requirement::Extension("router"),
            Requirement::Extension("qos-fip"),
            Requirement::SharedResources,
        ];
        let reason = Skip("extension qos-fip is not available".to_string());
        assert_eq!(caps().check(&reqs), Err(reason));
        let reqs = [Requirement::QosRuleType("dscp_marking")];
        assert!(caps().check(&reqs).is_err());
        assert!(Capabilities::default().check(&[Requirement::AltCredentials]).is_err());
    }
}
