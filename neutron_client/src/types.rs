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

//! # Resource Types
//!
//! Only the fields the tests inspect are modelled. Everything else in the server response is
//! ignored while deserializing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic direction of a QoS rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traffic entering the port
    Ingress,
    /// Traffic leaving the port
    Egress,
    /// Both directions (only for packet rate rules)
    Any,
}

impl Direction {
    /// Returns the other direction. `Any` has no opposite.
    pub fn opposite(&self) -> Option<Self> {
        match self {
            Self::Ingress => Some(Self::Egress),
            Self::Egress => Some(Self::Ingress),
            Self::Any => None,
        }
    }

    /// Parse the direction from its API representation
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ingress" => Some(Self::Ingress),
            "egress" => Some(Self::Egress),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "ingress"),
            Self::Egress => write!(f, "egress"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Network
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Network {
    /// ID of the network
    pub id: String,
    /// Name of the network
    #[serde(default)]
    pub name: String,
    /// Project owning the network
    #[serde(default)]
    pub project_id: Option<String>,
    /// Whether the network is shared with all projects
    #[serde(default)]
    pub shared: bool,
    /// QoS policy bound to the network
    #[serde(default)]
    pub qos_policy_id: Option<String>,
    /// IDs of the subnets on this network
    #[serde(default)]
    pub subnets: Vec<String>,
    /// Whether this is an external network
    #[serde(rename = "router:external", default)]
    pub router_external: bool,
}

/// Subnet
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Subnet {
    /// ID of the subnet
    pub id: String,
    /// Name of the subnet
    #[serde(default)]
    pub name: String,
    /// Network the subnet belongs to
    pub network_id: String,
    /// CIDR of the subnet
    pub cidr: String,
    /// IP version (4 or 6)
    pub ip_version: u8,
    /// Gateway address, if any
    #[serde(default)]
    pub gateway_ip: Option<String>,
}

/// Router
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Router {
    /// ID of the router
    pub id: String,
    /// Name of the router
    #[serde(default)]
    pub name: String,
    /// Gateway information, if the router is connected to an external network
    #[serde(default)]
    pub external_gateway_info: Option<serde_json::Value>,
}

/// Fixed IP of a port
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FixedIp {
    /// Subnet of the address
    pub subnet_id: String,
    /// The address
    pub ip_address: String,
}

/// Extra DHCP option of a port
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ExtraDhcpOpt {
    /// Name of the option, like `bootfile-name`
    pub opt_name: String,
    /// Value of the option
    pub opt_value: String,
    /// IP version the option applies to. The server defaults to 4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_version: Option<u8>,
}

/// Port
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Port {
    /// ID of the port
    pub id: String,
    /// Name of the port
    #[serde(default)]
    pub name: String,
    /// Network of the port
    pub network_id: String,
    /// Addresses assigned to the port
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    /// QoS policy bound to the port
    #[serde(default)]
    pub qos_policy_id: Option<String>,
    /// Security groups applied to the port
    #[serde(default)]
    pub security_groups: Vec<String>,
    /// Extra DHCP options (only with the `extra_dhcp_opt` extension)
    #[serde(default)]
    pub extra_dhcp_opts: Vec<ExtraDhcpOpt>,
    /// Device using the port
    #[serde(default)]
    pub device_id: String,
}

/// Floating IP
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FloatingIp {
    /// ID of the floating IP
    pub id: String,
    /// The public address
    pub floating_ip_address: String,
    /// Private address the floating IP maps to
    #[serde(default)]
    pub fixed_ip_address: Option<String>,
    /// Port the floating IP is associated with
    #[serde(default)]
    pub port_id: Option<String>,
    /// External network the address is allocated from
    pub floating_network_id: String,
    /// QoS policy bound to the floating IP
    #[serde(default)]
    pub qos_policy_id: Option<String>,
}

/// Security group
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SecurityGroup {
    /// ID of the security group
    pub id: String,
    /// Name of the security group
    #[serde(default)]
    pub name: String,
    /// Rules of the group
    #[serde(default)]
    pub security_group_rules: Vec<SecurityGroupRule>,
}

/// Security group rule
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SecurityGroupRule {
    /// ID of the rule
    pub id: String,
    /// Group the rule belongs to
    pub security_group_id: String,
    /// `ingress` or `egress`
    pub direction: String,
    /// `IPv4` or `IPv6`
    #[serde(default)]
    pub ethertype: String,
    /// Protocol, if restricted
    #[serde(default)]
    pub protocol: Option<String>,
    /// Lower bound of the port range
    #[serde(default)]
    pub port_range_min: Option<u16>,
    /// Upper bound of the port range
    #[serde(default)]
    pub port_range_max: Option<u16>,
}

/// Summary of a rule, as embedded in a QoS policy
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct QosPolicyRule {
    /// ID of the rule
    pub id: String,
    /// Type of the rule, like `bandwidth_limit`
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Direction, for rule types that have one
    #[serde(default)]
    pub direction: Option<Direction>,
}

/// QoS policy
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct QosPolicy {
    /// ID of the policy
    pub id: String,
    /// Name of the policy
    #[serde(default)]
    pub name: String,
    /// Description of the policy
    #[serde(default)]
    pub description: String,
    /// Whether the policy is shared with all projects
    #[serde(default)]
    pub shared: bool,
    /// Whether the policy is the default policy of its project
    #[serde(default)]
    pub is_default: bool,
    /// Project owning the policy
    #[serde(default)]
    pub project_id: Option<String>,
    /// Rules of the policy
    #[serde(default)]
    pub rules: Vec<QosPolicyRule>,
}

/// Common interface of the QoS rule kinds, used to build the REST paths.
pub trait QosRule: serde::de::DeserializeOwned {
    /// Key of a single rule in requests and responses, like `bandwidth_limit_rule`
    const SINGULAR: &'static str;
    /// Key of a rule list, and the path segment below the policy
    const PLURAL: &'static str;
    /// Rule type as reported by the rule-types API
    const RULE_TYPE: &'static str;

    /// ID of the rule
    fn id(&self) -> &str;
}

/// Bandwidth limit rule
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BandwidthLimitRule {
    /// ID of the rule
    pub id: String,
    /// Maximum rate in kbps
    pub max_kbps: u64,
    /// Maximum burst in kilobits
    #[serde(default)]
    pub max_burst_kbps: u64,
    /// Direction (only with the `qos-bw-limit-direction` extension)
    #[serde(default)]
    pub direction: Option<Direction>,
}

impl QosRule for BandwidthLimitRule {
    const SINGULAR: &'static str = "bandwidth_limit_rule";
    const PLURAL: &'static str = "bandwidth_limit_rules";
    const RULE_TYPE: &'static str = "bandwidth_limit";

    fn id(&self) -> &str {
        &self.id
    }
}

/// DSCP marking rule
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DscpMarkingRule {
    /// ID of the rule
    pub id: String,
    /// DSCP mark
    pub dscp_mark: u8,
}

impl QosRule for DscpMarkingRule {
    const SINGULAR: &'static str = "dscp_marking_rule";
    const PLURAL: &'static str = "dscp_marking_rules";
    const RULE_TYPE: &'static str = "dscp_marking";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Minimum bandwidth rule
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MinimumBandwidthRule {
    /// ID of the rule
    pub id: String,
    /// Guaranteed rate in kbps
    pub min_kbps: u64,
    /// Direction
    pub direction: Direction,
}

impl QosRule for MinimumBandwidthRule {
    const SINGULAR: &'static str = "minimum_bandwidth_rule";
    const PLURAL: &'static str = "minimum_bandwidth_rules";
    const RULE_TYPE: &'static str = "minimum_bandwidth";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Minimum packet rate rule
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MinimumPacketRateRule {
    /// ID of the rule
    pub id: String,
    /// Guaranteed packet rate in kpps
    pub min_kpps: u64,
    /// Direction
    pub direction: Direction,
}

impl QosRule for MinimumPacketRateRule {
    const SINGULAR: &'static str = "minimum_packet_rate_rule";
    const PLURAL: &'static str = "minimum_packet_rate_rules";
    const RULE_TYPE: &'static str = "minimum_packet_rate";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Supported QoS rule type
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuleType {
    /// Name of the rule type
    #[serde(rename = "type")]
    pub rule_type: String,
}

/// Details of a QoS rule type, as shown to admins
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuleTypeDetails {
    /// Name of the rule type
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Drivers supporting the rule type, with their supported parameters
    #[serde(default)]
    pub drivers: Vec<serde_json::Value>,
}

/// RBAC policy, sharing an object with another project
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RbacPolicy {
    /// ID of the RBAC policy
    pub id: String,
    /// Type of the shared object, like `qos_policy`
    pub object_type: String,
    /// ID of the shared object
    pub object_id: String,
    /// Granted action, like `access_as_shared`
    pub action: String,
    /// Project the object is shared with, or `*`
    pub target_tenant: String,
    /// Project owning the RBAC policy
    #[serde(default)]
    pub project_id: Option<String>,
}

/// API extension
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Alias of the extension, used to check for its presence
    pub alias: String,
    /// Name of the extension
    #[serde(default)]
    pub name: String,
}

/// Key pair
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Keypair {
    /// Name of the key pair
    pub name: String,
    /// Public key
    #[serde(default)]
    pub public_key: String,
    /// Private key, only present right after the key pair was generated
    #[serde(default)]
    pub private_key: Option<String>,
}

/// Server status
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Server is running
    Active,
    /// Server is being built
    Build,
    /// Server failed
    Error,
    /// Server is shut off
    Shutoff,
    /// Server was deleted
    Deleted,
    /// Any other state
    #[serde(other)]
    Other,
}

impl ServerStatus {
    /// Returns true if the server is active
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
    /// Returns true if the server is in error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Build => "BUILD",
            Self::Error => "ERROR",
            Self::Shutoff => "SHUTOFF",
            Self::Deleted => "DELETED",
            Self::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

/// Server (Nova instance)
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Server {
    /// ID of the server
    pub id: String,
    /// Name of the server. Only present on `show`.
    #[serde(default)]
    pub name: String,
    /// Status of the server. Not present right after creation.
    #[serde(default)]
    pub status: Option<ServerStatus>,
}

/// Keystone project
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Project {
    /// ID of the project
    pub id: String,
    /// Name of the project
    pub name: String,
    /// Domain of the project
    #[serde(default)]
    pub domain_id: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn qos_policy_with_rules() {
        let policy: QosPolicy = serde_json::from_value(json!({
            "id": "p1",
            "name": "policy",
            "description": "",
            "shared": false,
            "tenant_id": "t",
            "project_id": "t",
            "revision_number": 1,
            "rules": [
                {"id": "r1", "type": "bandwidth_limit", "max_kbps": 200, "direction": "egress"},
                {"id": "r2", "type": "dscp_marking", "dscp_mark": 56},
            ],
        }))
        .unwrap();
        assert_eq!(policy.rules.len(), 2);
        assert_eq!(policy.rules[0].direction, Some(Direction::Egress));
        assert_eq!(policy.rules[1].rule_type, DscpMarkingRule::RULE_TYPE);
        assert!(!policy.is_default);
    }

    #[test]
    fn server_status() {
        let s: Server = serde_json::from_value(json!({"id": "s", "status": "ACTIVE"})).unwrap();
        assert!(s.status.unwrap().is_active());
        let s: Server = serde_json::from_value(json!({"id": "s", "status": "REBOOT"})).unwrap();
        assert_eq!(s.status, Some(ServerStatus::Other));
        let s: Server = serde_json::from_value(json!({"id": "s", "adminPass": "x"})).unwrap();
        assert_eq!(s.status, None);
    }

    #[test]
    fn extra_dhcp_opt_default_version() {
        let opt = ExtraDhcpOpt {
            opt_name: "bootfile-name".to_string(),
            opt_value: "pxelinux.0".to_string(),
            ip_version: None,
        };
        assert_eq!(
            serde_json::to_value(&opt).unwrap(),
            json!({"opt_name": "bootfile-name", "opt_value": "pxelinux.0"})
        );
    }

    #[test]
    fn direction() {
        assert_eq!(Direction::Ingress.opposite(), Some(Direction::Egress));
        assert_eq!(Direction::Any.opposite(), None);
        assert_eq!(Direction::from_name("egress"), Some(Direction::Egress));
        assert_eq!(Direction::Egress.to_string(), "egress");
    }
}
