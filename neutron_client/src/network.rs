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

//! # Networking Client
//!
//! Client for the Neutron v2.0 API. Resources are created from a JSON object of attributes, which
//! is wrapped into the resource key (`{"network": attrs}`) before it is sent. This way, the tests
//! can pass exactly the attributes they want to check, including invalid ones.

use crate::query::Query;
use crate::transport::{take, Transport};
use crate::types::*;
use crate::{Result, Session};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Client for the networking service, bound to the project of the session that created it.
#[derive(Debug, Clone)]
pub struct NetworkClient {
    transport: Transport,
    project_id: String,
}

impl NetworkClient {
    /// Create a new client from an authenticated session, using the `network` endpoint of the
    /// service catalog.
    pub fn from_session(session: &Session) -> Result<Self> {
        let endpoint = session.endpoint("network")?;
        Ok(Self {
            transport: session.transport(format!("{}/v2.0", endpoint)),
            project_id: session.project_id().to_string(),
        })
    }

    /// Project the client acts on
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Alias of `project_id`, for tests which still speak of tenants.
    pub fn tenant_id(&self) -> &str {
        &self.project_id
    }

    fn create<T: DeserializeOwned>(&self, path: &str, key: &str, attrs: Value) -> Result<T> {
        take(self.transport.post::<Value>(path, &json!({ key: attrs }))?, key)
    }

    fn show<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<T> {
        take(self.transport.get::<Value>(path)?, key)
    }

    fn update<T: DeserializeOwned>(&self, path: &str, key: &str, attrs: Value) -> Result<T> {
        take(self.transport.put::<Value>(path, &json!({ key: attrs }))?, key)
    }

    fn list<T: DeserializeOwned>(&self, path: &str, key: &str, query: &Query) -> Result<Vec<T>> {
        take(self.transport.get::<Value>(query.apply(path))?, key)
    }

    // Networks

    /// Create a network
    pub fn create_network(&self, attrs: Value) -> Result<Network> {
        self.create("networks", "network", attrs)
    }

    /// Get a network
    pub fn show_network(&self, id: impl AsRef<str>) -> Result<Network> {
        self.show(&format!("networks/{}", id.as_ref()), "network")
    }

    /// Update a network
    pub fn update_network(&self, id: impl AsRef<str>, attrs: Value) -> Result<Network> {
        self.update(&format!("networks/{}", id.as_ref()), "network", attrs)
    }

    /// List networks
    pub fn list_networks(&self, query: &Query) -> Result<Vec<Network>> {
        self.list("networks", "networks", query)
    }

    /// Delete a network
    pub fn delete_network(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("networks/{}", id.as_ref()))
    }

    // Subnets

    /// Create a subnet
    pub fn create_subnet(&self, attrs: Value) -> Result<Subnet> {
        self.create("subnets", "subnet", attrs)
    }

    /// Get a subnet
    pub fn show_subnet(&self, id: impl AsRef<str>) -> Result<Subnet> {
        self.show(&format!("subnets/{}", id.as_ref()), "subnet")
    }

    /// List subnets
    pub fn list_subnets(&self, query: &Query) -> Result<Vec<Subnet>> {
        self.list("subnets", "subnets", query)
    }

    /// Delete a subnet
    pub fn delete_subnet(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("subnets/{}", id.as_ref()))
    }

    // Routers

    /// Create a router
    pub fn create_router(&self, attrs: Value) -> Result<Router> {
        self.create("routers", "router", attrs)
    }

    /// Get a router
    pub fn show_router(&self, id: impl AsRef<str>) -> Result<Router> {
        self.show(&format!("routers/{}", id.as_ref()), "router")
    }

    /// Update a router
    pub fn update_router(&self, id: impl AsRef<str>, attrs: Value) -> Result<Router> {
        self.update(&format!("routers/{}", id.as_ref()), "router", attrs)
    }

    /// Delete a router. All interfaces must be removed before.
    pub fn delete_router(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("routers/{}", id.as_ref()))
    }

    /// Connect a subnet to the router
    pub fn add_router_interface(
        &self,
        router_id: impl AsRef<str>,
        subnet_id: impl AsRef<str>,
    ) -> Result<()> {
        let path = format!("routers/{}/add_router_interface", router_id.as_ref());
        self.transport.put::<Value>(path, &json!({ "subnet_id": subnet_id.as_ref() }))?;
        Ok(())
    }

    /// Disconnect a subnet from the router
    pub fn remove_router_interface(
        &self,
        router_id: impl AsRef<str>,
        subnet_id: impl AsRef<str>,
    ) -> Result<()> {
        let path = format!("routers/{}/remove_router_interface", router_id.as_ref());
        self.transport.put::<Value>(path, &json!({ "subnet_id": subnet_id.as_ref() }))?;
        Ok(())
    }

    // Ports

    /// Create a port
    pub fn create_port(&self, attrs: Value) -> Result<Port> {
        self.create("ports", "port", attrs)
    }

    /// Get a port
    pub fn show_port(&self, id: impl AsRef<str>) -> Result<Port> {
        self.show(&format!("ports/{}", id.as_ref()), "port")
    }

    /// Update a port
    pub fn update_port(&self, id: impl AsRef<str>, attrs: Value) -> Result<Port> {
        self.update(&format!("ports/{}", id.as_ref()), "port", attrs)
    }

    /// List ports
    pub fn list_ports(&self, query: &Query) -> Result<Vec<Port>> {
        self.list("ports", "ports", query)
    }

    /// Delete a port
    pub fn delete_port(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("ports/{}", id.as_ref()))
    }

    // Floating IPs

    /// Allocate a floating IP
    pub fn create_floatingip(&self, attrs: Value) -> Result<FloatingIp> {
        self.create("floatingips", "floatingip", attrs)
    }

    /// Get a floating IP
    pub fn show_floatingip(&self, id: impl AsRef<str>) -> Result<FloatingIp> {
        self.show(&format!("floatingips/{}", id.as_ref()), "floatingip")
    }

    /// Update a floating IP, for instance to (dis-)associate it or to bind a QoS policy
    pub fn update_floatingip(&self, id: impl AsRef<str>, attrs: Value) -> Result<FloatingIp> {
        self.update(&format!("floatingips/{}", id.as_ref()), "floatingip", attrs)
    }

    /// Release a floating IP
    pub fn delete_floatingip(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("floatingips/{}", id.as_ref()))
    }

    // Security Groups

    /// Create a security group
    pub fn create_security_group(&self, attrs: Value) -> Result<SecurityGroup> {
        self.create("security-groups", "security_group", attrs)
    }

    /// Delete a security group
    pub fn delete_security_group(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("security-groups/{}", id.as_ref()))
    }

    /// Create a security group rule
    pub fn create_security_group_rule(&self, attrs: Value) -> Result<SecurityGroupRule> {
        self.create("security-group-rules", "security_group_rule", attrs)
    }

    /// Delete a security group rule
    pub fn delete_security_group_rule(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("security-group-rules/{}", id.as_ref()))
    }

    // QoS Policies

    /// Create a QoS policy
    pub fn create_qos_policy(&self, attrs: Value) -> Result<QosPolicy> {
        self.create("qos/policies", "policy", attrs)
    }

    /// Get a QoS policy
    pub fn show_qos_policy(&self, id: impl AsRef<str>) -> Result<QosPolicy> {
        self.show(&format!("qos/policies/{}", id.as_ref()), "policy")
    }

    /// Get a QoS policy as a raw JSON object, for comparing whole documents.
    pub fn show_qos_policy_raw(&self, id: impl AsRef<str>) -> Result<Value> {
        self.show(&format!("qos/policies/{}", id.as_ref()), "policy")
    }

    /// Update a QoS policy
    pub fn update_qos_policy(&self, id: impl AsRef<str>, attrs: Value) -> Result<QosPolicy> {
        self.update(&format!("qos/policies/{}", id.as_ref()), "policy", attrs)
    }

    /// List QoS policies
    pub fn list_qos_policies(&self, query: &Query) -> Result<Vec<QosPolicy>> {
        self.list("qos/policies", "policies", query)
    }

    /// List QoS policies and return the raw response, including the `policies_links` used for
    /// pagination.
    pub fn list_qos_policies_raw(&self, query: &Query) -> Result<Value> {
        self.transport.get(query.apply("qos/policies"))
    }

    /// Delete a QoS policy
    pub fn delete_qos_policy(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("qos/policies/{}", id.as_ref()))
    }

    // QoS Rules

    /// Create a rule of kind `R` in a policy
    pub fn create_qos_rule<R: QosRule>(
        &self,
        policy_id: impl AsRef<str>,
        attrs: Value,
    ) -> Result<R> {
        let path = format!("qos/policies/{}/{}", policy_id.as_ref(), R::PLURAL);
        self.create(&path, R::SINGULAR, attrs)
    }

    /// Get a rule of kind `R`
    pub fn show_qos_rule<R: QosRule>(
        &self,
        policy_id: impl AsRef<str>,
        rule_id: impl AsRef<str>,
    ) -> Result<R> {
        let path = rule_path::<R>(policy_id.as_ref(), rule_id.as_ref());
        self.show(&path, R::SINGULAR)
    }

    /// List all rules of kind `R` in a policy
    pub fn list_qos_rules<R: QosRule>(&self, policy_id: impl AsRef<str>) -> Result<Vec<R>> {
        let path = format!("qos/policies/{}/{}", policy_id.as_ref(), R::PLURAL);
        self.list(&path, R::PLURAL, &Query::new())
    }

    /// Update a rule of kind `R`
    pub fn update_qos_rule<R: QosRule>(
        &self,
        policy_id: impl AsRef<str>,
        rule_id: impl AsRef<str>,
        attrs: Value,
    ) -> Result<R> {
        let path = rule_path::<R>(policy_id.as_ref(), rule_id.as_ref());
        self.update(&path, R::SINGULAR, attrs)
    }

    /// Delete a rule of kind `R`
    pub fn delete_qos_rule<R: QosRule>(
        &self,
        policy_id: impl AsRef<str>,
        rule_id: impl AsRef<str>,
    ) -> Result<()> {
        let path = rule_path::<R>(policy_id.as_ref(), rule_id.as_ref());
        self.transport.delete(path)
    }

    /// List the rule types supported by the deployment
    pub fn list_qos_rule_types(&self) -> Result<Vec<RuleType>> {
        self.list("qos/rule-types", "rule_types", &Query::new())
    }

    /// Get the details of a rule type, including the supported drivers and their parameters.
    /// Only available with the `qos-rule-type-details` extension.
    pub fn show_qos_rule_type(&self, rule_type: impl AsRef<str>) -> Result<RuleTypeDetails> {
        self.show(&format!("qos/rule-types/{}", rule_type.as_ref()), "rule_type")
    }

    /// List the rule types as raw JSON objects, to check which keys the server returns.
    pub fn list_qos_rule_types_raw(&self) -> Result<Vec<Value>> {
        self.list("qos/rule-types", "rule_types", &Query::new())
    }

    /// Get the details of a rule type as a raw JSON object.
    pub fn show_qos_rule_type_raw(&self, rule_type: impl AsRef<str>) -> Result<Value> {
        self.show(&format!("qos/rule-types/{}", rule_type.as_ref()), "rule_type")
    }

    // RBAC Policies

    /// Create an RBAC policy
    pub fn create_rbac_policy(&self, attrs: Value) -> Result<RbacPolicy> {
        self.create("rbac-policies", "rbac_policy", attrs)
    }

    /// Get an RBAC policy
    pub fn show_rbac_policy(&self, id: impl AsRef<str>) -> Result<RbacPolicy> {
        self.show(&format!("rbac-policies/{}", id.as_ref()), "rbac_policy")
    }

    /// Update an RBAC policy
    pub fn update_rbac_policy(&self, id: impl AsRef<str>, attrs: Value) -> Result<RbacPolicy> {
        self.update(&format!("rbac-policies/{}", id.as_ref()), "rbac_policy", attrs)
    }

    /// List RBAC policies
    pub fn list_rbac_policies(&self, query: &Query) -> Result<Vec<RbacPolicy>> {
        self.list("rbac-policies", "rbac_policies", query)
    }

    /// List RBAC policies as raw JSON objects. With a `fields` query, only those fields are
    /// present.
    pub fn list_rbac_policies_raw(&self, query: &Query) -> Result<Vec<Value>> {
        self.list("rbac-policies", "rbac_policies", query)
    }

    /// Delete an RBAC policy
    pub fn delete_rbac_policy(&self, id: impl AsRef<str>) -> Result<()> {
        self.transport.delete(format!("rbac-policies/{}", id.as_ref()))
    }

    // Extensions

    /// List all enabled API extensions
    pub fn list_extensions(&self) -> Result<Vec<Extension>> {
        self.list("extensions", "extensions", &Query::new())
    }
}

fn rule_path<R: QosRule>(policy_id: &str, rule_id: &str) -> String {
    format!("qos/policies/{}/{}/{}", policy_id, R::PLURAL, rule_id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn qos_rule_paths() {
        assert_eq!(
            rule_path::<BandwidthLimitRule>("p", "r"),
            "qos/policies/p/bandwidth_limit_rules/r"
        );
        assert_eq!(
            rule_path::<MinimumPacketRateRule>("p", "r"),
            "qos/policies/p/minimum_packet_rate_rules/r"
        );
    }
}
