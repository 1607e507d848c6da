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

//! # Test context
//!
//! A [`TestContext`] is handed to every fixture and test body. It gives access to the
//! configuration, the clients of each role and the capabilities of the deployment, and it builds
//! resources such that each of them is deleted again when the active [`ResourceRegistry`] runs its
//! cleanups.

use crate::config::{Config, ConfigError};
use crate::registry::{ResourceHandle, ResourceKind, ResourceRegistry};
use crate::requirements::Capabilities;
use crate::ssh::SshClient;
use crate::waiter::{wait_for_deletion, wait_for_server_status};
use crate::{Error, Result};

use log::*;
use neutron_client::{
    BandwidthLimitRule, ComputeClient, Direction, DscpMarkingRule, FloatingIp, IdentityClient,
    Keypair, MinimumBandwidthRule, MinimumPacketRateRule, Network, NetworkClient, Port, Project,
    QosPolicy, QosRule, RbacPolicy, Router, SecurityGroup, SecurityGroupRule, Server,
    ServerStatus, Session, Subnet,
};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// Random resource name with the given prefix, like `test-network-x3Fa9kQ1`.
pub fn rand_name(prefix: &str) -> String {
    let suffix: String = thread_rng().sample_iter(&Alphanumeric).take(8).collect();
    format!("{}-{}", prefix, suffix)
}

/// Insert a random name into `attrs`, unless it already carries one.
fn default_name(attrs: &mut Value, prefix: &str) {
    set_default(attrs, "name", Value::String(rand_name(prefix)));
}

/// Insert `key` into `attrs` if it is missing. `attrs` is turned into an object if it is `null`.
fn set_default(attrs: &mut Value, key: &str, value: Value) {
    if attrs.is_null() {
        *attrs = json!({});
    }
    if let Some(map) = attrs.as_object_mut() {
        map.entry(key.to_string()).or_insert(value);
    }
}

/// Role of the user issuing a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Regular user owning the test resources
    Primary,
    /// Second regular user in a different project
    Alt,
    /// Administrator
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Alt => write!(f, "alt"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Clients of a single user
#[derive(Debug, Clone)]
pub struct Manager {
    /// Role of the user
    pub role: Role,
    /// Networking client
    pub network: NetworkClient,
    /// Compute client, if the deployment has a compute service
    pub compute: Option<ComputeClient>,
    /// Identity client
    pub identity: IdentityClient,
}

impl Manager {
    /// Authenticate the user and create its clients.
    pub fn connect(
        role: Role,
        config: &Config,
        credentials: &neutron_client::Credentials,
    ) -> Result<Self> {
        let options = config.client_options();
        let session = Session::authenticate(&config.identity.uri, credentials, &options)?;
        info!("{} user {} is in project {}", role, credentials.username, session.project_id());
        Self::from_session(role, &session)
    }

    /// Create the clients of an existing session.
    pub fn from_session(role: Role, session: &Session) -> Result<Self> {
        let network = NetworkClient::from_session(session)?;
        let compute = match ComputeClient::from_session(session) {
            Ok(compute) => Some(compute),
            Err(e) => {
                debug!("no compute service for {}: {}", role, e);
                None
            }
        };
        let identity = IdentityClient::from_session(session);
        Ok(Self { role, network, compute, identity })
    }

    /// ID of the project of the user
    pub fn project_id(&self) -> &str {
        self.network.project_id()
    }

    /// The compute client. Tests needing servers are skipped without one.
    pub fn compute(&self) -> Result<&ComputeClient> {
        let skip = || Error::Skip("compute service is not available".to_string());
        self.compute.as_ref().ok_or_else(skip)
    }
}

/// The managers of all configured roles
#[derive(Debug, Clone)]
pub struct Managers {
    /// Regular user
    pub primary: Manager,
    /// Administrator
    pub admin: Manager,
    /// Second regular user, if configured
    pub alt: Option<Manager>,
}

impl Managers {
    /// Authenticate all configured users.
    pub fn connect(config: &Config) -> Result<Self> {
        let primary = Manager::connect(Role::Primary, config, &config.auth.primary)?;
        let admin = Manager::connect(Role::Admin, config, &config.auth.admin)?;
        let alt = match config.auth.alt.as_ref() {
            Some(credentials) => Some(Manager::connect(Role::Alt, config, credentials)?),
            None => None,
        };
        Ok(Self { primary, admin, alt })
    }

    /// Manager of the given role. Returns [`Error::Skip`] for an unconfigured `alt` role.
    pub fn get(&self, role: Role) -> Result<&Manager> {
        match role {
            Role::Primary => Ok(&self.primary),
            Role::Admin => Ok(&self.admin),
            Role::Alt => {
                let skip = || Error::Skip("alt credentials are not configured".to_string());
                self.alt.as_ref().ok_or_else(skip)
            }
        }
    }
}

/// Everything shared by all tests of a run. Built once in `main` and passed by reference.
#[derive(Debug)]
pub struct Environment {
    /// Configuration of the run
    pub config: Config,
    /// Clients of all roles
    pub managers: Managers,
    /// Capabilities of the deployment
    pub capabilities: Capabilities,
}

impl Environment {
    /// Authenticate all users and discover the capabilities of the deployment.
    pub fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let managers = Managers::connect(&config)?;
        let capabilities = Capabilities::discover(&managers.admin.network, &config)?;
        Ok(Self::new(config, managers, capabilities))
    }

    /// Assemble an environment from its parts. Nothing is validated or requested.
    pub fn new(config: Config, managers: Managers, capabilities: Capabilities) -> Self {
        Self { config, managers, capabilities }
    }
}

/// Context of a fixture or a test body
#[derive(Debug)]
pub struct TestContext<'a> {
    /// Configuration of the run
    pub config: &'a Config,
    /// Clients of all roles
    pub managers: &'a Managers,
    /// Capabilities of the deployment
    pub capabilities: &'a Capabilities,
    registry: ResourceRegistry,
}

impl<'a> TestContext<'a> {
    /// Create a context with an empty registry called `name`.
    pub fn new(env: &'a Environment, name: impl Into<String>) -> Self {
        Self {
            config: &env.config,
            managers: &env.managers,
            capabilities: &env.capabilities,
            registry: ResourceRegistry::new(name),
        }
    }

    /// The active registry
    pub fn registry(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    /// Install a new registry and return the previous one.
    pub fn replace_registry(&mut self, registry: ResourceRegistry) -> ResourceRegistry {
        std::mem::replace(&mut self.registry, registry)
    }

    /// Manager of the given role
    pub fn manager(&self, role: Role) -> Result<&'a Manager> {
        self.managers.get(role)
    }

    /// Networking client of the given role
    pub fn network(&self, role: Role) -> Result<&'a NetworkClient> {
        Ok(&self.managers.get(role)?.network)
    }

    /// Compute client of the given role
    pub fn compute(&self, role: Role) -> Result<&'a ComputeClient> {
        self.managers.get(role)?.compute()
    }

    // networks

    /// Create a network
    pub fn create_network(&mut self, role: Role, mut attrs: Value) -> Result<Network> {
        default_name(&mut attrs, "test-network");
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::Network,
            move || Ok(client.create_network(attrs)?),
            move |id| Ok(cleanup.delete_network(id)?),
        )
    }

    /// Create a subnet on `network`. Unless `attrs` contains a `cidr`, the next free range of the
    /// configured project pool is used.
    pub fn create_subnet(
        &mut self,
        role: Role,
        network: &Network,
        ip_version: u8,
        mut attrs: Value,
    ) -> Result<Subnet> {
        default_name(&mut attrs, "test-subnet");
        set_default(&mut attrs, "network_id", json!(network.id));
        set_default(&mut attrs, "ip_version", json!(ip_version));
        let client = self.network(role)?.clone();

        if attrs.get("cidr").is_some() {
            return self.track_subnet(&client, attrs);
        }

        let (pool, mask_bits) = self.config.project_network_pool(ip_version)?;
        for cidr in pool.subnets(mask_bits).map_err(ConfigError::from)? {
            let mut attrs = attrs.clone();
            attrs["cidr"] = json!(cidr.to_string());
            match self.track_subnet(&client, attrs) {
                Ok(subnet) => return Ok(subnet),
                Err(Error::Client(neutron_client::Error::BadRequest(msg)))
                    if msg.contains("overlap") =>
                {
                    trace!("{} is already used: {}", cidr, msg);
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Assertion(format!("no free /{} subnet left in {}", mask_bits, pool)))
    }

    fn track_subnet(&mut self, client: &NetworkClient, attrs: Value) -> Result<Subnet> {
        let create = client.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::Subnet,
            move || Ok(create.create_subnet(attrs)?),
            move |id| Ok(cleanup.delete_subnet(id)?),
        )
    }

    // routers

    /// Create a router. If a public network is configured, it becomes the gateway of the router
    /// unless `attrs` says otherwise.
    pub fn create_router(&mut self, role: Role, mut attrs: Value) -> Result<Router> {
        default_name(&mut attrs, "test-router");
        if let Some(public) = self.config.network.public_network_id.as_ref() {
            set_default(&mut attrs, "external_gateway_info", json!({ "network_id": public }));
        }
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::Router,
            move || Ok(client.create_router(attrs)?),
            move |id| Ok(cleanup.delete_router(id)?),
        )
    }

    /// Connect a subnet to a router. The interface is tracked on its own, such that it is removed
    /// before both the router and the subnet.
    pub fn add_router_interface(
        &mut self,
        role: Role,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<()> {
        let client = self.network(role)?.clone();
        client.add_router_interface(router_id, subnet_id)?;
        let (router, subnet) = (router_id.to_string(), subnet_id.to_string());
        let id = format!("{}/{}", router, subnet);
        let handle = ResourceHandle::new(ResourceKind::RouterInterface, id);
        self.registry.register(handle, move || {
            Ok(client.remove_router_interface(&router, &subnet)?)
        });
        Ok(())
    }

    // ports and floating IPs

    /// Create a port on `network`
    pub fn create_port(&mut self, role: Role, network: &Network, mut attrs: Value) -> Result<Port> {
        default_name(&mut attrs, "test-port");
        set_default(&mut attrs, "network_id", json!(network.id));
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::Port,
            move || Ok(client.create_port(attrs)?),
            move |id| Ok(cleanup.delete_port(id)?),
        )
    }

    /// Allocate a floating IP from the public network, optionally associated with `port`.
    pub fn create_floating_ip(
        &mut self,
        role: Role,
        port: Option<&Port>,
        mut attrs: Value,
    ) -> Result<FloatingIp> {
        let public = self
            .config
            .network
            .public_network_id
            .clone()
            .ok_or_else(|| Error::Skip("public network is not configured".to_string()))?;
        set_default(&mut attrs, "floating_network_id", json!(public));
        if let Some(port) = port {
            set_default(&mut attrs, "port_id", json!(port.id));
        }
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::FloatingIp,
            move || Ok(client.create_floatingip(attrs)?),
            move |id| Ok(cleanup.delete_floatingip(id)?),
        )
    }

    // security groups

    /// Create a security group
    pub fn create_security_group(
        &mut self,
        role: Role,
        mut attrs: Value,
    ) -> Result<SecurityGroup> {
        default_name(&mut attrs, "test-secgroup");
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::SecurityGroup,
            move || Ok(client.create_security_group(attrs)?),
            move |id| Ok(cleanup.delete_security_group(id)?),
        )
    }

    /// Create a rule in a security group
    pub fn create_security_group_rule(
        &mut self,
        role: Role,
        attrs: Value,
    ) -> Result<SecurityGroupRule> {
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::SecurityGroupRule,
            move || Ok(client.create_security_group_rule(attrs)?),
            move |id| Ok(cleanup.delete_security_group_rule(id)?),
        )
    }

    /// Allow incoming SSH connections
    pub fn create_loginable_secgroup_rule(
        &mut self,
        role: Role,
        secgroup_id: &str,
    ) -> Result<SecurityGroupRule> {
        self.create_security_group_rule(
            role,
            json!({
                "security_group_id": secgroup_id,
                "direction": "ingress",
                "ethertype": "IPv4",
                "protocol": "tcp",
                "port_range_min": 22,
                "port_range_max": 22,
            }),
        )
    }

    /// Allow incoming echo requests, both for IPv4 and IPv6
    pub fn create_pingable_secgroup_rule(
        &mut self,
        role: Role,
        secgroup_id: &str,
    ) -> Result<Vec<SecurityGroupRule>> {
        [("IPv4", "icmp"), ("IPv6", "ipv6-icmp")]
            .iter()
            .map(|(ethertype, protocol)| {
                self.create_security_group_rule(
                    role,
                    json!({
                        "security_group_id": secgroup_id,
                        "direction": "ingress",
                        "ethertype": ethertype,
                        "protocol": protocol,
                    }),
                )
            })
            .collect()
    }

    // compute

    /// Generate a key pair. The private key is only available in the returned value.
    pub fn create_keypair(&mut self, role: Role) -> Result<Keypair> {
        let client = self.compute(role)?.clone();
        let cleanup = client.clone();
        let name = rand_name("test-keypair");
        self.registry.track(
            ResourceKind::Keypair,
            move || Ok(client.create_keypair(name)?),
            move |name| Ok(cleanup.delete_keypair(name)?),
        )
    }

    /// Boot a server and wait until it is active. `attrs` must contain the `networks` of the
    /// server. Image and flavor default to the configured ones. The cleanup waits until the
    /// server is gone, such that its ports are released before the networks are deleted.
    pub fn create_server(&mut self, role: Role, mut attrs: Value) -> Result<Server> {
        if self.config.compute.image_ref.is_empty() {
            return Err(Error::Skip("compute.image_ref is not configured".to_string()));
        }
        default_name(&mut attrs, "test-server");
        set_default(&mut attrs, "imageRef", json!(self.config.compute.image_ref));
        set_default(&mut attrs, "flavorRef", json!(self.config.compute.flavor_ref));
        let client = self.compute(role)?.clone();
        let create = client.clone();
        let cleanup = client.clone();
        let (timeout, interval) = self.config.compute_timeouts();
        let server = self.registry.track(
            ResourceKind::Server,
            move || Ok(create.create_server(attrs)?),
            move |id| {
                cleanup.delete_server(id)?;
                let what = format!("server {}", id);
                wait_for_deletion(what, timeout, interval, || cleanup.show_server(id))?;
                Ok(())
            },
        )?;
        wait_for_server_status(&client, &server.id, ServerStatus::Active, timeout, interval)
    }

    /// SSH client logging into `host` with the private key of `keypair`
    pub fn ssh_client(&self, host: &str, keypair: &Keypair) -> Result<SshClient> {
        let key = keypair.private_key.as_ref().ok_or_else(|| {
            Error::Assertion(format!("keypair {} has no private key", keypair.name))
        })?;
        let timeout = Duration::from_secs(self.config.validation.connect_timeout);
        SshClient::new(host, &self.config.validation.image_ssh_user, key, timeout)
    }

    // QoS

    /// Create a QoS policy
    pub fn create_qos_policy(&mut self, role: Role, mut attrs: Value) -> Result<QosPolicy> {
        default_name(&mut attrs, "test-policy");
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::QosPolicy,
            move || Ok(client.create_qos_policy(attrs)?),
            move |id| Ok(cleanup.delete_qos_policy(id)?),
        )
    }

    /// Create a rule of kind `R` in a policy
    pub fn create_qos_rule<R: QosRule + 'static>(
        &mut self,
        role: Role,
        policy_id: &str,
        attrs: Value,
    ) -> Result<R> {
        let client = self.network(role)?.clone();
        let rule: R = client.create_qos_rule(policy_id, attrs)?;
        let (policy, rule_id) = (policy_id.to_string(), rule.id().to_string());
        let handle = ResourceHandle::new(ResourceKind::QosRule, rule_id.clone());
        self.registry.register(handle, move || {
            Ok(client.delete_qos_rule::<R>(&policy, &rule_id)?)
        });
        Ok(rule)
    }

    /// Create a bandwidth limit rule. The direction is only sent if given.
    pub fn create_bandwidth_limit_rule(
        &mut self,
        role: Role,
        policy_id: &str,
        max_kbps: u64,
        max_burst_kbps: u64,
        direction: Option<Direction>,
    ) -> Result<BandwidthLimitRule> {
        let mut attrs = json!({ "max_kbps": max_kbps, "max_burst_kbps": max_burst_kbps });
        if let Some(direction) = direction {
            attrs["direction"] = json!(direction);
        }
        self.create_qos_rule(role, policy_id, attrs)
    }

    /// Create a DSCP marking rule
    pub fn create_dscp_marking_rule(
        &mut self,
        role: Role,
        policy_id: &str,
        dscp_mark: u8,
    ) -> Result<DscpMarkingRule> {
        self.create_qos_rule(role, policy_id, json!({ "dscp_mark": dscp_mark }))
    }

    /// Create a minimum bandwidth rule
    pub fn create_minimum_bandwidth_rule(
        &mut self,
        role: Role,
        policy_id: &str,
        min_kbps: u64,
        direction: Direction,
    ) -> Result<MinimumBandwidthRule> {
        let attrs = json!({ "min_kbps": min_kbps, "direction": direction });
        self.create_qos_rule(role, policy_id, attrs)
    }

    /// Create a minimum packet rate rule
    pub fn create_minimum_packet_rate_rule(
        &mut self,
        role: Role,
        policy_id: &str,
        min_kpps: u64,
        direction: Direction,
    ) -> Result<MinimumPacketRateRule> {
        let attrs = json!({ "min_kpps": min_kpps, "direction": direction });
        self.create_qos_rule(role, policy_id, attrs)
    }

    // RBAC and identity

    /// Create an RBAC policy
    pub fn create_rbac_policy(&mut self, role: Role, attrs: Value) -> Result<RbacPolicy> {
        let client = self.network(role)?.clone();
        let cleanup = client.clone();
        self.registry.track(
            ResourceKind::RbacPolicy,
            move || Ok(client.create_rbac_policy(attrs)?),
            move |id| Ok(cleanup.delete_rbac_policy(id)?),
        )
    }

    /// Create a scratch project in the configured default domain, as admin.
    pub fn create_project(&mut self, prefix: &str) -> Result<Project> {
        let client = self.managers.admin.identity.clone();
        let cleanup = client.clone();
        let name = rand_name(prefix);
        let domain = self.config.identity.default_domain_id.clone();
        self.registry.track(
            ResourceKind::Project,
            move || Ok(client.create_project(&name, &domain, "scratch project")?),
            move |id| Ok(cleanup.delete_project(id)?),
        )
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use neutron_client::ClientOptions;

    const CONFIG: &str = r#"
        [identity]
        uri = "http://127.0.0.1:5000/v3"

        [auth.admin]
        username = "admin"
        password = "secret"
        project_name = "admin"

        [auth.primary]
        username = "demo"
        password = "secret"
        project_name = "demo"
    "#;

    fn offline_manager(role: Role) -> Manager {
        let endpoints = [("network", "http://127.0.0.1:9696")];
        let project = format!("{}-project", role);
        let options = ClientOptions::default();
        let session =
            Session::from_token("http://127.0.0.1:5000/v3", "token", project, &endpoints, &options)
                .unwrap();
        Manager::from_session(role, &session).unwrap()
    }

    /// Environment that sends no request as long as the tests only register in-memory cleanups.
    pub(crate) fn offline_environment(capabilities: Capabilities) -> Environment {
        let managers = Managers {
            primary: offline_manager(Role::Primary),
            admin: offline_manager(Role::Admin),
            alt: None,
        };
        Environment::new(Config::from_toml(CONFIG).unwrap(), managers, capabilities)
    }

    #[test]
    fn offline() {
        let env = offline_environment(Capabilities::default());
        let mut ctx = TestContext::new(&env, "offline");
        assert_eq!(ctx.manager(Role::Primary).unwrap().project_id(), "primary-project");
        assert_eq!(ctx.network(Role::Admin).unwrap().project_id(), "admin-project");
        assert!(matches!(ctx.compute(Role::Primary), Err(Error::Skip(_))));
        assert!(matches!(ctx.manager(Role::Alt), Err(Error::Skip(_))));
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn random_names() {
        let a = rand_name("test-network");
        let b = rand_name("test-network");
        assert!(a.starts_with("test-network-"));
        assert_eq!(a.len(), "test-network-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn defaults() {
        let mut attrs = Value::Null;
        default_name(&mut attrs, "test-port");
        assert!(attrs["name"].as_str().unwrap().starts_with("test-port-"));

        let mut attrs = json!({ "name": "mine", "shared": true });
        default_name(&mut attrs, "test-port");
        set_default(&mut attrs, "shared", json!(false));
        set_default(&mut attrs, "network_id", json!("net"));
        assert_eq!(attrs, json!({ "name": "mine", "shared": true, "network_id": "net" }));
    }

    #[test]
    fn roles() {
        assert_eq!(Role::Primary.to_string(), "primary");
        assert_eq!(Role::Alt.to_string(), "alt");
        assert_eq!(Role::Admin.to_string(), "admin");
    }
}
