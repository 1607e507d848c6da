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

//! Connectivity through floating IPs between servers, to the outside, and with a bandwidth limit
//! on the floating IP.
//!
//! Every class shares the same fixture: a project network behind a router, a key pair and a
//! security group allowing SSH and ping. Servers without a floating IP are reached through a
//! proxy server that has one.

use crate::bandwidth::BandwidthProbe;
use crate::catalog::{SetupFn, TestCase, TestClass};
use crate::context::{Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::{Axis, Scenario};
use crate::ssh::{check_remote_connectivity, wait_for_ssh, SshClient};
use crate::{ensure_eq, Error, Result};

use log::*;
use neutron_client::{
    BandwidthLimitRule, Direction, FloatingIp, Keypair, Network, Port, Query, QosRule, Router,
    SecurityGroup, Server,
};
use serde_json::json;
use std::time::Duration;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

/// CIDR of the destination network in the separate network classes
const DEST_CIDR: &str = "10.10.0.0/24";

/// Resources shared by all cases of a scenario instance
#[derive(Debug)]
pub(super) struct Fixture {
    network: Network,
    dest_network: Network,
    router: Router,
    keypair: Keypair,
    secgroup: SecurityGroup,
}

fn fip_axes() -> Vec<Axis> {
    vec![
        Axis::boolean("source", "src_has_fip", "SRC with FIP", "SRC without FIP"),
        Axis::boolean("destination", "dest_has_fip", "DEST with FIP", "DEST without FIP"),
    ]
}

fn requirements() -> Vec<Requirement> {
    vec![Requirement::Extension("router"), Requirement::PublicNetwork]
}

fn east_west_class(
    name: &'static str,
    setup: SetupFn<Fixture>,
    id: &'static str,
) -> TestClass<Fixture> {
    fip_axes()
        .into_iter()
        .fold(TestClass::new(name, setup).requires(&requirements()), TestClass::axis)
        .case(TestCase::new("test_east_west", id, east_west).unstable("bug 1717302"))
}

pub(super) fn same_network() -> TestClass<Fixture> {
    east_west_class(
        "FloatingIpSameNetwork",
        setup_same_network,
        "05c4e3b3-7319-4052-90ad-e8916436c23b",
    )
}

pub(super) fn separate_network() -> TestClass<Fixture> {
    east_west_class(
        "FloatingIpSeparateNetwork",
        setup_separate_network,
        "f18f0090-3289-4783-b956-a0f8ac511e8b",
    )
}

pub(super) fn default_snat() -> TestClass<Fixture> {
    TestClass::new("DefaultSnatToExternal", setup_same_network)
        .requires(&requirements())
        .case(TestCase::new(
            "test_snat_external_ip",
            "3d73ea1a-27c6-45a9-b0f8-04a283d9d764",
            snat_external_ip,
        ))
}

pub(super) fn qos() -> TestClass<Fixture> {
    TestClass::new("FloatingIPQosTest", setup_same_network)
        .requires(&requirements())
        .requires(&[
            Requirement::Extension("qos"),
            Requirement::Extension("qos-fip"),
            Requirement::QosRuleType(BandwidthLimitRule::RULE_TYPE),
        ])
        .case(TestCase::new("test_qos", "5eb48aea-eaba-4c20-8a6f-7740070a0aa3", fip_qos))
}

fn setup_same_network(ctx: Ctx, _: &Scenario) -> Result<Fixture> {
    setup(ctx, true)
}

fn setup_separate_network(ctx: Ctx, _: &Scenario) -> Result<Fixture> {
    setup(ctx, false)
}

fn setup(ctx: Ctx, same_network: bool) -> Result<Fixture> {
    let network = ctx.create_network(Role::Primary, json!({}))?;
    let subnet = ctx.create_subnet(Role::Primary, &network, 4, json!({}))?;
    let router = ctx.create_router(Role::Primary, json!({}))?;
    ctx.add_router_interface(Role::Primary, &router.id, &subnet.id)?;
    let keypair = ctx.create_keypair(Role::Primary)?;

    let secgroup = ctx.create_security_group(Role::Primary, json!({}))?;
    ctx.create_loginable_secgroup_rule(Role::Primary, &secgroup.id)?;
    ctx.create_pingable_secgroup_rule(Role::Primary, &secgroup.id)?;

    let dest_network = if same_network {
        network.clone()
    } else {
        let dest = ctx.create_network(Role::Primary, json!({}))?;
        let subnet = ctx.create_subnet(Role::Primary, &dest, 4, json!({ "cidr": DEST_CIDR }))?;
        ctx.add_router_interface(Role::Primary, &router.id, &subnet.id)?;
        dest
    };

    Ok(Fixture { network, dest_network, router, keypair, secgroup })
}

/// A server with its port, and the floating IP of the port if it has one
#[derive(Debug)]
struct Instance {
    port: Port,
    fip: Option<FloatingIp>,
    server: Server,
}

impl Instance {
    fn fixed_ip(&self) -> Result<&str> {
        self.port
            .fixed_ips
            .first()
            .map(|ip| ip.ip_address.as_str())
            .ok_or_else(|| Error::Assertion(format!("port {} has no fixed IP", self.port.id)))
    }

    fn floating_ip(&self) -> Result<&FloatingIp> {
        let server = &self.server.id;
        self.fip
            .as_ref()
            .ok_or_else(|| Error::Assertion(format!("server {} has no floating IP", server)))
    }
}

/// Boot a server on `network` in the fixture's security group, with a floating IP if requested.
fn boot(ctx: Ctx, fixture: &Fixture, network: &Network, with_fip: bool) -> Result<Instance> {
    let attrs = json!({ "security_groups": [fixture.secgroup.id] });
    let port = ctx.create_port(Role::Primary, network, attrs)?;
    let fip = if with_fip {
        Some(ctx.create_floating_ip(Role::Primary, Some(&port), json!({}))?)
    } else {
        None
    };
    let server = ctx.create_server(
        Role::Primary,
        json!({
            "key_name": fixture.keypair.name,
            "networks": [{ "port": port.id }],
        }),
    )?;
    debug!("server {} is active on {}", server.id, network.id);
    Ok(Instance { port, fip, server })
}

/// SSH client for a server with a floating IP, once it accepts connections
fn login(ctx: Ctx, fixture: &Fixture, instance: &Instance) -> Result<SshClient> {
    let ssh = ctx.ssh_client(&instance.floating_ip()?.floating_ip_address, &fixture.keypair)?;
    wait_for_ssh(&ssh, ssh_timeout(ctx), poll_interval(ctx))?;
    Ok(ssh)
}

/// SSH client for a server without a floating IP, jumping over `proxy`
fn login_via(
    ctx: Ctx,
    fixture: &Fixture,
    instance: &Instance,
    proxy: SshClient,
) -> Result<SshClient> {
    let ssh = ctx.ssh_client(instance.fixed_ip()?, &fixture.keypair)?.with_proxy(proxy);
    wait_for_ssh(&ssh, ssh_timeout(ctx), poll_interval(ctx))?;
    Ok(ssh)
}

fn ssh_timeout(ctx: &TestContext<'_>) -> Duration {
    Duration::from_secs(ctx.config.validation.ssh_timeout)
}

fn ping_timeout(ctx: &TestContext<'_>) -> Duration {
    Duration::from_secs(ctx.config.validation.ping_timeout)
}

fn poll_interval(ctx: &TestContext<'_>) -> Duration {
    Duration::from_secs(ctx.config.compute.build_interval)
}

fn east_west(ctx: Ctx, scenario: &Scenario, fixture: &Fixture) -> Result<()> {
    let src_has_fip = scenario.flag("src_has_fip");
    let dest_has_fip = scenario.flag("dest_has_fip");

    // source, reached through a proxy if it has no floating IP
    let ssh = if src_has_fip {
        let src = boot(ctx, fixture, &fixture.network, true)?;
        login(ctx, fixture, &src)?
    } else {
        let proxy = boot(ctx, fixture, &fixture.network, true)?;
        let proxy = login(ctx, fixture, &proxy)?;
        let src = boot(ctx, fixture, &fixture.network, false)?;
        login_via(ctx, fixture, &src, proxy)?
    };

    let dest = boot(ctx, fixture, &fixture.dest_network, dest_has_fip)?;
    let (timeout, interval) = (ping_timeout(ctx), poll_interval(ctx));
    check_remote_connectivity(&ssh, dest.fixed_ip()?, timeout, interval)?;
    if dest_has_fip {
        let fip = &dest.floating_ip()?.floating_ip_address;
        check_remote_connectivity(&ssh, fip, timeout, interval)?;
    }
    Ok(())
}

/// IPv4 gateway of the public network
fn external_gateway(ctx: Ctx) -> Result<Option<String>> {
    let public = match ctx.config.network.public_network_id.as_ref() {
        Some(public) => public,
        None => return Ok(None),
    };
    let query = Query::new().with("network_id", public);
    let subnets = ctx.network(Role::Admin)?.list_subnets(&query)?;
    Ok(subnets.into_iter().filter(|s| s.ip_version == 4).find_map(|s| s.gateway_ip))
}

fn snat_external_ip(ctx: Ctx, _: &Scenario, fixture: &Fixture) -> Result<()> {
    let gateway = external_gateway(ctx)?.ok_or_else(|| {
        Error::Skip(
            "IPv4 gateway is not configured for the public network or public_network_id is not \
             configured"
                .to_string(),
        )
    })?;

    let proxy = boot(ctx, fixture, &fixture.network, true)?;
    let proxy = login(ctx, fixture, &proxy)?;
    let src = boot(ctx, fixture, &fixture.network, false)?;
    let ssh = login_via(ctx, fixture, &src, proxy)?;
    check_remote_connectivity(&ssh, &gateway, ping_timeout(ctx), poll_interval(ctx))
}

/// Bind a policy limiting both directions to the floating IP of a server, then download a file
/// from the server until the measured rate respects the limit.
fn fip_qos(ctx: Ctx, _: &Scenario, fixture: &Fixture) -> Result<()> {
    let limit = ctx.config.qos.limit_kilo_bits_per_second;
    let burst = ctx.config.qos.limit_kilo_bytes;
    let nc_port = ctx.config.qos.nc_port;
    let probe = BandwidthProbe::from_config(&ctx.config.qos);

    // created before the floating IP, such that the binding is gone when the policy is deleted
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "name": "test-policy", "description": "test-qos-policy", "shared": true }),
    )?;
    for direction in [Direction::Ingress, Direction::Egress].iter() {
        ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, limit, burst, Some(*direction))?;
    }

    let instance = boot(ctx, fixture, &fixture.network, true)?;
    let ssh = login(ctx, fixture, &instance)?;
    ctx.create_security_group_rule(
        Role::Primary,
        json!({
            "security_group_id": fixture.secgroup.id,
            "direction": "ingress",
            "ethertype": "IPv4",
            "protocol": "tcp",
            "port_range_min": nc_port,
            "port_range_max": nc_port,
            "remote_ip_prefix": "0.0.0.0/0",
        }),
    )?;

    let admin = ctx.network(Role::Admin)?;
    ensure_eq!(admin.list_qos_rules::<BandwidthLimitRule>(&policy.id)?.len(), 2);

    let fip = instance.floating_ip()?;
    ensure_eq!(admin.show_floatingip(&fip.id)?.port_id, Some(instance.port.id.clone()));
    admin.update_floatingip(&fip.id, json!({ "qos_policy_id": policy.id }))?;
    ensure_eq!(admin.show_floatingip(&fip.id)?.qos_policy_id, Some(policy.id.clone()));

    probe.create_file(&ssh)?;
    probe.wait_for_limit(&ssh, &fip.floating_ip_address, limit)?;
    info!(
        "{} kbps are enforced on {} behind router {}",
        limit, fip.floating_ip_address, fixture.router.id
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::RunnableClass;

    #[test]
    fn east_west_scenarios() {
        let class = separate_network();
        let names: Vec<String> = class.scenarios().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "SRC with FIP DEST with FIP",
                "SRC with FIP DEST without FIP",
                "SRC without FIP DEST with FIP",
                "SRC without FIP DEST without FIP",
            ]
        );
    }

    #[test]
    fn qos_requirements() {
        let class = qos();
        assert!(class.requires.contains(&Requirement::Extension("router")));
        assert!(class.requires.contains(&Requirement::Extension("qos-fip")));
        assert!(class.requires.contains(&Requirement::QosRuleType("bandwidth_limit")));
        assert_eq!(default_snat().scenarios().unwrap().len(), 1);
    }

    #[test]
    fn only_east_west_is_unstable() {
        for class in [same_network(), separate_network()].iter() {
            assert_eq!(class.cases[0].unstable, Some("bug 1717302"));
        }
        assert_eq!(default_snat().cases[0].unstable, None);
        assert!(qos().cases.iter().all(|c| c.unstable.is_none()));
    }
}
