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

//! Extra DHCP options on ports, for both IP versions.

use crate::catalog::{TestCase, TestClass};
use crate::context::{rand_name, Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::{Axis, Scenario};
use crate::{ensure, ensure_eq, Error, Result};

use neutron_client::{ExtraDhcpOpt, Network, Port, Query};
use serde_json::json;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

/// Network with a subnet of the scenario's IP version, an unconfigured port, and the options to
/// apply.
#[derive(Debug)]
pub(super) struct Fixture {
    network: Network,
    port: Port,
    options: Vec<ExtraDhcpOpt>,
}

pub(super) fn class() -> TestClass<Fixture> {
    TestClass::new("ExtraDHCPOptionsTestJSON", setup)
        .requires(&[Requirement::Extension("extra_dhcp_opt")])
        .axis(Axis::values("ip_version", "ip_version", vec![("IPv4", 4), ("IPv6", 6)]))
        .case(TestCase::new(
            "test_create_list_port_with_extra_dhcp_options",
            "d2c17063-3767-4a24-be4f-a23dbfa133c9",
            create_list_port,
        ))
        .case(TestCase::new(
            "test_update_show_port_with_extra_dhcp_options",
            "9a6aebf4-86ee-4f47-b07a-7f7232c55607",
            update_show_port,
        ))
}

fn ip_version(scenario: &Scenario) -> u8 {
    match scenario.integer("ip_version") {
        Some(6) => 6,
        _ => 4,
    }
}

/// Options for `ip_version`. The boot file name has no version, which the server treats as 4.
fn dhcp_options(ip_version: u8) -> Vec<ExtraDhcpOpt> {
    let (tftp, server) = match ip_version {
        6 => ("2015::dead", "2015::badd"),
        _ => ("123.123.123.123", "123.123.123.45"),
    };
    let opt = |name: &str, value: &str, ip_version: Option<u8>| ExtraDhcpOpt {
        opt_name: name.to_string(),
        opt_value: value.to_string(),
        ip_version,
    };
    vec![
        opt("bootfile-name", "pxelinux.0", None),
        opt("tftp-server", tftp, Some(ip_version)),
        opt("server-ip-address", server, Some(ip_version)),
    ]
}

fn setup(ctx: Ctx, scenario: &Scenario) -> Result<Fixture> {
    let ip_version = ip_version(scenario);
    let network = ctx.create_network(Role::Primary, json!({}))?;
    ctx.create_subnet(Role::Primary, &network, ip_version, json!({}))?;
    let port = ctx.create_port(Role::Primary, &network, json!({}))?;
    Ok(Fixture { network, port, options: dhcp_options(ip_version) })
}

/// Every option of the port must match one of `expected`, comparing a missing version as 4.
fn confirm_options(port: &Port, expected: &[ExtraDhcpOpt]) -> Result<()> {
    let retrieved = &port.extra_dhcp_opts;
    ensure_eq!(retrieved.len(), expected.len(), "number of extra DHCP options");
    for option in retrieved {
        let found = expected.iter().any(|e| {
            e.opt_name == option.opt_name
                && e.opt_value == option.opt_value
                && e.ip_version.unwrap_or(4) == option.ip_version.unwrap_or(4)
        });
        ensure!(found, "extra DHCP option {:?} not found in port {}", option, port.id);
    }
    Ok(())
}

fn create_list_port(ctx: Ctx, _: &Scenario, fixture: &Fixture) -> Result<()> {
    let port = ctx.create_port(
        Role::Primary,
        &fixture.network,
        json!({ "extra_dhcp_opts": fixture.options }),
    )?;

    let listed = ctx
        .network(Role::Primary)?
        .list_ports(&Query::new())?
        .into_iter()
        .find(|p| p.id == port.id)
        .ok_or_else(|| Error::Assertion(format!("port {} is not listed", port.id)))?;
    confirm_options(&listed, &fixture.options)
}

fn update_show_port(ctx: Ctx, _: &Scenario, fixture: &Fixture) -> Result<()> {
    let primary = ctx.network(Role::Primary)?;
    primary.update_port(
        &fixture.port.id,
        json!({ "name": rand_name("new-port-name"), "extra_dhcp_opts": fixture.options }),
    )?;
    confirm_options(&primary.show_port(&fixture.port.id)?, &fixture.options)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn options_per_version() {
        let v4 = dhcp_options(4);
        assert_eq!(v4.len(), 3);
        assert_eq!(v4[0].ip_version, None);
        assert_eq!(v4[1].opt_value, "123.123.123.123");
        assert_eq!(v4[2].ip_version, Some(4));

        let v6 = dhcp_options(6);
        assert_eq!(v6[1].opt_value, "2015::dead");
        assert_eq!(v6[2].opt_value, "2015::badd");
        assert_eq!(v6[2].ip_version, Some(6));
    }

    #[test]
    fn scenarios() {
        let scenarios = crate::scenario::expand(&class().axes).unwrap();
        let versions: Vec<u8> = scenarios.iter().map(ip_version).collect();
        assert_eq!(versions, vec![4, 6]);
        assert_eq!(scenarios[1].to_string(), "IPv6");
    }

    #[test]
    fn missing_version_is_four() {
        let port: Port = serde_json::from_value(json!({
            "id": "p",
            "network_id": "n",
            "extra_dhcp_opts": [
                { "opt_name": "bootfile-name", "opt_value": "pxelinux.0", "ip_version": 4 },
                { "opt_name": "tftp-server", "opt_value": "123.123.123.123", "ip_version": 4 },
                { "opt_name": "server-ip-address", "opt_value": "123.123.123.45" },
            ],
        }))
        .unwrap();
        assert!(confirm_options(&port, &dhcp_options(4)).is_ok());
        assert!(confirm_options(&port, &dhcp_options(6)).is_err());
    }
}
