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

//! # Test Catalog
//!
//! All test classes, each with its cases and the stable idempotent id of every case. The catalog
//! is built by [`catalog`] and handed to the [`crate::runner`].

mod bandwidth_limit;
mod dscp;
mod extra_dhcp;
mod floating_ip;
mod minimum_bandwidth;
mod minimum_packet_rate;
mod qos;
mod rbac;
mod search;

use crate::catalog::RunnableClass;
use crate::context::{Role, TestContext};
use crate::Result;

use neutron_client::QosPolicy;
use serde_json::json;

/// All test classes, API tests first, followed by the scenario tests that boot servers.
pub fn catalog() -> Vec<Box<dyn RunnableClass>> {
    vec![
        Box::new(qos::class()),
        Box::new(bandwidth_limit::class()),
        Box::new(bandwidth_limit::class_with_direction()),
        Box::new(rbac::class()),
        Box::new(dscp::class()),
        Box::new(minimum_bandwidth::class()),
        Box::new(minimum_packet_rate::class()),
        Box::new(search::class()),
        Box::new(extra_dhcp::class()),
        Box::new(floating_ip::same_network()),
        Box::new(floating_ip::separate_network()),
        Box::new(floating_ip::default_snat()),
        Box::new(floating_ip::qos()),
    ]
}

/// Policy owned by the admin project
fn admin_policy(ctx: &mut TestContext<'_>, description: &str, shared: bool) -> Result<QosPolicy> {
    ctx.create_qos_policy(Role::Admin, json!({ "description": description, "shared": shared }))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn class_names() {
        let catalog = catalog();
        let names: HashSet<&str> = catalog.iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), catalog.len());
        assert!(names.contains("QosTestJSON"));
        assert!(names.contains("FloatingIPQosTest"));
    }

    #[test]
    fn every_class_expands() {
        for class in catalog() {
            let scenarios = class.scenarios().unwrap();
            assert!(!scenarios.is_empty(), "{} has no scenario", class.name());
            for scenario in scenarios.iter() {
                assert!(!class.cases(scenario).is_empty(), "{} has no case", class.name());
            }
        }
    }

    #[test]
    fn idempotent_ids_are_uuids() {
        for class in catalog() {
            let scenario = class.scenarios().unwrap().remove(0);
            for case in class.cases(&scenario) {
                let id = case.idempotent_id;
                let groups: Vec<usize> = id.split('-').map(str::len).collect();
                assert_eq!(groups, vec![8, 4, 4, 4, 12], "{} has a malformed id {}", case.id, id);
            }
        }
    }
}
