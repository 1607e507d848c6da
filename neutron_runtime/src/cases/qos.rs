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

//! QoS policies: CRUD, rule types and association with networks and ports.

use super::admin_policy;
use crate::catalog::{no_fixture, TestCase, TestClass};
use crate::context::{rand_name, Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::Scenario;
use crate::{ensure, ensure_eq, expect_err, Result};

use neutron_client::{BandwidthLimitRule, Query, QosRule};
use serde_json::json;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

const NONEXISTENT_NETWORK_POLICY: &str = "9efe63d0-836f-4cc2-b00c-468e63aa614e";
const NONEXISTENT_PORT_POLICY: &str = "49e02f5a-e1dd-41d5-9855-cfa37f2d195e";

pub(super) fn class() -> TestClass<()> {
    TestClass::new("QosTestJSON", no_fixture)
        .requires(&[Requirement::Extension("qos")])
        .case(TestCase::new(
            "test_create_policy",
            "108fbdf7-3463-4e47-9871-d07f3dcf5bbb",
            create_policy,
        ))
        .case(
            TestCase::new(
                "test_show_policy_has_project_id",
                "606a48e2-5403-4052-b40f-4d54b855af76",
                show_policy_has_project_id,
            )
            .requires(&[Requirement::Extension("project-id")]),
        )
        .case(TestCase::new(
            "test_list_policy_filter_by_name",
            "f8d20e92-f06d-4805-b54f-230f77715815",
            list_policy_filter_by_name,
        ))
        .case(TestCase::new(
            "test_list_policy_sort_by_name",
            "dde0b449-a400-4a87-b5a5-4d1c413c917b",
            list_policy_sort_by_name,
        ))
        .case(TestCase::new(
            "test_policy_update",
            "8e88a54b-f0b2-4b7d-b061-a15d93c2c7d6",
            policy_update,
        ))
        .case(TestCase::new(
            "test_policy_update_forbidden_for_regular_tenants_own_policy",
            "6e880e0f-bbfc-4e54-87c6-680f90e1b618",
            policy_update_forbidden_own_policy,
        ))
        .case(TestCase::new(
            "test_policy_update_forbidden_for_regular_tenants_foreign_policy",
            "4ecfd7e7-47b6-4702-be38-be9235901a87",
            policy_update_forbidden_foreign_policy,
        ))
        .case(TestCase::new(
            "test_shared_policy_update",
            "ee263db4-009a-4641-83e5-d0e83506ba4c",
            shared_policy_update,
        ))
        .case(TestCase::new(
            "test_delete_policy",
            "1cb42653-54bd-4a9a-b888-c55e18199201",
            delete_policy,
        ))
        .case(TestCase::new(
            "test_list_admin_rule_types",
            "cf776f77-8d3d-49f2-8572-12d6a1557224",
            list_admin_rule_types,
        ))
        .case(TestCase::new(
            "test_list_regular_rule_types",
            "49c8ea35-83a9-453a-bd23-239cf3b13929",
            list_regular_rule_types,
        ))
        .case(TestCase::new(
            "test_show_rule_type_details_as_user",
            "8ececa21-ef97-4904-a152-9f04c90f484d",
            show_rule_type_details_as_user,
        ))
        .case(
            TestCase::new(
                "test_show_rule_type_details_as_admin",
                "d0a2460b-7325-481f-a531-050bd96ab25e",
                show_rule_type_details_as_admin,
            )
            .requires(&[Requirement::Extension("qos-rule-type-details")]),
        )
        .case(TestCase::new(
            "test_policy_association_with_admin_network",
            "65b9ef75-1911-406a-bbdb-ca1d68d528b0",
            association_with_admin_network,
        ))
        .case(TestCase::new(
            "test_policy_association_with_tenant_network",
            "1738de5d-0476-4163-9022-5e1b548c208e",
            association_with_tenant_network,
        ))
        .case(TestCase::new(
            "test_policy_association_with_network_nonexistent_policy",
            "9efe63d0-836f-4cc2-b00c-468e63aa614e",
            association_with_network_nonexistent_policy,
        ))
        .case(TestCase::new(
            "test_policy_association_with_network_non_shared_policy",
            "1aa55a79-324f-47d9-a076-894a8fc2448b",
            association_with_network_non_shared_policy,
        ))
        .case(TestCase::new(
            "test_policy_update_association_with_admin_network",
            "09a9392c-1359-4cbb-989f-fb768e5834a8",
            update_association_with_admin_network,
        ))
        .case(TestCase::new(
            "test_policy_association_with_port_shared_policy",
            "98fcd95e-84cf-4746-860e-44692e674f2e",
            association_with_port_shared_policy,
        ))
        .case(TestCase::new(
            "test_policy_association_with_port_nonexistent_policy",
            "49e02f5a-e1dd-41d5-9855-cfa37f2d195e",
            association_with_port_nonexistent_policy,
        ))
        .case(TestCase::new(
            "test_policy_association_with_port_non_shared_policy",
            "f53d961c-9fe5-4422-8b66-7add972c6031",
            association_with_port_non_shared_policy,
        ))
        .case(TestCase::new(
            "test_policy_update_association_with_port_shared_policy",
            "f8163237-fba9-4db5-9526-bad6d2343c76",
            update_association_with_port_shared_policy,
        ))
        .case(TestCase::new(
            "test_delete_not_allowed_if_policy_in_use_by_network",
            "18163237-8ba9-4db5-9525-bad6d2343c75",
            delete_not_allowed_in_use_by_network,
        ))
        .case(TestCase::new(
            "test_delete_not_allowed_if_policy_in_use_by_port",
            "24153230-84a9-4dd5-9525-bad6d2343c75",
            delete_not_allowed_in_use_by_port,
        ))
        .case(
            TestCase::new(
                "test_qos_policy_delete_with_rules",
                "a2a5849b-dd06-4b18-9664-0b6828a1fc27",
                delete_with_rules,
            )
            .requires(&[Requirement::QosRuleType("bandwidth_limit")]),
        )
        .case(TestCase::new(
            "test_get_policy_that_is_shared",
            "fb384bde-a973-41c3-a542-6f77a092155f",
            get_policy_that_is_shared,
        ))
        .case(TestCase::new(
            "test_policy_create_forbidden_for_regular_tenants",
            "aed8e2a6-22da-421b-89b9-935a2c1a1b50",
            create_forbidden_for_regular_tenants,
        ))
        .case(
            TestCase::new(
                "test_default_policy_creating_network_without_policy",
                "18d94f22-b9d5-4390-af12-d30a0cfc4cd3",
                default_policy_network_without_policy,
            )
            .requires(&[Requirement::Extension("qos-default")]),
        )
        .case(
            TestCase::new(
                "test_default_policy_creating_network_with_policy",
                "807cce45-38e5-482d-94db-36e1796aba73",
                default_policy_network_with_policy,
            )
            .requires(&[Requirement::Extension("qos-default")]),
        )
        .case(TestCase::new(
            "test_user_create_port_with_admin_qos_policy",
            "06060880-2956-4c16-9a63-f284c3879229",
            user_create_port_with_admin_policy,
        ))
}

fn create_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "name": "test-policy", "description": "test policy desc1", "shared": false }),
    )?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved = admin.show_qos_policy(&policy.id)?;
    ensure_eq!(retrieved.name, "test-policy");
    ensure_eq!(retrieved.description, "test policy desc1");
    ensure!(!retrieved.shared, "policy {} is shared", policy.id);

    let policies = admin.list_qos_policies(&Query::new())?;
    ensure!(policies.iter().any(|p| p.id == policy.id), "policy {} is not listed", policy.id);
    Ok(())
}

fn show_policy_has_project_id(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "", false)?;
    let admin = ctx.network(Role::Admin)?;
    let shown = admin.show_qos_policy_raw(&policy.id)?;
    ensure!(shown.get("project_id").is_some(), "policy has no project_id");
    ensure_eq!(shown["project_id"], json!(admin.tenant_id()));
    Ok(())
}

fn list_policy_filter_by_name(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let name1 = format!("test{}", rand_name("policy"));
    let name2 = format!("test{}", rand_name("policy"));
    for name in [&name1, &name2].iter() {
        ctx.create_qos_policy(
            Role::Admin,
            json!({ "name": name, "description": "test policy", "shared": false }),
        )?;
    }

    let admin = ctx.network(Role::Admin)?;
    let policies = admin.list_qos_policies(&Query::new().with("name", &name1))?;
    ensure_eq!(policies.len(), 1);
    ensure_eq!(policies[0].name, name1);
    Ok(())
}

fn list_policy_sort_by_name(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let name_a = format!("A{}", rand_name("policy"));
    let name_b = format!("B{}", rand_name("policy"));
    for name in [&name_a, &name_b].iter() {
        ctx.create_qos_policy(
            Role::Admin,
            json!({ "name": name, "description": "test policy", "shared": false }),
        )?;
    }

    let admin = ctx.network(Role::Admin)?;
    for (dir, first, second) in [("asc", &name_a, &name_b), ("desc", &name_b, &name_a)].iter() {
        let query = Query::new().with("sort_key", "name").with("sort_dir", dir);
        let names: Vec<String> =
            admin.list_qos_policies(&query)?.into_iter().map(|p| p.name).collect();
        let position = |name: &str| names.iter().position(|n| n == name);
        match (position(first.as_str()), position(second.as_str())) {
            (Some(a), Some(b)) => ensure!(a < b, "{} is not before {} ({})", first, second, dir),
            _ => ensure!(false, "created policies are missing in the {} listing", dir),
        }
    }
    Ok(())
}

fn policy_update(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "description": "", "shared": false, "project_id": admin.tenant_id() }),
    )?;
    admin.update_qos_policy(
        &policy.id,
        json!({ "description": "test policy desc2", "shared": true }),
    )?;

    let retrieved = admin.show_qos_policy(&policy.id)?;
    ensure_eq!(retrieved.description, "test policy desc2");
    ensure!(retrieved.shared, "policy {} is not shared", policy.id);
    ensure!(retrieved.rules.is_empty(), "policy {} has rules", policy.id);
    Ok(())
}

fn policy_update_forbidden_own_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let primary = ctx.network(Role::Primary)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "description": "", "shared": false, "project_id": primary.tenant_id() }),
    )?;
    expect_err!(
        primary.update_qos_policy(&policy.id, json!({ "description": "test policy" })),
        is_forbidden
    );
    Ok(())
}

fn policy_update_forbidden_foreign_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "description": "", "shared": false, "project_id": admin.tenant_id() }),
    )?;
    let primary = ctx.network(Role::Primary)?;
    expect_err!(
        primary.update_qos_policy(&policy.id, json!({ "description": "test policy" })),
        is_not_found
    );
    Ok(())
}

fn shared_policy_update(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "description": "", "shared": true, "project_id": admin.tenant_id() }),
    )?;

    admin.update_qos_policy(&policy.id, json!({ "description": "test policy desc2" }))?;
    ensure!(admin.show_qos_policy(&policy.id)?.shared, "policy is no longer shared");

    admin.update_qos_policy(&policy.id, json!({ "shared": false }))?;
    ensure!(!admin.show_qos_policy(&policy.id)?.shared, "policy is still shared");
    Ok(())
}

fn delete_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "name": "test-policy", "description": "desc", "shared": true }),
    )?;
    let admin = ctx.network(Role::Admin)?;
    ensure_eq!(admin.show_qos_policy(&policy.id)?.name, "test-policy");

    admin.delete_qos_policy(&policy.id)?;
    expect_err!(admin.show_qos_policy(&policy.id), is_not_found);
    Ok(())
}

fn check_rule_type_keys(ctx: Ctx, role: Role) -> Result<()> {
    let rule_types = ctx.network(role)?.list_qos_rule_types_raw()?;
    for rule_type in rule_types.iter() {
        let keys: Vec<&String> =
            rule_type.as_object().map(|o| o.keys().collect()).unwrap_or_default();
        ensure_eq!(keys, vec!["type"], "keys of rule type {}", rule_type);
    }
    Ok(())
}

fn list_admin_rule_types(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    check_rule_type_keys(ctx, Role::Admin)
}

fn list_regular_rule_types(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    check_rule_type_keys(ctx, Role::Primary)
}

fn show_rule_type_details_as_user(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let primary = ctx.network(Role::Primary)?;
    expect_err!(primary.show_qos_rule_type(BandwidthLimitRule::RULE_TYPE), is_forbidden);
    Ok(())
}

fn show_rule_type_details_as_admin(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let details = admin.show_qos_rule_type_raw(BandwidthLimitRule::RULE_TYPE)?;
    let mut keys: Vec<&String> =
        details.as_object().map(|o| o.keys().collect()).unwrap_or_default();
    keys.sort();
    ensure_eq!(keys, vec!["drivers", "type"]);
    Ok(())
}

fn association_with_admin_network(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let network = ctx.create_network(
        Role::Admin,
        json!({ "shared": true, "qos_policy_id": policy.id }),
    )?;
    let retrieved = ctx.network(Role::Admin)?.show_network(&network.id)?;
    ensure_eq!(retrieved.qos_policy_id, Some(policy.id));
    Ok(())
}

fn association_with_tenant_network(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", true)?;
    let network = ctx.create_network(Role::Primary, json!({ "qos_policy_id": policy.id }))?;
    let retrieved = ctx.network(Role::Admin)?.show_network(&network.id)?;
    ensure_eq!(retrieved.qos_policy_id, Some(policy.id));
    Ok(())
}

fn association_with_network_nonexistent_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let attrs = json!({ "qos_policy_id": NONEXISTENT_NETWORK_POLICY });
    expect_err!(ctx.create_network(Role::Primary, attrs), is_not_found);
    Ok(())
}

fn association_with_network_non_shared_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    expect_err!(
        ctx.create_network(Role::Primary, json!({ "qos_policy_id": policy.id })),
        is_not_found
    );
    Ok(())
}

fn update_association_with_admin_network(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let network = ctx.create_network(Role::Admin, json!({ "shared": true }))?;
    let admin = ctx.network(Role::Admin)?;
    ensure_eq!(admin.show_network(&network.id)?.qos_policy_id, None);

    admin.update_network(&network.id, json!({ "qos_policy_id": policy.id }))?;
    ensure_eq!(admin.show_network(&network.id)?.qos_policy_id, Some(policy.id));
    Ok(())
}

fn association_with_port_shared_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", true)?;
    let network = ctx.create_network(Role::Admin, json!({ "shared": true }))?;
    let port = ctx.create_port(Role::Primary, &network, json!({ "qos_policy_id": policy.id }))?;
    let retrieved = ctx.network(Role::Admin)?.show_port(&port.id)?;
    ensure_eq!(retrieved.qos_policy_id, Some(policy.id));
    Ok(())
}

fn association_with_port_nonexistent_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let network = ctx.create_network(Role::Admin, json!({ "shared": true }))?;
    let attrs = json!({ "qos_policy_id": NONEXISTENT_PORT_POLICY });
    expect_err!(ctx.create_port(Role::Primary, &network, attrs), is_not_found);
    Ok(())
}

fn association_with_port_non_shared_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let network = ctx.create_network(Role::Admin, json!({ "shared": true }))?;
    expect_err!(
        ctx.create_port(Role::Primary, &network, json!({ "qos_policy_id": policy.id })),
        is_not_found
    );
    Ok(())
}

fn update_association_with_port_shared_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", true)?;
    let network = ctx.create_network(Role::Admin, json!({ "shared": true }))?;
    let port = ctx.create_port(Role::Primary, &network, json!({}))?;
    let admin = ctx.network(Role::Admin)?;
    ensure_eq!(admin.show_port(&port.id)?.qos_policy_id, None);

    let primary = ctx.network(Role::Primary)?;
    primary.update_port(&port.id, json!({ "qos_policy_id": policy.id }))?;
    ensure_eq!(admin.show_port(&port.id)?.qos_policy_id, Some(policy.id));
    Ok(())
}

fn delete_not_allowed_in_use_by_network(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", true)?;
    ctx.create_network(Role::Admin, json!({ "shared": true, "qos_policy_id": policy.id }))?;
    expect_err!(ctx.network(Role::Admin)?.delete_qos_policy(&policy.id), is_conflict);
    Ok(())
}

fn delete_not_allowed_in_use_by_port(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", true)?;
    let network = ctx.create_network(Role::Admin, json!({ "shared": true }))?;
    ctx.create_port(Role::Primary, &network, json!({ "qos_policy_id": policy.id }))?;
    expect_err!(ctx.network(Role::Admin)?.delete_qos_policy(&policy.id), is_conflict);
    Ok(())
}

fn delete_with_rules(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 200, 1337, None)?;
    let admin = ctx.network(Role::Admin)?;
    admin.delete_qos_policy(&policy.id)?;
    expect_err!(admin.show_qos_policy(&policy.id), is_not_found);
    Ok(())
}

fn get_policy_that_is_shared(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({
            "name": "test-policy-shared",
            "description": "shared policy",
            "shared": true,
            "project_id": admin.tenant_id(),
        }),
    )?;
    let obtained = ctx.network(Role::Primary)?.show_qos_policy(&policy.id)?;
    ensure_eq!(obtained, policy);
    Ok(())
}

fn create_forbidden_for_regular_tenants(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(
        ctx.create_qos_policy(
            Role::Primary,
            json!({ "name": "test-policy", "description": "test policy", "shared": false }),
        ),
        is_forbidden
    );
    Ok(())
}

fn default_policy_network_without_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let project = ctx.create_project("test-project")?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "project_id": project.id, "is_default": true }),
    )?;
    let network = ctx.create_network(Role::Admin, json!({ "project_id": project.id }))?;
    let retrieved = ctx.network(Role::Admin)?.show_network(&network.id)?;
    ensure_eq!(retrieved.qos_policy_id, Some(policy.id));
    Ok(())
}

fn default_policy_network_with_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let project = ctx.create_project("test-project")?;
    ctx.create_qos_policy(
        Role::Admin,
        json!({ "name": "test-policy", "project_id": project.id, "is_default": true }),
    )?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "name": "test-policy", "project_id": project.id }),
    )?;
    let network = ctx.create_network(
        Role::Admin,
        json!({ "project_id": project.id, "qos_policy_id": policy.id }),
    )?;
    let retrieved = ctx.network(Role::Admin)?.show_network(&network.id)?;
    ensure_eq!(retrieved.qos_policy_id, Some(policy.id));
    Ok(())
}

fn user_create_port_with_admin_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let primary = ctx.network(Role::Primary)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "project_id": admin.tenant_id(), "shared": false }),
    )?;
    let network = ctx.create_network(
        Role::Admin,
        json!({ "project_id": primary.tenant_id(), "qos_policy_id": policy.id }),
    )?;
    let port = ctx.create_port(Role::Primary, &network, json!({}))?;
    ensure_eq!(port.network_id, network.id);
    Ok(())
}
