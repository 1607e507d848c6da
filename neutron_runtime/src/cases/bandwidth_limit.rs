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

//! Bandwidth limit rules, with and without the direction extension.

use super::admin_policy;
use crate::catalog::{no_fixture, TestCase, TestClass};
use crate::context::{Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::{Axis, Scenario};
use crate::{ensure, ensure_eq, expect_err, Result};

use neutron_client::{BandwidthLimitRule, Direction};
use serde_json::json;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

/// Direction of the scenario. `None` in the class without the direction axis.
fn direction(scenario: &Scenario) -> Option<Direction> {
    scenario.string("direction").and_then(Direction::from_name)
}

fn common_cases() -> Vec<TestCase<()>> {
    vec![
        TestCase::new("test_rule_create", "8a59b00b-3e9c-4787-92f8-93a5cdf5e378", rule_create),
        TestCase::new(
            "test_rule_create_fail_for_the_same_type",
            "8a59b00b-ab01-4787-92f8-93a5cdf5e378",
            rule_create_fail_for_the_same_type,
        ),
        TestCase::new("test_rule_update", "149a6988-2568-47d2-931e-2dbc858943b3", rule_update),
        TestCase::new("test_rule_delete", "67ee6efd-7b33-4a68-927d-275b4f8ba958", rule_delete),
        TestCase::new(
            "test_rule_create_rule_nonexistent_policy",
            "f211222c-5808-46cb-a961-983bbab6b852",
            rule_create_nonexistent_policy,
        ),
        TestCase::new(
            "test_rule_create_forbidden_for_regular_tenants",
            "a4a2e7ad-786f-4927-a85a-e545a93bd274",
            rule_create_forbidden_for_regular_tenants,
        ),
        TestCase::new(
            "test_rule_update_forbidden_for_regular_tenants_own_policy",
            "1bfc55d9-6fd8-4293-ab3a-b1d69bf7cd2e",
            rule_update_forbidden_own_policy,
        ),
        TestCase::new(
            "test_rule_update_forbidden_for_regular_tenants_foreign_policy",
            "9a607936-4b6f-4c2f-ad21-bd5b3d4fc91f",
            rule_update_forbidden_foreign_policy,
        ),
        TestCase::new(
            "test_get_rules_by_policy",
            "ce0bd0c2-54d9-4e29-85f1-cfb36ac3ebe2",
            get_rules_by_policy,
        ),
        TestCase::new(
            "test_attach_and_detach_a_policy_by_a_tenant",
            "d911707e-fa2c-11e9-9553-5076af30bbf5",
            attach_and_detach_by_tenant,
        )
        .requires(&[Requirement::SharedResources]),
    ]
}

pub(super) fn class() -> TestClass<()> {
    let class = TestClass::new("QosBandwidthLimitRuleTestJSON", no_fixture).requires(&[
        Requirement::Extension("qos"),
        Requirement::QosRuleType(BANDWIDTH_LIMIT),
    ]);
    common_cases().into_iter().fold(class, TestClass::case)
}

pub(super) fn class_with_direction() -> TestClass<()> {
    let class = TestClass::new("QosBandwidthLimitRuleWithDirectionTestJSON", no_fixture)
        .requires(&[
            Requirement::Extension("qos"),
            Requirement::Extension("qos-bw-limit-direction"),
            Requirement::QosRuleType(BANDWIDTH_LIMIT),
        ])
        .axis(Axis::values(
            "direction",
            "direction",
            vec![("ingress", "ingress"), ("egress", "egress")],
        ));
    common_cases().into_iter().fold(class, TestClass::case).case(TestCase::new(
        "test_create_policy_with_multiple_rules",
        "c8cbe502-0f7e-11ea-8d71-362b9e155667",
        create_policy_with_multiple_rules,
    ))
}

const BANDWIDTH_LIMIT: &str = "bandwidth_limit";

fn rule_create(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let ingress = Some(Direction::Ingress);
    let rule = ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 200, 1337, ingress)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: BandwidthLimitRule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);
    ensure_eq!(retrieved.max_kbps, 200);
    ensure_eq!(retrieved.max_burst_kbps, 1337);
    ensure_eq!(retrieved.direction, Some(Direction::Ingress));

    let rules = admin.list_qos_rules::<BandwidthLimitRule>(&policy.id)?;
    ensure!(rules.iter().any(|r| r.id == rule.id), "rule {} is not listed", rule.id);

    let policy_rules = admin.show_qos_policy(&policy.id)?.rules;
    ensure_eq!(policy_rules.len(), 1);
    ensure_eq!(policy_rules[0].id, rule.id);
    ensure_eq!(policy_rules[0].rule_type, BANDWIDTH_LIMIT);
    Ok(())
}

fn rule_create_fail_for_the_same_type(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 200, 1337, None)?;
    expect_err!(
        ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 201, 1338, None),
        is_conflict
    );
    Ok(())
}

fn rule_update(ctx: Ctx, scenario: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 1, 1, None)?;
    let opposite = direction(scenario).and_then(|d| d.opposite());

    let mut attrs = json!({ "max_kbps": 200, "max_burst_kbps": 1337 });
    if let Some(opposite) = opposite {
        attrs["direction"] = json!(opposite);
    }
    let admin = ctx.network(Role::Admin)?;
    admin.update_qos_rule::<BandwidthLimitRule>(&policy.id, &rule.id, attrs)?;

    let retrieved: BandwidthLimitRule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.max_kbps, 200);
    ensure_eq!(retrieved.max_burst_kbps, 1337);
    if opposite.is_some() {
        ensure_eq!(retrieved.direction, opposite);
    }
    Ok(())
}

fn rule_delete(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 200, 1337, None)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: BandwidthLimitRule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);

    admin.delete_qos_rule::<BandwidthLimitRule>(&policy.id, &rule.id)?;
    expect_err!(admin.show_qos_rule::<BandwidthLimitRule>(&policy.id, &rule.id), is_not_found);
    Ok(())
}

fn rule_create_nonexistent_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(
        ctx.create_bandwidth_limit_rule(Role::Admin, "policy", 200, 1337, None),
        is_not_found
    );
    Ok(())
}

fn rule_create_forbidden_for_regular_tenants(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(
        ctx.create_bandwidth_limit_rule(Role::Primary, "policy", 1, 2, None),
        is_forbidden
    );
    Ok(())
}

fn rule_update_forbidden_own_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let primary = ctx.network(Role::Primary)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "description": "test policy", "shared": false, "project_id": primary.tenant_id() }),
    )?;
    let rule = ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 1, 1, None)?;
    expect_err!(
        primary.update_qos_rule::<BandwidthLimitRule>(
            &policy.id,
            &rule.id,
            json!({ "max_kbps": 2, "max_burst_kbps": 4 }),
        ),
        is_forbidden
    );
    Ok(())
}

fn rule_update_forbidden_foreign_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({ "description": "test policy", "shared": false, "project_id": admin.tenant_id() }),
    )?;
    let rule = ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 1, 1, None)?;
    let primary = ctx.network(Role::Primary)?;
    expect_err!(
        primary.update_qos_rule::<BandwidthLimitRule>(
            &policy.id,
            &rule.id,
            json!({ "max_kbps": 2, "max_burst_kbps": 4 }),
        ),
        is_not_found
    );
    Ok(())
}

fn get_rules_by_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy1 = admin_policy(ctx, "test policy1", false)?;
    let rule1 = ctx.create_bandwidth_limit_rule(Role::Admin, &policy1.id, 200, 1337, None)?;
    let policy2 = admin_policy(ctx, "test policy2", false)?;
    let rule2 = ctx.create_bandwidth_limit_rule(Role::Admin, &policy2.id, 5000, 2523, None)?;

    let rules = ctx.network(Role::Admin)?.list_qos_rules::<BandwidthLimitRule>(&policy1.id)?;
    ensure!(rules.iter().any(|r| r.id == rule1.id), "rule {} is not listed", rule1.id);
    ensure!(rules.iter().all(|r| r.id != rule2.id), "rule {} of another policy", rule2.id);
    Ok(())
}

fn attach_and_detach_by_tenant(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let network = ctx.create_network(Role::Primary, json!({}))?;
    let policy = admin_policy(ctx, "test policy for attach", false)?;
    ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 1024, 1024, None)?;
    let admin = ctx.network(Role::Admin)?;
    let primary = ctx.network(Role::Primary)?;

    admin.update_network(&network.id, json!({ "qos_policy_id": policy.id }))?;
    // detaching a policy the tenant cannot see
    expect_err!(
        primary.update_network(&network.id, json!({ "qos_policy_id": null })),
        is_forbidden
    );

    admin.update_qos_policy(&policy.id, json!({ "shared": true }))?;
    primary.update_network(&network.id, json!({ "qos_policy_id": null }))?;
    ensure_eq!(admin.show_network(&network.id)?.qos_policy_id, None);

    expect_err!(primary.delete_qos_policy(&policy.id), is_forbidden);
    Ok(())
}

fn create_policy_with_multiple_rules(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy1", false)?;
    let (egress, ingress) = (Some(Direction::Egress), Some(Direction::Ingress));
    let egress = ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 1024, 1024, egress)?;
    let ingress = ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 1024, 1024, ingress)?;

    let rules = ctx.network(Role::Admin)?.list_qos_rules::<BandwidthLimitRule>(&policy.id)?;
    for rule in [&egress, &ingress].iter() {
        ensure!(rules.iter().any(|r| r.id == rule.id), "rule {} is not listed", rule.id);
    }

    for direction in [Direction::Egress, Direction::Ingress].iter() {
        expect_err!(
            ctx.create_bandwidth_limit_rule(Role::Admin, &policy.id, 1025, 1025, Some(*direction)),
            is_conflict
        );
    }
    Ok(())
}
