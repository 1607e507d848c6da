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

//! Minimum bandwidth rules.

use super::admin_policy;
use crate::catalog::{no_fixture, TestCase, TestClass};
use crate::context::{Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::Scenario;
use crate::{ensure, ensure_eq, expect_err, Result};

use neutron_client::{Direction, MinimumBandwidthRule, QosRule};
use serde_json::json;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

type Rule = MinimumBandwidthRule;

pub(super) fn class() -> TestClass<()> {
    TestClass::new("QosMinimumBandwidthRuleTestJSON", no_fixture)
        .requires(&[Requirement::Extension("qos"), Requirement::QosRuleType(Rule::RULE_TYPE)])
        .case(TestCase::new(
            "test_rule_create",
            "aa59b00b-3e9c-4787-92f8-93a5cdf5e378",
            rule_create,
        ))
        .case(TestCase::new(
            "test_rule_create_fail_for_missing_min_kbps",
            "266d9b87-e51c-48bd-9aa7-8269573621be",
            rule_create_fail_for_missing_min_kbps,
        ))
        .case(TestCase::new(
            "test_rule_create_fail_for_the_same_type",
            "aa59b00b-ab01-4787-92f8-93a5cdf5e378",
            rule_create_fail_for_the_same_type,
        ))
        .case(
            TestCase::new(
                "test_rule_create_pass_for_direction_ingress",
                "35baf998-ae65-495c-9902-35a0d11e8936",
                rule_create_pass_for_direction_ingress,
            )
            .requires(&[Requirement::Extension("qos-bw-minimum-ingress")]),
        )
        .case(TestCase::new(
            "test_rule_update",
            "a49a6988-2568-47d2-931e-2dbc858943b3",
            rule_update,
        ))
        .case(TestCase::new(
            "test_rule_delete",
            "a7ee6efd-7b33-4a68-927d-275b4f8ba958",
            rule_delete,
        ))
        .case(TestCase::new(
            "test_rule_create_rule_nonexistent_policy",
            "a211222c-5808-46cb-a961-983bbab6b852",
            rule_create_nonexistent_policy,
        ))
        .case(TestCase::new(
            "test_rule_create_forbidden_for_regular_tenants",
            "b4a2e7ad-786f-4927-a85a-e545a93bd274",
            rule_create_forbidden_for_regular_tenants,
        ))
        .case(TestCase::new(
            "test_get_rules_by_policy",
            "de0bd0c2-54d9-4e29-85f1-cfb36ac3ebe2",
            get_rules_by_policy,
        ))
}

fn rule_create(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_minimum_bandwidth_rule(Role::Admin, &policy.id, 1138, Direction::Egress)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: Rule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);
    ensure_eq!(retrieved.min_kbps, 1138);
    ensure_eq!(retrieved.direction, Direction::Egress);

    let rules = admin.list_qos_rules::<Rule>(&policy.id)?;
    ensure!(rules.iter().any(|r| r.id == rule.id), "rule {} is not listed", rule.id);

    let policy_rules = admin.show_qos_policy(&policy.id)?.rules;
    ensure_eq!(policy_rules.len(), 1);
    ensure_eq!(policy_rules[0].id, rule.id);
    ensure_eq!(policy_rules[0].rule_type, Rule::RULE_TYPE);
    Ok(())
}

fn rule_create_fail_for_missing_min_kbps(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let attrs = json!({ "direction": Direction::Egress });
    expect_err!(ctx.create_qos_rule::<Rule>(Role::Admin, &policy.id, attrs), is_bad_request);
    Ok(())
}

fn rule_create_fail_for_the_same_type(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    ctx.create_minimum_bandwidth_rule(Role::Admin, &policy.id, 200, Direction::Egress)?;
    expect_err!(
        ctx.create_minimum_bandwidth_rule(Role::Admin, &policy.id, 201, Direction::Egress),
        is_conflict
    );
    Ok(())
}

fn rule_create_pass_for_direction_ingress(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    ctx.create_minimum_bandwidth_rule(Role::Admin, &policy.id, 201, Direction::Ingress)?;

    let policy_rules = ctx.network(Role::Admin)?.show_qos_policy(&policy.id)?.rules;
    ensure_eq!(policy_rules.len(), 1);
    ensure_eq!(policy_rules[0].rule_type, Rule::RULE_TYPE);
    ensure_eq!(policy_rules[0].direction, Some(Direction::Ingress));
    Ok(())
}

fn rule_update(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_minimum_bandwidth_rule(Role::Admin, &policy.id, 300, Direction::Egress)?;
    let admin = ctx.network(Role::Admin)?;

    let attrs = json!({ "min_kbps": 350, "direction": Direction::Egress });
    admin.update_qos_rule::<Rule>(&policy.id, &rule.id, attrs)?;
    let retrieved: Rule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.min_kbps, 350);
    ensure_eq!(retrieved.direction, Direction::Egress);
    Ok(())
}

fn rule_delete(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_minimum_bandwidth_rule(Role::Admin, &policy.id, 200, Direction::Egress)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: Rule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);

    admin.delete_qos_rule::<Rule>(&policy.id, &rule.id)?;
    expect_err!(admin.show_qos_rule::<Rule>(&policy.id, &rule.id), is_not_found);
    Ok(())
}

fn rule_create_nonexistent_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(
        ctx.create_minimum_bandwidth_rule(Role::Admin, "policy", 200, Direction::Egress),
        is_not_found
    );
    Ok(())
}

fn rule_create_forbidden_for_regular_tenants(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(
        ctx.create_minimum_bandwidth_rule(Role::Primary, "policy", 300, Direction::Egress),
        is_forbidden
    );
    Ok(())
}

fn get_rules_by_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy1 = admin_policy(ctx, "test policy1", false)?;
    let rule1 =
        ctx.create_minimum_bandwidth_rule(Role::Admin, &policy1.id, 200, Direction::Egress)?;
    let policy2 = admin_policy(ctx, "test policy2", false)?;
    let rule2 =
        ctx.create_minimum_bandwidth_rule(Role::Admin, &policy2.id, 5000, Direction::Egress)?;

    let rules = ctx.network(Role::Admin)?.list_qos_rules::<Rule>(&policy1.id)?;
    ensure!(rules.iter().any(|r| r.id == rule1.id), "rule {} is not listed", rule1.id);
    ensure!(rules.iter().all(|r| r.id != rule2.id), "rule {} of another policy", rule2.id);
    Ok(())
}
