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

//! Minimum packet rate rules. Unlike the other rule types, a policy may hold one rule per
//! direction, but `any` conflicts with both `ingress` and `egress`.

use super::admin_policy;
use crate::catalog::{no_fixture, TestCase, TestClass};
use crate::context::{Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::Scenario;
use crate::{ensure, ensure_eq, expect_err, Result};

use neutron_client::{Direction, MinimumPacketRateRule, QosRule};
use serde_json::json;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

type Rule = MinimumPacketRateRule;

pub(super) fn class() -> TestClass<()> {
    TestClass::new("QosMinimumPpsRuleTestJSON", no_fixture)
        .requires(&[
            Requirement::Extension("qos"),
            Requirement::Extension("port-resource-request-groups"),
        ])
        .case(TestCase::new(
            "test_rule_create",
            "66a5b9b4-d4f9-4af8-b238-9e1881b78487",
            rule_create,
        ))
        .case(TestCase::new(
            "test_rule_create_fail_for_missing_min_kpps",
            "6b656b57-d2bf-47f9-89a9-1baad1bd5418",
            rule_create_fail_for_missing_min_kpps,
        ))
        .case(TestCase::new(
            "test_rule_create_fail_for_the_same_type",
            "f41213e5-2ab8-4916-b106-38d2cac5e18c",
            rule_create_fail_for_the_same_type,
        ))
        .case(TestCase::new(
            "test_rule_create_any_direction_when_egress_direction_exists",
            "ceb8e41e-3d72-11ec-a446-d7faae6daec2",
            any_when_egress_exists,
        ))
        .case(TestCase::new(
            "test_rule_create_egress_direction_when_any_direction_exists",
            "a147a71e-3d7b-11ec-8097-278b1afd5fa2",
            egress_when_any_exists,
        ))
        .case(TestCase::new(
            "test_rule_update",
            "522ed09a-1d7f-4c1b-9195-61f19caf916f",
            rule_update,
        ))
        .case(TestCase::new(
            "test_rule_update_direction_conflict",
            "a020e186-3d60-11ec-88ca-d7f5eec22764",
            rule_update_direction_conflict,
        ))
        .case(TestCase::new(
            "test_rule_delete",
            "c49018b6-d358-49a1-a94b-d53224165045",
            rule_delete,
        ))
        .case(TestCase::new(
            "test_rule_create_forbidden_for_regular_tenants",
            "1a6b6128-3d3e-11ec-bf49-57b326d417c0",
            rule_create_forbidden_for_regular_tenants,
        ))
        .case(TestCase::new(
            "test_get_rules_by_policy",
            "1b94f4e2-3d3e-11ec-bb21-6f98e4044b8b",
            get_rules_by_policy,
        ))
}

fn rule_create(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule =
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy.id, 1138, Direction::Egress)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: Rule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);
    ensure_eq!(retrieved.min_kpps, 1138);
    ensure_eq!(retrieved.direction, Direction::Egress);

    let rules = admin.list_qos_rules::<Rule>(&policy.id)?;
    ensure!(rules.iter().any(|r| r.id == rule.id), "rule {} is not listed", rule.id);

    let policy_rules = admin.show_qos_policy(&policy.id)?.rules;
    ensure_eq!(policy_rules.len(), 1);
    ensure_eq!(policy_rules[0].id, rule.id);
    ensure_eq!(policy_rules[0].rule_type, Rule::RULE_TYPE);
    Ok(())
}

fn rule_create_fail_for_missing_min_kpps(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let attrs = json!({ "direction": Direction::Egress });
    expect_err!(ctx.create_qos_rule::<Rule>(Role::Admin, &policy.id, attrs), is_bad_request);
    Ok(())
}

/// Create a rule with `first`, then expect a conflict when adding a rule with `second`.
fn conflicting_directions(ctx: Ctx, first: Direction, second: Direction) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    ctx.create_minimum_packet_rate_rule(Role::Admin, &policy.id, 200, first)?;
    expect_err!(
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy.id, 201, second),
        is_conflict
    );
    Ok(())
}

fn rule_create_fail_for_the_same_type(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    conflicting_directions(ctx, Direction::Egress, Direction::Egress)
}

fn any_when_egress_exists(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    conflicting_directions(ctx, Direction::Egress, Direction::Any)
}

fn egress_when_any_exists(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    conflicting_directions(ctx, Direction::Any, Direction::Egress)
}

fn rule_update(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule =
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy.id, 300, Direction::Egress)?;
    let admin = ctx.network(Role::Admin)?;

    let attrs = json!({ "min_kpps": 350, "direction": Direction::Any });
    admin.update_qos_rule::<Rule>(&policy.id, &rule.id, attrs)?;
    let retrieved: Rule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.min_kpps, 350);
    ensure_eq!(retrieved.direction, Direction::Any);
    Ok(())
}

fn rule_update_direction_conflict(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let egress =
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy.id, 300, Direction::Egress)?;
    let ingress =
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy.id, 300, Direction::Ingress)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: Rule = admin.show_qos_rule(&policy.id, &egress.id)?;
    ensure_eq!(retrieved.direction, Direction::Egress);
    let retrieved: Rule = admin.show_qos_rule(&policy.id, &ingress.id)?;
    ensure_eq!(retrieved.direction, Direction::Ingress);

    let attrs = json!({ "direction": Direction::Any });
    expect_err!(admin.update_qos_rule::<Rule>(&policy.id, &ingress.id, attrs), is_conflict);
    Ok(())
}

fn rule_delete(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule =
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy.id, 200, Direction::Egress)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: Rule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);

    admin.delete_qos_rule::<Rule>(&policy.id, &rule.id)?;
    expect_err!(admin.show_qos_rule::<Rule>(&policy.id, &rule.id), is_not_found);
    Ok(())
}

fn rule_create_forbidden_for_regular_tenants(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(
        ctx.create_minimum_packet_rate_rule(Role::Primary, "policy", 300, Direction::Egress),
        is_forbidden
    );
    Ok(())
}

fn get_rules_by_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy1 = admin_policy(ctx, "test policy1", false)?;
    let rule1 =
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy1.id, 200, Direction::Egress)?;
    let policy2 = admin_policy(ctx, "test policy2", false)?;
    let rule2 =
        ctx.create_minimum_packet_rate_rule(Role::Admin, &policy2.id, 5000, Direction::Egress)?;

    let rules = ctx.network(Role::Admin)?.list_qos_rules::<Rule>(&policy1.id)?;
    ensure!(rules.iter().any(|r| r.id == rule1.id), "rule {} is not listed", rule1.id);
    ensure!(rules.iter().all(|r| r.id != rule2.id), "rule {} of another policy", rule2.id);
    Ok(())
}
