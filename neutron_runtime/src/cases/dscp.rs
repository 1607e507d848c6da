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

//! DSCP marking rules.

use super::admin_policy;
use crate::catalog::{no_fixture, TestCase, TestClass};
use crate::context::{Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::Scenario;
use crate::{ensure, ensure_eq, expect_err, Result};

use neutron_client::{DscpMarkingRule, QosRule};
use serde_json::json;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

const MARK1: u8 = 56;
const MARK2: u8 = 48;

/// Marks accepted by the API. Everything else in `0..=56` is rejected.
pub const VALID_DSCP_MARKS: [u8; 21] =
    [0, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30, 32, 34, 36, 38, 40, 46, 48, 56];

pub(super) fn class() -> TestClass<()> {
    TestClass::new("QosDscpMarkingRuleTestJSON", no_fixture)
        .requires(&[
            Requirement::Extension("qos"),
            Requirement::QosRuleType(DscpMarkingRule::RULE_TYPE),
        ])
        .case(TestCase::new(
            "test_rule_create",
            "f5cbaceb-5829-497c-9c60-ad70969e9a08",
            rule_create,
        ))
        .case(TestCase::new(
            "test_rule_create_fail_for_the_same_type",
            "08553ffe-030f-4037-b486-7e0b8fb9385a",
            rule_create_fail_for_the_same_type,
        ))
        .case(TestCase::new(
            "test_rule_update",
            "76f632e5-3175-4408-9a32-3625e599c8a2",
            rule_update,
        ))
        .case(TestCase::new(
            "test_rule_delete",
            "74f81904-c35f-48a3-adae-1f5424cb3c18",
            rule_delete,
        ))
        .case(TestCase::new(
            "test_rule_create_rule_nonexistent_policy",
            "9cb8ef5c-96fc-4978-9ee0-e3b02bab628a",
            rule_create_nonexistent_policy,
        ))
        .case(TestCase::new(
            "test_rule_create_forbidden_for_regular_tenants",
            "bf6002ea-29de-486f-b65d-08aea6d4c4e2",
            rule_create_forbidden_for_regular_tenants,
        ))
        .case(TestCase::new(
            "test_invalid_rule_create",
            "33646b08-4f05-4493-a48a-bde768a18533",
            invalid_rule_create,
        ))
        .case(TestCase::new(
            "test_get_rules_by_policy",
            "c565131d-4c80-4231-b0f3-9ae2be4de129",
            get_rules_by_policy,
        ))
        .case(TestCase::new(
            "test_qos_dscp_create_and_update",
            "19ed2286-ccb1-11e9-87d7-525400d6f522",
            create_and_update,
        ))
}

fn rule_create(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_dscp_marking_rule(Role::Admin, &policy.id, MARK1)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: DscpMarkingRule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);
    ensure_eq!(retrieved.dscp_mark, MARK1);

    let rules = admin.list_qos_rules::<DscpMarkingRule>(&policy.id)?;
    ensure!(rules.iter().any(|r| r.id == rule.id), "rule {} is not listed", rule.id);

    let policy_rules = admin.show_qos_policy(&policy.id)?.rules;
    ensure_eq!(policy_rules.len(), 1);
    ensure_eq!(policy_rules[0].id, rule.id);
    ensure_eq!(policy_rules[0].rule_type, DscpMarkingRule::RULE_TYPE);
    Ok(())
}

fn rule_create_fail_for_the_same_type(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    ctx.create_dscp_marking_rule(Role::Admin, &policy.id, MARK1)?;
    expect_err!(ctx.create_dscp_marking_rule(Role::Admin, &policy.id, MARK2), is_conflict);
    Ok(())
}

fn rule_update(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_dscp_marking_rule(Role::Admin, &policy.id, MARK1)?;
    let admin = ctx.network(Role::Admin)?;

    admin.update_qos_rule::<DscpMarkingRule>(&policy.id, &rule.id, json!({ "dscp_mark": MARK2 }))?;
    let retrieved: DscpMarkingRule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.dscp_mark, MARK2);
    Ok(())
}

fn rule_delete(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rule = ctx.create_dscp_marking_rule(Role::Admin, &policy.id, MARK1)?;
    let admin = ctx.network(Role::Admin)?;

    let retrieved: DscpMarkingRule = admin.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.id, rule.id);

    admin.delete_qos_rule::<DscpMarkingRule>(&policy.id, &rule.id)?;
    expect_err!(admin.show_qos_rule::<DscpMarkingRule>(&policy.id, &rule.id), is_not_found);
    Ok(())
}

fn rule_create_nonexistent_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(ctx.create_dscp_marking_rule(Role::Admin, "policy", MARK1), is_not_found);
    Ok(())
}

fn rule_create_forbidden_for_regular_tenants(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    expect_err!(ctx.create_dscp_marking_rule(Role::Primary, "policy", MARK1), is_forbidden);
    Ok(())
}

fn invalid_rule_create(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy = admin_policy(ctx, "test policy", false)?;
    expect_err!(ctx.create_dscp_marking_rule(Role::Admin, &policy.id, 58), is_bad_request);
    Ok(())
}

fn get_rules_by_policy(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let policy1 = admin_policy(ctx, "test policy1", false)?;
    let rule1 = ctx.create_dscp_marking_rule(Role::Admin, &policy1.id, MARK1)?;
    let policy2 = admin_policy(ctx, "test policy2", false)?;
    let rule2 = ctx.create_dscp_marking_rule(Role::Admin, &policy2.id, MARK2)?;

    let rules = ctx.network(Role::Admin)?.list_qos_rules::<DscpMarkingRule>(&policy1.id)?;
    ensure!(rules.iter().any(|r| r.id == rule1.id), "rule {} is not listed", rule1.id);
    ensure!(rules.iter().all(|r| r.id != rule2.id), "rule {} of another policy", rule2.id);
    Ok(())
}

/// Sweep all marks from 8 to 56 on a rule of a shared policy bound to a network. Valid marks are
/// updated and read back, invalid ones are rejected on creation.
fn create_and_update(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let network = ctx.create_network(Role::Primary, json!({}))?;
    let policy = admin_policy(ctx, "test-qos-policy", true)?;
    let admin = ctx.network(Role::Admin)?;
    admin.update_network(&network.id, json!({ "qos_policy_id": policy.id }))?;

    let rule = ctx.create_dscp_marking_rule(Role::Admin, &policy.id, VALID_DSCP_MARKS[0])?;
    let retrieved: DscpMarkingRule =
        ctx.network(Role::Primary)?.show_qos_rule(&policy.id, &rule.id)?;
    ensure_eq!(retrieved.dscp_mark, VALID_DSCP_MARKS[0], "initial DSCP mark");

    for mark in VALID_DSCP_MARKS[1]..=MARK1 {
        if VALID_DSCP_MARKS.contains(&mark) {
            admin.update_qos_rule::<DscpMarkingRule>(
                &policy.id,
                &rule.id,
                json!({ "dscp_mark": mark }),
            )?;
            let retrieved: DscpMarkingRule = admin.show_qos_rule(&policy.id, &rule.id)?;
            ensure_eq!(retrieved.dscp_mark, mark, "DSCP mark after the update");
        } else {
            let created = ctx.create_dscp_marking_rule(Role::Admin, &policy.id, mark);
            expect_err!(created, is_bad_request);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_marks() {
        let invalid: Vec<u8> = (8..=56).filter(|m| !VALID_DSCP_MARKS.contains(m)).collect();
        assert!(invalid.contains(&42));
        assert!(invalid.contains(&44));
        assert!((50..=54).all(|m| invalid.contains(&m)));
        assert!(VALID_DSCP_MARKS.iter().all(|m| m % 2 == 0));
    }
}
