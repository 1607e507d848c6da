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

//! Sharing QoS policies between projects with RBAC policies.

use super::admin_policy;
use crate::catalog::{no_fixture, TestCase, TestClass};
use crate::context::{Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::Scenario;
use crate::{ensure, ensure_eq, expect_err, Error, Result};

use neutron_client::{QosPolicy, Query, RbacPolicy};
use serde_json::json;
use std::collections::HashSet;

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

const QOS_POLICY: &str = "qos_policy";
const ACCESS_AS_SHARED: &str = "access_as_shared";
const WILDCARD: &str = "*";

pub(super) fn class() -> TestClass<()> {
    TestClass::new("RbacSharedQosPoliciesTest", no_fixture)
        .requires(&[Requirement::Extension("qos"), Requirement::AltCredentials])
        .case(TestCase::new(
            "test_policy_sharing_with_wildcard",
            "b9dcf582-d3b3-11e5-950a-54ee756c66df",
            policy_sharing_with_wildcard,
        ))
        .case(TestCase::new(
            "test_net_bound_shared_policy_wildcard_and_project_id_wild_remove",
            "328b1f70-d424-11e5-a57f-54ee756c66df",
            net_bound_wildcard_removed,
        ))
        .case(TestCase::new(
            "test_net_bound_shared_policy_wildcard_and_projectid_wild_remains",
            "1997b00c-0c75-4e43-8ce2-999f9fa555ee",
            net_bound_wildcard_remains,
        ))
        .case(TestCase::new(
            "test_policy_sharing_with_wildcard_and_project_id",
            "2ace9adc-da6e-11e5-aafe-54ee756c66df",
            policy_sharing_with_wildcard_and_project_id,
        ))
        .case(TestCase::new(
            "test_policy_target_update",
            "9f85c76a-a350-11e5-8ae5-54ee756c66df",
            policy_target_update,
        ))
        .case(TestCase::new(
            "test_network_presence_prevents_policy_rbac_policy_deletion",
            "a9b39f46-a350-11e5-97c7-54ee756c66df",
            network_presence_prevents_deletion,
        ))
        .case(TestCase::new(
            "test_regular_client_shares_to_another_regular_client",
            "b0fe87e8-a350-11e5-9f08-54ee756c66df",
            regular_client_shares_to_another,
        ))
        .case(TestCase::new(
            "test_filter_fields",
            "ba88d0ca-a350-11e5-a06f-54ee756c66df",
            filter_fields,
        ))
        .case(TestCase::new(
            "test_rbac_policy_show",
            "c10d993a-a350-11e5-9c7a-54ee756c66df",
            rbac_policy_show,
        ))
        .case(TestCase::new(
            "test_filter_rbac_policies",
            "c7496f86-a350-11e5-b380-54ee756c66df",
            filter_rbac_policies,
        ))
        .case(TestCase::new(
            "test_regular_client_blocked_from_sharing_anothers_policy",
            "cd7d755a-a350-11e5-a344-54ee756c66df",
            regular_client_blocked_from_sharing,
        ))
}

fn share(ctx: Ctx, policy_id: &str, target: &str) -> Result<RbacPolicy> {
    ctx.create_rbac_policy(
        Role::Admin,
        json!({
            "object_type": QOS_POLICY,
            "object_id": policy_id,
            "action": ACCESS_AS_SHARED,
            "target_tenant": target,
        }),
    )
}

/// Admin-owned policy, shared to a single project.
fn policy_shared_to(ctx: Ctx, project_id: &str) -> Result<(QosPolicy, RbacPolicy)> {
    let policy = admin_policy(ctx, "test policy", false)?;
    let rbac = share(ctx, &policy.id, project_id)?;
    Ok((policy, rbac))
}

fn is_listed(policies: &[QosPolicy], id: &str) -> bool {
    policies.iter().any(|p| p.id == id)
}

fn policy_sharing_with_wildcard(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let alt = ctx.network(Role::Alt)?;
    let policy = ctx.create_qos_policy(
        Role::Admin,
        json!({
            "description": "test-shared-policy",
            "shared": false,
            "project_id": admin.tenant_id(),
        }),
    )?;
    ensure!(!is_listed(&alt.list_qos_policies(&Query::new())?, &policy.id));

    // shared: false -> true
    admin.update_qos_policy(&policy.id, json!({ "shared": true }))?;
    alt.show_qos_policy(&policy.id)?;
    let wildcard = admin
        .list_rbac_policies(&Query::new())?
        .into_iter()
        .find(|r| r.object_id == policy.id && r.target_tenant == WILDCARD)
        .ok_or_else(|| Error::Assertion(format!("no wildcard rbac policy for {}", policy.id)))?;
    ensure_eq!(wildcard.object_type, QOS_POLICY);
    ensure_eq!(wildcard.action, ACCESS_AS_SHARED);
    ensure_eq!(wildcard.project_id.as_deref(), Some(admin.tenant_id()));

    // a bound network keeps the policy shared
    let network = ctx.create_network(Role::Admin, json!({ "qos_policy_id": policy.id }))?;
    expect_err!(admin.update_qos_policy(&policy.id, json!({ "shared": false })), is_conflict);

    admin.delete_network(&network.id)?;
    admin.update_qos_policy(&policy.id, json!({ "shared": false }))?;
    ensure!(!is_listed(&alt.list_qos_policies(&Query::new())?, &policy.id));
    Ok(())
}

/// A policy shared both to the primary project and to everyone, used by a primary network.
fn net_bound_rbacs(ctx: Ctx) -> Result<(RbacPolicy, RbacPolicy)> {
    let project = ctx.network(Role::Primary)?.tenant_id();
    let (policy, project_rbac) = policy_shared_to(ctx, project)?;
    let wildcard_rbac = share(ctx, &policy.id, WILDCARD)?;
    ctx.create_network(Role::Primary, json!({ "qos_policy_id": policy.id }))?;
    Ok((project_rbac, wildcard_rbac))
}

fn net_bound_wildcard_removed(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let (project_rbac, wildcard_rbac) = net_bound_rbacs(ctx)?;
    // the project share remains
    ctx.network(Role::Admin)?.delete_rbac_policy(&wildcard_rbac.id)?;
    ctx.network(Role::Primary)?.list_rbac_policies(&Query::new().with("id", &project_rbac.id))?;
    Ok(())
}

fn net_bound_wildcard_remains(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let (project_rbac, wildcard_rbac) = net_bound_rbacs(ctx)?;
    // the wildcard share remains
    ctx.network(Role::Admin)?.delete_rbac_policy(&project_rbac.id)?;
    ctx.network(Role::Primary)?.list_rbac_policies(&Query::new().with("id", &wildcard_rbac.id))?;
    Ok(())
}

fn policy_sharing_with_wildcard_and_project_id(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let primary = ctx.network(Role::Primary)?;
    let alt = ctx.network(Role::Alt)?;
    let (policy, rbac) = policy_shared_to(ctx, primary.tenant_id())?;

    ensure!(primary.show_qos_policy(&policy.id)?.shared, "policy is not shared to the project");
    expect_err!(alt.show_qos_policy(&policy.id), is_not_found);

    // global share
    admin.update_qos_policy(&policy.id, json!({ "shared": true }))?;
    ensure!(alt.show_qos_policy(&policy.id)?.shared, "policy is not shared globally");

    // global unshare, the project share remains
    admin.update_qos_policy(&policy.id, json!({ "shared": false }))?;
    primary.show_qos_policy(&policy.id)?;
    expect_err!(alt.show_qos_policy(&policy.id), is_not_found);
    ensure!(admin.list_rbac_policies(&Query::new())?.contains(&rbac));
    Ok(())
}

fn policy_target_update(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let primary = ctx.network(Role::Primary)?;
    let alt = ctx.network(Role::Alt)?;
    let (_, rbac) = policy_shared_to(ctx, primary.tenant_id())?;

    let updated = ctx
        .network(Role::Admin)?
        .update_rbac_policy(&rbac.id, json!({ "target_tenant": alt.tenant_id() }))?;
    ensure_eq!(updated.target_tenant, alt.tenant_id());
    let expected = RbacPolicy { target_tenant: alt.tenant_id().to_string(), ..rbac };
    ensure_eq!(updated, expected, "only the target changes");
    Ok(())
}

fn network_presence_prevents_deletion(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let alt = ctx.network(Role::Alt)?;
    let (policy, rbac) = policy_shared_to(ctx, alt.tenant_id())?;
    ctx.create_network(Role::Alt, json!({ "qos_policy_id": policy.id }))?;

    // the network needs the share
    expect_err!(admin.delete_rbac_policy(&rbac.id), is_conflict);

    // a wildcard covers the network as well
    let wildcard = share(ctx, &policy.id, WILDCARD)?;
    admin.delete_rbac_policy(&rbac.id)?;

    // now the wildcard is the last one
    expect_err!(admin.delete_rbac_policy(&wildcard.id), is_conflict);
    expect_err!(
        admin.update_rbac_policy(&wildcard.id, json!({ "target_tenant": alt.tenant_id() })),
        is_conflict
    );
    Ok(())
}

fn regular_client_shares_to_another(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let primary = ctx.network(Role::Primary)?;
    let alt = ctx.network(Role::Alt)?;
    let policy = admin_policy(ctx, "test policy", false)?;
    expect_err!(primary.show_qos_policy(&policy.id), is_not_found);

    let rbac = share(ctx, &policy.id, primary.tenant_id())?;
    primary.show_qos_policy(&policy.id)?;
    ensure!(admin.list_rbac_policies(&Query::new())?.contains(&rbac));

    // the rbac policy belongs to the primary project, the alt project cannot see it
    let visible = alt.list_rbac_policies(&Query::new())?;
    ensure!(visible.iter().all(|r| r.id != rbac.id), "{} is visible to alt", rbac.id);
    Ok(())
}

fn filter_fields(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let alt = ctx.network(Role::Alt)?;
    let policy = admin_policy(ctx, "test policy", false)?;
    share(ctx, &policy.id, alt.tenant_id())?;

    let field_sets: &[&[&str]] = &[
        &["id"],
        &["id", "action"],
        &["object_type", "object_id"],
        &["project_id", "target_tenant"],
    ];
    let admin = ctx.network(Role::Admin)?;
    for fields in field_sets {
        let mut query = Query::new();
        for field in fields.iter() {
            query.push("fields", field);
        }
        let listed = admin.list_rbac_policies_raw(&query)?;
        let first = listed.first().and_then(|p| p.as_object()).ok_or_else(|| {
            Error::Assertion(format!("no rbac policy listed with fields {:?}", fields))
        })?;
        let keys: HashSet<&str> = first.keys().map(String::as_str).collect();
        let expected: HashSet<&str> = fields.iter().copied().collect();
        ensure_eq!(keys, expected);
    }
    Ok(())
}

fn rbac_policy_show(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let primary = ctx.network(Role::Primary)?;
    let (policy, project_rbac) = policy_shared_to(ctx, primary.tenant_id())?;
    let wildcard_rbac = share(ctx, &policy.id, WILDCARD)?;

    let admin = ctx.network(Role::Admin)?;
    ensure_eq!(admin.show_rbac_policy(&project_rbac.id)?, project_rbac);
    ensure_eq!(admin.show_rbac_policy(&wildcard_rbac.id)?, wildcard_rbac);
    Ok(())
}

fn filter_rbac_policies(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let admin = ctx.network(Role::Admin)?;
    let alt = ctx.network(Role::Alt)?;
    let policy = admin_policy(ctx, "test policy", false)?;
    let rbac1 = share(ctx, &policy.id, alt.tenant_id())?;
    let rbac2 = share(ctx, &policy.id, admin.tenant_id())?;

    for rbac in [&rbac1, &rbac2].iter() {
        let listed = admin.list_rbac_policies(&Query::new().with("id", &rbac.id))?;
        ensure_eq!(listed.len(), 1);
        ensure_eq!(listed[0].id, rbac.id);
    }
    Ok(())
}

fn regular_client_blocked_from_sharing(ctx: Ctx, _: &Scenario, _: &()) -> Result<()> {
    let primary = ctx.network(Role::Primary)?;
    let alt = ctx.network(Role::Alt)?;
    let (policy, _) = policy_shared_to(ctx, primary.tenant_id())?;

    expect_err!(
        ctx.create_rbac_policy(
            Role::Primary,
            json!({
                "object_type": QOS_POLICY,
                "object_id": policy.id,
                "action": ACCESS_AS_SHARED,
                "target_tenant": alt.tenant_id(),
            }),
        ),
        is_bad_request
    );
    // the share itself is invisible to the project it targets
    ensure!(primary.list_rbac_policies(&Query::new())?.is_empty());
    Ok(())
}
