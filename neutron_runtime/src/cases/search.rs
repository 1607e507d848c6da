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

//! Sorting and pagination of QoS policy lists.
//!
//! The class fixture creates a set of policies sharing a unique description, and every listing
//! filters by it. Names include a duplicate to check the order of equal sort keys.

use crate::catalog::{TestCase, TestClass};
use crate::context::{Role, TestContext};
use crate::requirements::Requirement;
use crate::scenario::Scenario;
use crate::{ensure, ensure_eq, Error, Result};

use neutron_client::{QosPolicy, Query};
use serde::Deserialize;
use serde_json::{json, Value};

type Ctx<'a, 'b> = &'a mut TestContext<'b>;

const DESCRIPTION: &str = "search-criteria-test";
const RESOURCE_NAMES: [&str; 5] = ["test1", "abc1", "test10", "123test", "test1"];
const SORT_KEY: &str = "name";

pub(super) fn class() -> TestClass<Vec<QosPolicy>> {
    TestClass::new("QosSearchCriteriaTest", create_policies)
        .requires(&[Requirement::Extension("qos")])
        .case(TestCase::new(
            "test_list_sorts_asc",
            "55fc0103-fdc1-4d34-ab62-c579bb739a91",
            list_sorts_asc,
        ))
        .case(TestCase::new(
            "test_list_sorts_desc",
            "13e08ac3-bfed-426b-892a-b3b158560c23",
            list_sorts_desc,
        ))
        .case(TestCase::new(
            "test_list_pagination",
            "719e61cc-e33c-4918-aa4d-1a791e6e0e86",
            list_pagination,
        ))
        .case(TestCase::new(
            "test_list_pagination_with_marker",
            "3bd8fb58-c0f8-4954-87fb-f286e1eb096a",
            list_pagination_with_marker,
        ))
        .case(TestCase::new(
            "test_list_pagination_with_href_links",
            "3bad0747-8082-46e9-be4d-c428a842db41",
            list_pagination_with_href_links,
        ))
        .case(TestCase::new(
            "test_list_pagination_page_reverse_asc",
            "d6a8bacd-d5e8-4ef3-bc55-23ca6998d208",
            list_pagination_page_reverse_asc,
        ))
        .case(TestCase::new(
            "test_list_pagination_page_reverse_desc",
            "0b9aecdc-2b27-421b-b104-53d24e905ae8",
            list_pagination_page_reverse_desc,
        ))
        .case(TestCase::new(
            "test_list_pagination_page_reverse_with_href_links",
            "1a3dc257-dafd-4870-8c71-639ae7ddc6ea",
            list_pagination_page_reverse_with_href_links,
        ))
        .case(TestCase::new(
            "test_list_no_pagination_limit_0",
            "40e09b53-4eb8-4526-9181-d438c8005a20",
            list_no_pagination_limit_0,
        ))
}

fn create_policies(ctx: Ctx, _: &Scenario) -> Result<Vec<QosPolicy>> {
    RESOURCE_NAMES
        .iter()
        .map(|name| {
            ctx.create_qos_policy(Role::Admin, json!({ "name": name, "description": DESCRIPTION }))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

/// One page of a policy listing
#[derive(Debug, Deserialize)]
struct Page {
    policies: Vec<QosPolicy>,
    #[serde(default)]
    policies_links: Vec<Link>,
}

impl Page {
    fn parse(body: Value) -> Result<Self> {
        serde_json::from_value(body).map_err(|e| Error::Client(e.into()))
    }

    fn link(&self, rel: &str) -> Option<&str> {
        self.policies_links.iter().find(|l| l.rel == rel).map(|l| l.href.as_str())
    }

    fn names(&self) -> Vec<String> {
        self.policies.iter().map(|p| p.name.clone()).collect()
    }

    fn ids(&self) -> Vec<String> {
        self.policies.iter().map(|p| p.id.clone()).collect()
    }
}

/// Query restricted to the fixture policies, sorted by name.
fn sorted(direction: &str) -> Query {
    Query::new()
        .with("description", DESCRIPTION)
        .with("sort_key", SORT_KEY)
        .with("sort_dir", direction)
}

fn fetch(ctx: Ctx, query: &Query) -> Result<Page> {
    Page::parse(ctx.network(Role::Admin)?.list_qos_policies_raw(query)?)
}

/// All fixture policies in one go
fn fetch_all(ctx: Ctx, direction: &str) -> Result<Page> {
    let page = fetch(ctx, &sorted(direction))?;
    ensure!(!page.policies.is_empty(), "no policies listed");
    Ok(page)
}

fn list_sorts(ctx: Ctx, direction: &str) -> Result<()> {
    let names = fetch_all(ctx, direction)?.names();
    let mut expected = names.clone();
    expected.sort();
    if direction == "desc" {
        expected.reverse();
    }
    ensure_eq!(names, expected);
    Ok(())
}

fn list_sorts_asc(ctx: Ctx, _: &Scenario, _: &Vec<QosPolicy>) -> Result<()> {
    list_sorts(ctx, "asc")
}

fn list_sorts_desc(ctx: Ctx, _: &Scenario, _: &Vec<QosPolicy>) -> Result<()> {
    list_sorts(ctx, "desc")
}

fn list_pagination(ctx: Ctx, _: &Scenario, policies: &Vec<QosPolicy>) -> Result<()> {
    for limit in 1..=policies.len() {
        let query = Query::new().with("description", DESCRIPTION).with("limit", limit);
        let page = fetch(ctx, &query)?;
        ensure_eq!(page.policies.len(), limit, "policies listed with limit {}", limit);
    }
    Ok(())
}

fn list_pagination_with_marker(ctx: Ctx, _: &Scenario, _: &Vec<QosPolicy>) -> Result<()> {
    let expected = fetch_all(ctx, "asc")?.ids();

    let mut ids: Vec<String> = Vec::new();
    for _ in 0..expected.len() {
        let mut query = sorted("asc").with("limit", 1);
        if let Some(marker) = ids.last() {
            query.push("marker", marker);
        }
        let page = fetch(ctx, &query)?;
        ensure_eq!(page.policies.len(), 1);
        ids.extend(page.ids());
    }
    ensure_eq!(ids, expected);
    Ok(())
}

/// Follow the `rel` link of a page. Fails if the page has no such link.
fn follow(ctx: Ctx, page: &Page, rel: &str) -> Result<Page> {
    let href = page
        .link(rel)
        .ok_or_else(|| Error::Assertion(format!("page has no `{}` link", rel)))?;
    fetch(ctx, &Query::from_href(href))
}

fn list_pagination_with_href_links(ctx: Ctx, _: &Scenario, _: &Vec<QosPolicy>) -> Result<()> {
    let expected = fetch_all(ctx, "asc")?.ids();

    // forward, one by one
    let mut forward: Vec<String> = Vec::new();
    let mut page = fetch(ctx, &sorted("asc").with("limit", 1))?;
    forward.extend(page.ids());
    for _ in 1..expected.len() {
        page = follow(ctx, &page, "next")?;
        ensure_eq!(page.policies.len(), 1);
        forward.extend(page.ids());
    }
    ensure_eq!(forward, expected);

    // the page after the last one is empty and has no next link
    page = follow(ctx, &page, "next")?;
    ensure!(page.policies.is_empty(), "policies listed after the last page");
    ensure!(page.link("next").is_none(), "last page has a next link");

    // and back again
    let mut backward: Vec<String> = Vec::new();
    for _ in 0..expected.len() {
        page = follow(ctx, &page, "previous")?;
        ensure_eq!(page.policies.len(), 1);
        backward.extend(page.ids());
    }
    backward.reverse();
    ensure_eq!(backward, expected);
    Ok(())
}

fn list_pagination_page_reverse(ctx: Ctx, direction: &str) -> Result<()> {
    let expected = fetch_all(ctx, direction)?;
    let query =
        sorted(direction).with("limit", expected.policies.len()).with("page_reverse", "True");
    let page = fetch(ctx, &query)?;
    ensure_eq!(page.names(), expected.names());
    Ok(())
}

fn list_pagination_page_reverse_asc(ctx: Ctx, _: &Scenario, _: &Vec<QosPolicy>) -> Result<()> {
    list_pagination_page_reverse(ctx, "asc")
}

fn list_pagination_page_reverse_desc(ctx: Ctx, _: &Scenario, _: &Vec<QosPolicy>) -> Result<()> {
    list_pagination_page_reverse(ctx, "desc")
}

/// Start at the end of the list and walk back two policies at a time.
fn list_pagination_page_reverse_with_href_links(
    ctx: Ctx,
    _: &Scenario,
    _: &Vec<QosPolicy>,
) -> Result<()> {
    const PAGE_SIZE: usize = 2;
    let expected = fetch_all(ctx, "desc")?.names();

    let query = sorted("desc").with("limit", PAGE_SIZE).with("page_reverse", "True");
    let mut page = fetch(ctx, &query)?;
    let mut names = page.names();
    // one extra round trip covers the empty page at the very beginning
    for _ in 0..expected.len() / PAGE_SIZE + 1 {
        if page.link("previous").is_none() {
            break;
        }
        page = follow(ctx, &page, "previous")?;
        ensure!(page.policies.len() <= PAGE_SIZE, "page larger than the limit");
        let mut before = page.names();
        before.extend(names);
        names = before;
    }
    ensure_eq!(names, expected);
    Ok(())
}

fn list_no_pagination_limit_0(ctx: Ctx, _: &Scenario, _: &Vec<QosPolicy>) -> Result<()> {
    let query = Query::new().with("description", DESCRIPTION).with("limit", 0);
    let page = fetch(ctx, &query)?;
    ensure!(
        page.policies.len() >= RESOURCE_NAMES.len(),
        "only {} policies listed with limit 0",
        page.policies.len()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn page_links() {
        let body = json!({
            "policies": [{ "id": "p1", "name": "abc1" }, { "id": "p2", "name": "test1" }],
            "policies_links": [
                { "rel": "next", "href": "http://neutron/v2.0/qos/policies?limit=2&marker=p2" },
                { "rel": "previous", "href": "http://neutron/v2.0/qos/policies?page_reverse=True" },
            ],
        });
        let page = Page::parse(body).unwrap();
        assert_eq!(page.names(), vec!["abc1", "test1"]);
        assert_eq!(page.ids(), vec!["p1", "p2"]);
        let next = Query::from_href(page.link("next").unwrap());
        assert_eq!(next.get("marker"), Some("p2"));
        assert!(page.link("self").is_none());

        let last = Page::parse(json!({ "policies": [] })).unwrap();
        assert!(last.policies.is_empty());
        assert!(last.link("next").is_none());
    }

    #[test]
    fn sorted_query() {
        let query = sorted("desc");
        assert_eq!(query.get("description"), Some(DESCRIPTION));
        assert_eq!(query.get("sort_key"), Some("name"));
        assert_eq!(query.get("sort_dir"), Some("desc"));
    }
}
