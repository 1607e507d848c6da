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

//! # Query parameters for list calls

use std::fmt;

/// Ordered list of query parameters. Keys may repeat, which Neutron uses for `fields`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter and return the query
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Add a parameter in place
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.params.push((key.into(), value.to_string()));
    }

    /// Parse the query part of a link, like the `next` and `previous` hrefs Neutron returns for
    /// paginated lists. Everything before the `?` is ignored.
    pub fn from_href(href: &str) -> Self {
        let query = match href.find('?') {
            Some(pos) => &href[pos + 1..],
            None => return Self::default(),
        };
        let decode = |raw: &str| {
            urlencoding::decode(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string())
        };
        let params = query
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| match part.find('=') {
                Some(pos) => (decode(&part[..pos]), decode(&part[pos + 1..])),
                None => (decode(part), String::new()),
            })
            .collect();
        Self { params }
    }

    /// Value of the first parameter with the given key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Returns true if no parameter is set
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Append the query string to a path
    pub(crate) fn apply(&self, path: impl AsRef<str>) -> String {
        if self.is_empty() {
            path.as_ref().to_string()
        } else {
            format!("{}?{}", path.as_ref(), self)
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>();
        write!(f, "{}", parts.join("&"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repeated_fields() {
        let q = Query::new().with("fields", "id").with("fields", "action");
        assert_eq!(q.apply("rbac-policies"), "rbac-policies?fields=id&fields=action");
    }

    #[test]
    fn href() {
        let q = Query::from_href(
            "http://10.0.0.1:9696/v2.0/qos/policies?limit=1&marker=abc&description=a%20b",
        );
        assert_eq!(q.get("limit"), Some("1"));
        assert_eq!(q.get("marker"), Some("abc"));
        assert_eq!(q.get("description"), Some("a b"));
        assert_eq!(q.get("page_reverse"), None);
        assert!(Query::from_href("http://host/v2.0/qos/policies").is_empty());
    }

    #[test]
    fn encoding() {
        let q = Query::new().with("name", "a b&c");
        assert_eq!(q.to_string(), "name=a%20b%26c");
        assert_eq!(Query::new().apply("networks"), "networks");
    }
}
