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

//! # Scenario Expander
//!
//! A test class can be parameterized by several independent axes, each a list of named variants.
//! The class then runs once for every combination of variants. For instance, the axes
//!
//! ```text
//! source:      "SRC with FIP"  {src_has_fip: true},  "SRC without FIP"  {src_has_fip: false}
//! destination: "DEST with FIP" {dest_has_fip: true}, "DEST without FIP" {dest_has_fip: false}
//! ```
//!
//! expand to four scenarios, the first one named `SRC with FIP DEST with FIP`. The enumeration is
//! row-major: the first axis varies slowest.

use itertools::Itertools;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Parameters of a variant or a scenario
pub type Params = BTreeMap<String, Value>;

/// Separator between the variant labels in a scenario name
pub const NAME_SEPARATOR: &str = " ";

/// Error while expanding the scenario axes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    /// Two axes contribute the same parameter key
    #[error("Parameter {key} is set by both axis {first} and axis {second}")]
    ParamCollision {
        /// The colliding key
        key: String,
        /// Name of the first axis setting the key
        first: String,
        /// Name of the second axis setting the key
        second: String,
    },
    /// The same label appears twice in one axis, which would produce ambiguous names.
    #[error("Axis {axis} contains the label {label} twice")]
    DuplicateLabel {
        /// Name of the axis
        axis: String,
        /// The duplicate label
        label: String,
    },
}

/// One value of an axis
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// Label, used to build the scenario name
    pub label: String,
    /// Parameters contributed by this variant
    pub params: Params,
}

impl Variant {
    /// Create a new variant
    pub fn new(label: impl Into<String>, params: Params) -> Self {
        Self { label: label.into(), params }
    }
}

/// Independent dimension of variation
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// Name of the axis (only used in error messages)
    pub name: String,
    /// Variants, in order
    pub variants: Vec<Variant>,
}

impl Axis {
    /// Create an axis without any variant
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), variants: Vec::new() }
    }

    /// Add a variant to the axis
    pub fn variant(mut self, label: impl Into<String>, params: Params) -> Self {
        self.variants.push(Variant::new(label, params));
        self
    }

    /// Axis with two variants, setting the parameter `key` to `true` and `false`.
    pub fn boolean(
        name: impl Into<String>,
        key: impl Into<String>,
        true_label: impl Into<String>,
        false_label: impl Into<String>,
    ) -> Self {
        let key = key.into();
        Self::new(name)
            .variant(true_label, single(key.clone(), Value::Bool(true)))
            .variant(false_label, single(key, Value::Bool(false)))
    }

    /// Axis with one variant per value, each setting the parameter `key`.
    pub fn values<L, V>(name: impl Into<String>, key: &str, values: Vec<(L, V)>) -> Self
    where
        L: Into<String>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .fold(Self::new(name), |axis, (label, v)| axis.variant(label, single(key, v.into())))
    }

    fn keys(&self) -> HashSet<&str> {
        self.variants.iter().flat_map(|v| v.params.keys()).map(|k| k.as_str()).collect()
    }
}

fn single(key: impl Into<String>, value: Value) -> Params {
    let mut params = Params::new();
    params.insert(key.into(), value);
    params
}

/// One concrete combination of variants
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Labels of the variants joined by [`NAME_SEPARATOR`]. Empty if there are no axes.
    pub name: String,
    /// Labels of the contributing variants, in axis order
    pub labels: Vec<String>,
    /// Union of the parameters of all contributing variants
    pub params: Params,
}

impl Scenario {
    /// The scenario without any parameters
    pub fn empty() -> Self {
        Self { name: String::new(), labels: Vec::new(), params: Params::new() }
    }

    /// Get a parameter
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Get a boolean parameter. Missing or non-boolean parameters are `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Get a string parameter
    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Get an integer parameter
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Expand the axes into the full cartesian product.
///
/// - Zero axes result in a single, empty scenario.
/// - An axis without variants results in no scenario at all.
/// - A label appearing twice in the same axis, or a key set by variants of two different axes, is
///   an error.
pub fn expand(axes: &[Axis]) -> Result<Vec<Scenario>, ScenarioError> {
    for axis in axes {
        let mut seen = HashSet::new();
        for variant in axis.variants.iter() {
            if !seen.insert(variant.label.as_str()) {
                return Err(ScenarioError::DuplicateLabel {
                    axis: axis.name.clone(),
                    label: variant.label.clone(),
                });
            }
        }
    }

    let keys: Vec<HashSet<&str>> = axes.iter().map(Axis::keys).collect();
    for (i, j) in (0..axes.len()).tuple_combinations() {
        if let Some(key) = keys[i].intersection(&keys[j]).min() {
            return Err(ScenarioError::ParamCollision {
                key: key.to_string(),
                first: axes[i].name.clone(),
                second: axes[j].name.clone(),
            });
        }
    }

    if axes.is_empty() {
        return Ok(vec![Scenario::empty()]);
    }

    Ok(axes
        .iter()
        .map(|axis| axis.variants.iter())
        .multi_cartesian_product()
        .map(|combination| {
            let labels: Vec<String> = combination.iter().map(|v| v.label.clone()).collect();
            let params: Params =
                combination.iter().flat_map(|v| v.params.clone().into_iter()).collect();
            Scenario { name: labels.join(NAME_SEPARATOR), labels, params }
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    fn fip_axes() -> Vec<Axis> {
        vec![
            Axis::new("src")
                .variant("with-fip", Params::new())
                .variant("without-fip", Params::new()),
            Axis::new("dest")
                .variant("dest-with-fip", Params::new())
                .variant("dest-without-fip", Params::new()),
        ]
    }

    #[test]
    fn two_axes() {
        let names: Vec<String> = expand(&fip_axes()).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "with-fip dest-with-fip",
                "with-fip dest-without-fip",
                "without-fip dest-with-fip",
                "without-fip dest-without-fip",
            ]
        );
    }

    #[test]
    fn product_size_and_params() {
        let axes = vec![
            Axis::boolean("src", "src_has_fip", "SRC with FIP", "SRC without FIP"),
            Axis::values("version", "ip_version", vec![("IPv4", 4), ("IPv6", 6)]),
            Axis::values("direction", "direction", vec![("a", "x"), ("b", "y"), ("c", "z")]),
        ];
        let scenarios = expand(&axes).unwrap();
        assert_eq!(scenarios.len(), 2 * 2 * 3);

        let labels: HashSet<Vec<String>> = scenarios.iter().map(|s| s.labels.clone()).collect();
        assert_eq!(labels.len(), scenarios.len());

        let last = scenarios.last().unwrap();
        assert_eq!(last.name, "SRC without FIP IPv6 c");
        assert_eq!(
            last.params,
            btreemap! {
                "src_has_fip".to_string() => json!(false),
                "ip_version".to_string() => json!(6),
                "direction".to_string() => json!("z"),
            }
        );
        assert!(!last.flag("src_has_fip"));
        assert_eq!(last.integer("ip_version"), Some(6));
        assert_eq!(last.string("direction"), Some("z"));
        assert!(scenarios[0].flag("src_has_fip"));
    }

    #[test]
    fn zero_axes() {
        let scenarios = expand(&[]).unwrap();
        assert_eq!(scenarios, vec![Scenario::empty()]);
        assert_eq!(scenarios[0].name, "");
    }

    #[test]
    fn empty_axis() {
        let mut axes = fip_axes();
        axes.push(Axis::new("nothing"));
        assert!(expand(&axes).unwrap().is_empty());
    }

    #[test]
    fn collision() {
        let axes = vec![
            Axis::boolean("a", "fip", "x", "y"),
            Axis::boolean("b", "fip", "z", "w"),
        ];
        assert_eq!(
            expand(&axes),
            Err(ScenarioError::ParamCollision {
                key: "fip".to_string(),
                first: "a".to_string(),
                second: "b".to_string()
            })
        );
    }

    #[test]
    fn duplicate_label() {
        let axes = vec![Axis::values("v", "ip_version", vec![("IP", 4), ("IP", 6)])];
        assert_eq!(
            expand(&axes),
            Err(ScenarioError::DuplicateLabel { axis: "v".to_string(), label: "IP".to_string() })
        );
    }

    #[test]
    fn deterministic() {
        assert_eq!(expand(&fip_axes()).unwrap(), expand(&fip_axes()).unwrap());
    }
}
