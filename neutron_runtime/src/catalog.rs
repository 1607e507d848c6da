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

//! # Test catalog
//!
//! A [`TestClass`] groups test cases sharing the same requirements, scenario axes and fixture.
//! The fixture is built once per scenario instance by the `setup` function, into a registry that
//! is cleaned up after the last case of that instance. Every case runs with its own registry.
//!
//! The requirements and the idempotent id of a case are plain data of the table, such that the
//! runner can list and filter cases without running anything.

use crate::context::{Environment, TestContext};
use crate::registry::ResourceRegistry;
use crate::requirements::Requirement;
use crate::runner::{CaseResult, Outcome};
use crate::scenario::{expand, Axis, Scenario, ScenarioError};
use crate::Result;

use log::*;
use std::fmt;
use std::time::Instant;

/// Builds the fixture of a scenario instance
pub type SetupFn<F> = fn(&mut TestContext<'_>, &Scenario) -> Result<F>;
/// Body of a test case
pub type CaseFn<F> = fn(&mut TestContext<'_>, &Scenario, &F) -> Result<()>;

/// Setup of classes without a fixture
pub fn no_fixture(_: &mut TestContext<'_>, _: &Scenario) -> Result<()> {
    Ok(())
}

/// Single test case
pub struct TestCase<F> {
    /// Name of the test, unique within its class
    pub name: &'static str,
    /// Stable external id of the test
    pub idempotent_id: &'static str,
    /// Requirements in addition to the ones of the class
    pub requires: Vec<Requirement>,
    /// The test body
    pub run: CaseFn<F>,
    /// Bug that makes the case fail sporadically. Failures of such a case are reported as skips.
    pub unstable: Option<&'static str>,
}

impl<F> TestCase<F> {
    /// Create a test case without additional requirements
    pub fn new(name: &'static str, idempotent_id: &'static str, run: CaseFn<F>) -> Self {
        Self { name, idempotent_id, requires: Vec::new(), run, unstable: None }
    }

    /// Add requirements
    pub fn requires(mut self, requirements: &[Requirement]) -> Self {
        self.requires.extend_from_slice(requirements);
        self
    }

    /// Mark the case as unstable because of a known bug.
    pub fn unstable(mut self, bug: &'static str) -> Self {
        self.unstable = Some(bug);
        self
    }

    fn outcome(&self, result: Result<()>) -> Outcome {
        match (Outcome::from_result(result), self.unstable) {
            (Outcome::Failed(msg), Some(bug)) | (Outcome::TimedOut(msg), Some(bug)) => {
                Outcome::Skipped(format!("unstable because of {}, failure was: {}", bug, msg))
            }
            (outcome, _) => outcome,
        }
    }
}

impl<F> fmt::Debug for TestCase<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("idempotent_id", &self.idempotent_id)
            .field("requires", &self.requires)
            .field("unstable", &self.unstable)
            .finish()
    }
}

/// Group of test cases
pub struct TestClass<F> {
    /// Name of the class
    pub name: &'static str,
    /// Requirements of every case
    pub requires: Vec<Requirement>,
    /// Scenario axes. Every case runs once per scenario instance.
    pub axes: Vec<Axis>,
    /// Builds the fixture
    pub setup: SetupFn<F>,
    /// The test cases
    pub cases: Vec<TestCase<F>>,
}

impl<F> TestClass<F> {
    /// Create an empty class
    pub fn new(name: &'static str, setup: SetupFn<F>) -> Self {
        Self { name, requires: Vec::new(), axes: Vec::new(), setup, cases: Vec::new() }
    }

    /// Add requirements of the whole class
    pub fn requires(mut self, requirements: &[Requirement]) -> Self {
        self.requires.extend_from_slice(requirements);
        self
    }

    /// Add a scenario axis
    pub fn axis(mut self, axis: Axis) -> Self {
        self.axes.push(axis);
        self
    }

    /// Add a test case
    pub fn case(mut self, case: TestCase<F>) -> Self {
        self.cases.push(case);
        self
    }
}

impl<F> fmt::Debug for TestClass<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("axes", &self.axes)
            .field("cases", &self.cases)
            .finish()
    }
}

/// Id of a case in a scenario instance: `Class.case[scenario]`, without brackets if the class has
/// no axes.
pub fn case_id(class: &str, case: &str, scenario: &Scenario) -> String {
    if scenario.name.is_empty() {
        format!("{}.{}", class, case)
    } else {
        format!("{}.{}[{}]", class, case, scenario.name)
    }
}

/// Description of a case, used for listing and filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInfo {
    /// Full id, see [`case_id`]
    pub id: String,
    /// Stable external id
    pub idempotent_id: &'static str,
}

impl CaseInfo {
    /// Returns true if `filter` is part of the id or of the idempotent id
    pub fn matches(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(f) => self.id.contains(f) || self.idempotent_id.contains(f),
        }
    }
}

/// A test class with its fixture type erased, such that classes with different fixtures can live
/// in the same catalog.
pub trait RunnableClass: Send + Sync + fmt::Debug {
    /// Name of the class
    fn name(&self) -> &str;

    /// The scenario instances of the class
    fn scenarios(&self) -> std::result::Result<Vec<Scenario>, ScenarioError>;

    /// All cases in a scenario instance
    fn cases(&self, scenario: &Scenario) -> Vec<CaseInfo>;

    /// Run the cases of a scenario instance that match the filter.
    fn run_scenario(
        &self,
        env: &Environment,
        scenario: &Scenario,
        filter: Option<&str>,
    ) -> Vec<CaseResult>;
}

impl<F: 'static> RunnableClass for TestClass<F> {
    fn name(&self) -> &str {
        self.name
    }

    fn scenarios(&self) -> std::result::Result<Vec<Scenario>, ScenarioError> {
        expand(&self.axes)
    }

    fn cases(&self, scenario: &Scenario) -> Vec<CaseInfo> {
        self.cases
            .iter()
            .map(|c| CaseInfo {
                id: case_id(self.name, c.name, scenario),
                idempotent_id: c.idempotent_id,
            })
            .collect()
    }

    fn run_scenario(
        &self,
        env: &Environment,
        scenario: &Scenario,
        filter: Option<&str>,
    ) -> Vec<CaseResult> {
        let selected: Vec<(&TestCase<F>, CaseInfo)> = self
            .cases
            .iter()
            .zip(self.cases(scenario))
            .filter(|(_, info)| info.matches(filter))
            .collect();
        if selected.is_empty() {
            return Vec::new();
        }

        // class level requirements skip every case without building the fixture
        if let Err(skip) = env.capabilities.check(&self.requires) {
            info!("{}[{}]: skipped, {}", self.name, scenario.name, skip);
            return selected
                .into_iter()
                .map(|(_, info)| CaseResult::new(info, Outcome::Skipped(skip.0.clone())))
                .collect();
        }

        let unit = case_id(self.name, "setup", scenario);
        let mut ctx = TestContext::new(env, unit.clone());
        let start = Instant::now();
        let fixture = match (self.setup)(&mut ctx, scenario) {
            Ok(fixture) => fixture,
            Err(e) => {
                let outcome = Outcome::from_setup_error(&e);
                warn!("{}: {}", unit, e);
                let cleanup_errors = cleanup_messages(ctx.registry());
                let elapsed = start.elapsed();
                let mut results: Vec<CaseResult> = selected
                    .into_iter()
                    .map(|(_, info)| {
                        let mut result = CaseResult::new(info, outcome.clone());
                        result.duration = elapsed;
                        result
                    })
                    .collect();
                attach_fixture_errors(&mut results, cleanup_errors);
                return results;
            }
        };
        let mut class_registry = ctx.replace_registry(ResourceRegistry::new(unit.as_str()));
        debug!("{}: fixture ready after {:?}", unit, start.elapsed());

        let mut results = Vec::with_capacity(selected.len());
        for (case, info) in selected {
            if let Err(skip) = env.capabilities.check(&case.requires) {
                info!("{}: skipped, {}", info.id, skip);
                results.push(CaseResult::new(info, Outcome::Skipped(skip.0)));
                continue;
            }
            ctx.replace_registry(ResourceRegistry::new(info.id.as_str()));
            let start = Instant::now();
            let result = (case.run)(&mut ctx, scenario, &fixture);
            let cleanup_errors = cleanup_messages(ctx.registry());
            let mut result = CaseResult::new(info, case.outcome(result));
            result.duration = start.elapsed();
            result.cleanup_errors = cleanup_errors;
            result.log();
            results.push(result);
        }

        drop(fixture);
        let class_errors = cleanup_messages(&mut class_registry);
        attach_fixture_errors(&mut results, class_errors);
        results
    }
}

/// The fixture belongs to the whole scenario instance. Its cleanup errors are reported once, on
/// the last case.
fn attach_fixture_errors(results: &mut [CaseResult], errors: Vec<String>) {
    if errors.is_empty() {
        return;
    }
    match results.last_mut() {
        Some(last) => {
            let errors = errors.into_iter().map(|e| format!("fixture: {}", e));
            last.cleanup_errors.extend(errors)
        }
        None => errors.iter().for_each(|e| error!("fixture cleanup failed: {}", e)),
    }
}

fn cleanup_messages(registry: &mut ResourceRegistry) -> Vec<String> {
    match registry.run_cleanups() {
        Ok(_) => Vec::new(),
        Err(report) => report.messages(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::offline_environment;
    use crate::registry::{ResourceHandle, ResourceKind};
    use crate::requirements::Capabilities;
    use crate::Error;
    use maplit::btreeset;
    use std::cell::RefCell;

    thread_local! {
        static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    fn record(event: String) {
        EVENTS.with(|e| e.borrow_mut().push(event));
    }

    /// Take all events recorded on this thread
    fn events() -> Vec<String> {
        EVENTS.with(|e| e.borrow_mut().drain(..).collect())
    }

    /// Register an in-memory resource, whose cleanup is recorded as `delete <id>`.
    fn track(ctx: &mut TestContext<'_>, id: &'static str) {
        record(format!("create {}", id));
        let handle = ResourceHandle::new(ResourceKind::Network, id);
        ctx.registry().register(handle, move || {
            record(format!("delete {}", id));
            Ok(())
        });
    }

    /// Register an in-memory resource that cannot be removed.
    fn track_stuck(ctx: &mut TestContext<'_>, id: &'static str) {
        let handle = ResourceHandle::new(ResourceKind::Port, id);
        ctx.registry().register(handle, move || {
            record(format!("delete {}", id));
            Err(neutron_client::Error::Conflict(format!("{} is in use", id)).into())
        });
    }

    fn qos() -> Capabilities {
        Capabilities { extensions: btreeset! {"qos".to_string()}, ..Default::default() }
    }

    fn with_fixture(ctx: &mut TestContext<'_>, _: &Scenario) -> Result<()> {
        track(ctx, "fixture");
        Ok(())
    }

    fn broken_fixture(ctx: &mut TestContext<'_>, _: &Scenario) -> Result<()> {
        track(ctx, "fixture");
        Err(Error::Assertion("no router".to_string()))
    }

    fn stuck_fixture(ctx: &mut TestContext<'_>, _: &Scenario) -> Result<()> {
        track_stuck(ctx, "fixture");
        Ok(())
    }

    fn create_a(ctx: &mut TestContext<'_>, _: &Scenario, _: &()) -> Result<()> {
        track(ctx, "a");
        Ok(())
    }

    fn create_b_and_fail(ctx: &mut TestContext<'_>, _: &Scenario, _: &()) -> Result<()> {
        track(ctx, "b");
        Err(Error::Assertion("wrong".to_string()))
    }

    fn create_stuck(ctx: &mut TestContext<'_>, _: &Scenario, _: &()) -> Result<()> {
        track_stuck(ctx, "stuck");
        Ok(())
    }

    fn fixture_class(setup: SetupFn<()>) -> TestClass<()> {
        TestClass::new("FixtureTest", setup)
            .case(TestCase::new("test_a", "0001", create_a))
            .case(TestCase::new("test_b", "0002", create_b_and_fail))
    }

    fn outcomes(results: &[CaseResult]) -> Vec<&Outcome> {
        results.iter().map(|r| &r.outcome).collect()
    }

    fn passing(_: &mut TestContext<'_>, _: &Scenario, _: &()) -> Result<()> {
        Ok(())
    }

    fn failing(_: &mut TestContext<'_>, _: &Scenario, _: &()) -> Result<()> {
        Err(Error::Assertion("wrong".to_string()))
    }

    fn class() -> TestClass<()> {
        TestClass::new("PolicyTest", no_fixture)
            .axis(Axis::values("version", "ip_version", vec![("IPv4", 4), ("IPv6", 6)]))
            .case(TestCase::new("test_create", "0001", passing))
            .case(
                TestCase::new("test_update", "0002", failing)
                    .requires(&[Requirement::Extension("qos")]),
            )
    }

    #[test]
    fn ids() {
        let class = class();
        let scenarios = class.scenarios().unwrap();
        assert_eq!(scenarios.len(), 2);
        let cases = class.cases(&scenarios[1]);
        assert_eq!(cases[0].id, "PolicyTest.test_create[IPv6]");
        assert_eq!(cases[1].idempotent_id, "0002");
        assert_eq!(case_id("A", "b", &Scenario::empty()), "A.b");
    }

    #[test]
    fn filter() {
        let id = "PolicyTest.test_create[IPv4]".to_string();
        let info = CaseInfo { id, idempotent_id: "abc" };
        assert!(info.matches(None));
        assert!(info.matches(Some("test_create")));
        assert!(info.matches(Some("[IPv4]")));
        assert!(info.matches(Some("abc")));
        assert!(!info.matches(Some("IPv6")));
    }

    #[test]
    fn requirements_are_data() {
        let class = class();
        let capabilities = Capabilities::default();
        assert!(capabilities.check(&class.cases[0].requires).is_ok());
        assert!(capabilities.check(&class.cases[1].requires).is_err());
    }

    #[test]
    fn unmet_class_requirement_skips_setup() {
        events();
        let env = offline_environment(Capabilities::default());
        let class = fixture_class(with_fixture).requires(&[Requirement::Extension("qos")]);
        let results = class.run_scenario(&env, &Scenario::empty(), None);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r.outcome, Outcome::Skipped(_))));
        assert!(events().is_empty());
    }

    #[test]
    fn cleanup_order() {
        events();
        let env = offline_environment(qos());
        let class = fixture_class(with_fixture).requires(&[Requirement::Extension("qos")]);
        let results = class.run_scenario(&env, &Scenario::empty(), None);
        assert_eq!(
            outcomes(&results),
            vec![&Outcome::Passed, &Outcome::Failed("Assertion failed: wrong".to_string())]
        );
        assert!(results.iter().all(|r| r.cleanup_errors.is_empty()));
        // the failing case still removes its resources, the fixture goes last
        assert_eq!(
            events(),
            vec!["create fixture", "create a", "delete a", "create b", "delete b", "delete fixture"]
        );
    }

    #[test]
    fn setup_failure_fails_every_case() {
        events();
        let env = offline_environment(Capabilities::default());
        let results = fixture_class(broken_fixture).run_scenario(&env, &Scenario::empty(), None);
        let expected = Outcome::Failed("setup: Assertion failed: no router".to_string());
        assert_eq!(outcomes(&results), vec![&expected, &expected]);
        assert_eq!(events(), vec!["create fixture", "delete fixture"]);
    }

    #[test]
    fn filter_selects_cases() {
        events();
        let env = offline_environment(Capabilities::default());
        let class = fixture_class(with_fixture);
        let results = class.run_scenario(&env, &Scenario::empty(), Some("test_a"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "FixtureTest.test_a");
        assert_eq!(events(), vec!["create fixture", "create a", "delete a", "delete fixture"]);

        assert!(class.run_scenario(&env, &Scenario::empty(), Some("nothing")).is_empty());
        assert!(events().is_empty());
    }

    #[test]
    fn case_requirement_skips_case() {
        events();
        let env = offline_environment(Capabilities::default());
        let results = class().run_scenario(&env, &class().scenarios().unwrap()[0], None);
        assert_eq!(results[0].outcome, Outcome::Passed);
        assert_eq!(results[0].id, "PolicyTest.test_create[IPv4]");
        assert!(matches!(results[1].outcome, Outcome::Skipped(_)));
    }

    #[test]
    fn cleanup_errors_keep_outcome() {
        events();
        let env = offline_environment(Capabilities::default());
        let class = TestClass::new("StuckTest", no_fixture)
            .case(TestCase::new("test_stuck", "0003", create_stuck));
        let results = class.run_scenario(&env, &Scenario::empty(), None);
        assert_eq!(results[0].outcome, Outcome::Passed);
        assert_eq!(results[0].cleanup_errors.len(), 1);
        assert!(results[0].cleanup_errors[0].contains("stuck"));
        assert_eq!(events(), vec!["delete stuck"]);
    }

    #[test]
    fn fixture_errors_reported_once() {
        events();
        let env = offline_environment(Capabilities::default());
        let class = TestClass::new("StuckFixtureTest", stuck_fixture)
            .case(TestCase::new("test_a", "0001", create_a))
            .case(TestCase::new("test_c", "0004", passing))
            .case(TestCase::new("test_d", "0005", passing));
        let results = class.run_scenario(&env, &Scenario::empty(), None);
        assert!(results.iter().all(|r| r.outcome == Outcome::Passed));
        let errors: Vec<usize> = results.iter().map(|r| r.cleanup_errors.len()).collect();
        assert_eq!(errors, vec![0, 0, 1]);
        assert!(results[2].cleanup_errors[0].starts_with("fixture: "));
    }

    #[test]
    fn unstable_failures_are_skipped() {
        events();
        let env = offline_environment(Capabilities::default());
        let class = TestClass::new("UnstableTest", no_fixture)
            .case(TestCase::new("test_fails", "0006", failing).unstable("bug 1717302"))
            .case(TestCase::new("test_passes", "0007", passing).unstable("bug 1717302"));
        let results = class.run_scenario(&env, &Scenario::empty(), None);
        match &results[0].outcome {
            Outcome::Skipped(msg) => {
                assert!(msg.contains("bug 1717302"));
                assert!(msg.contains("wrong"));
            }
            o => panic!("unexpected outcome {:?}", o),
        }
        assert_eq!(results[1].outcome, Outcome::Passed);
    }
}
