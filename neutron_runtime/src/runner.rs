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

//! # Test runner
//!
//! The runner expands the scenarios of every class into units of work, one per class and scenario
//! instance, and spreads them over a pool of worker threads. Everything inside a unit runs
//! sequentially on one thread. Isolation between units relies on random resource names only.

use crate::catalog::{CaseInfo, RunnableClass};
use crate::context::Environment;
use crate::scenario::Scenario;
use crate::{Error, Result};

use indicatif::ProgressBar;
use log::*;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{spawn, JoinHandle};
use std::time::{Duration, Instant};

/// Outcome of a single test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum Outcome {
    /// The test body returned successfully
    Passed,
    /// An assertion failed, or a request returned an unexpected error
    Failed(String),
    /// A wait condition never became true
    TimedOut(String),
    /// The deployment lacks a required capability
    Skipped(String),
}

impl Outcome {
    /// Classify the result of a test body
    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(Error::Skip(reason)) => Self::Skipped(reason),
            Err(e) if e.is_timeout() => Self::TimedOut(e.to_string()),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    /// Outcome of every case whose fixture could not be built
    pub fn from_setup_error(error: &Error) -> Self {
        match error {
            Error::Skip(reason) => Self::Skipped(reason.clone()),
            e if e.is_timeout() => Self::TimedOut(format!("setup: {}", e)),
            e => Self::Failed(format!("setup: {}", e)),
        }
    }

    /// Returns true for failed and timed out cases
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::TimedOut(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASS"),
            Self::Failed(_) => write!(f, "FAIL"),
            Self::TimedOut(_) => write!(f, "TIMEOUT"),
            Self::Skipped(_) => write!(f, "SKIP"),
        }
    }
}

fn as_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Result of a single test case in a scenario instance
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    /// Full id of the case
    pub id: String,
    /// Stable external id
    pub idempotent_id: String,
    /// Outcome of the test body
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Time spent in the test body and its cleanups
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    /// Resources that could not be removed. They never change the outcome.
    pub cleanup_errors: Vec<String>,
}

impl CaseResult {
    /// Result without duration and cleanup errors
    pub fn new(info: CaseInfo, outcome: Outcome) -> Self {
        Self {
            id: info.id,
            idempotent_id: info.idempotent_id.to_string(),
            outcome,
            duration: Duration::default(),
            cleanup_errors: Vec::new(),
        }
    }

    pub(crate) fn log(&self) {
        match &self.outcome {
            Outcome::Passed => info!("{} ... PASS ({:.1}s)", self.id, self.duration.as_secs_f64()),
            Outcome::Skipped(reason) => info!("{} ... SKIP: {}", self.id, reason),
            Outcome::TimedOut(msg) => warn!("{} ... TIMEOUT: {}", self.id, msg),
            Outcome::Failed(msg) => error!("{} ... FAIL: {}", self.id, msg),
        }
        for e in self.cleanup_errors.iter() {
            warn!("{}: cleanup failed: {}", self.id, e);
        }
    }
}

/// Results of a test run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    /// Results in catalog order
    pub results: Vec<CaseResult>,
    /// Wall clock time of the run
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
}

impl Report {
    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| f(&r.outcome)).count()
    }

    /// Number of passed cases
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Passed))
    }

    /// Number of failed cases
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// Number of timed out cases
    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, Outcome::TimedOut(_)))
    }

    /// Number of skipped cases
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    /// Number of cases with at least one cleanup error
    pub fn leaking(&self) -> usize {
        self.results.iter().filter(|r| !r.cleanup_errors.is_empty()).count()
    }

    /// Returns true if no case failed or timed out. Skips and cleanup errors do not count.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| !r.outcome.is_failure())
    }

    /// Render the report as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in self.results.iter() {
            match &r.outcome {
                Outcome::Passed => writeln!(f, "{:<7} {}", r.outcome, r.id)?,
                Outcome::Failed(msg) | Outcome::TimedOut(msg) | Outcome::Skipped(msg) => {
                    writeln!(f, "{:<7} {}: {}", r.outcome, r.id, msg)?
                }
            }
        }
        write!(
            f,
            "Ran {} tests in {:.1}s: {} passed, {} failed, {} timed out, {} skipped, {} leaking",
            self.results.len(),
            self.duration.as_secs_f64(),
            self.passed(),
            self.failed(),
            self.timed_out(),
            self.skipped(),
            self.leaking()
        )
    }
}

/// List all cases of the catalog matching the filter.
pub fn list(catalog: &[Box<dyn RunnableClass>], filter: Option<&str>) -> Result<Vec<CaseInfo>> {
    let mut cases = Vec::new();
    for class in catalog.iter() {
        for scenario in class.scenarios()? {
            cases.extend(class.cases(&scenario).into_iter().filter(|c| c.matches(filter)));
        }
    }
    Ok(cases)
}

/// Unit of work: a class index and one of its scenario instances
pub type Unit = (usize, Scenario);

/// Expand the catalog into units with at least one case matching the filter.
pub fn plan(catalog: &[Box<dyn RunnableClass>], filter: Option<&str>) -> Result<Vec<Unit>> {
    let mut units = Vec::new();
    for (i, class) in catalog.iter().enumerate() {
        let scenarios = class.scenarios()?;
        if scenarios.is_empty() {
            warn!("{} has an empty axis, no scenarios are generated", class.name());
        }
        for scenario in scenarios {
            if class.cases(&scenario).iter().any(|c| c.matches(filter)) {
                units.push((i, scenario));
            }
        }
    }
    Ok(units)
}

/// Options of a test run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Only run cases whose id or idempotent id contains this string
    pub filter: Option<String>,
    /// Number of worker threads
    pub threads: usize,
    /// Show a progress bar
    pub progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { filter: None, threads: 1, progress: false }
    }
}

/// Run all selected cases of the catalog.
pub fn run(
    env: Arc<Environment>,
    catalog: Arc<Vec<Box<dyn RunnableClass>>>,
    options: &RunOptions,
) -> Result<Report> {
    let start = Instant::now();
    let units = plan(&catalog, options.filter.as_deref())?;
    let num_units = units.len();
    let num_threads = options.threads.max(1).min(num_units.max(1));
    info!("Running {} scenario instances on {} threads", num_units, num_threads);

    let (sender, receiver) = channel::<(usize, Vec<CaseResult>)>();
    let jobs_todo: Arc<Mutex<VecDeque<(usize, Unit)>>> =
        Arc::new(Mutex::new(units.iter().cloned().enumerate().collect()));

    let bar = if options.progress {
        ProgressBar::new(num_units as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.tick();

    // spawn all workers
    let workers: Vec<JoinHandle<()>> = (0..num_threads)
        .map(|_| {
            let env = env.clone();
            let catalog = catalog.clone();
            let todo = jobs_todo.clone();
            let filter = options.filter.clone();
            let tx = sender.clone();
            spawn(move || worker(env, catalog, todo, filter, tx))
        })
        .collect();
    drop(sender);

    let mut done: Vec<(usize, Vec<CaseResult>)> = Vec::with_capacity(num_units);
    for unit in receiver.iter() {
        bar.inc(1);
        done.push(unit);
    }
    bar.finish_and_clear();

    for worker in workers {
        if worker.join().is_err() {
            error!("A worker thread panicked");
        }
    }
    if done.len() < num_units {
        error!("{} of {} scenario instances did not report", num_units - done.len(), num_units);
        let reported: HashSet<usize> = done.iter().map(|(index, _)| *index).collect();
        for (index, (class, scenario)) in units.iter().enumerate() {
            if !reported.contains(&index) {
                let results = unreported(
                    catalog[*class].as_ref(),
                    scenario,
                    options.filter.as_deref(),
                    "scenario instance did not report",
                );
                done.push((index, results));
            }
        }
    }

    done.sort_by_key(|(index, _)| *index);
    let results = done.into_iter().flat_map(|(_, results)| results).collect();
    Ok(Report { results, duration: start.elapsed() })
}

fn worker(
    env: Arc<Environment>,
    catalog: Arc<Vec<Box<dyn RunnableClass>>>,
    jobs_todo: Arc<Mutex<VecDeque<(usize, Unit)>>>,
    filter: Option<String>,
    sender: Sender<(usize, Vec<CaseResult>)>,
) {
    loop {
        // check if there are jobs todo
        let job = match jobs_todo.lock() {
            Ok(mut jobs) => jobs.pop_front(),
            Err(_) => None,
        };
        let (index, (class, scenario)) = match job {
            Some(job) => job,
            None => break,
        };
        let class = catalog[class].as_ref();
        let filter = filter.as_deref();
        let results = match catch_unwind(AssertUnwindSafe(|| {
            class.run_scenario(&env, &scenario, filter)
        })) {
            Ok(results) => results,
            Err(payload) => {
                let reason = format!("panicked: {}", panic_message(payload.as_ref()));
                error!("{}[{}] {}", class.name(), scenario.name, reason);
                unreported(class, &scenario, filter, &reason)
            }
        };
        if sender.send((index, results)).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown cause"
    }
}

/// Failed results of all selected cases of a scenario instance whose results were lost.
fn unreported(
    class: &dyn RunnableClass,
    scenario: &Scenario,
    filter: Option<&str>,
    reason: &str,
) -> Vec<CaseResult> {
    class
        .cases(scenario)
        .into_iter()
        .filter(|c| c.matches(filter))
        .map(|info| {
            let result = CaseResult::new(info, Outcome::Failed(reason.to_string()));
            result.log();
            result
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cases::catalog;
    use crate::catalog::{no_fixture, TestCase, TestClass};
    use crate::config::Config;
    use crate::context::test::offline_environment;
    use crate::context::TestContext;
    use crate::requirements::Capabilities;

    fn passing(_: &mut TestContext<'_>, _: &Scenario, _: &()) -> Result<()> {
        Ok(())
    }

    fn panicking(_: &mut TestContext<'_>, _: &Scenario, _: &()) -> Result<()> {
        panic!("lost the test host")
    }

    fn panicking_catalog() -> Vec<Box<dyn RunnableClass>> {
        vec![
            Box::new(
                TestClass::new("PanicTest", no_fixture)
                    .case(TestCase::new("test_panic", "0001", panicking))
                    .case(TestCase::new("test_other", "0002", passing)),
            ),
            Box::new(
                TestClass::new("PassTest", no_fixture)
                    .case(TestCase::new("test_pass", "0003", passing)),
            ),
        ]
    }

    fn result(id: &str, outcome: Outcome) -> CaseResult {
        let info = CaseInfo { id: id.to_string(), idempotent_id: "id" };
        CaseResult::new(info, outcome)
    }

    #[test]
    fn outcomes() {
        assert_eq!(Outcome::from_result(Ok(())), Outcome::Passed);
        let skip = Error::Skip("no qos".to_string());
        assert_eq!(Outcome::from_result(Err(skip)), Outcome::Skipped("no qos".to_string()));
        let elapsed = Duration::from_secs(2);
        let timeout = Error::Timeout { what: "x".to_string(), elapsed, attempts: 3 };
        assert!(matches!(Outcome::from_result(Err(timeout)), Outcome::TimedOut(_)));
        let failure = Error::Assertion("wrong".to_string());
        assert!(matches!(Outcome::from_result(Err(failure)), Outcome::Failed(_)));
        let setup = Outcome::from_setup_error(&Error::Assertion("wrong".to_string()));
        assert_eq!(setup, Outcome::Failed("setup: Assertion failed: wrong".to_string()));
    }

    #[test]
    fn report() {
        let mut leaking = result("C.d", Outcome::Skipped("no qos".to_string()));
        leaking.cleanup_errors.push("network abc: conflict".to_string());
        let report = Report {
            results: vec![
                result("C.a", Outcome::Passed),
                result("C.b", Outcome::Failed("wrong".to_string())),
                result("C.c", Outcome::TimedOut("slow".to_string())),
                leaking,
            ],
            duration: Duration::from_secs(1),
        };
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.timed_out(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.leaking(), 1);
        assert!(!report.is_success());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["results"][0]["outcome"], "passed");
        assert_eq!(json["results"][1]["outcome"], "failed");
        assert_eq!(json["results"][1]["message"], "wrong");
        assert_eq!(json["results"][3]["cleanup_errors"][0], "network abc: conflict");
        assert_eq!(json["duration"], 1.0);
    }

    #[test]
    fn cleanup_errors_do_not_fail() {
        let mut r = result("C.a", Outcome::Passed);
        r.cleanup_errors.push("port xyz: timeout".to_string());
        let report = Report { results: vec![r], duration: Duration::default() };
        assert!(report.is_success());
    }

    #[test]
    fn planning() {
        let catalog = catalog();
        let all = plan(&catalog, None).unwrap();
        let cases = list(&catalog, None).unwrap();
        assert!(cases.len() > all.len());

        let filter = "FloatingIpSameNetwork.test_east_west[SRC with FIP DEST without FIP]";
        let units = plan(&catalog, Some(filter)).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].1.name, "SRC with FIP DEST without FIP");

        assert!(plan(&catalog, Some("no such test")).unwrap().is_empty());
    }

    #[test]
    fn unique_ids() {
        let cases = list(&catalog(), None).unwrap();
        let mut ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        let len = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), len);
    }

    #[test]
    fn live() {
        let path = match std::env::var("NEUTRON_TEST_CONFIG") {
            Ok(path) => path,
            Err(_) => return, // skip the test
        };
        let config = Config::from_file(path).unwrap();
        let env = Arc::new(Environment::connect(config).unwrap());
        let options = RunOptions {
            filter: Some("QosTestJSON.test_create_policy".to_string()),
            ..Default::default()
        };
        let report = run(env, Arc::new(catalog()), &options).unwrap();
        assert!(!report.results.is_empty());
        assert!(report.is_success(), "{}", report);
    }

    #[test]
    fn panic_fails_the_scenario_instance() {
        let env = Arc::new(offline_environment(Capabilities::default()));
        for threads in 1..=2 {
            let options = RunOptions { threads, ..Default::default() };
            let report = run(env.clone(), Arc::new(panicking_catalog()), &options).unwrap();
            let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(
                ids,
                vec!["PanicTest.test_panic", "PanicTest.test_other", "PassTest.test_pass"]
            );
            assert_eq!(
                report.results[0].outcome,
                Outcome::Failed("panicked: lost the test host".to_string())
            );
            assert_eq!(report.failed(), 2);
            assert_eq!(report.passed(), 1);
            assert!(!report.is_success());
        }
    }

    #[test]
    fn lost_results_fail() {
        let catalog = panicking_catalog();
        let scenario = Scenario::empty();
        let results = unreported(catalog[0].as_ref(), &scenario, Some("test_other"), "gone");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "PanicTest.test_other");
        assert_eq!(results[0].outcome, Outcome::Failed("gone".to_string()));
    }
}
