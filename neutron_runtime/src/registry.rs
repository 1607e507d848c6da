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

//! # Resource Registry
//!
//! Every remote resource created by a test is registered together with the action that removes
//! it again. The registry runs these actions in reverse creation order, such that dependents (a
//! port) are removed before their prerequisites (the network). This is only a valid deletion
//! order as long as the dependencies form chains. Diamond shaped dependencies (like a router
//! connected to two subnets) are handled by registering the connection as a resource of its own,
//! which places it after both endpoints in creation order.
//!
//! A failing cleanup never stops the remaining ones. All failures are collected and returned as
//! a single [`CleanupReport`]. A "not found" answer is treated as success, since the resource is
//! gone either way.

use crate::{Error, Result};

use log::*;
use serde_json::Value;
use std::fmt;

/// Kind of a tracked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Network
    Network,
    /// Subnet
    Subnet,
    /// Router
    Router,
    /// Connection between a router and a subnet
    RouterInterface,
    /// Port
    Port,
    /// Server (Nova instance)
    Server,
    /// Floating IP
    FloatingIp,
    /// Security group
    SecurityGroup,
    /// Security group rule
    SecurityGroupRule,
    /// Key pair
    Keypair,
    /// QoS policy
    QosPolicy,
    /// Rule of a QoS policy
    QosRule,
    /// RBAC policy
    RbacPolicy,
    /// Keystone project
    Project,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::Router => "router",
            Self::RouterInterface => "router-interface",
            Self::Port => "port",
            Self::Server => "server",
            Self::FloatingIp => "floating-ip",
            Self::SecurityGroup => "security-group",
            Self::SecurityGroupRule => "security-group-rule",
            Self::Keypair => "keypair",
            Self::QosPolicy => "qos-policy",
            Self::QosRule => "qos-rule",
            Self::RbacPolicy => "rbac-policy",
            Self::Project => "project",
        };
        write!(f, "{}", s)
    }
}

/// Identifies a created remote object
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHandle {
    /// ID of the resource, as returned by the server
    pub id: String,
    /// Kind of the resource
    pub kind: ResourceKind,
    /// Server side representation at creation time, if it was kept
    pub raw: Option<Value>,
}

impl ResourceHandle {
    /// Create a new handle without a raw representation
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self { id: id.into(), kind, raw: None }
    }

    /// Attach the raw representation to the handle
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Anything returned by a create call that carries an id.
pub trait Identified {
    /// The opaque id of the resource
    fn resource_id(&self) -> &str;
}

macro_rules! identified_by_id {
    ($($t:ty),* $(,)?) => {
        $(impl Identified for $t {
            fn resource_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

identified_by_id!(
    neutron_client::Network,
    neutron_client::Subnet,
    neutron_client::Router,
    neutron_client::Port,
    neutron_client::FloatingIp,
    neutron_client::SecurityGroup,
    neutron_client::SecurityGroupRule,
    neutron_client::QosPolicy,
    neutron_client::BandwidthLimitRule,
    neutron_client::DscpMarkingRule,
    neutron_client::MinimumBandwidthRule,
    neutron_client::MinimumPacketRateRule,
    neutron_client::RbacPolicy,
    neutron_client::Server,
    neutron_client::Project,
);

impl Identified for neutron_client::Keypair {
    fn resource_id(&self) -> &str {
        &self.name
    }
}

impl Identified for ResourceHandle {
    fn resource_id(&self) -> &str {
        &self.id
    }
}

/// Deferred delete operation bound to a resource
pub type CleanupAction = Box<dyn FnMut() -> Result<()>>;

/// A cleanup action that failed
#[derive(Debug)]
pub struct CleanupFailure {
    /// The resource that could not be removed
    pub handle: ResourceHandle,
    /// The error returned by the cleanup action
    pub error: Error,
}

/// All cleanup actions of a registry that failed, in the order they were executed.
#[derive(Debug)]
pub struct CleanupReport {
    /// The failed actions
    pub failures: Vec<CleanupFailure>,
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cleanup(s) failed: {}", self.failures.len(), self.messages().join("; "))
    }
}

impl std::error::Error for CleanupReport {}

impl CleanupReport {
    /// One message per failed cleanup
    pub fn messages(&self) -> Vec<String> {
        self.failures.iter().map(|f| format!("{}: {}", f.handle, f.error)).collect()
    }
}

/// Tracks created resources and their cleanup actions.
pub struct ResourceRegistry {
    name: String,
    entries: Vec<(ResourceHandle, CleanupAction)>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("name", &self.name)
            .field("pending", &self.entries.iter().map(|(h, _)| h).collect::<Vec<_>>())
            .finish()
    }
}

impl ResourceRegistry {
    /// Create an empty registry. The name only appears in log messages.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: Vec::new() }
    }

    /// Name of the registry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record the cleanup action of a resource that was created successfully.
    pub fn register<F>(&mut self, handle: ResourceHandle, cleanup: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        debug!("[{}] tracking {}", self.name, handle);
        self.entries.push((handle, Box::new(cleanup)));
    }

    /// Run `create`, and register `cleanup` with the id of the created resource. If `create`
    /// fails, nothing is registered and the error is returned.
    pub fn track<T, C, D>(&mut self, kind: ResourceKind, create: C, mut cleanup: D) -> Result<T>
    where
        T: Identified,
        C: FnOnce() -> Result<T>,
        D: FnMut(&str) -> Result<()> + 'static,
    {
        let resource = create()?;
        let id = resource.resource_id().to_string();
        self.register(ResourceHandle::new(kind, id.clone()), move || cleanup(&id));
        Ok(resource)
    }

    /// Number of pending cleanup actions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no cleanup action is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the tracked resources, in creation order
    pub fn handles(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.entries.iter().map(|(h, _)| h)
    }

    /// Execute all registered cleanup actions, last in first out. Returns the number of removed
    /// resources, or the report of all actions that failed. The registry is empty afterwards in
    /// both cases.
    pub fn run_cleanups(&mut self) -> std::result::Result<usize, CleanupReport> {
        let mut removed = 0;
        let mut failures = Vec::new();
        while let Some((handle, mut action)) = self.entries.pop() {
            match action() {
                Ok(()) => {
                    debug!("[{}] removed {}", self.name, handle);
                    removed += 1;
                }
                Err(e) if e.is_not_found() => {
                    debug!("[{}] {} was already removed", self.name, handle);
                    removed += 1;
                }
                Err(error) => {
                    warn!("[{}] cannot remove {}: {}", self.name, handle, error);
                    failures.push(CleanupFailure { handle, error });
                }
            }
        }
        if failures.is_empty() {
            Ok(removed)
        } else {
            Err(CleanupReport { failures })
        }
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        warn!("[{}] dropped with {} pending cleanup(s)", self.name, self.entries.len());
        if let Err(report) = self.run_cleanups() {
            for message in report.messages() {
                error!("[{}] leaked {}", self.name, message);
            }
        }
    }
}

/// Map a "not found" error to success. Use this when deleting a resource explicitly, which might
/// already be gone.
pub fn ignore_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(t) => Ok(Some(t)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    /// In-memory stand-in for the remote system: a set of existing ids, and the order in which
    /// delete calls arrived.
    #[derive(Default)]
    struct Remote {
        existing: HashSet<String>,
        deleted: Vec<String>,
    }

    fn delete(remote: &Rc<RefCell<Remote>>, id: &str) -> Result<()> {
        let mut remote = remote.borrow_mut();
        remote.deleted.push(id.to_string());
        if remote.existing.remove(id) {
            Ok(())
        } else {
            Err(neutron_client::Error::NotFound(format!("{} could not be found", id)).into())
        }
    }

    fn registry_with(remote: &Rc<RefCell<Remote>>, n: usize) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new("test");
        for i in 0..n {
            let id = format!("r{}", i);
            remote.borrow_mut().existing.insert(id.clone());
            let r = remote.clone();
            let create = || Ok(ResourceHandle::new(ResourceKind::Network, id));
            registry.track(ResourceKind::Network, create, move |id| delete(&r, id)).unwrap();
        }
        registry
    }

    #[test]
    fn lifo_order() {
        let remote = Rc::new(RefCell::new(Remote::default()));
        let mut registry = registry_with(&remote, 4);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.run_cleanups().unwrap(), 4);
        assert!(registry.is_empty());
        assert_eq!(remote.borrow().deleted, vec!["r3", "r2", "r1", "r0"]);
        assert!(remote.borrow().existing.is_empty());
    }

    #[test]
    fn failures_do_not_stop_cleanup() {
        let remote = Rc::new(RefCell::new(Remote::default()));
        let mut registry = registry_with(&remote, 2);
        registry.register(ResourceHandle::new(ResourceKind::Port, "stuck"), || {
            Err(neutron_client::Error::Conflict("port in use".to_string()).into())
        });
        let r = remote.clone();
        remote.borrow_mut().existing.insert("r3".to_string());
        registry.register(ResourceHandle::new(ResourceKind::Port, "r3"), move || delete(&r, "r3"));

        let report = registry.run_cleanups().unwrap_err();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].handle.id, "stuck");
        assert!(report.failures[0].error.is_conflict());
        // all others ran, before and after the failing one
        assert_eq!(remote.borrow().deleted, vec!["r3", "r1", "r0"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn not_found_is_success() {
        let remote = Rc::new(RefCell::new(Remote::default()));
        let mut registry = registry_with(&remote, 1);
        // remove it before the cleanup runs
        delete(&remote, "r0").unwrap();
        assert_eq!(registry.run_cleanups().unwrap(), 1);
    }

    #[test]
    fn idempotent_cleanup() {
        let remote = Rc::new(RefCell::new(Remote::default()));
        remote.borrow_mut().existing.insert("a".to_string());
        let r = remote.clone();
        let mut action = move || delete(&r, "a");
        assert!(action().is_ok());
        assert!(ignore_not_found(action()).unwrap().is_none());

        // the same action registered twice
        let mut registry = ResourceRegistry::new("twice");
        remote.borrow_mut().existing.insert("b".to_string());
        for _ in 0..2 {
            let r = remote.clone();
            let handle = ResourceHandle::new(ResourceKind::Router, "b");
            registry.register(handle, move || delete(&r, "b"));
        }
        assert_eq!(registry.run_cleanups().unwrap(), 2);
    }

    #[test]
    fn failed_create_is_not_tracked() {
        let mut registry = ResourceRegistry::new("test");
        let result: Result<ResourceHandle> = registry.track(
            ResourceKind::Subnet,
            || Err(neutron_client::Error::BadRequest("overlap".to_string()).into()),
            |_| Ok(()),
        );
        assert!(result.unwrap_err().is_bad_request());
        assert!(registry.is_empty());
    }

    #[test]
    fn drop_runs_pending_cleanups() {
        let remote = Rc::new(RefCell::new(Remote::default()));
        {
            let _registry = registry_with(&remote, 3);
        }
        assert_eq!(remote.borrow().deleted, vec!["r2", "r1", "r0"]);
    }

    #[test]
    fn report_messages() {
        let mut registry = ResourceRegistry::new("test");
        registry.register(ResourceHandle::new(ResourceKind::QosPolicy, "p"), || {
            Err(Error::Assertion("boom".to_string()))
        });
        let report = registry.run_cleanups().unwrap_err();
        assert_eq!(report.messages(), vec!["qos-policy p: Assertion failed: boom"]);
        assert!(report.to_string().starts_with("1 cleanup(s) failed"));
    }
}
