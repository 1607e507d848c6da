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

//! # Neutron Probe Runtime
//!
//! Harness for running API and scenario tests against a live OpenStack Networking deployment.
//!
//! - [`registry`] tracks every created resource and removes them in reverse creation order.
//! - [`scenario`] expands the parameter axes of a test class into scenario instances.
//! - [`waiter`] polls remote state until a condition holds or a timeout passes.
//! - [`catalog`] describes test classes and cases as data, [`cases`] contains all of them, and
//!   [`runner`] executes them on a pool of worker threads.
//!
//! For simplified usage, build an [`context::Environment`] from a [`config::Config`], and pass it
//! to [`runner::run`] together with [`cases::catalog`].

#![deny(missing_docs, missing_debug_implementations)]

mod macros;

pub mod bandwidth;
pub mod cases;
pub mod catalog;
pub mod cidr;
pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod requirements;
pub mod runner;
pub mod scenario;
pub mod ssh;
pub mod waiter;

pub use error::{Error, Result};
