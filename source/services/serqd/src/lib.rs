// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![deny(clippy::all, missing_docs)]

//! CONTEXT: Privileged console service draining the shared request queue
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 12 unit tests, 6 integration tests
//!
//! PUBLIC API:
//!   - ConsoleService: consumer loop (poll_once / drain / run)
//!   - ServiceConfig: TOML-backed service configuration
//!   - ServiceError / ConfigError: failure reporting
//!
//! DEPENDENCIES:
//!   - serq-abi: queue layout and ordering contract
//!   - serq-hal::ByteSink: console device
//!   - serq-sync: idle strategy between empty polls

mod config;
mod service;

pub use config::{ConfigError, ServiceConfig, UnsupportedPolicy};
pub use service::{ConsoleService, PollOutcome, Result, RunExit, ServiceError, ServiceStats};
