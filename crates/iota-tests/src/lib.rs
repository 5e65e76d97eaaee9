// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # OPC UA IoT Agent Integration Tests
//!
//! Every suite runs against [`common::mocks::MockTransportFactory`], so no
//! OPC UA server is needed.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p iota-tests
//! cargo test -p iota-tests --test integration_pool
//! ```
//!
//! ## Test Suites
//!
//! - `integration_pool.rs`: one client per endpoint, concurrent creation,
//!   failed starts, shutdown releases
//! - `integration_binding.rs`: parameter validation, monitoring, value
//!   forwarding, device removal
//! - `integration_lifecycle.rs`: agent start and stop, the multi-device
//!   scenario
//! - `integration_config.rs`: configuration files, overrides, devices from
//!   configuration

pub mod common;
