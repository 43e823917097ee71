// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects, aggregates and boundary traits shared by the provider and
//! client agents.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Endpoint descriptors, mount state and host boundaries

pub mod endpoint;
pub mod wire;
pub mod mount;
pub mod mount_request;
pub mod peer;
pub mod status;
pub mod events;
pub mod relation;
pub mod system;
pub mod agent_config;
