// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0
//! fsrelay core
//!
//! Endpoint relation protocol between filesystem providers and clients, and
//! the client-side mount reconciliation engine.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, use cases and host adapters for fsrelay agents

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
