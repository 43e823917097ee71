// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Host runtime adapters: relation storage, peer channel and leadership

pub mod file;
pub mod memory;

pub use file::{FileHost, HostState, RelationState};
pub use memory::{MemoryUnit, RelationNetwork, WriteRecord};
