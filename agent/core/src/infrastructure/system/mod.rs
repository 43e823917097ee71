// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Mount System Infrastructure Module
//!
//! Concrete implementations of the MountSystem trait.

pub mod fstab;
pub mod linux;
pub mod mock;

pub use fstab::FstabFile;
pub use linux::LinuxMountSystem;
pub use mock::{MockMountSystem, SystemCall};

use crate::domain::agent_config::SystemPaths;
use crate::domain::system::MountSystem;
use std::sync::Arc;

/// Mount system backend selection
#[derive(Debug, Clone)]
pub enum SystemBackend {
    /// Real host: /proc/self/mounts, mount(8), umount(8), fstab
    Linux(SystemPaths),

    /// In-memory mount table for tests and dry runs
    Mock,
}

pub fn create_mount_system(backend: SystemBackend) -> Arc<dyn MountSystem> {
    match backend {
        SystemBackend::Linux(paths) => Arc::new(LinuxMountSystem::new(paths)),
        SystemBackend::Mock => Arc::new(MockMountSystem::new()),
    }
}
