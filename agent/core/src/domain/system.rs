// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! System Mount Boundary
//!
//! Primitive host operations the reconciliation engine drives. Implementations
//! shell out to the standard client tooling; the engine never issues mount
//! syscalls itself.

use crate::domain::mount::{ErrorKind, ForceLevel, MountRecord, PersistentEntry};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[async_trait]
pub trait MountSystem: Send + Sync {
    /// Current live mount table
    async fn mount_table(&self) -> Result<Vec<MountRecord>, MountSystemError>;

    /// Mount `source` on `target`. A leading `remount` option changes the
    /// flags of an existing mount in place.
    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &[String],
    ) -> Result<(), MountSystemError>;

    async fn unmount(&self, target: &Path, level: ForceLevel) -> Result<(), MountSystemError>;

    /// Entries of the managed persistent-table block
    async fn read_persistent(&self) -> Result<Vec<PersistentEntry>, MountSystemError>;

    /// Replace the managed persistent-table block
    async fn write_persistent(&self, entries: &[PersistentEntry]) -> Result<(), MountSystemError>;

    async fn ensure_directory(&self, path: &Path) -> Result<(), MountSystemError>;

    /// Store a mount credential in a file only root can read
    async fn write_secret(&self, path: &Path, secret: &str) -> Result<(), MountSystemError>;

    /// Remove a credential file; a missing file is not an error
    async fn remove_secret(&self, path: &Path) -> Result<(), MountSystemError>;

    /// Probe that a mounted target still responds
    async fn check_health(&self, _target: &Path) -> Result<(), MountSystemError> {
        Ok(())
    }

    /// Whether this host can mount network filesystems at all
    async fn supports_network_mounts(&self) -> Result<bool, MountSystemError> {
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountSystemError {
    #[error("target is busy: {0}")]
    Busy(String),

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("not mounted: {0}")]
    NotMounted(String),

    #[error("stale file handle: {0}")]
    Stale(String),

    #[error("operation timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(String),

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
}

impl MountSystemError {
    /// Classify into the error kinds the engine recovers from
    pub fn kind(&self) -> ErrorKind {
        match self {
            MountSystemError::Busy(_) => ErrorKind::ResourceBusy,
            MountSystemError::Unsupported(_) => ErrorKind::ProtocolValidation,
            MountSystemError::Unreachable(_)
            | MountSystemError::PermissionDenied(_)
            | MountSystemError::NotMounted(_)
            | MountSystemError::Stale(_)
            | MountSystemError::Timeout(_)
            | MountSystemError::Io(_)
            | MountSystemError::CommandFailed { .. } => ErrorKind::TransientMount,
        }
    }

    /// Classify failed `mount`/`umount` output by the messages those tools print
    pub fn from_command_output(command: &str, status: i32, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let detail = stderr.trim().to_string();

        if lower.contains("target is busy") || lower.contains("device is busy") {
            MountSystemError::Busy(detail)
        } else if lower.contains("not mounted") || lower.contains("no mount point specified") {
            MountSystemError::NotMounted(detail)
        } else if lower.contains("stale file handle") {
            MountSystemError::Stale(detail)
        } else if lower.contains("permission denied") || lower.contains("access denied") {
            MountSystemError::PermissionDenied(detail)
        } else if lower.contains("unknown filesystem type") || lower.contains("wrong fs type") {
            MountSystemError::Unsupported(detail)
        } else if lower.contains("connection timed out")
            || lower.contains("connection refused")
            || lower.contains("no route to host")
            || lower.contains("name or service not known")
        {
            MountSystemError::Unreachable(detail)
        } else {
            MountSystemError::CommandFailed {
                command: command.to_string(),
                status,
                stderr: detail,
            }
        }
    }
}
