// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Recording in-memory mount system for tests
//!
//! Keeps a fake live table and managed block, records every call, and lets a
//! test inject mount failures, busy targets, stale mounts, hangs and an
//! unsupported environment.

use crate::domain::mount::{ForceLevel, MountRecord, PersistentEntry};
use crate::domain::system::{MountSystem, MountSystemError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCall {
    Mount {
        source: String,
        target: PathBuf,
        fstype: String,
        options: Vec<String>,
    },
    Remount {
        target: PathBuf,
        options: Vec<String>,
    },
    Unmount {
        target: PathBuf,
        level: ForceLevel,
    },
    WritePersistent(Vec<PersistentEntry>),
    EnsureDirectory(PathBuf),
    WriteSecret(PathBuf),
    RemoveSecret(PathBuf),
}

impl SystemCall {
    /// Calls that change the live mount table
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            SystemCall::Mount { .. } | SystemCall::Remount { .. } | SystemCall::Unmount { .. }
        )
    }
}

#[derive(Clone, Default)]
pub struct MockMountSystem {
    pub table: Arc<Mutex<Vec<MountRecord>>>,
    pub persistent: Arc<Mutex<Vec<PersistentEntry>>>,
    pub directories: Arc<Mutex<BTreeSet<PathBuf>>>,
    pub calls: Arc<Mutex<Vec<SystemCall>>>,
    secrets: Arc<Mutex<HashMap<PathBuf, String>>>,
    mount_failures: Arc<Mutex<VecDeque<MountSystemError>>>,
    // target -> lowest force level that succeeds; None never succeeds
    busy: Arc<Mutex<HashMap<PathBuf, Option<ForceLevel>>>>,
    stale: Arc<Mutex<BTreeSet<PathBuf>>>,
    mount_delay: Arc<Mutex<Option<Duration>>>,
    unsupported: Arc<Mutex<bool>>,
    // the next successful mount makes this many table reads fail
    table_failures_after_mount: Arc<Mutex<u32>>,
    table_failures: Arc<Mutex<u32>>,
}

impl MockMountSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend something is already mounted, e.g. by an administrator
    pub fn insert_record(&self, record: MountRecord) {
        self.table.lock().push(record);
    }

    /// Drop a live record behind the engine's back
    pub fn remove_record(&self, target: &Path) {
        self.table.lock().retain(|r| r.target != target);
    }

    pub fn set_persistent(&self, entries: Vec<PersistentEntry>) {
        *self.persistent.lock() = entries;
    }

    /// Fail the next mount attempts with these errors, in order
    pub fn fail_next_mounts(&self, errors: impl IntoIterator<Item = MountSystemError>) {
        self.mount_failures.lock().extend(errors);
    }

    /// Make unmounts of `target` report busy below `succeeds_at`
    pub fn set_busy(&self, target: impl Into<PathBuf>, succeeds_at: Option<ForceLevel>) {
        self.busy.lock().insert(target.into(), succeeds_at);
    }

    pub fn clear_busy(&self, target: &Path) {
        self.busy.lock().remove(target);
    }

    pub fn set_stale(&self, target: impl Into<PathBuf>) {
        self.stale.lock().insert(target.into());
    }

    /// Make every mount call sleep first
    pub fn set_mount_delay(&self, delay: Option<Duration>) {
        *self.mount_delay.lock() = delay;
    }

    pub fn set_unsupported(&self, unsupported: bool) {
        *self.unsupported.lock() = unsupported;
    }

    /// Let the next mount succeed, then fail the table read that follows it
    pub fn fail_table_read_after_next_mount(&self) {
        *self.table_failures_after_mount.lock() = 1;
    }

    pub fn secret_at(&self, path: &Path) -> Option<String> {
        self.secrets.lock().get(path).cloned()
    }

    pub fn calls(&self) -> Vec<SystemCall> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> Vec<SystemCall> {
        self.calls.lock().iter().filter(|c| c.is_mutation()).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn records_at(&self, target: &Path) -> Vec<MountRecord> {
        self.table.lock().iter().filter(|r| r.target == target).cloned().collect()
    }

    pub fn persistent_entries(&self) -> Vec<PersistentEntry> {
        self.persistent.lock().clone()
    }
}

#[async_trait]
impl MountSystem for MockMountSystem {
    async fn mount_table(&self) -> Result<Vec<MountRecord>, MountSystemError> {
        {
            let mut failures = self.table_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(MountSystemError::Io("mount table unavailable".to_string()));
            }
        }
        Ok(self.table.lock().clone())
    }

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &[String],
    ) -> Result<(), MountSystemError> {
        let delay = *self.mount_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let remount = options.first().map(String::as_str) == Some("remount");
        let options: Vec<String> = options.iter().filter(|o| *o != "remount").cloned().collect();

        if remount {
            self.calls.lock().push(SystemCall::Remount {
                target: target.to_path_buf(),
                options: options.clone(),
            });
            let mut table = self.table.lock();
            return match table.iter_mut().rev().find(|r| r.target == target) {
                Some(record) => {
                    record.options = options;
                    Ok(())
                }
                None => Err(MountSystemError::NotMounted(target.display().to_string())),
            };
        }

        self.calls.lock().push(SystemCall::Mount {
            source: source.to_string(),
            target: target.to_path_buf(),
            fstype: fstype.to_string(),
            options: options.clone(),
        });

        if let Some(err) = self.mount_failures.lock().pop_front() {
            return Err(err);
        }

        self.table.lock().push(MountRecord {
            source: source.to_string(),
            target: target.to_path_buf(),
            fstype: fstype.to_string(),
            options,
        });
        let armed = std::mem::take(&mut *self.table_failures_after_mount.lock());
        *self.table_failures.lock() += armed;
        Ok(())
    }

    async fn unmount(&self, target: &Path, level: ForceLevel) -> Result<(), MountSystemError> {
        self.calls.lock().push(SystemCall::Unmount {
            target: target.to_path_buf(),
            level,
        });

        if let Some(succeeds_at) = self.busy.lock().get(target) {
            if succeeds_at.map_or(true, |min| level < min) {
                return Err(MountSystemError::Busy(target.display().to_string()));
            }
        }

        let mut table = self.table.lock();
        if let Some(pos) = table.iter().rposition(|r| r.target == target) {
            table.remove(pos);
        }
        self.stale.lock().remove(target);
        Ok(())
    }

    async fn read_persistent(&self) -> Result<Vec<PersistentEntry>, MountSystemError> {
        Ok(self.persistent.lock().clone())
    }

    async fn write_persistent(&self, entries: &[PersistentEntry]) -> Result<(), MountSystemError> {
        self.calls.lock().push(SystemCall::WritePersistent(entries.to_vec()));
        *self.persistent.lock() = entries.to_vec();
        Ok(())
    }

    async fn ensure_directory(&self, path: &Path) -> Result<(), MountSystemError> {
        self.calls.lock().push(SystemCall::EnsureDirectory(path.to_path_buf()));
        self.directories.lock().insert(path.to_path_buf());
        Ok(())
    }

    async fn write_secret(&self, path: &Path, secret: &str) -> Result<(), MountSystemError> {
        self.calls.lock().push(SystemCall::WriteSecret(path.to_path_buf()));
        self.secrets.lock().insert(path.to_path_buf(), secret.to_string());
        Ok(())
    }

    async fn remove_secret(&self, path: &Path) -> Result<(), MountSystemError> {
        self.calls.lock().push(SystemCall::RemoveSecret(path.to_path_buf()));
        self.secrets.lock().remove(path);
        Ok(())
    }

    async fn check_health(&self, target: &Path) -> Result<(), MountSystemError> {
        if self.stale.lock().contains(target) {
            return Err(MountSystemError::Stale(target.display().to_string()));
        }
        Ok(())
    }

    async fn supports_network_mounts(&self) -> Result<bool, MountSystemError> {
        Ok(!*self.unsupported.lock())
    }
}
