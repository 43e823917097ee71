// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Mount Domain Model
//!
//! Desired state (`MountSpec`) is derived from an `EndpointDescriptor` plus the
//! client's `MountOptions` and is never stored on its own. Actual state is what
//! the host reports (`MountRecord`) and what the persistent table holds
//! (`PersistentEntry`). `MountState` is the per-mountpoint lifecycle the
//! reconciliation engine drives.

use crate::domain::endpoint::{EndpointDescriptor, HostAddr};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Value Objects
// ============================================================================

/// Security and access flags applied to a mount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MountFlags {
    #[serde(default)]
    pub noexec: bool,
    #[serde(default)]
    pub nosuid: bool,
    #[serde(default)]
    pub nodev: bool,
    #[serde(default)]
    pub read_only: bool,
}

impl MountFlags {
    /// Option words, always spelled explicitly
    pub fn option_words(&self) -> [&'static str; 4] {
        [
            if self.noexec { "noexec" } else { "exec" },
            if self.nosuid { "nosuid" } else { "suid" },
            if self.nodev { "nodev" } else { "dev" },
            if self.read_only { "ro" } else { "rw" },
        ]
    }

    /// Recover flags from an observed option list. Kernels omit the
    /// permissive defaults, so only the restrictive words are looked for.
    pub fn from_options<S: AsRef<str>>(options: &[S]) -> Self {
        let has = |word: &str| options.iter().any(|o| o.as_ref() == word);
        Self {
            noexec: has("noexec"),
            nosuid: has("nosuid"),
            nodev: has("nodev"),
            read_only: has("ro"),
        }
    }
}

/// Client-local mount configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    pub mountpoint: PathBuf,
    #[serde(flatten)]
    pub flags: MountFlags,
}

impl MountOptions {
    pub fn new(mountpoint: impl Into<PathBuf>, flags: MountFlags) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            flags,
        }
    }

    pub fn validate(&self) -> Result<(), ReconcileError> {
        let raw = self.mountpoint.to_string_lossy();
        if !self.mountpoint.is_absolute() {
            return Err(ReconcileError::ProtocolValidation(format!(
                "mountpoint `{}` is not an absolute path",
                raw
            )));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(ReconcileError::ProtocolValidation(format!(
                "mountpoint `{}` must not contain whitespace",
                raw
            )));
        }
        if self.mountpoint == Path::new("/") {
            return Err(ReconcileError::ProtocolValidation(
                "refusing to mount over `/`".to_string(),
            ));
        }
        Ok(())
    }
}

/// Directory holding per-mountpoint credential files
pub const SECRET_DIR: &str = "/etc/fsrelay/secrets";

/// Credential file for the mount at `target`, e.g. `/mnt/x` maps to
/// `/etc/fsrelay/secrets/mnt-x.secret`
pub fn secret_path_for(target: &Path) -> PathBuf {
    let name = target
        .to_string_lossy()
        .trim_matches('/')
        .replace('/', "-");
    Path::new(SECRET_DIR).join(format!("{}.secret", name))
}

/// Credential a mount reads from a root-only file. It never appears in
/// mount options, the persistent table or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct MountSecret {
    pub path: PathBuf,
    pub key: String,
}

impl fmt::Debug for MountSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountSecret")
            .field("path", &self.path)
            .field("key", &"***")
            .finish()
    }
}

/// Fully resolved desired mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Device string handed to `mount`, e.g. `10.0.0.5:/export`
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    pub flags: MountFlags,
    /// Protocol-specific options such as `port=2049` or `mon_addr=...`
    pub extra_options: Vec<String>,
    #[serde(skip)]
    pub secret: Option<MountSecret>,
}

impl MountSpec {
    /// Derive the desired mount from what the provider advertises and how the
    /// client wants it mounted
    pub fn resolve(descriptor: &EndpointDescriptor, options: &MountOptions) -> Self {
        let mut secret = None;
        let (source, fstype, extra_options) = match descriptor {
            EndpointDescriptor::Nfs(nfs) => {
                let host = HostAddr::new(nfs.hostname.clone(), None);
                // the client falls back to 4.1, 3 or 2 when the server lacks 4.2
                let mut extra = vec!["nfsvers=4".to_string(), "minorversion=2".to_string()];
                extra.extend(nfs.port.map(|p| format!("port={}", p)));
                (format!("{}:{}", host.host_for_uri(), nfs.path), "nfs", extra)
            }
            EndpointDescriptor::Cephfs(ceph) => {
                let mons: Vec<String> = ceph.monitor_hosts.iter().map(HostAddr::to_string).collect();
                let path = secret_path_for(&options.mountpoint);
                let extra = vec![
                    format!("mon_addr={}", mons.join("/")),
                    format!("secretfile={}", path.display()),
                ];
                secret = Some(MountSecret {
                    path,
                    key: ceph.key.clone(),
                });
                (
                    format!("{}@{}.{}={}", ceph.user, ceph.fsid, ceph.fs_name, ceph.path),
                    "ceph",
                    extra,
                )
            }
            EndpointDescriptor::Lustre(lustre) => (
                format!("{}:/{}", lustre.mgs_nids.join(":"), lustre.fs_name),
                "lustre",
                Vec::new(),
            ),
        };

        Self {
            source,
            target: options.mountpoint.clone(),
            fstype: fstype.to_string(),
            flags: options.flags,
            extra_options,
            secret,
        }
    }

    /// Sorted option list as passed to `mount -o`
    pub fn options(&self) -> Vec<String> {
        let mut options: Vec<String> = self
            .flags
            .option_words()
            .iter()
            .map(|w| w.to_string())
            .chain(self.extra_options.iter().cloned())
            .collect();
        options.sort();
        options
    }

    pub fn option_string(&self) -> String {
        self.options().join(",")
    }

    /// Same options with secrets masked, for logs and status
    pub fn redacted_option_string(&self) -> String {
        redact_options(&self.option_string())
    }
}

/// Mask inline `secret=` values in a comma-separated option list
pub fn redact_options(options: &str) -> String {
    options
        .split(',')
        .map(|o| if o.starts_with("secret=") { "secret=***" } else { o })
        .collect::<Vec<_>>()
        .join(",")
}

/// Observed entry in the live mount table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    pub options: Vec<String>,
}

impl MountRecord {
    pub fn flags(&self) -> MountFlags {
        MountFlags::from_options(&self.options)
    }

    /// Same backing filesystem as the spec
    pub fn same_source(&self, spec: &MountSpec) -> bool {
        normalize_source(&self.source) == normalize_source(&spec.source)
            && fstype_family(&self.fstype) == fstype_family(&spec.fstype)
    }

    /// Whether this record was mounted from `source`
    pub fn source_is(&self, source: &str) -> bool {
        normalize_source(&self.source) == normalize_source(source)
    }

    /// Backing filesystem and flags both match
    pub fn satisfies(&self, spec: &MountSpec) -> bool {
        self.same_source(spec) && self.flags() == spec.flags
    }
}

fn normalize_source(source: &str) -> &str {
    match source.strip_suffix('/') {
        Some(trimmed) if !trimmed.ends_with(':') && !trimmed.ends_with('=') => trimmed,
        _ => source,
    }
}

// The kernel reports nfs4 for mounts requested as nfs.
fn fstype_family(fstype: &str) -> &str {
    match fstype {
        "nfs4" => "nfs",
        other => other,
    }
}

/// Entry in the managed persistent mount table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentEntry {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    pub options: String,
}

impl PersistentEntry {
    /// Persistent entries always carry `_netdev` so boot waits for the network
    pub fn from_spec(spec: &MountSpec) -> Self {
        let mut options = spec.options();
        options.push("_netdev".to_string());
        options.sort();
        Self {
            source: spec.source.clone(),
            target: spec.target.clone(),
            fstype: spec.fstype.clone(),
            options: options.join(","),
        }
    }

    /// Credential file the entry's mount reads, if any
    pub fn secret_file(&self) -> Option<PathBuf> {
        self.options
            .split(',')
            .find_map(|o| o.strip_prefix("secretfile="))
            .map(PathBuf::from)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of one managed mountpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountState {
    Absent,
    Mounting,
    Mounted,
    Unmounting,
    Failed,
    Conflicted,
}

impl MountState {
    pub fn can_transition_to(self, next: MountState) -> bool {
        use MountState::*;
        match (self, next) {
            // forced teardown is allowed from anywhere
            (_, Absent) => true,
            (Absent, Mounting | Conflicted) => true,
            (Mounting, Mounted | Failed | Conflicted) => true,
            (Mounted, Unmounting | Failed | Conflicted) => true,
            (Unmounting, Unmounting) => true,
            (Failed, Mounting | Unmounting | Conflicted) => true,
            (Conflicted, Unmounting | Mounting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MountState::Absent => "absent",
            MountState::Mounting => "mounting",
            MountState::Mounted => "mounted",
            MountState::Unmounting => "unmounting",
            MountState::Failed => "failed",
            MountState::Conflicted => "conflicted",
        };
        write!(f, "{}", s)
    }
}

/// Unmount force level, escalated in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceLevel {
    Graceful,
    Force,
    Lazy,
}

impl ForceLevel {
    pub const ESCALATION: [ForceLevel; 3] = [ForceLevel::Graceful, ForceLevel::Force, ForceLevel::Lazy];

    /// Extra `umount` flag for this level
    pub fn umount_flag(&self) -> Option<&'static str> {
        match self {
            ForceLevel::Graceful => None,
            ForceLevel::Force => Some("-f"),
            ForceLevel::Lazy => Some("-l"),
        }
    }
}

impl fmt::Display for ForceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ForceLevel::Graceful => "graceful",
            ForceLevel::Force => "force",
            ForceLevel::Lazy => "lazy",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

/// Error classes the engine distinguishes for recovery and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    ProtocolValidation,
    TransientMount,
    Conflict,
    ResourceBusy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("invalid mount configuration: {0}")]
    ProtocolValidation(String),

    #[error("mount of {} failed: {reason} (retry in {}s)", .target.display(), .retry_in.as_secs())]
    TransientMount {
        target: PathBuf,
        reason: String,
        retry_in: Duration,
    },

    #[error("{} is occupied by {found}, expected {expected}", .target.display())]
    Conflict {
        target: PathBuf,
        found: String,
        expected: String,
    },

    #[error("{} is busy; unmount escalated to {level}", .target.display())]
    ResourceBusy { target: PathBuf, level: ForceLevel },

    #[error("invalid state transition for {}: {from} -> {to}", .target.display())]
    InvalidStateTransition {
        target: PathBuf,
        from: MountState,
        to: MountState,
    },
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::ProtocolValidation(_) | ReconcileError::InvalidStateTransition { .. } => {
                ErrorKind::ProtocolValidation
            }
            ReconcileError::TransientMount { .. } => ErrorKind::TransientMount,
            ReconcileError::Conflict { .. } => ErrorKind::Conflict,
            ReconcileError::ResourceBusy { .. } => ErrorKind::ResourceBusy,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
