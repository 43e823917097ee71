// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::mount::{ForceLevel, MountState};
use crate::domain::relation::RelationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle notification delivered by the host runtime
///
/// Delivery is at-least-once and one at a time. Handlers re-derive state from
/// durable inputs, so the payload only names what changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    ConfigChanged,
    RelationJoined { endpoint: String, relation: RelationId },
    RelationChanged { endpoint: String, relation: RelationId },
    /// The relation is still listed by the store while this is handled
    RelationBroken { endpoint: String, relation: RelationId },
    LeaderElected,
    PeerChanged,
    UpdateStatus,
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::ConfigChanged => "config-changed",
            HostEvent::RelationJoined { .. } => "relation-joined",
            HostEvent::RelationChanged { .. } => "relation-changed",
            HostEvent::RelationBroken { .. } => "relation-broken",
            HostEvent::LeaderElected => "leader-elected",
            HostEvent::PeerChanged => "peer-changed",
            HostEvent::UpdateStatus => "update-status",
        }
    }

    /// Relation that is going away during this event, if any
    pub fn departing(&self, endpoint: &str) -> Option<RelationId> {
        match self {
            HostEvent::RelationBroken {
                endpoint: e,
                relation,
            } if e == endpoint => Some(*relation),
            _ => None,
        }
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::RelationJoined { endpoint, relation }
            | HostEvent::RelationChanged { endpoint, relation }
            | HostEvent::RelationBroken { endpoint, relation } => {
                write!(f, "{}:{}/{}", self.name(), endpoint, relation)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Mount lifecycle events published by the reconciliation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MountEvent {
    StateChanged {
        target: PathBuf,
        from: MountState,
        to: MountState,
        changed_at: DateTime<Utc>,
    },
    ConflictDetected {
        target: PathBuf,
        found_source: String,
        expected_source: String,
        owned: bool,
        detected_at: DateTime<Utc>,
    },
    MountFailed {
        target: PathBuf,
        reason: String,
        consecutive_failures: u32,
        retry_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    UnmountEscalated {
        target: PathBuf,
        level: ForceLevel,
        escalated_at: DateTime<Utc>,
    },
    Remounted {
        target: PathBuf,
        options: String,
        remounted_at: DateTime<Utc>,
    },
    PersistentEntryWritten {
        target: PathBuf,
        written_at: DateTime<Utc>,
    },
    PersistentEntryRemoved {
        target: PathBuf,
        removed_at: DateTime<Utc>,
    },
}

impl MountEvent {
    pub fn target(&self) -> &PathBuf {
        match self {
            MountEvent::StateChanged { target, .. }
            | MountEvent::ConflictDetected { target, .. }
            | MountEvent::MountFailed { target, .. }
            | MountEvent::UnmountEscalated { target, .. }
            | MountEvent::Remounted { target, .. }
            | MountEvent::PersistentEntryWritten { target, .. }
            | MountEvent::PersistentEntryRemoved { target, .. } => target,
        }
    }
}
