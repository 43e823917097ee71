// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Host Runtime Boundary - relation storage, peer channel and leadership
//!
//! These traits isolate the agents from whatever delivers relation data in a
//! deployment. The only ordering guarantee is last-writer-wins per key, so
//! callers must treat every read as possibly stale and re-derive state from
//! it instead of remembering deltas.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Flat string key-value payload of one side of a relation
pub type RelationData = BTreeMap<String, String>;

/// Endpoint name of the provider → client filesystem relation
pub const FILESYSTEM_ENDPOINT: &str = "filesystem";

/// Endpoint name of the workload → client mount-request relation
pub const MOUNT_ENDPOINT: &str = "mount";

/// Identifier of one relation instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId(pub u32);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable per-relation key-value storage
///
/// `remote_data` is what the other side published, `local_data` is what this
/// side published. Writes overwrite the previous value of the key.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Relations currently established on `endpoint`, in ascending id order
    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<RelationId>, RelationError>;

    async fn remote_data(&self, relation: RelationId) -> Result<RelationData, RelationError>;

    async fn local_data(&self, relation: RelationId) -> Result<RelationData, RelationError>;

    async fn write(&self, relation: RelationId, key: &str, value: &str) -> Result<(), RelationError>;

    async fn remove(&self, relation: RelationId, key: &str) -> Result<(), RelationError>;

    /// Read one key published by the remote side
    async fn read(&self, relation: RelationId, key: &str) -> Result<Option<String>, RelationError> {
        Ok(self.remote_data(relation).await?.remove(key))
    }
}

/// Application-wide data bag shared by all units of one provider application
#[async_trait]
pub trait PeerChannel: Send + Sync {
    async fn read(&self) -> Result<RelationData, RelationError>;

    async fn write(&self, data: &RelationData) -> Result<(), RelationError>;
}

/// Leadership as decided by the host runtime
///
/// Election itself is external; agents only query and gate on it.
#[async_trait]
pub trait Leadership: Send + Sync {
    /// Identity of the local unit, e.g. `nfs-proxy/0`
    fn unit_id(&self) -> &str;

    async fn is_leader(&self) -> Result<bool, RelationError>;
}

#[derive(Debug, Error)]
pub enum RelationError {
    #[error("Relation not found: {0}")]
    NotFound(RelationId),

    #[error("Host runtime unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
