// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! JSON host-state file
//!
//! Stand-in for the host runtime when an agent runs from the CLI. The file
//! holds this unit's relations, the peer bag, the leader flag and the last
//! reported status. It is re-read on every access so that whatever drives the
//! agent (a test harness, an operator, a bridge to a real orchestrator) can
//! edit it between events.

use crate::domain::relation::{
    Leadership, PeerChannel, RelationData, RelationError, RelationId, RelationStore,
};
use crate::domain::status::{StatusSink, UnitStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub leader: bool,

    #[serde(default)]
    pub relations: Vec<RelationState>,

    #[serde(default)]
    pub peer: RelationData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UnitStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationState {
    pub id: RelationId,
    pub endpoint: String,
    #[serde(default)]
    pub local: RelationData,
    #[serde(default)]
    pub remote: RelationData,
}

impl HostState {
    fn relation(&self, id: RelationId) -> Result<&RelationState, RelationError> {
        self.relations
            .iter()
            .find(|r| r.id == id)
            .ok_or(RelationError::NotFound(id))
    }

    fn relation_mut(&mut self, id: RelationId) -> Result<&mut RelationState, RelationError> {
        self.relations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RelationError::NotFound(id))
    }
}

pub struct FileHost {
    path: PathBuf,
    unit_id: String,
    // serialises read-modify-write cycles within this process
    lock: tokio::sync::Mutex<()>,
}

impl FileHost {
    pub fn new(path: impl Into<PathBuf>, unit_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            unit_id: unit_id.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A missing file is an empty host: no relations, not leader
    pub async fn load(&self) -> Result<HostState, RelationError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HostState::default()),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| RelationError::Serialization(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostState::default()),
            Err(e) => Err(RelationError::Io(format!("{}: {}", self.path.display(), e))),
        }
    }

    async fn store(&self, state: &HostState) -> Result<(), RelationError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| RelationError::Serialization(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RelationError::Io(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RelationError::Io(format!("{}: {}", self.path.display(), e)))
    }

    async fn update<T: Send>(
        &self,
        f: impl FnOnce(&mut HostState) -> Result<T, RelationError> + Send,
    ) -> Result<T, RelationError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let result = f(&mut state)?;
        self.store(&state).await?;
        Ok(result)
    }
}

#[async_trait]
impl RelationStore for FileHost {
    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<RelationId>, RelationError> {
        let state = self.load().await?;
        let mut ids: Vec<RelationId> = state
            .relations
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .map(|r| r.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn remote_data(&self, relation: RelationId) -> Result<RelationData, RelationError> {
        Ok(self.load().await?.relation(relation)?.remote.clone())
    }

    async fn local_data(&self, relation: RelationId) -> Result<RelationData, RelationError> {
        Ok(self.load().await?.relation(relation)?.local.clone())
    }

    async fn write(&self, relation: RelationId, key: &str, value: &str) -> Result<(), RelationError> {
        self.update(|state| {
            state
                .relation_mut(relation)?
                .local
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    async fn remove(&self, relation: RelationId, key: &str) -> Result<(), RelationError> {
        self.update(|state| {
            state.relation_mut(relation)?.local.remove(key);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PeerChannel for FileHost {
    async fn read(&self) -> Result<RelationData, RelationError> {
        Ok(self.load().await?.peer)
    }

    async fn write(&self, data: &RelationData) -> Result<(), RelationError> {
        let data = data.clone();
        self.update(move |state| {
            state.peer = data;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Leadership for FileHost {
    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    async fn is_leader(&self) -> Result<bool, RelationError> {
        Ok(self.load().await?.leader)
    }
}

#[async_trait]
impl StatusSink for FileHost {
    async fn set_status(&self, status: &UnitStatus) -> anyhow::Result<()> {
        let status = status.clone();
        self.update(move |state| {
            state.status = Some(status);
            Ok(())
        })
        .await?;
        Ok(())
    }
}
