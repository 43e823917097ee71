// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory host runtime
//!
//! A shared relation network between applications, each with one data bag per
//! relation side, one peer bag and one leader. Unit handles see the network
//! through the boundary traits. Every write is logged with the writing unit
//! so tests can check who published what.

use crate::domain::relation::{
    Leadership, PeerChannel, RelationData, RelationError, RelationId, RelationStore,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Side {
    app: String,
    endpoint: String,
    data: RelationData,
}

#[derive(Debug, Clone)]
struct Relation {
    sides: [Side; 2],
}

impl Relation {
    fn side_of(&self, app: &str) -> Option<usize> {
        self.sides.iter().position(|s| s.app == app)
    }
}

/// One relation write as seen by the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub unit: String,
    pub relation: RelationId,
    pub key: String,
    pub value: Option<String>,
}

#[derive(Default)]
struct NetworkState {
    next_id: u32,
    relations: BTreeMap<RelationId, Relation>,
    peers: HashMap<String, RelationData>,
    leaders: HashMap<String, String>,
    writes: Vec<WriteRecord>,
}

#[derive(Clone, Default)]
pub struct RelationNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl RelationNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish a relation between two applications' endpoints
    pub fn relate(&self, app_a: &str, endpoint_a: &str, app_b: &str, endpoint_b: &str) -> RelationId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = RelationId(state.next_id);
        let side = |app: &str, endpoint: &str| Side {
            app: app.to_string(),
            endpoint: endpoint.to_string(),
            data: RelationData::new(),
        };
        state.relations.insert(
            id,
            Relation {
                sides: [side(app_a, endpoint_a), side(app_b, endpoint_b)],
            },
        );
        id
    }

    pub fn remove_relation(&self, relation: RelationId) {
        self.state.lock().relations.remove(&relation);
    }

    pub fn set_leader(&self, app: &str, unit: &str) {
        self.state.lock().leaders.insert(app.to_string(), unit.to_string());
    }

    /// Data `app` has published on `relation`
    pub fn data_of(&self, relation: RelationId, app: &str) -> RelationData {
        let state = self.state.lock();
        state
            .relations
            .get(&relation)
            .and_then(|r| r.side_of(app).map(|i| r.sides[i].data.clone()))
            .unwrap_or_default()
    }

    /// Overwrite `app`'s side directly, as a remote workload would
    pub fn publish(&self, relation: RelationId, app: &str, data: RelationData) {
        let mut state = self.state.lock();
        if let Some(r) = state.relations.get_mut(&relation) {
            if let Some(i) = r.side_of(app) {
                r.sides[i].data = data;
            }
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Handle for one unit of `app`
    pub fn unit(&self, app: &str, unit_id: &str) -> MemoryUnit {
        MemoryUnit {
            network: self.clone(),
            app: app.to_string(),
            unit_id: unit_id.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct MemoryUnit {
    network: RelationNetwork,
    app: String,
    unit_id: String,
}

impl MemoryUnit {
    fn with_relation<T>(
        &self,
        relation: RelationId,
        f: impl FnOnce(&mut Relation, usize) -> T,
    ) -> Result<T, RelationError> {
        let mut state = self.network.state.lock();
        let r = state
            .relations
            .get_mut(&relation)
            .ok_or(RelationError::NotFound(relation))?;
        let local = r.side_of(&self.app).ok_or(RelationError::NotFound(relation))?;
        Ok(f(r, local))
    }

    fn log(&self, relation: RelationId, key: &str, value: Option<&str>) {
        self.network.state.lock().writes.push(WriteRecord {
            unit: self.unit_id.clone(),
            relation,
            key: key.to_string(),
            value: value.map(str::to_string),
        });
    }
}

#[async_trait]
impl RelationStore for MemoryUnit {
    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<RelationId>, RelationError> {
        let state = self.network.state.lock();
        Ok(state
            .relations
            .iter()
            .filter(|(_, r)| {
                r.side_of(&self.app)
                    .map_or(false, |i| r.sides[i].endpoint == endpoint)
            })
            .map(|(id, _)| *id)
            .collect())
    }

    async fn remote_data(&self, relation: RelationId) -> Result<RelationData, RelationError> {
        self.with_relation(relation, |r, local| r.sides[1 - local].data.clone())
    }

    async fn local_data(&self, relation: RelationId) -> Result<RelationData, RelationError> {
        self.with_relation(relation, |r, local| r.sides[local].data.clone())
    }

    async fn write(&self, relation: RelationId, key: &str, value: &str) -> Result<(), RelationError> {
        self.with_relation(relation, |r, local| {
            r.sides[local].data.insert(key.to_string(), value.to_string());
        })?;
        self.log(relation, key, Some(value));
        Ok(())
    }

    async fn remove(&self, relation: RelationId, key: &str) -> Result<(), RelationError> {
        self.with_relation(relation, |r, local| {
            r.sides[local].data.remove(key);
        })?;
        self.log(relation, key, None);
        Ok(())
    }
}

#[async_trait]
impl PeerChannel for MemoryUnit {
    async fn read(&self) -> Result<RelationData, RelationError> {
        Ok(self
            .network
            .state
            .lock()
            .peers
            .get(&self.app)
            .cloned()
            .unwrap_or_default())
    }

    async fn write(&self, data: &RelationData) -> Result<(), RelationError> {
        self.network
            .state
            .lock()
            .peers
            .insert(self.app.clone(), data.clone());
        Ok(())
    }
}

#[async_trait]
impl Leadership for MemoryUnit {
    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    async fn is_leader(&self) -> Result<bool, RelationError> {
        Ok(self
            .network
            .state
            .lock()
            .leaders
            .get(&self.app)
            .map_or(false, |leader| *leader == self.unit_id))
    }
}
