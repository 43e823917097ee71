// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Peer election record shared by provider replicas

use crate::domain::relation::RelationData;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LEADER_UNIT_ID_KEY: &str = "leader-unit-id";
pub const TERM_KEY: &str = "term";

/// Which replica may publish, and since which term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerElection {
    pub leader_unit_id: String,
    pub term: u64,
}

impl PeerElection {
    /// The successor record when `unit_id` takes over
    pub fn succeed(previous: Option<&PeerElection>, unit_id: &str) -> Self {
        Self {
            leader_unit_id: unit_id.to_string(),
            term: previous.map(|p| p.term + 1).unwrap_or(1),
        }
    }

    pub fn is_held_by(&self, unit_id: &str) -> bool {
        self.leader_unit_id == unit_id
    }

    pub fn to_data(&self) -> RelationData {
        let mut data = RelationData::new();
        data.insert(LEADER_UNIT_ID_KEY.to_string(), self.leader_unit_id.clone());
        data.insert(TERM_KEY.to_string(), self.term.to_string());
        data
    }

    /// `None` until the peer group has recorded a leader. A garbled term is
    /// read as 0 so the next leader still moves it forward.
    pub fn from_data(data: &RelationData) -> Option<Self> {
        let leader = data.get(LEADER_UNIT_ID_KEY).filter(|v| !v.is_empty())?;
        let term = data
            .get(TERM_KEY)
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(0);
        Some(Self {
            leader_unit_id: leader.clone(),
            term,
        })
    }
}

/// Role of the local provider unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Follower,
    Leader,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Follower => write!(f, "follower"),
            PeerRole::Leader => write!(f, "leader"),
        }
    }
}
