// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Peer Coordinator
//!
//! Gates publishing among redundant provider units. Election happens in the
//! host runtime; this service only follows it, records the winner and term in
//! the peer bag, and tells the publisher when leadership was gained or lost.
//! Stepping down never retracts data already published.

use crate::domain::peer::{PeerElection, PeerRole};
use crate::domain::relation::{Leadership, PeerChannel};
use crate::infrastructure::telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipTransition {
    /// Gained publishing rights; the caller republishes
    BecameLeader { term: u64 },
    SteppedDown,
    Unchanged(PeerRole),
}

pub struct PeerCoordinator {
    leadership: Arc<dyn Leadership>,
    peers: Arc<dyn PeerChannel>,
    role: PeerRole,
}

impl PeerCoordinator {
    pub fn new(leadership: Arc<dyn Leadership>, peers: Arc<dyn PeerChannel>) -> Self {
        Self {
            leadership,
            peers,
            role: PeerRole::Follower,
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn unit_id(&self) -> &str {
        self.leadership.unit_id()
    }

    /// Re-derive this unit's role from the runtime's answer and the peer bag
    pub async fn observe(&mut self) -> Result<LeadershipTransition> {
        let is_leader = self
            .leadership
            .is_leader()
            .await
            .context("Failed to query leadership")?;
        let election = self.current_election().await?;
        let unit_id = self.leadership.unit_id().to_string();

        let transition = match (is_leader, self.role) {
            (true, role) => {
                let term = match election.as_ref() {
                    Some(e) if e.is_held_by(&unit_id) => e.term,
                    previous => {
                        let next = PeerElection::succeed(previous, &unit_id);
                        self.peers
                            .write(&next.to_data())
                            .await
                            .context("Failed to record election in peer bag")?;
                        next.term
                    }
                };
                if role == PeerRole::Leader {
                    LeadershipTransition::Unchanged(PeerRole::Leader)
                } else {
                    LeadershipTransition::BecameLeader { term }
                }
            }
            (false, PeerRole::Leader) => LeadershipTransition::SteppedDown,
            (false, PeerRole::Follower) => LeadershipTransition::Unchanged(PeerRole::Follower),
        };

        match &transition {
            LeadershipTransition::BecameLeader { term } => {
                info!(unit = %unit_id, term, "Became publishing leader");
                metrics::counter!(telemetry::LEADERSHIP_CHANGES, "change" => "gained").increment(1);
                self.role = PeerRole::Leader;
            }
            LeadershipTransition::SteppedDown => {
                info!(unit = %unit_id, "Lost leadership; leaving published data in place");
                metrics::counter!(telemetry::LEADERSHIP_CHANGES, "change" => "lost").increment(1);
                self.role = PeerRole::Follower;
            }
            LeadershipTransition::Unchanged(role) => {
                debug!(unit = %unit_id, %role, "Leadership unchanged");
            }
        }

        Ok(transition)
    }

    /// Final check right before writing to client relations. Both the runtime
    /// and the peer record must name this unit.
    pub async fn may_publish(&self) -> Result<bool> {
        if self.role != PeerRole::Leader {
            return Ok(false);
        }
        if !self.leadership.is_leader().await.context("Failed to query leadership")? {
            return Ok(false);
        }
        let unit_id = self.leadership.unit_id();
        Ok(self
            .current_election()
            .await?
            .map_or(false, |e| e.is_held_by(unit_id)))
    }

    pub async fn current_election(&self) -> Result<Option<PeerElection>> {
        let data = self.peers.read().await.context("Failed to read peer bag")?;
        Ok(PeerElection::from_data(&data))
    }
}
