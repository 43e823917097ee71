// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Provider Publisher
//!
//! Builds the endpoint descriptor from provider configuration and writes it to
//! every client relation, but only while the Peer Coordinator says this unit
//! may publish. Only keys whose value differs are written, so republishing an
//! unchanged descriptor leaves client-visible data untouched.

use crate::application::peer_coordinator::{LeadershipTransition, PeerCoordinator};
use crate::application::status_reporter::StatusReporter;
use crate::domain::agent_config::ProviderConfig;
use crate::domain::endpoint::EndpointDescriptor;
use crate::domain::events::HostEvent;
use crate::domain::relation::{RelationData, RelationId, RelationStore, FILESYSTEM_ENDPOINT};
use crate::domain::status::UnitStatus;
use crate::domain::wire;
use crate::infrastructure::telemetry;
use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// `changed` relations out of `relations` received new data
    Published { relations: usize, changed: usize },
    Unchanged,
    NotLeader,
    /// Configuration did not yield a valid descriptor; nothing was written
    Blocked(String),
}

pub struct ProviderPublisher {
    relations: Arc<dyn RelationStore>,
}

impl ProviderPublisher {
    pub fn new(relations: Arc<dyn RelationStore>) -> Self {
        Self { relations }
    }

    /// Write `descriptor` to every filesystem relation except `skip`
    pub async fn publish(
        &self,
        descriptor: &EndpointDescriptor,
        skip: Option<RelationId>,
    ) -> Result<PublishOutcome> {
        let payload = wire::encode(descriptor);
        let ids: Vec<RelationId> = self
            .relations
            .relation_ids(FILESYSTEM_ENDPOINT)
            .await
            .context("Failed to list client relations")?
            .into_iter()
            .filter(|id| Some(*id) != skip)
            .collect();

        let results = join_all(ids.iter().map(|id| self.publish_to(*id, &payload))).await;

        let mut changed = 0;
        for (id, result) in ids.iter().zip(results) {
            if result.with_context(|| format!("Failed to publish to relation {}", id))? {
                changed += 1;
            }
        }

        if changed == 0 {
            debug!(relations = ids.len(), "Published endpoint unchanged");
            return Ok(PublishOutcome::Unchanged);
        }

        info!(
            endpoint = %descriptor,
            relations = ids.len(),
            changed,
            "Published endpoint descriptor"
        );
        metrics::counter!(telemetry::PUBLISHES).increment(changed as u64);
        Ok(PublishOutcome::Published {
            relations: ids.len(),
            changed,
        })
    }

    /// Returns whether anything was written
    async fn publish_to(&self, relation: RelationId, payload: &RelationData) -> Result<bool> {
        let current = self.relations.local_data(relation).await?;
        let mut changed = false;

        // keys of a previously published protocol
        for key in current.keys().filter(|k| wire::is_descriptor_key(k)) {
            if !payload.contains_key(key) {
                self.relations.remove(relation, key).await?;
                changed = true;
            }
        }

        for (key, value) in payload {
            if current.get(key) != Some(value) {
                self.relations.write(relation, key, value).await?;
                changed = true;
            }
        }

        Ok(changed)
    }
}

// ============================================================================
// Provider agent
// ============================================================================

/// Event handler of a provider unit
pub struct ProviderAgent {
    coordinator: PeerCoordinator,
    publisher: ProviderPublisher,
    reporter: StatusReporter,
}

impl ProviderAgent {
    pub fn new(
        coordinator: PeerCoordinator,
        publisher: ProviderPublisher,
        reporter: StatusReporter,
    ) -> Self {
        Self {
            coordinator,
            publisher,
            reporter,
        }
    }

    pub fn coordinator(&self) -> &PeerCoordinator {
        &self.coordinator
    }

    /// Re-derive everything from current config and leadership. Every unit
    /// validates configuration; only the leader writes.
    pub async fn handle(&mut self, event: &HostEvent, config: &ProviderConfig) -> Result<PublishOutcome> {
        debug!(%event, "Handling provider event");

        let transition = self.coordinator.observe().await?;

        let descriptor = match config.build_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let reason = e.to_string();
                warn!("Not publishing: {}", reason);
                self.reporter.report(UnitStatus::Blocked(reason.clone())).await;
                return Ok(PublishOutcome::Blocked(reason));
            }
        };

        if !self.coordinator.may_publish().await? {
            if transition == LeadershipTransition::SteppedDown {
                info!("Stepped down; published data is left for the next leader");
            }
            self.reporter
                .report(UnitStatus::Active(format!("Standby for {}", descriptor)))
                .await;
            return Ok(PublishOutcome::NotLeader);
        }

        let outcome = self
            .publisher
            .publish(&descriptor, event.departing(FILESYSTEM_ENDPOINT))
            .await?;
        self.reporter
            .report(UnitStatus::Active(format!("Publishing {}", descriptor)))
            .await;
        Ok(outcome)
    }
}
