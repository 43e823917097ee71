// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Client agent
//!
//! Handles every host event the same way: re-read the filesystem and mount
//! relations, derive the desired mount, run one reconciliation pass, answer
//! the workload and report status. Nothing is carried over from the event
//! itself except which relation is departing.

use crate::application::reconciler::{ReconcileReport, ReconciliationEngine};
use crate::application::status_reporter::{summarize, StatusReporter};
use crate::domain::agent_config::{ClientConfig, RetryPolicy};
use crate::domain::endpoint::EndpointDescriptor;
use crate::domain::events::HostEvent;
use crate::domain::mount::{MountOptions, MountSpec};
use crate::domain::mount_request::{self, MOUNTED_KEY};
use crate::domain::relation::{RelationId, RelationStore, FILESYSTEM_ENDPOINT, MOUNT_ENDPOINT};
use crate::domain::status::UnitStatus;
use crate::domain::system::MountSystem;
use crate::domain::wire::{self, DecodeError};
use crate::infrastructure::event_bus::EventBus;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where the mount options come from, or why there are none
enum OptionsResolution {
    Resolved(MountOptions),
    /// Nothing should be mounted; report this once the engine is idle
    Pending(UnitStatus),
    /// Inputs contradict each other; mounts are left as they are
    Invalid(UnitStatus),
}

pub struct ClientAgent {
    relations: Arc<dyn RelationStore>,
    system: Arc<dyn MountSystem>,
    engine: ReconciliationEngine,
    reporter: StatusReporter,
    /// Last descriptor that decoded cleanly, with the relation it came from
    descriptor: Option<(RelationId, EndpointDescriptor)>,
}

impl ClientAgent {
    pub fn new(
        relations: Arc<dyn RelationStore>,
        system: Arc<dyn MountSystem>,
        event_bus: Arc<EventBus>,
        reporter: StatusReporter,
        policy: RetryPolicy,
    ) -> Self {
        let engine = ReconciliationEngine::new(system.clone(), event_bus, policy);
        Self {
            relations,
            system,
            engine,
            reporter,
            descriptor: None,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.engine.set_policy(policy);
    }

    /// When the engine next wants a pass without an external event
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.engine.next_wakeup()
    }

    pub async fn handle(&mut self, event: &HostEvent, config: &ClientConfig) -> Result<UnitStatus> {
        debug!(%event, "Handling client event");
        let status = self.evaluate(event, config).await?;
        self.reporter.report(status.clone()).await;
        Ok(status)
    }

    async fn evaluate(&mut self, event: &HostEvent, config: &ClientConfig) -> Result<UnitStatus> {
        let supported = match self.system.supports_network_mounts().await {
            Ok(supported) => supported,
            Err(e) => {
                warn!("Environment probe failed, assuming network mounts work: {}", e);
                true
            }
        };
        if !supported {
            return Ok(UnitStatus::Blocked(
                "Cannot mount filesystems on LXD containers".to_string(),
            ));
        }

        let providers = self.live_relations(FILESYSTEM_ENDPOINT, event).await?;
        if providers.len() > 1 {
            warn!(count = providers.len(), "More than one filesystem provider related");
            return Ok(UnitStatus::Blocked(
                "Too many filesystem integrations; only one provider is supported".to_string(),
            ));
        }

        let (descriptor_waiting, invalid_payload) = self.refresh_descriptor(providers.first().copied()).await?;

        let workloads = self.live_relations(MOUNT_ENDPOINT, event).await?;
        let options = match self.resolve_options(config, &workloads).await? {
            OptionsResolution::Invalid(status) => return Ok(status),
            OptionsResolution::Pending(status) => Err(status),
            OptionsResolution::Resolved(options) => Ok(options),
        };

        let (desired, idle_status) = match (&self.descriptor, options) {
            (_, Err(status)) => (None, Some(status)),
            (Some((_, descriptor)), Ok(options)) => {
                (Some(MountSpec::resolve(descriptor, &options)), None)
            }
            (None, Ok(_)) => (None, Some(descriptor_waiting)),
        };

        // a config change is the operator's cue to try refused mounts again
        if *event == HostEvent::ConfigChanged {
            self.engine.retry_rejected();
        }

        if self.engine.unmount_pending(desired.as_ref()) {
            self.reporter
                .report(UnitStatus::Maintenance("Unmounting filesystem".to_string()))
                .await;
        }

        let report = match self.engine.reconcile(desired.as_ref()).await {
            Ok(report) => report,
            Err(e) => {
                self.reporter
                    .report(UnitStatus::Waiting(format!("Cannot read mount state: {:#}", e)))
                    .await;
                return Err(e);
            }
        };

        self.answer_workloads(&workloads, desired.as_ref(), &report).await?;

        if let Some(reason) = invalid_payload {
            return Ok(UnitStatus::Blocked(reason));
        }
        Ok(match idle_status {
            Some(status) if report.mounts.is_empty() => status,
            _ => summarize(&report.mounts, self.engine.policy().blocked_after_failures),
        })
    }

    /// Relations on `endpoint`, minus one departing in this event
    async fn live_relations(&self, endpoint: &str, event: &HostEvent) -> Result<Vec<RelationId>> {
        let departing = event.departing(endpoint);
        Ok(self
            .relations
            .relation_ids(endpoint)
            .await
            .with_context(|| format!("Failed to list `{}` relations", endpoint))?
            .into_iter()
            .filter(|id| Some(*id) != departing)
            .collect())
    }

    /// Update the held descriptor from the provider relation. Returns the
    /// status to show while nothing is desired, and a blocking reason when
    /// the provider sent something unusable.
    async fn refresh_descriptor(
        &mut self,
        provider: Option<RelationId>,
    ) -> Result<(UnitStatus, Option<String>)> {
        let Some(relation) = provider else {
            self.descriptor = None;
            return Ok((
                UnitStatus::Waiting("Waiting for filesystem integration".to_string()),
                None,
            ));
        };

        let data = self
            .relations
            .remote_data(relation)
            .await
            .with_context(|| format!("Failed to read filesystem relation {}", relation))?;
        let waiting = UnitStatus::Waiting("Waiting for endpoint from provider".to_string());

        match wire::decode(&data) {
            Ok(descriptor) => {
                let changed = self.descriptor.as_ref().map(|(_, d)| d) != Some(&descriptor);
                if changed {
                    info!(endpoint = %descriptor, relation = %relation, "Received endpoint descriptor");
                }
                self.descriptor = Some((relation, descriptor));
                Ok((waiting, None))
            }
            Err(DecodeError::Empty) => {
                self.descriptor = None;
                Ok((waiting, None))
            }
            Err(e) => {
                warn!(relation = %relation, "Ignoring invalid endpoint data: {}", e);
                // keep serving the last good descriptor from the same provider
                if self.descriptor.as_ref().map(|(id, _)| *id) != Some(relation) {
                    self.descriptor = None;
                }
                Ok((waiting, Some(format!("Invalid endpoint data from provider: {}", e))))
            }
        }
    }

    async fn resolve_options(
        &self,
        config: &ClientConfig,
        workloads: &[RelationId],
    ) -> Result<OptionsResolution> {
        let blocked = |message: &str| OptionsResolution::Invalid(UnitStatus::Blocked(message.to_string()));

        let options = match (config.mount_options(), workloads) {
            (Some(_), [_, ..]) => {
                return Ok(blocked(
                    "Cannot mount using both the `mountpoint` config and the `mount` integration",
                ))
            }
            (Some(options), []) => options,
            (None, []) => {
                return Ok(OptionsResolution::Pending(UnitStatus::Blocked(
                    "Missing `mountpoint` config or `mount` integration".to_string(),
                )))
            }
            (None, [relation]) => {
                let data = self
                    .relations
                    .remote_data(*relation)
                    .await
                    .with_context(|| format!("Failed to read mount relation {}", relation))?;
                match mount_request::decode(&data) {
                    Ok(Some(options)) => options,
                    Ok(None) => {
                        return Ok(OptionsResolution::Pending(UnitStatus::Waiting(
                            "Waiting for mountpoint from `mount` integration".to_string(),
                        )))
                    }
                    Err(e) => return Ok(blocked(&e.to_string())),
                }
            }
            (None, _) => {
                return Ok(blocked(
                    "Cannot mount using more than one relation at the same time",
                ))
            }
        };

        if let Err(e) = options.validate() {
            return Ok(blocked(&e.to_string()));
        }
        Ok(OptionsResolution::Resolved(options))
    }

    /// Tell every mount-relation workload whether its filesystem is mounted
    async fn answer_workloads(
        &self,
        workloads: &[RelationId],
        desired: Option<&MountSpec>,
        report: &ReconcileReport,
    ) -> Result<()> {
        let mounted = desired.map_or(false, |spec| report.is_mounted(&spec.target));
        let value = if mounted { "true" } else { "false" };

        for relation in workloads {
            let current = self.relations.local_data(*relation).await?;
            if current.get(MOUNTED_KEY).map(String::as_str) != Some(value) {
                self.relations
                    .write(*relation, MOUNTED_KEY, value)
                    .await
                    .with_context(|| format!("Failed to answer mount relation {}", relation))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::endpoint::NfsEndpoint;
    use crate::domain::mount::MountFlags;
    use crate::infrastructure::host::RelationNetwork;
    use crate::infrastructure::system::MockMountSystem;
    use crate::infrastructure::MemoryStatusSink;
    use std::path::{Path, PathBuf};

    struct Harness {
        network: RelationNetwork,
        system: MockMountSystem,
        sink: MemoryStatusSink,
        agent: ClientAgent,
    }

    fn harness() -> Harness {
        let network = RelationNetwork::new();
        let system = MockMountSystem::new();
        let sink = MemoryStatusSink::new();
        let agent = ClientAgent::new(
            Arc::new(network.unit("client", "client/0")),
            Arc::new(system.clone()),
            Arc::new(EventBus::with_default_capacity()),
            StatusReporter::new(Arc::new(sink.clone())),
            RetryPolicy::default(),
        );
        Harness {
            network,
            system,
            sink,
            agent,
        }
    }

    fn nfs() -> EndpointDescriptor {
        EndpointDescriptor::Nfs(NfsEndpoint {
            hostname: "10.0.0.5".to_string(),
            port: None,
            path: "/export".to_string(),
        })
    }

    fn scratch_config() -> ClientConfig {
        ClientConfig {
            mountpoint: Some(PathBuf::from("/scratch")),
            flags: MountFlags::default(),
        }
    }

    fn provide(h: &Harness, descriptor: &EndpointDescriptor) -> RelationId {
        let relation = h.network.relate("client", "filesystem", "nfs", "filesystem");
        h.network.publish(relation, "nfs", wire::encode(descriptor));
        relation
    }

    #[tokio::test]
    async fn test_waits_without_provider() {
        let mut h = harness();
        let status = h.agent.handle(&HostEvent::ConfigChanged, &scratch_config()).await.unwrap();
        assert_eq!(
            status,
            UnitStatus::Waiting("Waiting for filesystem integration".to_string())
        );
        assert!(h.system.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_environment_blocks() {
        let mut h = harness();
        provide(&h, &nfs());
        h.system.set_unsupported(true);

        let status = h.agent.handle(&HostEvent::ConfigChanged, &scratch_config()).await.unwrap();
        assert_eq!(
            status,
            UnitStatus::Blocked("Cannot mount filesystems on LXD containers".to_string())
        );
        assert!(h.system.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_second_provider_blocks_and_keeps_mount() {
        let mut h = harness();
        provide(&h, &nfs());
        h.agent.handle(&HostEvent::ConfigChanged, &scratch_config()).await.unwrap();
        h.system.clear_calls();

        provide(&h, &nfs());
        let status = h.agent.handle(&HostEvent::ConfigChanged, &scratch_config()).await.unwrap();

        assert!(status.is_blocked());
        assert!(status.message().contains("only one provider"));
        assert!(h.system.mutations().is_empty());
        assert_eq!(h.system.records_at(Path::new("/scratch")).len(), 1);
    }

    #[tokio::test]
    async fn test_mount_relation_supplies_options() {
        let mut h = harness();
        provide(&h, &nfs());
        let workload = h.network.relate("client", "mount", "app", "mount");
        let no_mountpoint = ClientConfig::default();

        let status = h.agent.handle(&HostEvent::ConfigChanged, &no_mountpoint).await.unwrap();
        assert_eq!(
            status,
            UnitStatus::Waiting("Waiting for mountpoint from `mount` integration".to_string())
        );
        assert_eq!(
            h.network.data_of(workload, "client").get(MOUNTED_KEY).map(String::as_str),
            Some("false")
        );

        let request = MountOptions::new(
            "/srv/data",
            MountFlags {
                read_only: true,
                ..Default::default()
            },
        );
        h.network.publish(workload, "app", mount_request::encode(&request));
        let event = HostEvent::RelationChanged {
            endpoint: MOUNT_ENDPOINT.to_string(),
            relation: workload,
        };
        let status = h.agent.handle(&event, &no_mountpoint).await.unwrap();

        assert!(matches!(status, UnitStatus::Active(_)));
        assert!(h.system.records_at(Path::new("/srv/data"))[0].flags().read_only);
        assert_eq!(
            h.network.data_of(workload, "client").get(MOUNTED_KEY).map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_mountpoint_from_both_sources_blocks() {
        let mut h = harness();
        provide(&h, &nfs());
        h.network.relate("client", "mount", "app", "mount");

        let status = h.agent.handle(&HostEvent::ConfigChanged, &scratch_config()).await.unwrap();
        assert_eq!(
            status,
            UnitStatus::Blocked(
                "Cannot mount using both the `mountpoint` config and the `mount` integration"
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_missing_mountpoint_blocks() {
        let mut h = harness();
        provide(&h, &nfs());
        let status = h.agent.handle(&HostEvent::ConfigChanged, &ClientConfig::default()).await.unwrap();
        assert_eq!(
            status,
            UnitStatus::Blocked("Missing `mountpoint` config or `mount` integration".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_payload_keeps_last_good_descriptor() {
        let mut h = harness();
        let relation = provide(&h, &nfs());
        h.agent.handle(&HostEvent::ConfigChanged, &scratch_config()).await.unwrap();
        h.system.clear_calls();

        let mut garbled = wire::encode(&nfs());
        garbled.insert(wire::NFS_PORT.to_string(), "not-a-port".to_string());
        h.network.publish(relation, "nfs", garbled);
        let event = HostEvent::RelationChanged {
            endpoint: FILESYSTEM_ENDPOINT.to_string(),
            relation,
        };
        let status = h.agent.handle(&event, &scratch_config()).await.unwrap();

        assert!(status.is_blocked());
        assert!(h.system.mutations().is_empty());
        assert_eq!(h.system.records_at(Path::new("/scratch")).len(), 1);
        assert_eq!(h.sink.current(), Some(status));
    }
}
