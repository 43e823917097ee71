// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Client lifecycle integration tests
//!
//! These drive a `ClientAgent` through host events against the in-memory
//! relation network and the recording mount system:
//! 1. Mount, then teardown on relation-broken, with status transitions
//! 2. Endpoint change at an occupied mountpoint
//! 3. Convergence under injected mount failures
//! 4. Cancellation of a pending retry by relation-broken

use fsrelay_core::application::{ClientAgent, StatusReporter};
use fsrelay_core::domain::agent_config::{ClientConfig, RetryPolicy};
use fsrelay_core::domain::endpoint::{EndpointDescriptor, NfsEndpoint};
use fsrelay_core::domain::events::{HostEvent, MountEvent};
use fsrelay_core::domain::mount::{ForceLevel, MountFlags, MountState};
use fsrelay_core::domain::relation::{RelationId, FILESYSTEM_ENDPOINT};
use fsrelay_core::domain::status::UnitStatus;
use fsrelay_core::domain::system::MountSystemError;
use fsrelay_core::domain::wire;
use fsrelay_core::infrastructure::host::RelationNetwork;
use fsrelay_core::infrastructure::system::{MockMountSystem, SystemCall};
use fsrelay_core::infrastructure::{EventBus, MemoryStatusSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Client {
    network: RelationNetwork,
    system: MockMountSystem,
    sink: MemoryStatusSink,
    bus: Arc<EventBus>,
    agent: ClientAgent,
}

fn client() -> Client {
    let network = RelationNetwork::new();
    let system = MockMountSystem::new();
    let sink = MemoryStatusSink::new();
    let bus = Arc::new(EventBus::with_default_capacity());
    let agent = ClientAgent::new(
        Arc::new(network.unit("client", "client/0")),
        Arc::new(system.clone()),
        bus.clone(),
        StatusReporter::new(Arc::new(sink.clone())),
        RetryPolicy::default(),
    );
    Client {
        network,
        system,
        sink,
        bus,
        agent,
    }
}

fn nfs(hostname: &str, port: Option<u16>, path: &str) -> EndpointDescriptor {
    EndpointDescriptor::Nfs(NfsEndpoint {
        hostname: hostname.to_string(),
        port,
        path: path.to_string(),
    })
}

fn config(mountpoint: &str, noexec: bool) -> ClientConfig {
    ClientConfig {
        mountpoint: Some(PathBuf::from(mountpoint)),
        flags: MountFlags {
            noexec,
            ..Default::default()
        },
    }
}

fn changed(relation: RelationId) -> HostEvent {
    HostEvent::RelationChanged {
        endpoint: FILESYSTEM_ENDPOINT.to_string(),
        relation,
    }
}

fn broken(relation: RelationId) -> HostEvent {
    HostEvent::RelationBroken {
        endpoint: FILESYSTEM_ENDPOINT.to_string(),
        relation,
    }
}

#[tokio::test]
async fn test_scratch_mount_lifecycle() {
    let mut c = client();
    let relation = c.network.relate("client", "filesystem", "nfs", "filesystem");
    c.network
        .publish(relation, "nfs", wire::encode(&nfs("10.0.0.5", Some(2049), "/export")));
    let config = config("/scratch", true);

    let status = c.agent.handle(&changed(relation), &config).await.unwrap();
    assert!(matches!(status, UnitStatus::Active(_)));

    let records = c.system.records_at(Path::new("/scratch"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "10.0.0.5:/export");
    assert!(records[0].flags().noexec);
    assert!(records[0].options.contains(&"port=2049".to_string()));
    assert_eq!(c.system.persistent_entries().len(), 1);
    assert!(c.system.persistent_entries()[0].options.contains("_netdev"));

    // the relation is still listed while relation-broken is handled
    let status = c.agent.handle(&broken(relation), &config).await.unwrap();
    c.network.remove_relation(relation);

    assert_eq!(
        status,
        UnitStatus::Waiting("Waiting for filesystem integration".to_string())
    );
    assert!(c.system.records_at(Path::new("/scratch")).is_empty());
    assert!(c.system.persistent_entries().is_empty());

    let history = c.sink.history();
    assert!(matches!(
        history.as_slice(),
        [UnitStatus::Active(_), UnitStatus::Maintenance(_), UnitStatus::Waiting(_)]
    ));
}

#[tokio::test]
async fn test_changed_endpoint_replaces_mount() {
    let mut c = client();
    let mut events = c.bus.subscribe();
    let relation = c.network.relate("client", "filesystem", "nfs", "filesystem");
    let config = config("/mnt/x", false);

    c.network.publish(relation, "nfs", wire::encode(&nfs("host1", None, "/data")));
    c.agent.handle(&changed(relation), &config).await.unwrap();

    c.network.publish(relation, "nfs", wire::encode(&nfs("host2", None, "/data")));
    let status = c.agent.handle(&changed(relation), &config).await.unwrap();

    assert!(matches!(status, UnitStatus::Active(_)));

    // unmount of the old source strictly before the new mount, in one pass
    let mutations = c.system.mutations();
    assert_eq!(mutations.len(), 3);
    assert!(matches!(&mutations[0], SystemCall::Mount { source, .. } if source == "host1:/data"));
    assert_eq!(
        mutations[1],
        SystemCall::Unmount {
            target: PathBuf::from("/mnt/x"),
            level: ForceLevel::Graceful
        }
    );
    assert!(matches!(&mutations[2], SystemCall::Mount { source, .. } if source == "host2:/data"));

    let records = c.system.records_at(Path::new("/mnt/x"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "host2:/data");
    assert_eq!(c.system.persistent_entries()[0].source, "host2:/data");

    let conflicts: Vec<MountEvent> = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, MountEvent::ConflictDetected { .. }))
        .collect();
    assert!(matches!(
        conflicts.as_slice(),
        [MountEvent::ConflictDetected { owned: true, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_converges_after_transient_failures() {
    let mut c = client();
    let relation = c.network.relate("client", "filesystem", "nfs", "filesystem");
    c.network
        .publish(relation, "nfs", wire::encode(&nfs("10.0.0.5", None, "/export")));
    c.system
        .fail_next_mounts((0..6).map(|_| MountSystemError::Unreachable("10.0.0.5".to_string())));
    let config = config("/scratch", false);

    let mut statuses = vec![c.agent.handle(&changed(relation), &config).await.unwrap()];
    let mut passes = 1;
    while let Some(wakeup) = c.agent.next_wakeup() {
        assert!(passes < 20, "engine did not converge");
        tokio::time::advance(wakeup.saturating_duration_since(tokio::time::Instant::now())).await;
        statuses.push(c.agent.handle(&HostEvent::UpdateStatus, &config).await.unwrap());
        passes += 1;
    }

    // one pass per failure plus the successful one
    assert_eq!(passes, 7);
    assert!(matches!(statuses[0], UnitStatus::Waiting(_)));
    assert!(statuses[4].is_blocked());
    assert!(statuses[5].is_blocked());
    assert!(matches!(statuses[6], UnitStatus::Active(_)));
    assert_eq!(c.system.records_at(Path::new("/scratch")).len(), 1);
}

#[tokio::test]
async fn test_relation_broken_cancels_retry() {
    let mut c = client();
    let relation = c.network.relate("client", "filesystem", "nfs", "filesystem");
    c.network
        .publish(relation, "nfs", wire::encode(&nfs("10.0.0.5", None, "/export")));
    c.system
        .fail_next_mounts([MountSystemError::Unreachable("10.0.0.5".to_string())]);
    let config = config("/scratch", false);

    c.agent.handle(&changed(relation), &config).await.unwrap();
    assert!(c.agent.next_wakeup().is_some());
    assert_eq!(
        c.agent.engine().report().state_of(Path::new("/scratch")),
        Some(MountState::Failed)
    );

    c.system.clear_calls();
    let status = c.agent.handle(&broken(relation), &config).await.unwrap();

    assert!(matches!(status, UnitStatus::Waiting(_)));
    assert!(c.agent.next_wakeup().is_none());
    assert!(c.system.mutations().is_empty());
    assert!(c.agent.engine().report().mounts.is_empty());
}

#[tokio::test]
async fn test_repeated_event_is_idempotent() {
    let mut c = client();
    let relation = c.network.relate("client", "filesystem", "nfs", "filesystem");
    c.network
        .publish(relation, "nfs", wire::encode(&nfs("10.0.0.5", None, "/export")));
    let config = config("/scratch", true);

    c.agent.handle(&changed(relation), &config).await.unwrap();
    c.system.clear_calls();

    for _ in 0..3 {
        let status = c.agent.handle(&changed(relation), &config).await.unwrap();
        assert!(matches!(status, UnitStatus::Active(_)));
    }
    assert!(c.system.calls().is_empty());
}
