// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Leader gating across redundant provider units
//!
//! Two replicas of one provider application share a peer bag. Across a
//! sequence of leadership changes, handled in either order, the client only
//! ever sees the current leader's descriptor and followers never write.

use fsrelay_core::application::{
    PeerCoordinator, ProviderAgent, ProviderPublisher, PublishOutcome, StatusReporter,
};
use fsrelay_core::domain::agent_config::ProviderConfig;
use fsrelay_core::domain::endpoint::Protocol;
use fsrelay_core::domain::events::HostEvent;
use fsrelay_core::domain::relation::RelationId;
use fsrelay_core::domain::wire;
use fsrelay_core::infrastructure::host::RelationNetwork;
use fsrelay_core::infrastructure::MemoryStatusSink;
use std::sync::Arc;

fn replica(network: &RelationNetwork, unit: &str) -> ProviderAgent {
    let handle = Arc::new(network.unit("nfs", unit));
    ProviderAgent::new(
        PeerCoordinator::new(handle.clone(), handle.clone()),
        ProviderPublisher::new(handle),
        StatusReporter::new(Arc::new(MemoryStatusSink::new())),
    )
}

/// Replicas are deliberately misconfigured apart so the published path
/// identifies the writer
fn config(path: &str) -> ProviderConfig {
    ProviderConfig {
        protocol: Some(Protocol::Nfs),
        hostname: Some("10.0.0.5".to_string()),
        path: Some(path.to_string()),
        ..Default::default()
    }
}

fn published_path(network: &RelationNetwork, relation: RelationId) -> Option<String> {
    match wire::decode(&network.data_of(relation, "nfs")).ok()? {
        fsrelay_core::domain::endpoint::EndpointDescriptor::Nfs(nfs) => Some(nfs.path),
        _ => None,
    }
}

fn writers_since(network: &RelationNetwork, from: usize) -> Vec<String> {
    network.writes()[from..].iter().map(|w| w.unit.clone()).collect()
}

#[tokio::test]
async fn test_only_leader_publishes_across_handovers() {
    let network = RelationNetwork::new();
    let relation = network.relate("nfs", "filesystem", "client", "filesystem");
    let mut unit0 = replica(&network, "nfs/0");
    let mut unit1 = replica(&network, "nfs/1");
    let (config0, config1) = (config("/from-unit0"), config("/from-unit1"));

    network.set_leader("nfs", "nfs/0");
    unit1.handle(&HostEvent::LeaderElected, &config1).await.unwrap();
    assert!(network.writes().is_empty());
    unit0.handle(&HostEvent::LeaderElected, &config0).await.unwrap();
    assert_eq!(published_path(&network, relation).as_deref(), Some("/from-unit0"));
    assert!(writers_since(&network, 0).iter().all(|u| u == "nfs/0"));

    // handover: the old leader handles its event first
    let mark = network.writes().len();
    network.set_leader("nfs", "nfs/1");
    assert_eq!(
        unit0.handle(&HostEvent::LeaderElected, &config0).await.unwrap(),
        PublishOutcome::NotLeader
    );
    // nothing retracted while nobody has taken over yet
    assert_eq!(published_path(&network, relation).as_deref(), Some("/from-unit0"));

    unit1.handle(&HostEvent::LeaderElected, &config1).await.unwrap();
    assert_eq!(published_path(&network, relation).as_deref(), Some("/from-unit1"));
    assert!(writers_since(&network, mark).iter().all(|u| u == "nfs/1"));

    // and back, new leader first this time
    let mark = network.writes().len();
    network.set_leader("nfs", "nfs/0");
    unit0.handle(&HostEvent::LeaderElected, &config0).await.unwrap();
    unit1.handle(&HostEvent::ConfigChanged, &config1).await.unwrap();
    assert_eq!(published_path(&network, relation).as_deref(), Some("/from-unit0"));
    assert!(writers_since(&network, mark).iter().all(|u| u == "nfs/0"));

    let term = unit0
        .coordinator()
        .current_election()
        .await
        .unwrap()
        .map(|e| e.term);
    assert_eq!(term, Some(3));
}

#[tokio::test]
async fn test_new_relation_gets_current_descriptor() {
    let network = RelationNetwork::new();
    network.set_leader("nfs", "nfs/0");
    let mut leader = replica(&network, "nfs/0");
    let config = config("/export");

    leader.handle(&HostEvent::LeaderElected, &config).await.unwrap();
    let relation = network.relate("nfs", "filesystem", "client", "filesystem");
    let outcome = leader
        .handle(
            &HostEvent::RelationJoined {
                endpoint: "filesystem".to_string(),
                relation,
            },
            &config,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PublishOutcome::Published {
            relations: 1,
            changed: 1
        }
    );
    assert_eq!(published_path(&network, relation).as_deref(), Some("/export"));
}
