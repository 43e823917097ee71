// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod peer_coordinator;
pub mod publisher;
pub mod reconciler;
pub mod status_reporter;
pub mod client;

// Re-export use cases for convenience
pub use peer_coordinator::{LeadershipTransition, PeerCoordinator};
pub use publisher::{ProviderAgent, ProviderPublisher, PublishOutcome};
pub use reconciler::{MountStatus, ReconcileReport, ReconciliationEngine};
pub use status_reporter::{summarize, StatusReporter};
pub use client::ClientAgent;
