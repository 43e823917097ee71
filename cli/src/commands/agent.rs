// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Provider and client event loops
//!
//! Events arrive one per line on stdin and are handled to completion before
//! the next is read. The client loop also wakes itself for scheduled retries
//! and for the periodic drift check.

use anyhow::Result;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::Stdin;
use tokio::time::{sleep_until, MissedTickBehavior};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fsrelay_core::application::{
    ClientAgent, PeerCoordinator, ProviderAgent, ProviderPublisher, StatusReporter,
};
use fsrelay_core::domain::agent_config::AgentConfigManifest;
use fsrelay_core::domain::events::HostEvent;
use fsrelay_core::domain::status::StatusSink;
use fsrelay_core::infrastructure::host::FileHost;
use fsrelay_core::infrastructure::system::{create_mount_system, SystemBackend};
use fsrelay_core::infrastructure::{EventBus, EventBusError, FanoutStatusSink, TracingStatusSink};

/// Longest accepted event line
const MAX_EVENT_LINE: usize = 64 * 1024;

struct EventSource {
    lines: FramedRead<Stdin, LinesCodec>,
}

impl EventSource {
    fn stdin() -> Self {
        Self {
            lines: FramedRead::new(
                tokio::io::stdin(),
                LinesCodec::new_with_max_length(MAX_EVENT_LINE),
            ),
        }
    }

    /// Next well-formed event; `None` once stdin closes
    async fn next(&mut self) -> Option<HostEvent> {
        loop {
            match self.lines.next().await? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => match serde_json::from_str::<HostEvent>(&line) {
                    Ok(event) => return Some(event),
                    Err(e) => warn!("Ignoring malformed event `{}`: {}", line, e),
                },
                Err(e) => warn!("Failed to read event: {}", e),
            }
        }
    }
}

fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C signal");
        }
        trigger.cancel();
    });
    token
}

/// Re-read configuration on `config-changed`. A broken file keeps the
/// previous configuration in force.
fn reload(path: &Option<PathBuf>, current: &mut AgentConfigManifest) {
    let loaded = AgentConfigManifest::load_or_default(path.clone())
        .and_then(|manifest| manifest.validate().map(|_| manifest));
    match loaded {
        Ok(manifest) => {
            if manifest.spec.unit.id != current.spec.unit.id {
                warn!("Ignoring unit id change until restart");
            }
            let unit = current.spec.unit.clone();
            *current = manifest;
            current.spec.unit = unit;
        }
        Err(e) => warn!("Keeping previous configuration: {:#}", e),
    }
}

fn status_sink(host: &Arc<FileHost>) -> Arc<dyn StatusSink> {
    let sinks: Vec<Arc<dyn StatusSink>> = vec![
        Arc::new(TracingStatusSink::new()),
        host.clone() as Arc<dyn StatusSink>,
    ];
    Arc::new(FanoutStatusSink::new(sinks))
}

pub async fn run_provider(
    state: PathBuf,
    config_path: Option<PathBuf>,
    mut manifest: AgentConfigManifest,
) -> Result<()> {
    let host = Arc::new(FileHost::new(&state, manifest.spec.unit.id.clone()));
    info!(unit = %manifest.spec.unit.id, state = %state.display(), "Starting provider agent");

    let mut agent = ProviderAgent::new(
        PeerCoordinator::new(host.clone(), host.clone()),
        ProviderPublisher::new(host.clone()),
        StatusReporter::new(status_sink(&host)),
    );

    let shutdown = shutdown_token();
    let mut events = EventSource::stdin();
    let mut event = Some(HostEvent::ConfigChanged);

    loop {
        if let Some(current) = event.take() {
            if current == HostEvent::ConfigChanged {
                reload(&config_path, &mut manifest);
            }
            match agent.handle(&current, &manifest.spec.provider).await {
                Ok(outcome) => debug!(%current, ?outcome, "Provider event handled"),
                Err(e) => error!(%current, "Provider event failed: {:#}", e),
            }
        }

        tokio::select! {
            next = events.next() => match next {
                Some(next) => event = Some(next),
                None => {
                    info!("Event stream closed");
                    break;
                }
            },
            _ = shutdown.cancelled() => break,
        }
    }

    info!("Provider agent stopped");
    Ok(())
}

pub async fn run_client(
    state: PathBuf,
    config_path: Option<PathBuf>,
    mut manifest: AgentConfigManifest,
    dry_run: bool,
) -> Result<()> {
    let host = Arc::new(FileHost::new(&state, manifest.spec.unit.id.clone()));
    let backend = if dry_run {
        SystemBackend::Mock
    } else {
        SystemBackend::Linux(manifest.spec.system.clone())
    };
    info!(
        unit = %manifest.spec.unit.id,
        state = %state.display(),
        dry_run,
        "Starting client agent"
    );

    let event_bus = Arc::new(EventBus::with_default_capacity());
    let mut mount_events = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match mount_events.recv().await {
                Ok(event) => debug!(mountpoint = %event.target().display(), ?event, "Mount event"),
                Err(EventBusError::Lagged(skipped)) => debug!(skipped, "Mount event log lagged"),
                Err(_) => break,
            }
        }
    });

    let mut agent = ClientAgent::new(
        host.clone(),
        create_mount_system(backend),
        event_bus,
        StatusReporter::new(status_sink(&host)),
        manifest.spec.retry.clone(),
    );

    let shutdown = shutdown_token();
    let mut events = EventSource::stdin();
    let mut ticker = tokio::time::interval(manifest.spec.retry.update_status_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    let mut event = Some(HostEvent::ConfigChanged);
    let mut open = true;

    loop {
        if let Some(current) = event.take() {
            if current == HostEvent::ConfigChanged {
                reload(&config_path, &mut manifest);
                agent.set_policy(manifest.spec.retry.clone());
            }
            match agent.handle(&current, &manifest.spec.client).await {
                Ok(status) => debug!(%current, %status, "Client event handled"),
                Err(e) => error!(%current, "Client event failed: {:#}", e),
            }
        }

        let wakeup = agent.next_wakeup();
        let retry_due = async move {
            match wakeup {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            next = events.next(), if open => match next {
                Some(next) => event = Some(next),
                None => {
                    info!("Event stream closed; continuing on timers");
                    open = false;
                }
            },
            _ = retry_due => event = Some(HostEvent::UpdateStatus),
            _ = ticker.tick() => event = Some(HostEvent::UpdateStatus),
            _ = shutdown.cancelled() => break,
        }
    }

    info!("Client agent stopped");
    Ok(())
}
