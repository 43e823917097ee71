// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Status Reporter
//!
//! Folds engine state across managed mountpoints into one unit status and
//! hands it to the host. Reporting failures are logged and otherwise ignored.

use crate::application::reconciler::MountStatus;
use crate::domain::mount::{MountState, ReconcileError};
use crate::domain::status::{StatusSink, UnitStatus};
use std::sync::Arc;
use tracing::warn;

pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    pub async fn report(&self, status: UnitStatus) {
        if let Err(e) = self.sink.set_status(&status).await {
            warn!("Failed to report status `{}`: {:#}", status, e);
        }
    }
}

/// Aggregate status, most severe first: Blocked, Maintenance, Waiting, Active
pub fn summarize(mounts: &[MountStatus], blocked_after_failures: u32) -> UnitStatus {
    if mounts.is_empty() {
        return UnitStatus::Waiting("Waiting for filesystem".to_string());
    }

    for m in mounts {
        if m.state == MountState::Conflicted {
            let message = match &m.last_error {
                Some(ReconcileError::Conflict { found, .. }) => format!(
                    "Mountpoint {} is occupied by {}",
                    m.target.display(),
                    found
                ),
                _ => format!("Mountpoint {} is occupied", m.target.display()),
            };
            return UnitStatus::Blocked(message);
        }
        if let Some(ReconcileError::ProtocolValidation(reason)) = &m.last_error {
            return UnitStatus::Blocked(reason.clone());
        }
        if m.state == MountState::Failed && m.consecutive_failures >= blocked_after_failures {
            return UnitStatus::Blocked(format!(
                "Failed to mount {} after {} attempts: {}",
                m.target.display(),
                m.consecutive_failures,
                last_reason(m)
            ));
        }
    }

    if let Some(m) = mounts.iter().find(|m| m.state == MountState::Unmounting) {
        let message = match &m.last_error {
            Some(ReconcileError::ResourceBusy { level, .. }) => format!(
                "Unmounting {}: target is busy (escalated to {})",
                m.target.display(),
                level
            ),
            _ => format!("Unmounting {}", m.target.display()),
        };
        return UnitStatus::Maintenance(message);
    }

    if let Some(m) = mounts
        .iter()
        .find(|m| matches!(m.state, MountState::Mounting | MountState::Failed | MountState::Absent))
    {
        let message = if m.state == MountState::Failed {
            format!("Retrying mount of {}: {}", m.target.display(), last_reason(m))
        } else {
            format!("Mounting {}", m.target.display())
        };
        return UnitStatus::Waiting(message);
    }

    let targets: Vec<String> = mounts.iter().map(|m| m.target.display().to_string()).collect();
    UnitStatus::Active(format!("Mounted filesystem at {}", targets.join(", ")))
}

fn last_reason(m: &MountStatus) -> String {
    match &m.last_error {
        Some(ReconcileError::TransientMount { reason, .. }) => reason.clone(),
        Some(other) => other.to_string(),
        None => "unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mount::ForceLevel;
    use crate::infrastructure::MemoryStatusSink;
    use std::path::PathBuf;
    use std::time::Duration;

    fn status(target: &str, state: MountState) -> MountStatus {
        MountStatus {
            target: PathBuf::from(target),
            state,
            source: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    #[test]
    fn test_all_mounted_is_active() {
        let mounts = [status("/scratch", MountState::Mounted)];
        assert_eq!(
            summarize(&mounts, 5),
            UnitStatus::Active("Mounted filesystem at /scratch".to_string())
        );
    }

    #[test]
    fn test_nothing_managed_is_waiting() {
        assert!(matches!(summarize(&[], 5), UnitStatus::Waiting(_)));
    }

    #[test]
    fn test_failure_budget() {
        let mut failed = status("/scratch", MountState::Failed);
        failed.consecutive_failures = 2;
        failed.last_error = Some(ReconcileError::TransientMount {
            target: PathBuf::from("/scratch"),
            reason: "endpoint unreachable".to_string(),
            retry_in: Duration::from_secs(10),
        });
        assert_eq!(
            summarize(&[failed.clone()], 5),
            UnitStatus::Waiting("Retrying mount of /scratch: endpoint unreachable".to_string())
        );

        failed.consecutive_failures = 5;
        assert!(summarize(&[failed], 5).is_blocked());
    }

    #[test]
    fn test_precedence() {
        let mut busy = status("/old", MountState::Unmounting);
        busy.last_error = Some(ReconcileError::ResourceBusy {
            target: PathBuf::from("/old"),
            level: ForceLevel::Lazy,
        });
        let mounting = status("/new", MountState::Mounting);
        let conflicted = status("/other", MountState::Conflicted);

        assert!(matches!(
            summarize(&[mounting.clone(), busy.clone()], 5),
            UnitStatus::Maintenance(m) if m.contains("busy")
        ));
        assert!(summarize(&[mounting, busy, conflicted], 5).is_blocked());
    }

    #[tokio::test]
    async fn test_reporter_forwards_to_sink() {
        let sink = MemoryStatusSink::new();
        let reporter = StatusReporter::new(Arc::new(sink.clone()));
        reporter.report(UnitStatus::Blocked("x".to_string())).await;
        assert_eq!(sink.current(), Some(UnitStatus::Blocked("x".to_string())));
    }
}
