// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Metric names and descriptions
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops. The CLI installs a Prometheus exporter when a
//! metrics port is configured.

use metrics::describe_counter;
use std::sync::OnceLock;

pub const MOUNT_ATTEMPTS: &str = "fsrelay_mount_attempts_total";
pub const MOUNT_FAILURES: &str = "fsrelay_mount_failures_total";
pub const UNMOUNTS: &str = "fsrelay_unmounts_total";
pub const UNMOUNT_ESCALATIONS: &str = "fsrelay_unmount_escalations_total";
pub const CONFLICTS: &str = "fsrelay_mount_conflicts_total";
pub const PUBLISHES: &str = "fsrelay_publishes_total";
pub const LEADERSHIP_CHANGES: &str = "fsrelay_leadership_changes_total";

static DESCRIBED: OnceLock<()> = OnceLock::new();

pub fn describe_metrics() {
    DESCRIBED.get_or_init(|| {
        describe_counter!(MOUNT_ATTEMPTS, "Mount operations attempted");
        describe_counter!(MOUNT_FAILURES, "Mount operations that failed");
        describe_counter!(UNMOUNTS, "Unmount operations that completed");
        describe_counter!(UNMOUNT_ESCALATIONS, "Unmounts retried at a higher force level");
        describe_counter!(CONFLICTS, "Mountpoints found occupied by another source");
        describe_counter!(PUBLISHES, "Endpoint descriptors written to client relations");
        describe_counter!(LEADERSHIP_CHANGES, "Times this unit gained or lost publishing rights");
    });
}
