// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Mount Reconciliation Engine
//!
//! Drives each managed mountpoint from what the host reports toward the
//! desired `MountSpec`:
//!
//! ```text
//! Absent -> Mounting -> Mounted -> Unmounting -> Absent
//!              |           |  \
//!              v           v   `-> Conflicted -> Unmounting
//!            Failed <------'
//! ```
//!
//! Every pass re-reads the live table, so a pass is safe to repeat under
//! at-least-once delivery. Ownership is the source this engine mounted at a
//! target, seeded on the first pass from the managed persistent-table block;
//! anything else found at a target is foreign and never touched, even when it
//! is the very filesystem that is wanted there.
//!
//! Every mount-system call is bounded by the policy's operation timeout, and
//! a timed-out call counts as a transient failure. A mount the host refuses
//! outright (unknown filesystem type) is not retried until the desired mount
//! changes or [`ReconciliationEngine::retry_rejected`] is called.

use crate::domain::agent_config::RetryPolicy;
use crate::domain::events::MountEvent;
use crate::domain::mount::{
    ErrorKind, ForceLevel, MountRecord, MountSpec, MountState, PersistentEntry, ReconcileError,
};
use crate::domain::system::{MountSystem, MountSystemError};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::telemetry;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

// ============================================================================
// Per-mountpoint state
// ============================================================================

#[derive(Debug, Clone)]
struct ManagedMount {
    target: PathBuf,
    state: MountState,
    /// Desired spec the retry state belongs to
    spec: Option<MountSpec>,
    /// Source this engine mounted here
    owned_source: Option<String>,
    persisted: Option<PersistentEntry>,
    consecutive_failures: u32,
    next_attempt: Option<Instant>,
    last_error: Option<ReconcileError>,
}

impl ManagedMount {
    fn new(target: PathBuf) -> Self {
        Self {
            target,
            state: MountState::Absent,
            spec: None,
            owned_source: None,
            persisted: None,
            consecutive_failures: 0,
            next_attempt: None,
            last_error: None,
        }
    }

    fn owns(&self, record: &MountRecord) -> bool {
        self.owned_source
            .as_deref()
            .map_or(false, |source| record.source_is(source))
    }

    fn backing_off(&self, now: Instant) -> bool {
        self.next_attempt.map_or(false, |at| now < at)
    }

    fn rejected(&self) -> bool {
        matches!(self.last_error, Some(ReconcileError::ProtocolValidation(_)))
    }

    /// Record a mount that has just been issued for `spec`
    fn claim(&mut self, spec: &MountSpec) {
        self.owned_source = Some(spec.source.clone());
        self.persisted = Some(PersistentEntry::from_spec(spec));
    }

    fn transition(&mut self, to: MountState, bus: &EventBus) -> Result<(), ReconcileError> {
        if self.state == to {
            return Ok(());
        }
        if !self.state.can_transition_to(to) {
            return Err(ReconcileError::InvalidStateTransition {
                target: self.target.clone(),
                from: self.state,
                to,
            });
        }
        self.record_state(to, bus);
        Ok(())
    }

    /// Accept what the live table shows without an engine-driven transition
    fn observe(&mut self, to: MountState, bus: &EventBus) {
        if self.state != to {
            self.record_state(to, bus);
        }
    }

    fn record_state(&mut self, to: MountState, bus: &EventBus) {
        info!(mountpoint = %self.target.display(), from = %self.state, to = %to, "Mount state changed");
        bus.publish(MountEvent::StateChanged {
            target: self.target.clone(),
            from: self.state,
            to,
            changed_at: Utc::now(),
        });
        self.state = to;
    }

    fn mounted(&mut self, spec: &MountSpec) {
        self.claim(spec);
        self.consecutive_failures = 0;
        self.next_attempt = None;
        self.last_error = None;
    }

    fn status(&self) -> MountStatus {
        MountStatus {
            target: self.target.clone(),
            state: self.state,
            source: self.owned_source.clone(),
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
        }
    }
}

/// Snapshot of one managed mountpoint after a pass
#[derive(Debug, Clone, PartialEq)]
pub struct MountStatus {
    pub target: PathBuf,
    pub state: MountState,
    pub source: Option<String>,
    pub consecutive_failures: u32,
    pub last_error: Option<ReconcileError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub mounts: Vec<MountStatus>,
}

impl ReconcileReport {
    pub fn state_of(&self, target: &Path) -> Option<MountState> {
        self.mounts.iter().find(|m| m.target == target).map(|m| m.state)
    }

    pub fn is_mounted(&self, target: &Path) -> bool {
        self.state_of(target) == Some(MountState::Mounted)
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct ReconciliationEngine {
    system: Arc<dyn MountSystem>,
    event_bus: Arc<EventBus>,
    policy: RetryPolicy,
    mounts: BTreeMap<PathBuf, ManagedMount>,
    adopted: bool,
}

/// Borrowed collaborators for one pass
struct Ctx<'a> {
    system: &'a dyn MountSystem,
    bus: &'a EventBus,
    policy: &'a RetryPolicy,
}

impl ReconciliationEngine {
    pub fn new(system: Arc<dyn MountSystem>, event_bus: Arc<EventBus>, policy: RetryPolicy) -> Self {
        telemetry::describe_metrics();
        Self {
            system,
            event_bus,
            policy,
            mounts: BTreeMap::new(),
            adopted: false,
        }
    }

    /// Policy comes from configuration and may change between passes
    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Allow mounts the host refused to be attempted again on the next pass
    pub fn retry_rejected(&mut self) {
        for m in self.mounts.values_mut().filter(|m| m.rejected()) {
            debug!(mountpoint = %m.target.display(), "Clearing rejected mount");
            m.last_error = None;
        }
    }

    pub async fn reconcile(&mut self, desired: Option<&MountSpec>) -> Result<ReconcileReport> {
        self.reconcile_at(desired, Instant::now()).await
    }

    /// One reconciliation pass. `None` means nothing should be mounted.
    pub async fn reconcile_at(
        &mut self,
        desired: Option<&MountSpec>,
        now: Instant,
    ) -> Result<ReconcileReport> {
        let limit = self.policy.operation_timeout();
        let persistent = guarded(limit, self.system.read_persistent())
            .await
            .context("Failed to read persistent mount table")?;

        if !self.adopted {
            let table = guarded(limit, self.system.mount_table())
                .await
                .context("Failed to read live mount table")?;
            self.adopt(&table, &persistent);
            self.adopted = true;
        }

        let ctx = Ctx {
            system: self.system.as_ref(),
            bus: &self.event_bus,
            policy: &self.policy,
        };

        let desired_target = desired.map(|spec| spec.target.clone());
        let mut gone = Vec::new();
        for (target, m) in self.mounts.iter_mut() {
            if Some(target) == desired_target.as_ref() {
                continue;
            }
            match teardown(m, &ctx, now).await {
                Ok(()) => gone.push(target.clone()),
                Err(e) => {
                    warn!(mountpoint = %target.display(), "Unmount incomplete: {}", e);
                    m.last_error = Some(e);
                }
            }
        }
        for target in gone {
            self.mounts.remove(&target);
        }

        if let Some(spec) = desired {
            let m = self
                .mounts
                .entry(spec.target.clone())
                .or_insert_with(|| ManagedMount::new(spec.target.clone()));
            if let Err(e) = converge(m, &ctx, spec, now).await {
                match e.kind() {
                    ErrorKind::TransientMount => warn!(mountpoint = %spec.target.display(), "{}", e),
                    _ => error!(mountpoint = %spec.target.display(), "{}", e),
                }
                m.last_error = Some(e);
            }
        }

        self.sync_persistent(&persistent).await?;

        Ok(self.report())
    }

    pub fn report(&self) -> ReconcileReport {
        ReconcileReport {
            mounts: self.mounts.values().map(ManagedMount::status).collect(),
        }
    }

    /// Earliest instant a scheduled retry is due
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.mounts.values().filter_map(|m| m.next_attempt).min()
    }

    /// Whether reaching `desired` requires unmounting something this engine
    /// mounted
    pub fn unmount_pending(&self, desired: Option<&MountSpec>) -> bool {
        self.mounts.values().any(|m| {
            let Some(owned) = m.owned_source.as_deref() else {
                return false;
            };
            match desired {
                Some(spec) => m.target != spec.target || owned != spec.source,
                None => true,
            }
        })
    }

    fn adopt(&mut self, table: &[MountRecord], persistent: &[PersistentEntry]) {
        for entry in persistent {
            let mut m = ManagedMount::new(entry.target.clone());
            m.owned_source = Some(entry.source.clone());
            m.persisted = Some(entry.clone());
            if table
                .iter()
                .any(|r| r.target == entry.target && r.source_is(&entry.source))
            {
                m.state = MountState::Mounted;
            }
            debug!(mountpoint = %entry.target.display(), state = %m.state, "Adopted managed mount");
            self.mounts.insert(entry.target.clone(), m);
        }
    }

    async fn sync_persistent(&self, before: &[PersistentEntry]) -> Result<()> {
        let entries: Vec<PersistentEntry> =
            self.mounts.values().filter_map(|m| m.persisted.clone()).collect();
        if entries == before {
            return Ok(());
        }

        guarded(self.policy.operation_timeout(), self.system.write_persistent(&entries))
            .await
            .context("Failed to write persistent mount table")?;

        for entry in &entries {
            if !before.contains(entry) {
                info!(mountpoint = %entry.target.display(), "Persistent mount entry written");
                self.event_bus.publish(MountEvent::PersistentEntryWritten {
                    target: entry.target.clone(),
                    written_at: Utc::now(),
                });
            }
        }
        for entry in before {
            if !entries.iter().any(|e| e.target == entry.target) {
                info!(mountpoint = %entry.target.display(), "Persistent mount entry removed");
                self.event_bus.publish(MountEvent::PersistentEntryRemoved {
                    target: entry.target.clone(),
                    removed_at: Utc::now(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Pass steps
// ============================================================================

async fn guarded<T>(
    limit: Duration,
    op: impl Future<Output = Result<T, MountSystemError>>,
) -> Result<T, MountSystemError> {
    match timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(MountSystemError::Timeout(limit.as_secs())),
    }
}

async fn live_record(ctx: &Ctx<'_>, target: &Path) -> Result<Option<MountRecord>, ReconcileError> {
    let table = guarded(ctx.policy.operation_timeout(), ctx.system.mount_table())
        .await
        .map_err(|e| ReconcileError::TransientMount {
            target: target.to_path_buf(),
            reason: format!("reading mount table: {}", e),
            retry_in: ctx.policy.backoff(1),
        })?;
    // the last entry is the one visible at the mountpoint
    Ok(table.into_iter().filter(|r| r.target == target).last())
}

/// Bring one mountpoint to `spec`
async fn converge(
    m: &mut ManagedMount,
    ctx: &Ctx<'_>,
    spec: &MountSpec,
    now: Instant,
) -> Result<(), ReconcileError> {
    if m.spec.as_ref() != Some(spec) {
        if m.spec.is_some() {
            debug!(mountpoint = %spec.target.display(), "Desired mount changed; resetting retry state");
        }
        m.consecutive_failures = 0;
        m.next_attempt = None;
        m.last_error = None;
        m.spec = Some(spec.clone());
    }

    let record = match live_record(ctx, &spec.target).await? {
        Some(record) if !m.owns(&record) => return foreign(m, ctx, spec, record),
        record => record,
    };

    match record {
        Some(record) if record.satisfies(spec) => {
            let health = guarded(
                ctx.policy.operation_timeout(),
                ctx.system.check_health(&spec.target),
            )
            .await;
            let Err(e) = health else {
                m.observe(MountState::Mounted, ctx.bus);
                m.mounted(spec);
                return Ok(());
            };

            // a dead mount stays out of Mounted until it is replaced
            if m.state != MountState::Unmounting {
                let err = fail(m, ctx, format!("health check failed: {}", e), now);
                warn!(mountpoint = %spec.target.display(), "{}", err);
                m.transition(MountState::Unmounting, ctx.bus)?;
            }
            if let Err(e) = unmount_escalating(ctx, &spec.target).await {
                m.next_attempt = Some(now + ctx.policy.backoff(1));
                return Err(e);
            }
            metrics::counter!(telemetry::UNMOUNTS).increment(1);
            m.transition(MountState::Absent, ctx.bus)?;
            mount_now(m, ctx, spec, now).await
        }
        Some(record) if record.same_source(spec) => {
            if m.backing_off(now) {
                return Ok(());
            }
            remount(m, ctx, spec, now).await
        }
        Some(record) => {
            if m.state != MountState::Unmounting {
                warn!(
                    mountpoint = %spec.target.display(),
                    found = %record.source,
                    expected = %spec.source,
                    "Replacing stale mount of a previous source"
                );
                metrics::counter!(telemetry::CONFLICTS).increment(1);
                ctx.bus.publish(MountEvent::ConflictDetected {
                    target: spec.target.clone(),
                    found_source: record.source.clone(),
                    expected_source: spec.source.clone(),
                    owned: true,
                    detected_at: Utc::now(),
                });
                m.transition(MountState::Conflicted, ctx.bus)?;
            }

            // stale mount of ours: replace it within this pass
            m.transition(MountState::Unmounting, ctx.bus)?;
            if let Err(e) = unmount_escalating(ctx, &spec.target).await {
                m.next_attempt = Some(now + ctx.policy.backoff(1));
                return Err(e);
            }
            metrics::counter!(telemetry::UNMOUNTS).increment(1);
            m.transition(MountState::Absent, ctx.bus)?;
            m.owned_source = None;
            m.persisted = None;
            mount_now(m, ctx, spec, now).await
        }
        None => {
            match m.state {
                MountState::Mounted => {
                    let err = fail(m, ctx, "mount disappeared from the live table".to_string(), now);
                    warn!(mountpoint = %spec.target.display(), "{}", err);
                    m.next_attempt = None;
                }
                MountState::Unmounting => {
                    m.transition(MountState::Absent, ctx.bus)?;
                    m.next_attempt = None;
                }
                MountState::Conflicted => {
                    m.transition(MountState::Absent, ctx.bus)?;
                }
                _ => {}
            }
            if m.rejected() {
                debug!(mountpoint = %spec.target.display(), "Mount was refused by the host; not retrying");
                return Ok(());
            }
            if m.backing_off(now) {
                debug!(mountpoint = %spec.target.display(), "Mount retry not due yet");
                return Ok(());
            }
            mount_now(m, ctx, spec, now).await
        }
    }
}

/// Something this engine did not mount occupies the target. It is reported
/// and left exactly as found.
fn foreign(
    m: &mut ManagedMount,
    ctx: &Ctx<'_>,
    spec: &MountSpec,
    record: MountRecord,
) -> Result<(), ReconcileError> {
    if m.state != MountState::Conflicted {
        warn!(
            mountpoint = %spec.target.display(),
            found = %record.source,
            expected = %spec.source,
            "Mountpoint occupied by a mount this agent did not create"
        );
        metrics::counter!(telemetry::CONFLICTS).increment(1);
        ctx.bus.publish(MountEvent::ConflictDetected {
            target: spec.target.clone(),
            found_source: record.source.clone(),
            expected_source: spec.source.clone(),
            owned: false,
            detected_at: Utc::now(),
        });
        m.observe(MountState::Conflicted, ctx.bus);
    }
    m.owned_source = None;
    m.persisted = None;

    Err(ReconcileError::Conflict {
        target: spec.target.clone(),
        found: record.source,
        expected: spec.source.clone(),
    })
}

async fn mount_now(
    m: &mut ManagedMount,
    ctx: &Ctx<'_>,
    spec: &MountSpec,
    now: Instant,
) -> Result<(), ReconcileError> {
    m.transition(MountState::Mounting, ctx.bus)?;
    let limit = ctx.policy.operation_timeout();

    if let Err(e) = guarded(limit, ctx.system.ensure_directory(&spec.target)).await {
        return Err(fail(m, ctx, format!("creating mountpoint: {}", e), now));
    }
    if let Some(secret) = &spec.secret {
        if let Err(e) = guarded(limit, ctx.system.write_secret(&secret.path, &secret.key)).await {
            return Err(fail(m, ctx, format!("storing credentials: {}", e), now));
        }
    }

    info!(
        source = %spec.source,
        mountpoint = %spec.target.display(),
        fstype = %spec.fstype,
        options = %spec.redacted_option_string(),
        "Mounting filesystem"
    );
    metrics::counter!(telemetry::MOUNT_ATTEMPTS, "fstype" => spec.fstype.clone()).increment(1);

    let result = guarded(
        limit,
        ctx.system
            .mount(&spec.source, &spec.target, &spec.fstype, &spec.options()),
    )
    .await;
    match result {
        Ok(()) => m.claim(spec),
        Err(e) if e.kind() == ErrorKind::ProtocolValidation => {
            return Err(reject(m, ctx, format!("{} cannot be mounted: {}", spec.source, e)));
        }
        Err(e) => return Err(fail(m, ctx, e.to_string(), now)),
    }

    let table = match guarded(limit, ctx.system.mount_table()).await {
        Ok(table) => table,
        Err(e) => return Err(fail(m, ctx, format!("verifying mount: {}", e), now)),
    };
    match table.into_iter().filter(|r| r.target == spec.target).last() {
        Some(record) if record.satisfies(spec) => {
            m.transition(MountState::Mounted, ctx.bus)?;
            m.mounted(spec);
            Ok(())
        }
        Some(record) => Err(fail(
            m,
            ctx,
            format!("mounted with unexpected source or options: {}", record.options.join(",")),
            now,
        )),
        None => Err(fail(m, ctx, "mount reported success but is not visible".to_string(), now)),
    }
}

async fn remount(
    m: &mut ManagedMount,
    ctx: &Ctx<'_>,
    spec: &MountSpec,
    now: Instant,
) -> Result<(), ReconcileError> {
    let mut options = vec!["remount".to_string()];
    options.extend(spec.options());

    info!(
        mountpoint = %spec.target.display(),
        options = %spec.redacted_option_string(),
        "Remounting with new options"
    );
    let result = guarded(
        ctx.policy.operation_timeout(),
        ctx.system.mount(&spec.source, &spec.target, &spec.fstype, &options),
    )
    .await;

    match result {
        Ok(()) => {
            m.observe(MountState::Mounted, ctx.bus);
            m.mounted(spec);
            ctx.bus.publish(MountEvent::Remounted {
                target: spec.target.clone(),
                options: spec.redacted_option_string(),
                remounted_at: Utc::now(),
            });
            Ok(())
        }
        Err(e) => Err(fail(m, ctx, format!("remount failed: {}", e), now)),
    }
}

/// Take down whatever this engine mounted at `m.target`. `Ok` means the
/// mountpoint is no longer managed.
async fn teardown(m: &mut ManagedMount, ctx: &Ctx<'_>, now: Instant) -> Result<(), ReconcileError> {
    let target = m.target.clone();
    m.spec = None;

    match live_record(ctx, &target).await? {
        Some(record) if m.owns(&record) => {
            m.transition(MountState::Unmounting, ctx.bus)?;
            info!(mountpoint = %target.display(), source = %record.source, "Unmounting filesystem");
            if let Err(e) = unmount_escalating(ctx, &target).await {
                m.next_attempt = Some(now + ctx.policy.backoff(1));
                return Err(e);
            }
            metrics::counter!(telemetry::UNMOUNTS).increment(1);
        }
        Some(record) => {
            info!(
                mountpoint = %target.display(),
                source = %record.source,
                "Leaving mount this agent did not create in place"
            );
        }
        None => {}
    }

    if let Some(path) = m.persisted.as_ref().and_then(PersistentEntry::secret_file) {
        if let Err(e) = guarded(ctx.policy.operation_timeout(), ctx.system.remove_secret(&path)).await {
            warn!(mountpoint = %target.display(), "Failed to remove {}: {}", path.display(), e);
        }
    }
    m.transition(MountState::Absent, ctx.bus)?;
    m.owned_source = None;
    m.persisted = None;
    Ok(())
}

/// Unmount with graceful, then forced, then lazy detach
async fn unmount_escalating(ctx: &Ctx<'_>, target: &Path) -> Result<ForceLevel, ReconcileError> {
    for level in ForceLevel::ESCALATION {
        if level != ForceLevel::Graceful {
            warn!(mountpoint = %target.display(), %level, "Escalating unmount");
            metrics::counter!(telemetry::UNMOUNT_ESCALATIONS, "level" => level.to_string()).increment(1);
            ctx.bus.publish(MountEvent::UnmountEscalated {
                target: target.to_path_buf(),
                level,
                escalated_at: Utc::now(),
            });
        }

        match guarded(ctx.policy.operation_timeout(), ctx.system.unmount(target, level)).await {
            Ok(()) => return Ok(level),
            Err(e @ (MountSystemError::Busy(_) | MountSystemError::Timeout(_))) => {
                debug!(mountpoint = %target.display(), %level, "Unmount did not complete: {}", e);
            }
            Err(e) => {
                return Err(ReconcileError::TransientMount {
                    target: target.to_path_buf(),
                    reason: format!("unmount failed: {}", e),
                    retry_in: ctx.policy.backoff(1),
                })
            }
        }
    }

    Err(ReconcileError::ResourceBusy {
        target: target.to_path_buf(),
        level: ForceLevel::Lazy,
    })
}

/// Record a mount the host refused outright. It is not rescheduled.
fn reject(m: &mut ManagedMount, ctx: &Ctx<'_>, reason: String) -> ReconcileError {
    m.consecutive_failures += 1;
    m.next_attempt = None;
    m.owned_source = None;
    m.persisted = None;
    m.observe(MountState::Failed, ctx.bus);
    metrics::counter!(telemetry::MOUNT_FAILURES).increment(1);

    let err = ReconcileError::ProtocolValidation(reason);
    m.last_error = Some(err.clone());
    err
}

/// Record a failed mount attempt and schedule the next one
fn fail(m: &mut ManagedMount, ctx: &Ctx<'_>, reason: String, now: Instant) -> ReconcileError {
    m.consecutive_failures += 1;
    let delay = ctx.policy.backoff(m.consecutive_failures);
    m.next_attempt = Some(now + delay);
    m.observe(MountState::Failed, ctx.bus);

    metrics::counter!(telemetry::MOUNT_FAILURES).increment(1);
    ctx.bus.publish(MountEvent::MountFailed {
        target: m.target.clone(),
        reason: reason.clone(),
        consecutive_failures: m.consecutive_failures,
        retry_at: Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64),
        failed_at: Utc::now(),
    });

    let err = ReconcileError::TransientMount {
        target: m.target.clone(),
        reason,
        retry_in: delay,
    };
    m.last_error = Some(err.clone());
    err
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::status_reporter::summarize;
    use crate::domain::mount::{MountFlags, MountSecret};
    use crate::domain::status::UnitStatus;
    use crate::infrastructure::system::{MockMountSystem, SystemCall};

    fn spec(source: &str, target: &str, noexec: bool) -> MountSpec {
        MountSpec {
            source: source.to_string(),
            target: PathBuf::from(target),
            fstype: "nfs".to_string(),
            flags: MountFlags {
                noexec,
                ..Default::default()
            },
            extra_options: vec![],
            secret: None,
        }
    }

    fn nfs_record(source: &str, target: &str, options: &[&str]) -> MountRecord {
        MountRecord {
            source: source.to_string(),
            target: PathBuf::from(target),
            fstype: "nfs4".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    fn engine(system: &MockMountSystem) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Arc::new(system.clone()),
            Arc::new(EventBus::new(64)),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_mounts_and_persists() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        let desired = spec("10.0.0.5:/export", "/scratch", true);

        let report = engine.reconcile(Some(&desired)).await.unwrap();

        assert!(report.is_mounted(Path::new("/scratch")));
        assert_eq!(system.records_at(Path::new("/scratch")).len(), 1);
        assert_eq!(system.persistent_entries(), vec![PersistentEntry::from_spec(&desired)]);
        assert!(system
            .calls()
            .contains(&SystemCall::EnsureDirectory(PathBuf::from("/scratch"))));
    }

    #[tokio::test]
    async fn test_repeat_pass_is_noop() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        let desired = spec("10.0.0.5:/export", "/scratch", true);
        engine.reconcile(Some(&desired)).await.unwrap();
        system.clear_calls();

        let report = engine.reconcile(Some(&desired)).await.unwrap();
        assert!(report.is_mounted(Path::new("/scratch")));
        assert!(system.calls().is_empty());
    }

    #[tokio::test]
    async fn test_flag_change_remounts_in_place() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        engine
            .reconcile(Some(&spec("h:/x", "/mnt/x", false)))
            .await
            .unwrap();
        system.clear_calls();

        let changed = spec("h:/x", "/mnt/x", true);
        let report = engine.reconcile(Some(&changed)).await.unwrap();

        assert!(report.is_mounted(Path::new("/mnt/x")));
        assert!(matches!(system.mutations().as_slice(), [SystemCall::Remount { .. }]));
        assert!(system.records_at(Path::new("/mnt/x"))[0].flags().noexec);
        assert_eq!(system.persistent_entries(), vec![PersistentEntry::from_spec(&changed)]);
    }

    #[tokio::test]
    async fn test_foreign_mount_is_conflicted_and_untouched() {
        let system = MockMountSystem::new();
        system.insert_record(MountRecord {
            source: "/dev/sdb1".to_string(),
            target: PathBuf::from("/mnt/x"),
            fstype: "ext4".to_string(),
            options: vec!["rw".to_string()],
        });
        let mut engine = engine(&system);

        let report = engine.reconcile(Some(&spec("h:/x", "/mnt/x", false))).await.unwrap();

        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Conflicted));
        assert!(matches!(
            report.mounts[0].last_error,
            Some(ReconcileError::Conflict { .. })
        ));
        assert!(system.mutations().is_empty());

        // and nothing is done to it on teardown either
        engine.reconcile(None).await.unwrap();
        assert!(system.mutations().is_empty());
        assert_eq!(system.records_at(Path::new("/mnt/x")).len(), 1);
    }

    #[tokio::test]
    async fn test_same_source_mounted_by_someone_else_is_left_alone() {
        let system = MockMountSystem::new();
        system.insert_record(nfs_record("h:/x", "/mnt/x", &["rw"]));
        let mut engine = engine(&system);

        // matching source and flags
        let report = engine.reconcile(Some(&spec("h:/x", "/mnt/x", false))).await.unwrap();
        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Conflicted));
        assert_eq!(report.mounts[0].source, None);
        assert!(system.persistent_entries().is_empty());

        // different flags must not remount it either
        let report = engine.reconcile(Some(&spec("h:/x", "/mnt/x", true))).await.unwrap();
        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Conflicted));
        assert!(!engine.unmount_pending(None));

        engine.reconcile(None).await.unwrap();
        assert!(system.mutations().is_empty());
        assert!(system.persistent_entries().is_empty());
        assert_eq!(system.records_at(Path::new("/mnt/x")).len(), 1);
    }

    #[tokio::test]
    async fn test_stale_busy_mount_stays_unmounting() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        let desired = spec("h:/x", "/mnt/x", false);
        engine.reconcile(Some(&desired)).await.unwrap();

        system.set_stale("/mnt/x");
        system.set_busy("/mnt/x", None);
        for _ in 0..4 {
            let report = engine.reconcile(Some(&desired)).await.unwrap();
            let m = &report.mounts[0];
            assert_eq!(m.state, MountState::Unmounting);
            assert_eq!(m.consecutive_failures, 1);
            assert!(matches!(m.last_error, Some(ReconcileError::ResourceBusy { .. })));
            assert!(matches!(
                summarize(&report.mounts, 5),
                UnitStatus::Maintenance(message) if message.contains("busy")
            ));
        }
        assert!(engine.next_wakeup().is_some());

        system.clear_busy(Path::new("/mnt/x"));
        let report = engine.reconcile(Some(&desired)).await.unwrap();
        assert!(report.is_mounted(Path::new("/mnt/x")));
        assert_eq!(report.mounts[0].consecutive_failures, 0);
        assert_eq!(system.records_at(Path::new("/mnt/x")).len(), 1);
    }

    #[tokio::test]
    async fn test_refused_mount_is_not_retried() {
        let system = MockMountSystem::new();
        system.fail_next_mounts([MountSystemError::Unsupported(
            "unknown filesystem type 'lustre'".into(),
        )]);
        let mut engine = engine(&system);
        let desired = spec("h:/x", "/mnt/x", false);
        let start = Instant::now();

        let report = engine.reconcile_at(Some(&desired), start).await.unwrap();
        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Failed));
        assert!(matches!(
            report.mounts[0].last_error,
            Some(ReconcileError::ProtocolValidation(_))
        ));
        assert_eq!(engine.next_wakeup(), None);
        assert!(matches!(summarize(&report.mounts, 5), UnitStatus::Blocked(_)));

        system.clear_calls();
        let later = start + Duration::from_secs(3600);
        let report = engine.reconcile_at(Some(&desired), later).await.unwrap();
        assert!(system.mutations().is_empty());
        assert!(matches!(summarize(&report.mounts, 5), UnitStatus::Blocked(_)));

        engine.retry_rejected();
        let report = engine.reconcile_at(Some(&desired), later).await.unwrap();
        assert!(report.is_mounted(Path::new("/mnt/x")));
    }

    #[tokio::test]
    async fn test_mount_is_owned_when_verification_fails() {
        let system = MockMountSystem::new();
        system.fail_table_read_after_next_mount();
        let mut engine = engine(&system);

        let report = engine.reconcile(Some(&spec("h:/x", "/mnt/x", false))).await.unwrap();
        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Failed));
        assert_eq!(report.mounts[0].source.as_deref(), Some("h:/x"));

        engine.reconcile(None).await.unwrap();
        assert!(system.records_at(Path::new("/mnt/x")).is_empty());
        assert!(matches!(system.mutations().last(), Some(SystemCall::Unmount { .. })));
    }

    #[tokio::test]
    async fn test_credentials_live_in_a_secret_file() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        let secret_path = PathBuf::from("/etc/fsrelay/secrets/mnt-ceph.secret");
        let desired = MountSpec {
            source: "client@123.cephfs=/vol".to_string(),
            target: PathBuf::from("/mnt/ceph"),
            fstype: "ceph".to_string(),
            flags: MountFlags::default(),
            extra_options: vec![format!("secretfile={}", secret_path.display())],
            secret: Some(MountSecret {
                path: secret_path.clone(),
                key: "AQBx==".to_string(),
            }),
        };

        engine.reconcile(Some(&desired)).await.unwrap();
        assert_eq!(system.secret_at(&secret_path).as_deref(), Some("AQBx=="));
        let entries = system.persistent_entries();
        assert!(!entries[0].options.contains("AQBx=="));
        for call in system.calls() {
            assert!(!format!("{:?}", call).contains("AQBx=="));
        }

        engine.reconcile(None).await.unwrap();
        assert_eq!(system.secret_at(&secret_path), None);
        assert!(system.calls().contains(&SystemCall::RemoveSecret(secret_path)));
    }

    #[tokio::test]
    async fn test_failure_backs_off() {
        let system = MockMountSystem::new();
        system.fail_next_mounts([
            MountSystemError::Unreachable("h".into()),
            MountSystemError::Unreachable("h".into()),
        ]);
        let mut engine = engine(&system);
        let desired = spec("h:/x", "/mnt/x", false);
        let start = Instant::now();

        let report = engine.reconcile_at(Some(&desired), start).await.unwrap();
        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Failed));
        assert_eq!(engine.next_wakeup(), Some(start + Duration::from_secs(5)));

        // not due yet
        system.clear_calls();
        engine
            .reconcile_at(Some(&desired), start + Duration::from_secs(1))
            .await
            .unwrap();
        assert!(system.mutations().is_empty());

        // second failure doubles the delay
        let t = start + Duration::from_secs(5);
        engine.reconcile_at(Some(&desired), t).await.unwrap();
        assert_eq!(engine.next_wakeup(), Some(t + Duration::from_secs(10)));
        assert_eq!(engine.report().mounts[0].consecutive_failures, 2);

        let t = t + Duration::from_secs(10);
        let report = engine.reconcile_at(Some(&desired), t).await.unwrap();
        assert!(report.is_mounted(Path::new("/mnt/x")));
        assert_eq!(report.mounts[0].consecutive_failures, 0);
        assert_eq!(engine.next_wakeup(), None);
    }

    #[tokio::test]
    async fn test_unmount_escalates() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        engine.reconcile(Some(&spec("h:/x", "/mnt/x", false))).await.unwrap();
        system.set_busy("/mnt/x", Some(ForceLevel::Force));
        system.clear_calls();

        let report = engine.reconcile(None).await.unwrap();

        assert!(report.mounts.is_empty());
        assert_eq!(
            system.mutations(),
            vec![
                SystemCall::Unmount {
                    target: PathBuf::from("/mnt/x"),
                    level: ForceLevel::Graceful
                },
                SystemCall::Unmount {
                    target: PathBuf::from("/mnt/x"),
                    level: ForceLevel::Force
                },
            ]
        );
        assert!(system.persistent_entries().is_empty());
    }

    #[tokio::test]
    async fn test_stuck_unmount_stays_unmounting() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        engine.reconcile(Some(&spec("h:/x", "/mnt/x", false))).await.unwrap();
        system.set_busy("/mnt/x", None);

        let report = engine.reconcile(None).await.unwrap();
        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Unmounting));
        assert!(matches!(
            report.mounts[0].last_error,
            Some(ReconcileError::ResourceBusy { level: ForceLevel::Lazy, .. })
        ));
        // still owned, so the persistent entry stays until the unmount lands
        assert_eq!(system.persistent_entries().len(), 1);

        system.clear_busy(Path::new("/mnt/x"));
        let report = engine.reconcile(None).await.unwrap();
        assert!(report.mounts.is_empty());
        assert!(system.persistent_entries().is_empty());
    }

    #[tokio::test]
    async fn test_drift_is_repaired() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        let desired = spec("h:/x", "/mnt/x", false);
        engine.reconcile(Some(&desired)).await.unwrap();

        system.remove_record(Path::new("/mnt/x"));
        let report = engine.reconcile(Some(&desired)).await.unwrap();
        assert!(report.is_mounted(Path::new("/mnt/x")));
        assert_eq!(system.records_at(Path::new("/mnt/x")).len(), 1);
    }

    #[tokio::test]
    async fn test_stale_mount_is_replaced() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        let desired = spec("h:/x", "/mnt/x", false);
        engine.reconcile(Some(&desired)).await.unwrap();

        system.set_stale("/mnt/x");
        system.clear_calls();
        let report = engine.reconcile(Some(&desired)).await.unwrap();

        assert!(report.is_mounted(Path::new("/mnt/x")));
        let mutations = system.mutations();
        assert!(matches!(mutations[0], SystemCall::Unmount { .. }));
        assert!(matches!(mutations[1], SystemCall::Mount { .. }));
    }

    #[tokio::test]
    async fn test_adopts_persistent_entries_on_restart() {
        let system = MockMountSystem::new();
        let desired = spec("h:/x", "/mnt/x", false);
        {
            let mut first = engine(&system);
            first.reconcile(Some(&desired)).await.unwrap();
        }
        system.clear_calls();

        // a fresh engine still knows the mount is its own and can remove it
        let mut restarted = engine(&system);
        restarted.reconcile(None).await.unwrap();
        assert!(system.records_at(Path::new("/mnt/x")).is_empty());
        assert!(system.persistent_entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_mount_times_out() {
        let system = MockMountSystem::new();
        system.set_mount_delay(Some(Duration::from_secs(3600)));
        let mut engine = engine(&system);

        let report = engine.reconcile(Some(&spec("h:/x", "/mnt/x", false))).await.unwrap();

        assert_eq!(report.state_of(Path::new("/mnt/x")), Some(MountState::Failed));
        assert!(matches!(
            &report.mounts[0].last_error,
            Some(ReconcileError::TransientMount { reason, .. }) if reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn test_unmount_pending() {
        let system = MockMountSystem::new();
        let mut engine = engine(&system);
        let desired = spec("h:/x", "/mnt/x", false);
        assert!(!engine.unmount_pending(None));

        engine.reconcile(Some(&desired)).await.unwrap();
        assert!(!engine.unmount_pending(Some(&desired)));
        assert!(engine.unmount_pending(None));
        assert!(engine.unmount_pending(Some(&spec("other:/x", "/mnt/x", false))));
    }
}
