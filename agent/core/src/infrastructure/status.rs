// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Status sinks

use crate::domain::status::{StatusSink, UnitStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Logs status changes; repeated identical statuses are not logged again
#[derive(Default)]
pub struct TracingStatusSink {
    last: Mutex<Option<UnitStatus>>,
}

impl TracingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusSink for TracingStatusSink {
    async fn set_status(&self, status: &UnitStatus) -> anyhow::Result<()> {
        let mut last = self.last.lock();
        if last.as_ref() == Some(status) {
            return Ok(());
        }
        match status {
            UnitStatus::Blocked(message) => warn!(severity = "blocked", "{}", message),
            other => info!(severity = other.severity(), "{}", other.message()),
        }
        *last = Some(status.clone());
        Ok(())
    }
}

/// Records every status it is given
#[derive(Clone, Default)]
pub struct MemoryStatusSink {
    history: Arc<Mutex<Vec<UnitStatus>>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<UnitStatus> {
        self.history.lock().clone()
    }

    pub fn current(&self) -> Option<UnitStatus> {
        self.history.lock().last().cloned()
    }
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
    async fn set_status(&self, status: &UnitStatus) -> anyhow::Result<()> {
        self.history.lock().push(status.clone());
        Ok(())
    }
}

/// Fans one status out to several sinks
pub struct FanoutStatusSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutStatusSink {
    pub fn new(sinks: Vec<Arc<dyn StatusSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl StatusSink for FanoutStatusSink {
    async fn set_status(&self, status: &UnitStatus) -> anyhow::Result<()> {
        for sink in &self.sinks {
            sink.set_status(status).await?;
        }
        Ok(())
    }
}
