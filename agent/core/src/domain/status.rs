// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible unit health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "severity", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    Active(String),
    Waiting(String),
    Blocked(String),
    Maintenance(String),
}

impl UnitStatus {
    pub fn severity(&self) -> &'static str {
        match self {
            UnitStatus::Active(_) => "active",
            UnitStatus::Waiting(_) => "waiting",
            UnitStatus::Blocked(_) => "blocked",
            UnitStatus::Maintenance(_) => "maintenance",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Active(m)
            | UnitStatus::Waiting(m)
            | UnitStatus::Blocked(m)
            | UnitStatus::Maintenance(m) => m,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, UnitStatus::Blocked(_))
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message().is_empty() {
            write!(f, "{}", self.severity())
        } else {
            write!(f, "{}: {}", self.severity(), self.message())
        }
    }
}

/// Where status ends up; the host runtime shows it to operators
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_status(&self, status: &UnitStatus) -> anyhow::Result<()>;
}
