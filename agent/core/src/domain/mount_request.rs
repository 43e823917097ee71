// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Mount-request relation payload
//!
//! A co-located workload may tell the client where and how to mount instead
//! of the client's own configuration. The client answers on the same relation
//! with `mounted`.

use crate::domain::mount::{MountFlags, MountOptions};
use crate::domain::relation::RelationData;
use std::path::PathBuf;
use thiserror::Error;

pub const MOUNTPOINT_KEY: &str = "mountpoint";
pub const NOEXEC_KEY: &str = "noexec";
pub const NOSUID_KEY: &str = "nosuid";
pub const NODEV_KEY: &str = "nodev";
pub const READ_ONLY_KEY: &str = "read-only";

/// Written back by the client after each reconciliation pass
pub const MOUNTED_KEY: &str = "mounted";

pub fn encode(options: &MountOptions) -> RelationData {
    let flag = |b: bool| if b { "true" } else { "false" }.to_string();
    let mut data = RelationData::new();
    data.insert(
        MOUNTPOINT_KEY.to_string(),
        options.mountpoint.to_string_lossy().into_owned(),
    );
    data.insert(NOEXEC_KEY.to_string(), flag(options.flags.noexec));
    data.insert(NOSUID_KEY.to_string(), flag(options.flags.nosuid));
    data.insert(NODEV_KEY.to_string(), flag(options.flags.nodev));
    data.insert(READ_ONLY_KEY.to_string(), flag(options.flags.read_only));
    data
}

/// `Ok(None)` while the workload has not published a mountpoint yet
pub fn decode(data: &RelationData) -> Result<Option<MountOptions>, MountRequestError> {
    let mountpoint = match data.get(MOUNTPOINT_KEY) {
        None => return Ok(None),
        Some(m) if m.is_empty() => return Ok(None),
        Some(m) => PathBuf::from(m),
    };

    let flags = MountFlags {
        noexec: flag(data, NOEXEC_KEY)?,
        nosuid: flag(data, NOSUID_KEY)?,
        nodev: flag(data, NODEV_KEY)?,
        read_only: flag(data, READ_ONLY_KEY)?,
    };

    Ok(Some(MountOptions::new(mountpoint, flags)))
}

fn flag(data: &RelationData, key: &str) -> Result<bool, MountRequestError> {
    match data.get(key).map(String::as_str) {
        None | Some("") | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(MountRequestError::InvalidFlag {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountRequestError {
    #[error("`{key}` must be \"true\" or \"false\", got `{value}`")]
    InvalidFlag { key: String, value: String },
}
