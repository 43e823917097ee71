// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Relation payload codec for endpoint descriptors
//!
//! Wire layout (all values are strings, absent key = not provided):
//!
//! | key                    | value                                  |
//! |------------------------|----------------------------------------|
//! | `protocol`             | `nfs` \| `cephfs` \| `lustre`          |
//! | `nfs.hostname`         | host name or address (IPv6 unbracketed)|
//! | `nfs.port`             | optional, 1..=65535                    |
//! | `nfs.path`             | absolute export path                   |
//! | `cephfs.fsid`          | cluster id                             |
//! | `cephfs.sharepoint`    | `<fs-name>:<path>`                     |
//! | `cephfs.monitor-hosts` | space separated `host[:port]`          |
//! | `cephfs.auth-info`     | `<user>:<key>`                         |
//! | `lustre.mgs-nids`      | space separated `<addr>@<net>`         |
//! | `lustre.fs-name`       | filesystem name                        |
//!
//! Keys outside the `protocol` key and the three protocol prefixes are
//! ignored, as are unknown keys under the declared protocol's prefix.
//! Decoding is pure and never panics.

use crate::domain::endpoint::{
    parse_port, CephFsEndpoint, EndpointDescriptor, EndpointError, HostAddr, LustreEndpoint,
    NfsEndpoint, Protocol,
};
use crate::domain::relation::RelationData;
use thiserror::Error;

pub const PROTOCOL_KEY: &str = "protocol";

pub const NFS_HOSTNAME: &str = "nfs.hostname";
pub const NFS_PORT: &str = "nfs.port";
pub const NFS_PATH: &str = "nfs.path";

pub const CEPHFS_FSID: &str = "cephfs.fsid";
pub const CEPHFS_SHAREPOINT: &str = "cephfs.sharepoint";
pub const CEPHFS_MONITOR_HOSTS: &str = "cephfs.monitor-hosts";
pub const CEPHFS_AUTH_INFO: &str = "cephfs.auth-info";

pub const LUSTRE_MGS_NIDS: &str = "lustre.mgs-nids";
pub const LUSTRE_FS_NAME: &str = "lustre.fs-name";

/// True for keys owned by this codec; used to prune stale keys on republish
pub fn is_descriptor_key(key: &str) -> bool {
    key == PROTOCOL_KEY || key_protocol(key).is_some()
}

fn key_protocol(key: &str) -> Option<Protocol> {
    let (prefix, _) = key.split_once('.')?;
    Protocol::ALL.into_iter().find(|p| p.as_str() == prefix)
}

/// Flatten a descriptor into its relation payload
pub fn encode(descriptor: &EndpointDescriptor) -> RelationData {
    let mut data = RelationData::new();
    data.insert(PROTOCOL_KEY.to_string(), descriptor.protocol().to_string());

    match descriptor {
        EndpointDescriptor::Nfs(nfs) => {
            data.insert(NFS_HOSTNAME.to_string(), nfs.hostname.clone());
            if let Some(port) = nfs.port {
                data.insert(NFS_PORT.to_string(), port.to_string());
            }
            data.insert(NFS_PATH.to_string(), nfs.path.clone());
        }
        EndpointDescriptor::Cephfs(ceph) => {
            data.insert(CEPHFS_FSID.to_string(), ceph.fsid.clone());
            data.insert(
                CEPHFS_SHAREPOINT.to_string(),
                format!("{}:{}", ceph.fs_name, ceph.path),
            );
            let mons: Vec<String> = ceph.monitor_hosts.iter().map(HostAddr::to_string).collect();
            data.insert(CEPHFS_MONITOR_HOSTS.to_string(), mons.join(" "));
            data.insert(
                CEPHFS_AUTH_INFO.to_string(),
                format!("{}:{}", ceph.user, ceph.key),
            );
        }
        EndpointDescriptor::Lustre(lustre) => {
            data.insert(LUSTRE_MGS_NIDS.to_string(), lustre.mgs_nids.join(" "));
            data.insert(LUSTRE_FS_NAME.to_string(), lustre.fs_name.clone());
        }
    }

    data
}

/// Rebuild a descriptor from a relation payload
///
/// Returns `DecodeError::Empty` when the payload carries no descriptor keys
/// at all, which callers treat as "nothing published yet".
pub fn decode(data: &RelationData) -> Result<EndpointDescriptor, DecodeError> {
    let mut present: Vec<Protocol> = Vec::new();
    for key in data.keys() {
        if let Some(protocol) = key_protocol(key) {
            if !present.contains(&protocol) {
                present.push(protocol);
            }
        }
    }

    let declared = match data.get(PROTOCOL_KEY) {
        None if present.is_empty() => return Err(DecodeError::Empty),
        None => return Err(DecodeError::MissingProtocol),
        Some(value) => value
            .parse::<Protocol>()
            .map_err(|_| DecodeError::UnsupportedProtocol(value.clone()))?,
    };

    if let Some(other) = present.iter().copied().find(|p| *p != declared) {
        return Err(DecodeError::MixedProtocols { declared, other });
    }

    let descriptor = match declared {
        Protocol::Nfs => EndpointDescriptor::Nfs(NfsEndpoint {
            hostname: field(data, NFS_HOSTNAME)?.to_string(),
            port: optional_field(data, NFS_PORT)?
                .map(|p| parse_port(p).map_err(|e| malformed(NFS_PORT, e)))
                .transpose()?,
            path: field(data, NFS_PATH)?.to_string(),
        }),
        Protocol::Cephfs => {
            let sharepoint = field(data, CEPHFS_SHAREPOINT)?;
            let (fs_name, path) = split_pair(CEPHFS_SHAREPOINT, sharepoint, "<fs-name>:<path>")?;

            let monitor_hosts = list_field(data, CEPHFS_MONITOR_HOSTS)?
                .into_iter()
                .map(|h| HostAddr::parse(h).map_err(|e| malformed(CEPHFS_MONITOR_HOSTS, e)))
                .collect::<Result<Vec<_>, _>>()?;

            let auth_info = field(data, CEPHFS_AUTH_INFO)?;
            let (user, key) = split_pair(CEPHFS_AUTH_INFO, auth_info, "<user>:<key>")?;

            EndpointDescriptor::Cephfs(CephFsEndpoint {
                fsid: field(data, CEPHFS_FSID)?.to_string(),
                fs_name: fs_name.to_string(),
                path: path.to_string(),
                monitor_hosts,
                user: user.to_string(),
                key: key.to_string(),
            })
        }
        Protocol::Lustre => EndpointDescriptor::Lustre(LustreEndpoint {
            mgs_nids: list_field(data, LUSTRE_MGS_NIDS)?
                .into_iter()
                .map(str::to_string)
                .collect(),
            fs_name: field(data, LUSTRE_FS_NAME)?.to_string(),
        }),
    };

    descriptor.validate()?;
    Ok(descriptor)
}

fn field<'a>(data: &'a RelationData, key: &str) -> Result<&'a str, DecodeError> {
    optional_field(data, key)?.ok_or_else(|| DecodeError::MissingField(key.to_string()))
}

fn optional_field<'a>(data: &'a RelationData, key: &str) -> Result<Option<&'a str>, DecodeError> {
    match data.get(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Err(DecodeError::EmptyField(key.to_string())),
        Some(value) => Ok(Some(value.as_str())),
    }
}

fn list_field<'a>(data: &'a RelationData, key: &str) -> Result<Vec<&'a str>, DecodeError> {
    Ok(field(data, key)?.split_whitespace().collect())
}

fn split_pair<'a>(key: &str, value: &'a str, shape: &str) -> Result<(&'a str, &'a str), DecodeError> {
    match value.split_once(':') {
        Some((left, right)) if !left.is_empty() && !right.is_empty() => Ok((left, right)),
        _ => Err(DecodeError::Malformed {
            field: key.to_string(),
            reason: format!("`{}` does not match {}", value, shape),
        }),
    }
}

fn malformed(key: &str, err: EndpointError) -> DecodeError {
    let reason = match err {
        EndpointError::InvalidField { reason, .. } => reason,
        other => other.to_string(),
    };
    DecodeError::Malformed {
        field: key.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload carries no endpoint descriptor")]
    Empty,

    #[error("payload has protocol fields but no `protocol` key")]
    MissingProtocol,

    #[error("unsupported protocol `{0}`")]
    UnsupportedProtocol(String),

    #[error("payload declares `{declared}` but also carries `{other}` fields")]
    MixedProtocols { declared: Protocol, other: Protocol },

    #[error("missing required key `{0}`")]
    MissingField(String),

    #[error("key `{0}` is present but empty")]
    EmptyField(String),

    #[error("malformed `{field}`: {reason}")]
    Malformed { field: String, reason: String },

    #[error(transparent)]
    Invalid(#[from] EndpointError),
}
