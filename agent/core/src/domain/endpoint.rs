// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Endpoint Descriptor - how to reach one exported filesystem share
//!
//! An `EndpointDescriptor` is the immutable value a provider publishes and a
//! client consumes. Exactly one protocol's field set is populated, which the
//! enum shape enforces; `validate()` enforces that every field in that set is
//! non-empty and syntactically well-formed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;
use std::sync::OnceLock;
use regex::Regex;
use thiserror::Error;

// ============================================================================
// Value Objects
// ============================================================================

/// Filesystem protocol advertised by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Nfs,
    Cephfs,
    Lustre,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Nfs, Protocol::Cephfs, Protocol::Lustre];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Nfs => "nfs",
            Protocol::Cephfs => "cephfs",
            Protocol::Lustre => "lustre",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nfs" => Ok(Protocol::Nfs),
            "cephfs" => Ok(Protocol::Cephfs),
            "lustre" => Ok(Protocol::Lustre),
            other => Err(EndpointError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// A `host[:port]` address. IPv6 hosts are stored without brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddr {
    pub host: String,
    pub port: Option<u16>,
}

impl HostAddr {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self { host: host.into(), port }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 address without brackets is ambiguous and rejected.
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        let invalid = |reason: &str| EndpointError::InvalidField {
            field: "host".to_string(),
            reason: format!("`{}`: {}", s, reason),
        };

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated `[`"))?;
            host.parse::<Ipv6Addr>()
                .map_err(|_| invalid("bracketed host is not an IPv6 address"))?;
            let port = match tail {
                "" => None,
                _ => Some(
                    tail.strip_prefix(':')
                        .ok_or_else(|| invalid("unexpected characters after `]`"))?,
                ),
            };
            (host, port)
        } else {
            match s.matches(':').count() {
                0 => (s, None),
                1 => {
                    let (host, port) = s.split_once(':').unwrap_or((s, ""));
                    (host, Some(port))
                }
                _ => return Err(invalid("IPv6 addresses must be enclosed in brackets")),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/' || c == '@') {
            return Err(invalid("host contains forbidden characters"));
        }

        let port = match port {
            None => None,
            Some(p) => Some(parse_port(p).map_err(|_| invalid("port must be in 1..=65535"))?),
        };

        Ok(Self::new(host, port))
    }

    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// Host as it appears in a mount source (IPv6 bracketed)
    pub fn host_for_uri(&self) -> String {
        if self.is_ipv6() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host_for_uri(), port),
            None => write!(f, "{}", self.host_for_uri()),
        }
    }
}

pub(crate) fn parse_port(s: &str) -> Result<u16, EndpointError> {
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(EndpointError::InvalidField {
            field: "port".to_string(),
            reason: format!("`{}` is not a port in 1..=65535", s),
        }),
        Ok(port) => Ok(port),
    }
}

/// NFS export
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NfsEndpoint {
    pub hostname: String,
    pub port: Option<u16>,
    pub path: String,
}

/// CephFS share
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CephFsEndpoint {
    /// Ceph cluster id
    pub fsid: String,
    /// Filesystem name half of the sharepoint
    pub fs_name: String,
    /// Path half of the sharepoint
    pub path: String,
    /// Monitor addresses, order preserved
    pub monitor_hosts: Vec<HostAddr>,
    pub user: String,
    /// Cephx secret key
    pub key: String,
}

/// Lustre filesystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LustreEndpoint {
    /// MGS network ids, order preserved
    pub mgs_nids: Vec<String>,
    pub fs_name: String,
}

// ============================================================================
// Aggregate: EndpointDescriptor
// ============================================================================

/// Description of one exported filesystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum EndpointDescriptor {
    Nfs(NfsEndpoint),
    Cephfs(CephFsEndpoint),
    Lustre(LustreEndpoint),
}

impl EndpointDescriptor {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Nfs(_) => Protocol::Nfs,
            Self::Cephfs(_) => Protocol::Cephfs,
            Self::Lustre(_) => Protocol::Lustre,
        }
    }

    /// Check every required field of the populated protocol
    pub fn validate(&self) -> Result<(), EndpointError> {
        match self {
            Self::Nfs(nfs) => {
                require("nfs.hostname", &nfs.hostname)?;
                let host = if nfs.hostname.contains(':') {
                    format!("[{}]", nfs.hostname)
                } else {
                    nfs.hostname.clone()
                };
                HostAddr::parse(&host).map_err(|e| e.for_field("nfs.hostname"))?;
                if nfs.port == Some(0) {
                    return Err(EndpointError::invalid("nfs.port", "port must be in 1..=65535"));
                }
                require_abs_path("nfs.path", &nfs.path)
            }
            Self::Cephfs(ceph) => {
                require_token("cephfs.fsid", &ceph.fsid)?;
                require_token("cephfs.fs-name", &ceph.fs_name)?;
                if ceph.fs_name.contains(':') {
                    return Err(EndpointError::invalid("cephfs.fs-name", "must not contain `:`"));
                }
                require_abs_path("cephfs.path", &ceph.path)?;
                if ceph.monitor_hosts.is_empty() {
                    return Err(EndpointError::MissingField("cephfs.monitor-hosts".to_string()));
                }
                for mon in &ceph.monitor_hosts {
                    HostAddr::parse(&mon.to_string())
                        .map_err(|e| e.for_field("cephfs.monitor-hosts"))?;
                }
                require_token("cephfs.user", &ceph.user)?;
                if ceph.user.contains(':') {
                    return Err(EndpointError::invalid("cephfs.user", "must not contain `:`"));
                }
                require_token("cephfs.key", &ceph.key)
            }
            Self::Lustre(lustre) => {
                if lustre.mgs_nids.is_empty() {
                    return Err(EndpointError::MissingField("lustre.mgs-nids".to_string()));
                }
                for nid in &lustre.mgs_nids {
                    if !nid_regex().is_match(nid) {
                        return Err(EndpointError::invalid(
                            "lustre.mgs-nids",
                            format!("`{}` is not a network id of the form <address>@<network>", nid),
                        ));
                    }
                }
                require("lustre.fs-name", &lustre.fs_name)?;
                if !fsname_regex().is_match(&lustre.fs_name) {
                    return Err(EndpointError::invalid(
                        "lustre.fs-name",
                        "must be 1-8 characters of [A-Za-z0-9_-]",
                    ));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nfs(nfs) => {
                let host = HostAddr::new(nfs.hostname.clone(), nfs.port);
                write!(f, "nfs://{}{}", host, nfs.path)
            }
            Self::Cephfs(ceph) => write!(
                f,
                "cephfs://{}@{}.{}{}",
                ceph.user, ceph.fsid, ceph.fs_name, ceph.path
            ),
            Self::Lustre(lustre) => {
                write!(f, "lustre://{}/{}", lustre.mgs_nids.join(":"), lustre.fs_name)
            }
        }
    }
}

fn nid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._\-]+@[A-Za-z]+[0-9]*$").expect("NID pattern is valid")
    })
}

fn fsname_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]{1,8}$").expect("fsname pattern is valid"))
}

fn require(field: &str, value: &str) -> Result<(), EndpointError> {
    if value.is_empty() {
        Err(EndpointError::MissingField(field.to_string()))
    } else {
        Ok(())
    }
}

fn require_token(field: &str, value: &str) -> Result<(), EndpointError> {
    require(field, value)?;
    if value.chars().any(char::is_whitespace) {
        return Err(EndpointError::invalid(field, "must not contain whitespace"));
    }
    Ok(())
}

fn require_abs_path(field: &str, value: &str) -> Result<(), EndpointError> {
    require_token(field, value)?;
    if !value.starts_with('/') {
        return Err(EndpointError::invalid(field, format!("`{}` is not an absolute path", value)));
    }
    Ok(())
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("unsupported filesystem protocol `{0}`")]
    UnsupportedProtocol(String),
}

impl EndpointError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Re-attribute a host parsing error to the field it came from
    pub(crate) fn for_field(self, field: &str) -> Self {
        match self {
            Self::InvalidField { reason, .. } => Self::InvalidField {
                field: field.to_string(),
                reason,
            },
            other => other,
        }
    }
}
