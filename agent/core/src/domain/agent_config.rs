// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

// Agent Configuration Types
//
// Defines the configuration schema for fsrelay provider and client agents:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Unit identity
// - Provider endpoint fields (nfs, cephfs, lustre)
// - Client mount options
// - Retry, escalation and timeout policy
// - System paths and observability settings
//
// A manifest is loaded fresh on every config-changed event and handed to the
// agents as an immutable value.

use crate::domain::endpoint::{
    parse_port, CephFsEndpoint, EndpointDescriptor, EndpointError, HostAddr, LustreEndpoint,
    NfsEndpoint, Protocol,
};
use crate::domain::mount::{MountFlags, MountOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_VERSION: &str = "fsrelay/v1";
pub const KIND: &str = "AgentConfig";

/// Top-level Kubernetes-style agent configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigManifest {
    /// API version (must be "fsrelay/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "AgentConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: AgentConfigSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigSpec {
    pub unit: UnitIdentity,

    /// Endpoint this unit advertises when running as a provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Mount options when running as a client
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub system: SystemPaths,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitIdentity {
    /// Unit name as known to the host runtime, e.g. "nfs-proxy/0"
    pub id: String,
}

/// Provider endpoint fields. Everything is a string as an operator types it;
/// `build_descriptor` parses and validates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    // nfs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    // cephfs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsid: Option<String>,
    /// `<fs-name>:<path>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharepoint: Option<String>,
    /// Whitespace separated `<host>[:<port>]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_hosts: Option<String>,
    /// `<user>:<key>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<String>,

    // lustre
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgs_nids: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_name: Option<String>,
}

impl ProviderConfig {
    /// Build and validate the descriptor this configuration describes
    pub fn build_descriptor(&self) -> Result<EndpointDescriptor, ConfigError> {
        let protocol = self.protocol.ok_or(ConfigError::MissingProtocol)?;

        let descriptor = match protocol {
            Protocol::Nfs => {
                let hostname = present(&self.hostname).ok_or(ConfigError::Missing("hostname"))?;
                let path = present(&self.path).ok_or(ConfigError::Missing("path"))?;
                let port = match present(&self.port) {
                    None => None,
                    Some(p) => Some(parse_port(p).map_err(|_| invalid("port", p))?),
                };
                EndpointDescriptor::Nfs(NfsEndpoint {
                    hostname: hostname.to_string(),
                    port,
                    path: path.to_string(),
                })
            }
            Protocol::Cephfs => {
                let required = [
                    ("fsid", &self.fsid),
                    ("sharepoint", &self.sharepoint),
                    ("monitor-hosts", &self.monitor_hosts),
                    ("auth-info", &self.auth_info),
                ];
                let missing: Vec<String> = required
                    .iter()
                    .filter(|(_, value)| present(value).is_none())
                    .map(|(name, _)| name.to_string())
                    .collect();
                if !missing.is_empty() {
                    return Err(ConfigError::MissingMany(missing));
                }

                // all four are present past this point
                let fsid = present(&self.fsid).unwrap_or_default();
                let sharepoint = present(&self.sharepoint).unwrap_or_default();
                let monitor_hosts = present(&self.monitor_hosts).unwrap_or_default();
                let auth_info = present(&self.auth_info).unwrap_or_default();

                let (fs_name, path) = split_pair(sharepoint).ok_or_else(|| invalid("sharepoint", sharepoint))?;
                let (user, key) = split_pair(auth_info).ok_or_else(|| invalid("auth-info", auth_info))?;
                let monitor_hosts = monitor_hosts
                    .split_whitespace()
                    .map(|h| HostAddr::parse(h).map_err(|_| invalid("monitor-hosts", h)))
                    .collect::<Result<Vec<_>, _>>()?;

                EndpointDescriptor::Cephfs(CephFsEndpoint {
                    fsid: fsid.to_string(),
                    fs_name: fs_name.to_string(),
                    path: path.to_string(),
                    monitor_hosts,
                    user: user.to_string(),
                    key: key.to_string(),
                })
            }
            Protocol::Lustre => {
                let nids = present(&self.mgs_nids).ok_or(ConfigError::Missing("mgs-nids"))?;
                let fs_name = present(&self.fs_name).ok_or(ConfigError::Missing("fs-name"))?;
                EndpointDescriptor::Lustre(LustreEndpoint {
                    mgs_nids: nids.split_whitespace().map(str::to_string).collect(),
                    fs_name: fs_name.to_string(),
                })
            }
        };

        descriptor.validate()?;
        Ok(descriptor)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn split_pair(value: &str) -> Option<(&str, &str)> {
    value
        .split_once(':')
        .filter(|(left, right)| !left.is_empty() && !right.is_empty())
}

fn invalid(field: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        value: value.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Where to mount. Unset means the `mount` relation decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<PathBuf>,

    #[serde(flatten)]
    pub flags: MountFlags,
}

impl ClientConfig {
    pub fn mount_options(&self) -> Option<MountOptions> {
        self.mountpoint
            .as_ref()
            .filter(|m| !m.as_os_str().is_empty())
            .map(|m| MountOptions::new(m.clone(), self.flags))
    }
}

/// Retry, escalation and timeout policy for the reconciliation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    #[serde(default = "default_base_backoff")]
    pub base_backoff_secs: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Consecutive failures after which the unit reports Blocked
    #[serde(default = "default_blocked_after")]
    pub blocked_after_failures: u32,

    /// Upper bound for any single mount-system operation
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Interval of the periodic drift check
    #[serde(default = "default_update_status_interval")]
    pub update_status_interval_secs: u64,
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32);
        let secs = self
            .base_backoff_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn update_status_interval(&self) -> Duration {
        Duration::from_secs(self.update_status_interval_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff_secs: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
            blocked_after_failures: default_blocked_after(),
            operation_timeout_secs: default_operation_timeout(),
            update_status_interval_secs: default_update_status_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SystemPaths {
    /// Persistent mount table holding the managed block
    #[serde(default = "default_fstab")]
    pub fstab: PathBuf,

    #[serde(default = "default_mount_table")]
    pub mount_table: PathBuf,

    #[serde(default = "default_mount_bin")]
    pub mount_bin: PathBuf,

    #[serde(default = "default_umount_bin")]
    pub umount_bin: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            fstab: default_fstab(),
            mount_table: default_mount_table(),
            mount_bin: default_mount_bin(),
            umount_bin: default_umount_bin(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus scrape port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_base_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    300
}

fn default_blocked_after() -> u32 {
    5
}

fn default_operation_timeout() -> u64 {
    60
}

fn default_update_status_interval() -> u64 {
    300
}

fn default_fstab() -> PathBuf {
    PathBuf::from("/etc/fstab")
}

fn default_mount_table() -> PathBuf {
    PathBuf::from("/proc/self/mounts")
}

fn default_mount_bin() -> PathBuf {
    PathBuf::from("/bin/mount")
}

fn default_umount_bin() -> PathBuf {
    PathBuf::from("/bin/umount")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9464
}

impl Default for AgentConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "fsrelay".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname.clone(),
                labels: None,
            },
            spec: AgentConfigSpec {
                unit: UnitIdentity {
                    id: format!("{}/0", hostname),
                },
                provider: ProviderConfig::default(),
                client: ClientConfig::default(),
                retry: RetryPolicy::default(),
                system: SystemPaths::default(),
                observability: None,
            },
        }
    }
}

impl AgentConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FSRELAY_CONFIG_PATH environment variable
    /// 2. ./fsrelay.yaml (working directory)
    /// 3. ~/.fsrelay/config.yaml (user home)
    /// 4. /etc/fsrelay/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FSRELAY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fsrelay.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fsrelay").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/fsrelay/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let (config, source) = Self::load_with_source(cli_path)?;
        if source.is_none() {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
        }
        Ok(config)
    }

    /// Like [`load_or_default`](Self::load_or_default), but without the fallback warning;
    /// returns the file the configuration came from (`None` for defaults) so
    /// callers that set up logging from the result can report it afterwards.
    pub fn load_with_source(cli_path: Option<PathBuf>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        // Explicit path must exist and parse
        let path = match cli_path {
            Some(path) => Some(path),
            None => Self::discover_config(),
        };

        let mut config = match &path {
            Some(path) => Self::from_yaml_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok((config, path))
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("FSRELAY_UNIT_ID") {
            if !id.is_empty() {
                tracing::debug!("Environment override: FSRELAY_UNIT_ID={}", id);
                self.spec.unit.id = id;
            }
        }

        if let Ok(level) = std::env::var("FSRELAY_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::debug!("Environment override: FSRELAY_LOG_LEVEL={}", level);
                let observability = self.spec.observability.get_or_insert_with(Default::default);
                match observability.logging.as_mut() {
                    Some(logging) => logging.level = level,
                    None => {
                        observability.logging = Some(LoggingConfig {
                            level,
                            format: default_log_format(),
                        })
                    }
                }
            }
        }
    }

    /// Validate manifest structure. Provider and client fields are checked by
    /// the agents, where a failure becomes a Blocked status instead of a
    /// startup error.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.unit.id.is_empty() {
            anyhow::bail!("spec.unit.id cannot be empty");
        }

        let retry = &self.spec.retry;
        if retry.base_backoff_secs == 0 || retry.max_backoff_secs < retry.base_backoff_secs {
            anyhow::bail!("spec.retry backoff must satisfy 0 < base-backoff-secs <= max-backoff-secs");
        }
        if retry.operation_timeout_secs == 0 {
            anyhow::bail!("spec.retry.operation-timeout-secs must be positive");
        }

        if let Some(logging) = self.spec.observability.as_ref().and_then(|o| o.logging.as_ref()) {
            if logging.format != "text" && logging.format != "json" {
                anyhow::bail!("Invalid log format: '{}'. Must be 'text' or 'json'", logging.format);
            }
        }

        Ok(())
    }

    pub fn log_level(&self) -> Option<&str> {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.as_ref())
            .map(|l| l.level.as_str())
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Provider configuration problems, worded for an operator reading status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("No configured protocol")]
    MissingProtocol,

    #[error("No configured {0}")]
    Missing(&'static str),

    #[error(
        "Missing required configuration for {}",
        .0.iter().map(|f| format!("`{}`", f)).collect::<Vec<_>>().join(", ")
    )]
    MissingMany(Vec<String>),

    #[error("Invalid {field} `{value}`")]
    Invalid { field: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Endpoint(#[from] EndpointError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(yaml: &str) -> ProviderConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_load_reports_explicit_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsrelay.yaml");
        std::fs::write(
            &path,
            "apiVersion: fsrelay/v1\nkind: AgentConfig\nmetadata:\n  name: test\nspec:\n  unit:\n    id: filesystem-client/3\n",
        )
        .unwrap();

        let (_, source) = AgentConfigManifest::load_with_source(Some(path.clone())).unwrap();
        assert_eq!(source, Some(path));
        assert!(AgentConfigManifest::load_with_source(Some(dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_default_manifest() {
        let manifest = AgentConfigManifest::default();
        assert_eq!(manifest.api_version, "fsrelay/v1");
        assert_eq!(manifest.kind, "AgentConfig");
        assert!(manifest.spec.unit.id.ends_with("/0"));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parse() {
        let manifest = AgentConfigManifest::from_yaml_str(
            r#"
apiVersion: fsrelay/v1
kind: AgentConfig
metadata:
  name: compute-01
spec:
  unit:
    id: filesystem-client/0
  client:
    mountpoint: /scratch
    noexec: true
  retry:
    base-backoff-secs: 2
  observability:
    logging:
      level: debug
      format: json
"#,
        )
        .unwrap();

        assert!(manifest.validate().is_ok());
        let options = manifest.spec.client.mount_options().unwrap();
        assert_eq!(options.mountpoint, PathBuf::from("/scratch"));
        assert!(options.flags.noexec);
        assert!(!options.flags.read_only);
        assert_eq!(manifest.spec.retry.base_backoff_secs, 2);
        assert_eq!(manifest.spec.retry.max_backoff_secs, 300);
        assert_eq!(manifest.spec.system.fstab, PathBuf::from("/etc/fstab"));
        assert_eq!(manifest.log_level(), Some("debug"));
    }

    #[test]
    fn test_validation() {
        let mut manifest = AgentConfigManifest::default();
        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = AgentConfigManifest::default();
        manifest.spec.unit.id.clear();
        assert!(manifest.validate().is_err());

        let mut manifest = AgentConfigManifest::default();
        manifest.spec.retry.max_backoff_secs = 1;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(4), Duration::from_secs(40));
        assert_eq!(policy.backoff(7), Duration::from_secs(300));
        assert_eq!(policy.backoff(200), Duration::from_secs(300));
    }

    #[test]
    fn test_nfs_provider_config() {
        let descriptor = provider("protocol: nfs\nhostname: 10.0.0.5\nport: '2049'\npath: /export")
            .build_descriptor()
            .unwrap();
        assert_eq!(
            descriptor,
            EndpointDescriptor::Nfs(NfsEndpoint {
                hostname: "10.0.0.5".to_string(),
                port: Some(2049),
                path: "/export".to_string(),
            })
        );

        let err = provider("protocol: nfs\npath: /export").build_descriptor().unwrap_err();
        assert_eq!(err.to_string(), "No configured hostname");

        let err = provider("protocol: nfs\nhostname: h\npath: /x\nport: http")
            .build_descriptor()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid port `http`");
    }

    #[test]
    fn test_cephfs_provider_config() {
        let config = provider(
            r#"
protocol: cephfs
fsid: 354ca7c4-f10d-11ee-93f8-1f85f87b7845
sharepoint: ceph-fs:/
monitor-hosts: 10.5.0.80:6789 10.5.0.81:6789
auth-info: ceph-client:AQAPdQldX264KBAAOyaxen/y0XBl1qxlGPTabw==
"#,
        );
        match config.build_descriptor().unwrap() {
            EndpointDescriptor::Cephfs(ceph) => {
                assert_eq!(ceph.fs_name, "ceph-fs");
                assert_eq!(ceph.path, "/");
                assert_eq!(ceph.monitor_hosts.len(), 2);
                assert_eq!(ceph.user, "ceph-client");
            }
            other => panic!("unexpected descriptor {:?}", other),
        }

        let err = provider("protocol: cephfs\nfsid: abc\nsharepoint: fs:/")
            .build_descriptor()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required configuration for `monitor-hosts`, `auth-info`"
        );

        let mut bad = config.clone();
        bad.sharepoint = Some("no-separator".to_string());
        assert_eq!(
            bad.build_descriptor().unwrap_err().to_string(),
            "Invalid sharepoint `no-separator`"
        );

        let mut bad = config;
        bad.auth_info = Some("user-only".to_string());
        assert_eq!(
            bad.build_descriptor().unwrap_err().to_string(),
            "Invalid auth-info `user-only`"
        );
    }

    #[test]
    fn test_lustre_provider_config() {
        let err = provider("protocol: lustre\nfs-name: lustre").build_descriptor().unwrap_err();
        assert_eq!(err.to_string(), "No configured mgs-nids");

        let err = provider("protocol: lustre\nmgs-nids: mgs@tcp").build_descriptor().unwrap_err();
        assert_eq!(err.to_string(), "No configured fs-name");

        let descriptor = provider("protocol: lustre\nmgs-nids: mgs1@tcp mgs2@tcp\nfs-name: lustre")
            .build_descriptor()
            .unwrap();
        assert_eq!(descriptor.protocol(), Protocol::Lustre);
    }

    #[test]
    fn test_missing_protocol() {
        assert_eq!(
            ProviderConfig::default().build_descriptor(),
            Err(ConfigError::MissingProtocol)
        );
    }
}
