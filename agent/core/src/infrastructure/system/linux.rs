// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Linux mount system adapter
//!
//! Reads the live table from `/proc/self/mounts` and shells out to
//! `mount`/`umount`. The managed fstab block is delegated to [`FstabFile`].

use crate::domain::agent_config::SystemPaths;
use crate::domain::mount::{redact_options, ForceLevel, MountRecord, PersistentEntry};
use crate::domain::system::{MountSystem, MountSystemError};
use crate::infrastructure::system::fstab::FstabFile;
use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

const DETECT_VIRT: &str = "systemd-detect-virt";

// ESTALE
const STALE_FILE_HANDLE: i32 = 116;

pub struct LinuxMountSystem {
    paths: SystemPaths,
    fstab: FstabFile,
}

impl LinuxMountSystem {
    pub fn new(paths: SystemPaths) -> Self {
        let fstab = FstabFile::new(paths.fstab.clone());
        Self { paths, fstab }
    }

    async fn run(&self, program: &Path, args: &[&str]) -> Result<(), MountSystemError> {
        debug!("Running {} {}", program.display(), redact_args(args));
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MountSystemError::Io(format!("spawning {}: {}", program.display(), e)))?;
        check_output(program, output)
    }
}

fn redact_args(args: &[&str]) -> String {
    args.iter()
        .map(|arg| redact_options(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_output(program: &Path, output: Output) -> Result<(), MountSystemError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(MountSystemError::from_command_output(
        &program.display().to_string(),
        output.status.code().unwrap_or(-1),
        &stderr,
    ))
}

/// Parse the `/proc/self/mounts` format
pub fn parse_mount_table(contents: &str) -> Vec<MountRecord> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fstype = fields.next()?;
            let options = fields.next()?;
            Some(MountRecord {
                source: unescape(source),
                target: PathBuf::from(unescape(target)),
                fstype: fstype.to_string(),
                options: options.split(',').map(str::to_string).collect(),
            })
        })
        .collect()
}

/// Undo the kernel's octal escaping of whitespace and backslashes
fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let octal = bytes.get(i + 1..i + 4).filter(|digits| {
            bytes[i] == b'\\' && digits[0] <= b'3' && digits.iter().all(|b| (b'0'..=b'7').contains(b))
        });
        if let Some(digits) = octal {
            out.push((digits[0] - b'0') * 64 + (digits[1] - b'0') * 8 + (digits[2] - b'0'));
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[async_trait]
impl MountSystem for LinuxMountSystem {
    async fn mount_table(&self) -> Result<Vec<MountRecord>, MountSystemError> {
        let contents = tokio::fs::read_to_string(&self.paths.mount_table)
            .await
            .map_err(|e| {
                MountSystemError::Io(format!("reading {}: {}", self.paths.mount_table.display(), e))
            })?;
        Ok(parse_mount_table(&contents))
    }

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &[String],
    ) -> Result<(), MountSystemError> {
        let options = options.join(",");
        let target = target.to_string_lossy();
        self.run(
            &self.paths.mount_bin,
            &["-t", fstype, "-o", &options, source, &target],
        )
        .await
    }

    async fn unmount(&self, target: &Path, level: ForceLevel) -> Result<(), MountSystemError> {
        let target = target.to_string_lossy();
        let mut args: Vec<&str> = Vec::new();
        if let Some(flag) = level.umount_flag() {
            args.push(flag);
        }
        args.push(&target);

        match self.run(&self.paths.umount_bin, &args).await {
            Err(MountSystemError::NotMounted(detail)) => {
                debug!("{} already unmounted: {}", target, detail);
                Ok(())
            }
            other => other,
        }
    }

    async fn read_persistent(&self) -> Result<Vec<PersistentEntry>, MountSystemError> {
        self.fstab.read().await
    }

    async fn write_persistent(&self, entries: &[PersistentEntry]) -> Result<(), MountSystemError> {
        self.fstab.write(entries).await
    }

    async fn ensure_directory(&self, path: &Path) -> Result<(), MountSystemError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| MountSystemError::Io(format!("creating {}: {}", path.display(), e)))
    }

    async fn write_secret(&self, path: &Path, secret: &str) -> Result<(), MountSystemError> {
        let io_err =
            |e: std::io::Error| MountSystemError::Io(format!("writing {}: {}", path.display(), e));

        if let Some(dir) = path.parent() {
            tokio::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(dir)
                .await
                .map_err(io_err)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .await
            .map_err(io_err)?;
        // mode() only applies on create
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_err)?;
        file.write_all(secret.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)
    }

    async fn remove_secret(&self, path: &Path) -> Result<(), MountSystemError> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(MountSystemError::Io(
                format!("removing {}: {}", path.display(), e),
            )),
            _ => Ok(()),
        }
    }

    async fn check_health(&self, target: &Path) -> Result<(), MountSystemError> {
        match tokio::fs::metadata(target).await {
            Ok(_) => Ok(()),
            Err(e) if e.raw_os_error() == Some(STALE_FILE_HANDLE) => {
                Err(MountSystemError::Stale(target.display().to_string()))
            }
            Err(e) => Err(MountSystemError::Io(format!("stat {}: {}", target.display(), e))),
        }
    }

    async fn supports_network_mounts(&self) -> Result<bool, MountSystemError> {
        // exits non-zero when no virtualization is found, so only stdout matters
        match Command::new(DETECT_VIRT).output().await {
            Ok(output) => {
                let virt = String::from_utf8_lossy(&output.stdout);
                Ok(virt.trim() != "lxc")
            }
            Err(e) => {
                warn!("Could not run {}: {}; assuming network mounts are supported", DETECT_VIRT, e);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mount_table() {
        let table = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
10.0.0.5:/export /scratch nfs4 rw,noexec,relatime,vers=4.2,port=2049 0 0
host:/with\\040space /mnt/with\\040space nfs rw 0 0
";
        let records = parse_mount_table(table);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].source, "10.0.0.5:/export");
        assert_eq!(records[1].target, PathBuf::from("/scratch"));
        assert!(records[1].flags().noexec);
        assert_eq!(records[2].target, PathBuf::from("/mnt/with space"));
    }

    #[test]
    fn test_logged_args_hide_inline_secret() {
        let logged = redact_args(&["-t", "ceph", "-o", "rw,secret=AQBx==", "src", "/mnt/x"]);
        assert_eq!(logged, "-t ceph -o rw,secret=*** src /mnt/x");
    }

    #[tokio::test]
    async fn test_secret_file_is_root_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets").join("mnt-x.secret");
        let system = LinuxMountSystem::new(SystemPaths::default());

        system.write_secret(&path, "AQBx==").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "AQBx==");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        system.remove_secret(&path).await.unwrap();
        assert!(!path.exists());
        // already gone
        system.remove_secret(&path).await.unwrap();
    }

    #[test]
    fn test_unescape_leaves_plain_fields() {
        assert_eq!(unescape("/plain/path"), "/plain/path");
        assert_eq!(unescape("trailing\\"), "trailing\\");
        assert_eq!(unescape("tab\\011x"), "tab\tx");
    }
}
