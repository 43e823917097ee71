// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Managed block of the persistent mount table
//!
//! fsrelay only ever edits the lines between its two markers. Whatever sits
//! inside the block is, by construction, a mount fsrelay created.

use crate::domain::mount::PersistentEntry;
use crate::domain::system::MountSystemError;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const BEGIN_MARKER: &str = "# BEGIN fsrelay managed mounts";
pub const END_MARKER: &str = "# END fsrelay managed mounts";

/// Entries inside the managed block. Malformed lines are skipped.
pub fn parse_managed(contents: &str) -> Vec<PersistentEntry> {
    let mut inside = false;
    let mut entries = Vec::new();

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed == BEGIN_MARKER {
            inside = true;
            continue;
        }
        if trimmed == END_MARKER {
            inside = false;
            continue;
        }
        if !inside || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 4 {
            tracing::warn!("Ignoring malformed managed fstab line: {}", trimmed);
            continue;
        }
        entries.push(PersistentEntry {
            source: fields[0].to_string(),
            target: PathBuf::from(fields[1]),
            fstype: fields[2].to_string(),
            options: fields[3].to_string(),
        });
    }

    entries
}

/// Replace the managed block with `entries`, leaving every other line as it
/// was. An empty entry list removes the block entirely.
pub fn render(contents: &str, entries: &[PersistentEntry]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut inside = false;
    let mut block_at: Option<usize> = None;

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed == BEGIN_MARKER {
            inside = true;
            block_at.get_or_insert(lines.len());
            continue;
        }
        if trimmed == END_MARKER {
            inside = false;
            continue;
        }
        if !inside {
            lines.push(line.to_string());
        }
    }

    if !entries.is_empty() {
        let mut block = vec![BEGIN_MARKER.to_string()];
        block.extend(entries.iter().map(|e| {
            format!(
                "{}\t{}\t{}\t{}\t0 0",
                e.source,
                e.target.display(),
                e.fstype,
                e.options
            )
        }));
        block.push(END_MARKER.to_string());

        let at = block_at.unwrap_or(lines.len());
        lines.splice(at..at, block);
    }

    let mut rendered = lines.join("\n");
    if !rendered.is_empty() {
        rendered.push('\n');
    }
    rendered
}

/// File-backed managed block
#[derive(Debug, Clone)]
pub struct FstabFile {
    path: PathBuf,
}

impl FstabFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn contents(&self) -> Result<String, MountSystemError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(MountSystemError::Io(format!(
                "reading {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub async fn read(&self) -> Result<Vec<PersistentEntry>, MountSystemError> {
        Ok(parse_managed(&self.contents().await?))
    }

    /// Write through a sibling edit file and rename over the original,
    /// keeping the original's permissions
    pub async fn write(&self, entries: &[PersistentEntry]) -> Result<(), MountSystemError> {
        let contents = self.contents().await?;
        let updated = render(&contents, entries);
        if updated == contents {
            return Ok(());
        }

        let io_err = |e: std::io::Error| {
            MountSystemError::Io(format!("writing {}: {}", self.path.display(), e))
        };

        let permissions = match fs::metadata(&self.path).await {
            Ok(metadata) => Some(metadata.permissions()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_err(e)),
        };

        let mut edit = self.path.clone().into_os_string();
        edit.push(".fsrelay.edit");
        let edit = PathBuf::from(edit);

        let mut file = fs::File::create(&edit).await.map_err(io_err)?;
        if let Some(permissions) = permissions {
            fs::set_permissions(&edit, permissions).await.map_err(io_err)?;
        }
        file.write_all(updated.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        fs::rename(&edit, &self.path).await.map_err(io_err)?;

        Ok(())
    }
}
