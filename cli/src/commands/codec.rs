// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Relation payload commands
//!
//! Commands: decode, encode

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use fsrelay_core::domain::endpoint::EndpointDescriptor;
use fsrelay_core::domain::relation::RelationData;
use fsrelay_core::domain::wire;

#[derive(Subcommand)]
pub enum CodecCommand {
    /// Decode a flat key-value relation payload (JSON object) into a descriptor
    Decode {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Encode a descriptor (JSON) into the flat relation payload
    Encode {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: CodecCommand) -> Result<()> {
    match command {
        CodecCommand::Decode { file } => {
            let descriptor = decode_file(&file).await?;
            eprintln!("{} {}", "✓".green(), descriptor);
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        }
        CodecCommand::Encode { file } => {
            let payload = encode_file(&file).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

async fn decode_file(path: &Path) -> Result<EndpointDescriptor> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let payload: RelationData =
        serde_json::from_str(&raw).context("Payload must be a JSON object of strings")?;
    wire::decode(&payload).context("Payload is not a valid endpoint descriptor")
}

async fn encode_file(path: &Path) -> Result<RelationData> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let descriptor: EndpointDescriptor =
        serde_json::from_str(&raw).context("Failed to parse descriptor")?;
    descriptor.validate().context("Descriptor is invalid")?;
    Ok(wire::encode(&descriptor))
}
