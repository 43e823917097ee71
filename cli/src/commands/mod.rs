// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the fsrelay CLI

pub mod agent;
pub mod codec;
pub mod config;

pub use self::codec::CodecCommand;
pub use self::config::ConfigCommand;
