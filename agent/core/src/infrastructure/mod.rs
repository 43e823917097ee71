// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod host;
pub mod status;
pub mod system;
pub mod telemetry;

pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use status::{FanoutStatusSink, MemoryStatusSink, TracingStatusSink};
