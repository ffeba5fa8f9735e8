// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

// PIA Status - Core Engine
// Status probing and aggregation, change notification, and lifecycle orchestration

pub mod aggregator;
pub mod catalog;
pub mod command;
pub mod display;
pub mod engine;
pub mod error;
pub mod lock;
pub mod marker;
pub mod notifier;
pub mod orchestrator;
pub mod probes;
pub mod readiness;
pub mod stack;

#[cfg(test)]
mod testing;

pub use aggregator::StatusAggregator;
pub use catalog::{fetch_catalog, CatalogCache};
pub use command::{CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
pub use display::{DisplayChanges, DisplayField, DisplayModel, DisplayState};
pub use engine::Engine;
pub use error::{Error, Result};
pub use lock::{OperationLock, OperationLockGuard};
pub use marker::CarryOverMarker;
pub use notifier::{DirectoryWatch, RefreshHandle, RefreshTrigger, StatusService};
pub use orchestrator::{plan, Operation, Orchestrator, Outcome, Step};
pub use probes::{Probes, SystemProbes};
pub use readiness::{Readiness, ReadinessPoller};
pub use stack::{settings_command, SystemVpnStack, VpnStack};
