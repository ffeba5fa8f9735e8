// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Orchestrator
//!
//! Every user-facing action compiles to a flat list of [`Step`]s via
//! [`plan`], which an executor walks in order. Gating steps (confirmed
//! credential edits) abort the rest of the sequence on failure; every other
//! step is best-effort and only logged when it fails.
//!
//! At most one sequence runs at a time, across every process sharing the
//! carry-over marker. A second request is rejected with [`Error::Busy`]
//! instead of being queued, because two sequences would race on the marker
//! and the credentials store.

use pia_status_common::{is_valid_region_id, Timings};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::lock::OperationLock;
use crate::marker::CarryOverMarker;
use crate::notifier::RefreshTrigger;
use crate::readiness::{Readiness, ReadinessPoller};
use crate::stack::VpnStack;

/// Credentials store key selecting the region
pub const PREFERRED_REGION_KEY: &str = "PREFERRED_REGION";
/// Credentials store key letting the service pick the fastest server
pub const AUTOCONNECT_KEY: &str = "AUTOCONNECT";

/// User-facing lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Disconnect,
    Reconnect,
    SwitchRegion { region_id: String },
    FindFastestServer,
    ToggleKillSwitch,
    /// Finish a kill-switch carry-over left behind by a previous process
    RestoreKillSwitch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Disconnect => write!(f, "disconnect"),
            Operation::Reconnect => write!(f, "reconnect"),
            Operation::SwitchRegion { region_id } => write!(f, "switch region to {}", region_id),
            Operation::FindFastestServer => write!(f, "find fastest server"),
            Operation::ToggleKillSwitch => write!(f, "toggle kill switch"),
            Operation::RestoreKillSwitch => write!(f, "restore kill switch"),
        }
    }
}

/// One discrete action of a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// If the kill switch is on: record the carry-over, then disable it
    SuspendKillSwitch,
    PauseWatchdog,
    StopPortForwarding,
    LinkDown,
    SetCredential { key: &'static str, value: String },
    RelaxCredentialPermissions,
    RestartVpn,
    /// Fixed settle delay; not interrupted by cancellation
    Wait(Duration),
    ResumeWatchdog,
    /// If a carry-over is recorded: wait for the link and re-arm
    RestoreKillSwitch,
    ToggleKillSwitch,
    Refresh,
}

impl Step {
    /// Failure of a gating step aborts everything after it
    pub fn is_gating(&self) -> bool {
        matches!(self, Step::SetCredential { .. })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::SuspendKillSwitch => write!(f, "suspend kill switch"),
            Step::PauseWatchdog => write!(f, "pause watchdog"),
            Step::StopPortForwarding => write!(f, "stop port forwarding"),
            Step::LinkDown => write!(f, "bring link down"),
            Step::SetCredential { key, value } => write!(f, "set {}={}", key, value),
            Step::RelaxCredentialPermissions => write!(f, "fix credentials permissions"),
            Step::RestartVpn => write!(f, "restart VPN service"),
            Step::Wait(delay) => write!(f, "wait {:?}", delay),
            Step::ResumeWatchdog => write!(f, "resume watchdog"),
            Step::RestoreKillSwitch => write!(f, "restore kill switch"),
            Step::ToggleKillSwitch => write!(f, "toggle kill switch"),
            Step::Refresh => write!(f, "refresh status"),
        }
    }
}

/// The step list for an operation
pub fn plan(operation: &Operation, timings: &Timings) -> Vec<Step> {
    // Shared by every operation that restarts the service
    let reconnect_tail = [
        Step::RestartVpn,
        Step::Wait(timings.reconnect_settle()),
        Step::ResumeWatchdog,
        Step::RestoreKillSwitch,
        Step::Refresh,
    ];

    match operation {
        Operation::Disconnect => vec![
            Step::SuspendKillSwitch,
            Step::PauseWatchdog,
            Step::StopPortForwarding,
            Step::LinkDown,
            Step::Wait(timings.disconnect_settle()),
            Step::Refresh,
        ],
        Operation::Reconnect => reconnect_tail.to_vec(),
        Operation::SwitchRegion { region_id } => {
            let mut steps = vec![
                Step::SuspendKillSwitch,
                Step::PauseWatchdog,
                Step::SetCredential {
                    key: PREFERRED_REGION_KEY,
                    value: region_id.clone(),
                },
                Step::SetCredential {
                    key: AUTOCONNECT_KEY,
                    value: "false".to_string(),
                },
                Step::RelaxCredentialPermissions,
            ];
            steps.extend(reconnect_tail);
            steps
        }
        Operation::FindFastestServer => {
            let mut steps = vec![
                Step::SuspendKillSwitch,
                Step::PauseWatchdog,
                Step::SetCredential {
                    key: AUTOCONNECT_KEY,
                    value: "true".to_string(),
                },
                Step::LinkDown,
                Step::Wait(timings.link_down_wait()),
            ];
            steps.extend(reconnect_tail);
            steps
        }
        Operation::ToggleKillSwitch => vec![
            Step::ToggleKillSwitch,
            Step::Wait(timings.killswitch_settle()),
            Step::Refresh,
        ],
        Operation::RestoreKillSwitch => vec![Step::RestoreKillSwitch, Step::Refresh],
    }
}

/// How a sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// A gating step failed; nothing after it ran except a status refresh
    Aborted { step: Step, reason: String },
    /// Cancelled before `completed_steps` + 1 could start
    Cancelled { completed_steps: usize },
}

struct InFlight {
    operation: Operation,
    cancel: CancellationToken,
}

/// Clears the in-flight slot when a sequence ends, however it ends
struct FlightGuard<'a> {
    slot: &'a Mutex<Option<InFlight>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        *lock_slot(self.slot) = None;
    }
}

fn lock_slot<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Orchestrator {
    stack: Arc<dyn VpnStack>,
    marker: CarryOverMarker,
    poller: ReadinessPoller,
    refresh: Arc<dyn RefreshTrigger>,
    timings: Timings,
    in_flight: Mutex<Option<InFlight>>,
    file_lock: OperationLock,
}

impl Orchestrator {
    pub fn new(
        stack: Arc<dyn VpnStack>,
        marker: CarryOverMarker,
        refresh: Arc<dyn RefreshTrigger>,
        timings: Timings,
    ) -> Self {
        let poller = ReadinessPoller::new(
            stack.clone(),
            marker.clone(),
            refresh.clone(),
            timings.readiness_interval(),
        );
        let file_lock = OperationLock::beside(marker.path());
        Self {
            stack,
            marker,
            poller,
            refresh,
            timings,
            in_flight: Mutex::new(None),
            file_lock,
        }
    }

    /// Operation currently running, if any
    pub fn in_flight(&self) -> Option<Operation> {
        lock_slot(&self.in_flight).as_ref().map(|f| f.operation.clone())
    }

    /// Stop the running sequence before its next step, or between kill-switch
    /// re-arm attempts. Effects already applied stay applied. Returns false
    /// when nothing is running.
    pub fn cancel(&self) -> bool {
        match lock_slot(&self.in_flight).as_ref() {
            Some(flight) => {
                info!("Cancelling {}", flight.operation);
                flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn disconnect(&self) -> Result<Outcome> {
        self.run(Operation::Disconnect).await
    }

    pub async fn reconnect(&self) -> Result<Outcome> {
        self.run(Operation::Reconnect).await
    }

    pub async fn switch_region(&self, region_id: &str) -> Result<Outcome> {
        self.run(Operation::SwitchRegion {
            region_id: region_id.to_string(),
        })
        .await
    }

    pub async fn find_fastest_server(&self) -> Result<Outcome> {
        self.run(Operation::FindFastestServer).await
    }

    pub async fn toggle_kill_switch(&self) -> Result<Outcome> {
        self.run(Operation::ToggleKillSwitch).await
    }

    /// Resume a carry-over recorded by an earlier process, if the VPN is up.
    /// While it is down the marker is left for the next reconnect.
    pub async fn restore_pending(&self) -> Result<Option<Outcome>> {
        if !self.marker.exists().await {
            return Ok(None);
        }
        if !self.stack.link_present().await {
            info!("Kill-switch carry-over pending, VPN is down; keeping it for the next reconnect");
            return Ok(None);
        }
        info!("Found pending kill-switch carry-over from a previous run");
        self.run(Operation::RestoreKillSwitch).await.map(Some)
    }

    /// Run an operation to completion, or reject it if another is running
    pub async fn run(&self, operation: Operation) -> Result<Outcome> {
        if let Operation::SwitchRegion { region_id } = &operation {
            if !is_valid_region_id(region_id) {
                return Err(Error::InvalidInput(format!(
                    "region id {:?} may only contain letters, digits, '_' and '-'",
                    region_id
                )));
            }
        }

        let cancel = CancellationToken::new();
        let _guard = {
            let mut slot = lock_slot(&self.in_flight);
            if let Some(running) = slot.as_ref() {
                warn!("Rejecting {}: {} is in progress", operation, running.operation);
                return Err(Error::Busy {
                    running: running.operation.to_string(),
                });
            }
            *slot = Some(InFlight {
                operation: operation.clone(),
                cancel: cancel.clone(),
            });
            FlightGuard {
                slot: &self.in_flight,
            }
        };

        // Another process may be driving the same stack
        let Some(_lock) = self.file_lock.try_acquire(&operation.to_string())? else {
            let running = self
                .file_lock
                .holder()
                .unwrap_or_else(|| "an operation in another process".to_string());
            warn!("Rejecting {}: {} is in progress elsewhere", operation, running);
            return Err(Error::Busy { running });
        };

        let steps = plan(&operation, &self.timings);
        Ok(self.execute(&operation, &steps, &cancel).await)
    }

    async fn execute(&self, operation: &Operation, steps: &[Step], cancel: &CancellationToken) -> Outcome {
        info!("Starting {} ({} steps)", operation, steps.len());

        for (index, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("{} cancelled after {} steps", operation, index);
                return Outcome::Cancelled {
                    completed_steps: index,
                };
            }

            debug!("{}: {}", operation, step);
            match self.perform(step, cancel).await {
                Ok(()) => {}
                Err(e) if step.is_gating() => {
                    error!("{} aborted, {} failed: {}", operation, step, e);
                    // Let the display catch up with whatever did happen
                    self.refresh.request_refresh();
                    return Outcome::Aborted {
                        step: step.clone(),
                        reason: e.to_string(),
                    };
                }
                Err(e) => {
                    warn!("{} failed, continuing: {}", step, e);
                }
            }
        }

        info!("Finished {}", operation);
        Outcome::Completed
    }

    async fn perform(&self, step: &Step, cancel: &CancellationToken) -> Result<()> {
        match step {
            Step::SuspendKillSwitch => {
                if !self.stack.killswitch_enabled().await {
                    debug!("Kill switch is off, nothing to carry over");
                    return Ok(());
                }
                if let Err(e) = self.marker.set().await {
                    warn!("Could not record kill-switch carry-over: {}", e);
                }
                self.stack.disable_killswitch().await
            }
            Step::PauseWatchdog => self.stack.pause_watchdog().await,
            Step::StopPortForwarding => self.stack.stop_port_forwarding().await,
            Step::LinkDown => self.stack.link_down().await,
            Step::SetCredential { key, value } => self.stack.set_credential(key, value).await,
            Step::RelaxCredentialPermissions => self.stack.relax_credentials_permissions().await,
            Step::RestartVpn => self.stack.restart_vpn().await,
            Step::Wait(delay) => {
                sleep(*delay).await;
                Ok(())
            }
            Step::ResumeWatchdog => self.stack.resume_watchdog().await,
            Step::RestoreKillSwitch => {
                if !self.marker.exists().await {
                    return Ok(());
                }
                match self
                    .poller
                    .wait_and_enable_kill_switch(self.timings.readiness_attempts, cancel)
                    .await
                {
                    Readiness::Rearmed { attempt } => {
                        debug!("Kill switch restored after {} attempt(s)", attempt)
                    }
                    Readiness::Exhausted { attempts } => {
                        warn!("Kill switch not restored after {} attempts", attempts)
                    }
                    Readiness::Cancelled { .. } | Readiness::AlreadyRunning => {}
                }
                Ok(())
            }
            Step::ToggleKillSwitch => {
                // A manual choice replaces any pending restore
                if let Err(e) = self.marker.clear().await {
                    warn!("Could not clear kill-switch carry-over: {}", e);
                }
                if self.stack.killswitch_enabled().await {
                    self.stack.disable_killswitch().await
                } else {
                    self.stack.enable_killswitch().await
                }
            }
            Step::Refresh => {
                self.refresh.request_refresh();
                Ok(())
            }
        }
    }
}
