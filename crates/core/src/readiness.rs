// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Readiness Poller
//!
//! Waits for the VPN interface to come back and re-arms the kill switch,
//! within a fixed attempt budget. The carry-over marker is consumed either
//! way: the kill switch is back, or the budget ran out and nobody is told
//! otherwise. A cancelled run leaves the marker for the next reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::marker::CarryOverMarker;
use crate::notifier::RefreshTrigger;
use crate::stack::VpnStack;

/// How a poller run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Kill switch enabled on this attempt (1-based)
    Rearmed { attempt: u32 },
    /// Budget exhausted; marker cleared without re-arming
    Exhausted { attempts: u32 },
    /// Another run owns the marker; nothing was done
    AlreadyRunning,
    /// Stopped between attempts; marker kept
    Cancelled { attempts: u32 },
}

pub struct ReadinessPoller {
    stack: Arc<dyn VpnStack>,
    marker: CarryOverMarker,
    refresh: Arc<dyn RefreshTrigger>,
    interval: Duration,
    active: AtomicBool,
}

/// Releases run ownership on every exit path
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReadinessPoller {
    pub fn new(
        stack: Arc<dyn VpnStack>,
        marker: CarryOverMarker,
        refresh: Arc<dyn RefreshTrigger>,
        interval: Duration,
    ) -> Self {
        Self {
            stack,
            marker,
            refresh,
            interval,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Poll for the interface and enable the kill switch once it is there
    pub async fn wait_and_enable_kill_switch(
        &self,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Readiness {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Kill-switch re-arm already in progress");
            return Readiness::AlreadyRunning;
        }
        let _guard = ActiveGuard(&self.active);

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = sleep(self.interval) => false,
                };
                if cancelled {
                    info!(
                        "Kill-switch re-arm cancelled after {} attempt(s), carry-over kept",
                        attempt - 1
                    );
                    return Readiness::Cancelled {
                        attempts: attempt - 1,
                    };
                }
            }

            if !self.stack.link_present().await {
                debug!(
                    "Interface not up yet (attempt {}/{})",
                    attempt, max_attempts
                );
                continue;
            }

            match self.stack.enable_killswitch().await {
                Ok(()) => {
                    info!("Kill switch re-armed on attempt {}", attempt);
                    self.consume_marker().await;
                    self.refresh.request_refresh();
                    return Readiness::Rearmed { attempt };
                }
                Err(e) => {
                    warn!(
                        "Kill-switch enable failed (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    );
                }
            }
        }

        warn!(
            "Giving up on kill-switch re-arm after {} attempts",
            max_attempts
        );
        self.consume_marker().await;
        Readiness::Exhausted {
            attempts: max_attempts,
        }
    }

    async fn consume_marker(&self) {
        if let Err(e) = self.marker.clear().await {
            warn!(
                "Failed to remove carry-over marker {}: {}",
                self.marker.path().display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::testing::CountingRefresh;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Interface appears on a given link check; enable answers from a script
    struct FlakyLink {
        up_from_check: u32,
        enable_ok: bool,
        link_checks: AtomicU32,
        enable_calls: AtomicU32,
    }

    impl FlakyLink {
        fn new(up_from_check: u32, enable_ok: bool) -> Self {
            Self {
                up_from_check,
                enable_ok,
                link_checks: AtomicU32::new(0),
                enable_calls: AtomicU32::new(0),
            }
        }
    }

    fn refused() -> Error {
        Error::CommandFailed {
            command: "pia-killswitch enable".to_string(),
            status: "status 1".to_string(),
        }
    }

    #[async_trait]
    impl VpnStack for FlakyLink {
        async fn link_present(&self) -> bool {
            let check = self.link_checks.fetch_add(1, Ordering::SeqCst) + 1;
            check >= self.up_from_check
        }
        async fn killswitch_enabled(&self) -> bool {
            false
        }
        async fn enable_killswitch(&self) -> Result<()> {
            self.enable_calls.fetch_add(1, Ordering::SeqCst);
            if self.enable_ok {
                Ok(())
            } else {
                Err(refused())
            }
        }
        async fn disable_killswitch(&self) -> Result<()> {
            Ok(())
        }
        async fn pause_watchdog(&self) -> Result<()> {
            Ok(())
        }
        async fn resume_watchdog(&self) -> Result<()> {
            Ok(())
        }
        async fn stop_port_forwarding(&self) -> Result<()> {
            Ok(())
        }
        async fn link_down(&self) -> Result<()> {
            Ok(())
        }
        async fn restart_vpn(&self) -> Result<()> {
            Ok(())
        }
        async fn set_credential(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn relax_credentials_permissions(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn poller_with(
        stack: Arc<FlakyLink>,
        dir: &std::path::Path,
    ) -> (ReadinessPoller, CarryOverMarker, Arc<CountingRefresh>) {
        let marker = CarryOverMarker::new(dir.join("killswitch.restore"));
        marker.set().await.unwrap();
        let refresh = Arc::new(CountingRefresh::default());
        let poller = ReadinessPoller::new(stack, marker.clone(), refresh.clone(), Duration::ZERO);
        (poller, marker, refresh)
    }

    #[tokio::test]
    async fn test_rearms_when_link_appears_on_last_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Arc::new(FlakyLink::new(5, true));
        let (poller, marker, refresh) = poller_with(stack.clone(), dir.path()).await;

        let result = poller.wait_and_enable_kill_switch(5, &CancellationToken::new()).await;

        assert_eq!(result, Readiness::Rearmed { attempt: 5 });
        assert!(!marker.exists().await);
        assert_eq!(refresh.count(), 1);
        assert_eq!(stack.enable_calls.load(Ordering::SeqCst), 1);
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn test_exhausts_without_enable_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Arc::new(FlakyLink::new(u32::MAX, true));
        let (poller, marker, refresh) = poller_with(stack.clone(), dir.path()).await;

        let result = poller.wait_and_enable_kill_switch(5, &CancellationToken::new()).await;

        assert_eq!(result, Readiness::Exhausted { attempts: 5 });
        assert!(!marker.exists().await);
        assert_eq!(refresh.count(), 0);
        assert_eq!(stack.link_checks.load(Ordering::SeqCst), 5);
        assert_eq!(stack.enable_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enable_failures_consume_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Arc::new(FlakyLink::new(1, false));
        let (poller, marker, refresh) = poller_with(stack.clone(), dir.path()).await;

        let result = poller.wait_and_enable_kill_switch(3, &CancellationToken::new()).await;

        assert_eq!(result, Readiness::Exhausted { attempts: 3 });
        assert_eq!(stack.enable_calls.load(Ordering::SeqCst), 3);
        assert!(!marker.exists().await);
        assert_eq!(refresh.count(), 0);
    }

    #[tokio::test]
    async fn test_second_call_while_running_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Arc::new(FlakyLink::new(u32::MAX, true));
        let marker = CarryOverMarker::new(dir.path().join("killswitch.restore"));
        marker.set().await.unwrap();
        let refresh = Arc::new(CountingRefresh::default());
        let poller = Arc::new(ReadinessPoller::new(
            stack.clone(),
            marker.clone(),
            refresh,
            Duration::from_millis(20),
        ));

        let first = {
            let poller = poller.clone();
            tokio::spawn(async move {
                poller
                    .wait_and_enable_kill_switch(5, &CancellationToken::new())
                    .await
            })
        };
        while !poller.is_running() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            poller.wait_and_enable_kill_switch(5, &CancellationToken::new()).await,
            Readiness::AlreadyRunning
        );
        // the first run still owns the marker
        assert!(marker.exists().await);

        assert_eq!(first.await.unwrap(), Readiness::Exhausted { attempts: 5 });
        assert_eq!(stack.link_checks.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_cancel_between_attempts_keeps_marker() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Arc::new(FlakyLink::new(u32::MAX, true));
        let marker = CarryOverMarker::new(dir.path().join("killswitch.restore"));
        marker.set().await.unwrap();
        let refresh = Arc::new(CountingRefresh::default());
        // long enough that only cancellation can end the wait
        let poller = ReadinessPoller::new(
            stack.clone(),
            marker.clone(),
            refresh.clone(),
            Duration::from_secs(600),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            poller.wait_and_enable_kill_switch(5, &cancel),
        )
        .await
        .unwrap();

        assert_eq!(result, Readiness::Cancelled { attempts: 1 });
        assert_eq!(stack.link_checks.load(Ordering::SeqCst), 1);
        assert!(marker.exists().await);
        assert_eq!(refresh.count(), 0);
        assert!(!poller.is_running());
    }
}
