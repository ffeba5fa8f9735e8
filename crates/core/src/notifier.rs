// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Change Notifier
//!
//! Refresh requests from the directory watch, the orchestrator and the user
//! all land on a [`RefreshHandle`]. The [`StatusService`] picks them up on
//! its own task, so aggregation never runs inside whoever asked for it, and
//! a burst of requests collapses into a single aggregation.

use pia_status_common::StatusSnapshot;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::StatusAggregator;

/// Something that can be asked to re-aggregate
pub trait RefreshTrigger: Send + Sync {
    /// Schedule an aggregation; must return immediately
    fn request_refresh(&self);
}

/// Cheap, cloneable handle for scheduling aggregations.
///
/// Backed by a single [`Notify`] permit: any number of requests made before
/// the service wakes up count as one.
#[derive(Debug, Clone, Default)]
pub struct RefreshHandle {
    notify: Arc<Notify>,
}

impl RefreshHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl RefreshTrigger for RefreshHandle {
    fn request_refresh(&self) {
        self.request();
    }
}

/// Owns the aggregator and publishes snapshots to subscribers
pub struct StatusService {
    aggregator: StatusAggregator,
    refresh: RefreshHandle,
    publisher: watch::Sender<Arc<StatusSnapshot>>,
}

impl StatusService {
    pub fn new(aggregator: StatusAggregator) -> Self {
        let (publisher, _) = watch::channel(Arc::new(StatusSnapshot::unknown()));
        Self {
            aggregator,
            refresh: RefreshHandle::new(),
            publisher,
        }
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.publisher.subscribe()
    }

    /// Aggregate once and publish, outside the request loop
    pub async fn refresh_now(&self) -> Arc<StatusSnapshot> {
        let snapshot = Arc::new(self.aggregator.aggregate().await);
        self.publisher.send_replace(snapshot.clone());
        snapshot
    }

    /// Serve refresh requests until the task is dropped
    pub async fn run(self) {
        loop {
            self.refresh.wait().await;
            self.refresh_now().await;
        }
    }

    /// Spawn [`StatusService::run`] on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Watches the VPN state directory with `inotifywait`
pub struct DirectoryWatch;

impl DirectoryWatch {
    /// Start watching `dir`. Returns `None` when the watcher cannot be
    /// started; status then only refreshes on explicit requests.
    pub fn spawn(dir: &Path, refresh: RefreshHandle) -> Option<JoinHandle<()>> {
        let mut child = match Command::new("inotifywait")
            .args(["-m", "-q", "-e", "modify,create"])
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    "Cannot watch {} ({}), falling back to manual refresh",
                    dir.display(),
                    e
                );
                return None;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            warn!("inotifywait has no stdout, falling back to manual refresh");
            return None;
        };

        info!("Watching {} for state changes", dir.display());
        Some(tokio::spawn(async move {
            forward_events(BufReader::new(stdout), &refresh).await;
            // keeps the child alive for as long as its output is read
            drop(child);
        }))
    }
}

/// Turn each line of watch output into a refresh request
pub async fn forward_events<R>(reader: R, refresh: &dyn RefreshTrigger)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("State change: {}", line);
                refresh.request_refresh();
            }
            Ok(None) => {
                info!("Directory watch ended");
                break;
            }
            Err(e) => {
                warn!("Directory watch read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::Probes;
    use crate::testing::CountingRefresh;
    use async_trait::async_trait;
    use pia_status_common::Latency;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProbes {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Probes for CountingProbes {
        async fn link_up(&self) -> bool {
            self.runs.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn forwarded_port(&self) -> Option<u16> {
            Some(40000)
        }

        async fn region(&self) -> Option<String> {
            None
        }

        async fn latency(&self) -> Latency {
            Latency::measured(20.0)
        }

        async fn killswitch_enabled(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_forward_events_one_request_per_line() {
        let refresh = CountingRefresh::default();
        let input: &[u8] = b"/var/lib/pia/ MODIFY forwarded_port\n/var/lib/pia/ CREATE region.txt\n";
        forward_events(input, &refresh).await;
        assert_eq!(refresh.count(), 2);
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_aggregation() {
        let probes = Arc::new(CountingProbes::default());
        let service = StatusService::new(StatusAggregator::new(probes.clone()));
        let refresh = service.refresh_handle();
        let mut rx = service.subscribe();

        refresh.request();
        refresh.request();
        refresh.request();

        let task = service.spawn();
        rx.changed().await.unwrap();
        assert!(rx.borrow().connected);
        assert_eq!(rx.borrow().forwarded_port, Some(40000));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(probes.runs.load(Ordering::SeqCst), 1);

        // a later request is served again
        refresh.request();
        rx.changed().await.unwrap();
        assert_eq!(probes.runs.load(Ordering::SeqCst), 2);

        task.abort();
    }

    #[tokio::test]
    async fn test_refresh_now_publishes() {
        let probes = Arc::new(CountingProbes::default());
        let service = StatusService::new(StatusAggregator::new(probes));
        let rx = service.subscribe();

        assert!(!rx.borrow().connected);
        let snapshot = service.refresh_now().await;
        assert!(snapshot.connected);
        assert!(rx.borrow().connected);
    }

    #[tokio::test]
    async fn test_missing_watch_directory_does_not_panic() {
        // Either inotifywait is absent (None) or it exits on the missing path
        let handle = DirectoryWatch::spawn(
            Path::new("/nonexistent/pia-status-watch"),
            RefreshHandle::new(),
        );
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        }
    }
}
