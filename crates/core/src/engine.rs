// Wiring of probes, status service, directory watch, and orchestrator from a
// single configuration. Presentation hosts (tray, CLI) start one of these.

use pia_status_common::{StatusConfig, StatusSnapshot};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregator::StatusAggregator;
use crate::catalog::CatalogCache;
use crate::command::{CommandRunner, TokioCommandRunner};
use crate::marker::CarryOverMarker;
use crate::notifier::{DirectoryWatch, RefreshHandle, StatusService};
use crate::orchestrator::Orchestrator;
use crate::probes::SystemProbes;
use crate::stack::SystemVpnStack;

pub struct Engine {
    config: Arc<StatusConfig>,
    catalog: Arc<CatalogCache>,
    refresh: RefreshHandle,
    status: watch::Receiver<Arc<StatusSnapshot>>,
    orchestrator: Arc<Orchestrator>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Start the status service against the real system.
    ///
    /// With `watch` set, the VPN state directory is watched for changes;
    /// otherwise status only refreshes on request. The server list is
    /// fetched up front; a failed fetch is not fatal.
    pub async fn start(config: StatusConfig, watch: bool) -> Self {
        let config = Arc::new(config);
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner);

        let catalog = Arc::new(CatalogCache::new());
        catalog.load(&config.network.server_list_url).await;

        let probes = Arc::new(SystemProbes::new(
            runner.clone(),
            config.clone(),
            catalog.clone(),
        ));
        let service = StatusService::new(StatusAggregator::new(probes));
        let refresh = service.refresh_handle();
        let status = service.subscribe();

        let stack = Arc::new(SystemVpnStack::new(runner, config.clone()));
        let marker = CarryOverMarker::new(config.paths.carry_over_marker.clone());
        let orchestrator = Arc::new(Orchestrator::new(
            stack,
            marker,
            Arc::new(refresh.clone()),
            config.timings.clone(),
        ));

        let mut tasks = vec![service.spawn()];
        if watch {
            if let Some(task) = DirectoryWatch::spawn(&config.paths.state_dir, refresh.clone()) {
                tasks.push(task);
            }
        }

        info!("Status engine started");
        refresh.request();

        Self {
            config,
            catalog,
            refresh,
            status,
            orchestrator,
            tasks,
        }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.status.clone()
    }

    /// Most recently published snapshot
    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        self.status.borrow().clone()
    }

    /// Request an aggregation and wait for its result
    pub async fn refresh_and_wait(&self) -> Arc<StatusSnapshot> {
        let mut status = self.status.clone();
        status.borrow_and_update();
        self.refresh.request();
        if status.changed().await.is_err() {
            warn!("Status service stopped, returning last snapshot");
        }
        let snapshot = status.borrow().clone();
        snapshot
    }

    /// Spawn the startup resume of an interrupted kill-switch carry-over
    pub fn restore_pending_in_background(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.restore_pending().await {
                warn!("Kill-switch restore at startup failed: {}", e);
            }
        })
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("Status engine stopped");
    }
}
