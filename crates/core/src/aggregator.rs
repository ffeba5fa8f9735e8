// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Status Aggregator
//!
//! Runs the Probe Set and assembles one immutable [`StatusSnapshot`].

use chrono::Utc;
use pia_status_common::{Latency, StatusSnapshot};
use std::sync::Arc;
use tracing::debug;

use crate::probes::Probes;

pub struct StatusAggregator {
    probes: Arc<dyn Probes>,
}

impl StatusAggregator {
    pub fn new(probes: Arc<dyn Probes>) -> Self {
        Self { probes }
    }

    /// Build a fresh snapshot. Never fails; broken probes show up as
    /// absent/unknown fields.
    pub async fn aggregate(&self) -> StatusSnapshot {
        let (connected, forwarded_port, region_name, killswitch_enabled) = tokio::join!(
            self.probes.link_up(),
            self.probes.forwarded_port(),
            self.probes.region(),
            self.probes.killswitch_enabled(),
        );

        // Pinging the tunnel-internal address is pointless without a tunnel
        let latency = if connected {
            self.probes.latency().await
        } else {
            Latency::not_applicable()
        };

        let snapshot = StatusSnapshot {
            connected,
            // A stale port file outlives the tunnel; never show it while down
            forwarded_port: forwarded_port.filter(|_| connected),
            region_name,
            latency,
            killswitch_enabled,
            generated_at: Utc::now(),
        };

        debug!(
            "Aggregated status: connected={} port={:?} region={:?} latency={} killswitch={}",
            snapshot.connected,
            snapshot.forwarded_port,
            snapshot.region_name,
            snapshot.latency,
            snapshot.killswitch_enabled
        );

        snapshot
    }
}
