// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Probe Set
//!
//! Independent read-only checks, one per snapshot field. No probe can fail:
//! every error path maps to the field's "absent" or "unknown" value so that
//! one broken signal never spoils the whole snapshot.

use async_trait::async_trait;
use pia_status_common::{resolve_region, Latency, LatencyClass, RegionMarker, StatusConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::catalog::CatalogCache;
use crate::command::{CommandRunner, CommandSpec};
use crate::error::Error;

/// One method per snapshot field
#[async_trait]
pub trait Probes: Send + Sync {
    /// Interface exists and carries an address
    async fn link_up(&self) -> bool;

    /// Forwarded port from the state file
    async fn forwarded_port(&self) -> Option<u16>;

    /// Display name of the active region
    async fn region(&self) -> Option<String>;

    /// Single reachability probe through the tunnel
    async fn latency(&self) -> Latency;

    /// Kill-switch firewall table present
    async fn killswitch_enabled(&self) -> bool;
}

/// Probes backed by `ip`, `ping`, `nft`, and the PIA state files
pub struct SystemProbes {
    runner: Arc<dyn CommandRunner>,
    config: Arc<StatusConfig>,
    catalog: Arc<CatalogCache>,
}

impl SystemProbes {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: Arc<StatusConfig>,
        catalog: Arc<CatalogCache>,
    ) -> Self {
        Self {
            runner,
            config,
            catalog,
        }
    }
}

#[async_trait]
impl Probes for SystemProbes {
    async fn link_up(&self) -> bool {
        let command = CommandSpec::new("ip", ["addr", "show", self.config.network.interface.as_str()]);
        match self.runner.run(&command, None).await {
            Ok(output) => output.success && has_inet_address(&output.stdout),
            Err(e) => {
                debug!("Link probe failed: {}", e);
                false
            }
        }
    }

    async fn forwarded_port(&self) -> Option<u16> {
        let path = &self.config.paths.forwarded_port_file;
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => parse_forwarded_port(&contents),
            Err(e) => {
                debug!("No forwarded port ({}): {}", path.display(), e);
                None
            }
        }
    }

    async fn region(&self) -> Option<String> {
        let marker = tokio::fs::read_to_string(&self.config.paths.region_file)
            .await
            .ok()
            .map(|contents| RegionMarker::parse(&contents));

        let catalog = self.catalog.get();
        resolve_region(marker.as_ref(), catalog.as_deref())
    }

    async fn latency(&self) -> Latency {
        let timeout = self.config.network.latency_timeout_secs;
        let command = CommandSpec::new(
            "ping",
            [
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                timeout.to_string(),
                self.config.network.latency_target.clone(),
            ],
        );

        // ping enforces its own timeout; the outer one only guards against a hung process
        let outer = Duration::from_secs(timeout + 1);
        match self.runner.run(&command, Some(outer)).await {
            Ok(output) if output.success => match parse_ping_millis(&output.stdout) {
                Some(ms) => Latency::measured(ms),
                None => Latency::without_sample(LatencyClass::Unknown),
            },
            Ok(_) | Err(Error::Timeout { .. }) => Latency::without_sample(LatencyClass::NoResponse),
            Err(e) => {
                debug!("Latency probe could not run: {}", e);
                Latency::without_sample(LatencyClass::Error)
            }
        }
    }

    async fn killswitch_enabled(&self) -> bool {
        let command = CommandSpec::privileged(
            self.config.services.use_sudo,
            "nft",
            ["list", "tables"],
        );
        match self.runner.run(&command, None).await {
            Ok(output) if output.success => {
                nft_has_table(&output.stdout, &self.config.network.killswitch_table)
            }
            Ok(_) => false,
            Err(e) => {
                debug!("Kill-switch probe failed: {}", e);
                false
            }
        }
    }
}

/// `ip addr show` output carries an IPv4 address line
pub fn has_inet_address(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.trim_start().starts_with("inet "))
}

/// First whitespace token as a port; zero and garbage are "not forwarded"
pub fn parse_forwarded_port(contents: &str) -> Option<u16> {
    contents
        .split_whitespace()
        .next()?
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
}

/// Round-trip time from ping output.
///
/// Reads `time=12.3 ms` from the reply line, falling back to the average of
/// the `rtt min/avg/max/mdev` summary.
pub fn parse_ping_millis(output: &str) -> Option<f64> {
    for line in output.lines() {
        if let Some(pos) = line.find("time=") {
            let value: String = line[pos + 5..]
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if let Ok(ms) = value.parse::<f64>() {
                return Some(ms);
            }
        }
    }

    output
        .lines()
        .find(|line| line.contains("min/avg/max"))
        .and_then(|line| line.split_once('='))
        .and_then(|(_, values)| values.trim().split('/').nth(1))
        .and_then(|avg| avg.trim().parse::<f64>().ok())
}

/// `nft list tables` lists a table with exactly this name
pub fn nft_has_table(output: &str, table: &str) -> bool {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("table "))
        .any(|line| line.split_whitespace().last() == Some(table))
}
