// Common types for PIA Status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality bucket for the round-trip time to the VPN-internal probe address
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    Excellent,     // < 50 ms
    Good,          // < 100 ms
    Fair,          // < 200 ms
    Poor,          // everything slower
    Unknown,       // got a reply but could not read the time out of it
    NoResponse,    // probe sent, nothing came back
    Error,         // probe could not be issued at all
    NotApplicable, // link is down, nothing was probed
}

impl LatencyClass {
    /// Bucket a round-trip time in milliseconds
    pub fn from_millis(millis: f64) -> Self {
        if millis < 50.0 {
            LatencyClass::Excellent
        } else if millis < 100.0 {
            LatencyClass::Good
        } else if millis < 200.0 {
            LatencyClass::Fair
        } else {
            LatencyClass::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LatencyClass::Excellent => "Excellent",
            LatencyClass::Good => "Good",
            LatencyClass::Fair => "Fair",
            LatencyClass::Poor => "Poor",
            LatencyClass::Unknown => "Unknown",
            LatencyClass::NoResponse => "No response",
            LatencyClass::Error => "Error",
            LatencyClass::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Latency class with the measured value, when there is one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Latency {
    pub class: LatencyClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub millis: Option<f64>,
}

impl Latency {
    /// A measured round-trip time
    pub fn measured(millis: f64) -> Self {
        Self {
            class: LatencyClass::from_millis(millis),
            millis: Some(millis),
        }
    }

    /// An outcome without a usable measurement
    pub fn without_sample(class: LatencyClass) -> Self {
        Self { class, millis: None }
    }

    pub fn not_applicable() -> Self {
        Self::without_sample(LatencyClass::NotApplicable)
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.millis {
            Some(ms) => write!(f, "{} ({:.0} ms)", self.class, ms),
            None => write!(f, "{}", self.class),
        }
    }
}

/// One fully-populated aggregation of every external status signal.
///
/// Snapshots are never mutated after the aggregator builds them; a fresh one
/// is published on every cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    /// VPN interface is up and carries an address
    pub connected: bool,
    /// Forwarded port, only while connected
    pub forwarded_port: Option<u16>,
    /// Resolved display name of the active region
    pub region_name: Option<String>,
    /// Latency to the VPN-internal probe address
    pub latency: Latency,
    /// Firewall kill-switch table is present
    pub killswitch_enabled: bool,
    /// When this snapshot was assembled
    pub generated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Placeholder published before the first aggregation completes
    pub fn unknown() -> Self {
        Self {
            connected: false,
            forwarded_port: None,
            region_name: None,
            latency: Latency::not_applicable(),
            killswitch_enabled: false,
            generated_at: Utc::now(),
        }
    }

    /// Region name for display, "Unknown" when unresolved
    pub fn region_display(&self) -> &str {
        self.region_name.as_deref().unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        assert_eq!(LatencyClass::from_millis(30.0), LatencyClass::Excellent);
        assert_eq!(LatencyClass::from_millis(75.0), LatencyClass::Good);
        assert_eq!(LatencyClass::from_millis(150.0), LatencyClass::Fair);
        assert_eq!(LatencyClass::from_millis(250.0), LatencyClass::Poor);
    }

    #[test]
    fn test_latency_bucket_edges() {
        assert_eq!(LatencyClass::from_millis(49.9), LatencyClass::Excellent);
        assert_eq!(LatencyClass::from_millis(50.0), LatencyClass::Good);
        assert_eq!(LatencyClass::from_millis(100.0), LatencyClass::Fair);
        assert_eq!(LatencyClass::from_millis(200.0), LatencyClass::Poor);
    }

    #[test]
    fn test_unknown_snapshot_is_disconnected() {
        let snapshot = StatusSnapshot::unknown();
        assert!(!snapshot.connected);
        assert_eq!(snapshot.forwarded_port, None);
        assert_eq!(snapshot.latency.class, LatencyClass::NotApplicable);
        assert_eq!(snapshot.region_display(), "Unknown");
    }

    #[test]
    fn test_snapshot_serializes_snake_case_latency() {
        let mut snapshot = StatusSnapshot::unknown();
        snapshot.connected = true;
        snapshot.latency = Latency::measured(42.0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["latency"]["class"], "excellent");
        assert_eq!(json["latency"]["millis"], 42.0);
    }
}
