// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

// PIA Status - Common Library
// Shared status types, region catalog handling, and configuration

pub mod config;
pub mod error;
pub mod region;
pub mod types;

pub use config::{NetworkConfig, PathsConfig, ServicesConfig, StatusConfig, Timings};
pub use error::{Error, Result};
pub use region::{
    is_valid_region_id, parse_catalog_document, resolve_region, Region, RegionCatalog,
    RegionMarker, Server,
};
pub use types::{Latency, LatencyClass, StatusSnapshot};

// Re-export commonly used external types
pub use chrono::{DateTime, Utc};
