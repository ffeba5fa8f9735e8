// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

// Region catalog download and process-lifetime cache

use pia_status_common::{parse_catalog_document, RegionCatalog};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;

const FETCH_TIMEOUT_SECS: u64 = 15;

/// Download and parse the server list
pub async fn fetch_catalog(url: &str) -> Result<RegionCatalog> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()?;

    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    Ok(parse_catalog_document(&body)?)
}

/// Catalog fetched once and shared read-only afterwards.
///
/// An empty cache is a normal state: region resolution degrades to raw
/// hostnames and the region menu stays empty.
#[derive(Debug, Default)]
pub struct CatalogCache {
    catalog: RwLock<Option<Arc<RegionCatalog>>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-filled with a catalog
    pub fn with_catalog(catalog: RegionCatalog) -> Self {
        Self {
            catalog: RwLock::new(Some(Arc::new(catalog))),
        }
    }

    /// Fetch the catalog unless one is already cached. Failures are logged
    /// and leave the cache empty.
    pub async fn load(&self, url: &str) -> bool {
        if self.get().is_some() {
            return true;
        }

        match fetch_catalog(url).await {
            Ok(catalog) => {
                info!("Loaded {} regions from server list", catalog.regions.len());
                self.set(catalog);
                true
            }
            Err(e) => {
                warn!("Server list unavailable, region names will be raw: {}", e);
                false
            }
        }
    }

    pub fn get(&self) -> Option<Arc<RegionCatalog>> {
        match self.catalog.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, catalog: RegionCatalog) {
        let mut guard = match self.catalog.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(catalog));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pia_status_common::Region;
    use std::collections::HashMap;

    #[test]
    fn test_empty_cache() {
        let cache = CatalogCache::new();
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn test_prefilled_cache_skips_fetch() {
        let cache = CatalogCache::with_catalog(RegionCatalog {
            regions: vec![Region {
                id: "ca_toronto".to_string(),
                name: "CA Toronto".to_string(),
                servers: HashMap::new(),
            }],
        });

        // URL is unroutable; a fetch attempt would fail
        assert!(cache.load("http://127.0.0.1:9/never").await);
        assert_eq!(cache.get().unwrap().regions.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_empty() {
        let cache = CatalogCache::new();
        assert!(!cache.load("http://127.0.0.1:9/serverlist").await);
        assert!(cache.get().is_none());
    }
}
