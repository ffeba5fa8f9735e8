// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Region catalog and region-name resolution
//!
//! The catalog is the PIA server list: a JSON document on the first line of
//! the response (a signature follows after a newline). Resolution turns the
//! region marker written by the VPN service into something a human can read,
//! and never fails.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// A single server inside a region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    /// Canonical hostname, e.g. "toronto401"
    pub cn: String,
    #[serde(default)]
    pub ip: String,
}

/// A region from the server list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    /// Stable identifier, e.g. "ca_toronto"
    pub id: String,
    /// Display name, e.g. "CA Toronto"
    pub name: String,
    /// Servers keyed by protocol ("wg", "ovpnudp", ...)
    #[serde(default)]
    pub servers: HashMap<String, Vec<Server>>,
}

/// Region catalog, loaded once and treated as read-only afterwards
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegionCatalog {
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl RegionCatalog {
    pub fn find_by_id(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Region owning a server with this exact canonical hostname, any protocol
    pub fn find_by_hostname(&self, hostname: &str) -> Option<&Region> {
        self.regions.iter().find(|region| {
            region
                .servers
                .values()
                .any(|servers| servers.iter().any(|s| s.cn == hostname))
        })
    }

    /// First region whose id or name contains the hostname's alphabetic prefix
    pub fn find_by_hostname_prefix(&self, hostname: &str) -> Option<&Region> {
        let prefix: String = hostname
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();

        if prefix.is_empty() {
            return None;
        }

        self.regions.iter().find(|region| {
            region.id.to_ascii_lowercase().contains(&prefix)
                || region.name.to_ascii_lowercase().contains(&prefix)
        })
    }

    /// Regions sorted by display name, for menus
    pub fn sorted_by_name(&self) -> Vec<&Region> {
        let mut regions: Vec<&Region> = self.regions.iter().collect();
        regions.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        regions
    }
}

/// Parse the server list body. Only the first line carries the JSON document.
pub fn parse_catalog_document(body: &str) -> Result<RegionCatalog> {
    let first_line = body.trim().lines().next().unwrap_or_default();
    if first_line.is_empty() {
        return Err(Error::Catalog("empty server list".to_string()));
    }
    Ok(serde_json::from_str(first_line)?)
}

/// Contents of the region marker file written by the VPN service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMarker {
    pub region_id: Option<String>,
    pub hostname: Option<String>,
}

impl RegionMarker {
    /// Parse `key=value` lines; unknown keys and empty values are ignored
    pub fn parse(contents: &str) -> Self {
        let mut marker = Self::default();

        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.split_whitespace().next().unwrap_or_default();
            if value.is_empty() {
                continue;
            }

            match key.trim() {
                "region_id" => marker.region_id = Some(value.to_string()),
                "hostname" => marker.hostname = Some(value.to_string()),
                _ => {}
            }
        }

        marker
    }

    pub fn is_empty(&self) -> bool {
        self.region_id.is_none() && self.hostname.is_none()
    }
}

/// Resolve a region marker to a display name.
///
/// Order: exact region id, exact server hostname, hostname prefix against
/// region id/name, then the literal hostname. Without a catalog the raw
/// hostname (or raw id) is returned. `None` only when the marker is absent
/// or empty.
pub fn resolve_region(marker: Option<&RegionMarker>, catalog: Option<&RegionCatalog>) -> Option<String> {
    let marker = marker.filter(|m| !m.is_empty())?;

    if let Some(catalog) = catalog {
        if let Some(region) = marker.region_id.as_deref().and_then(|id| catalog.find_by_id(id)) {
            return Some(region.name.clone());
        }

        if let Some(hostname) = marker.hostname.as_deref() {
            if let Some(region) = catalog
                .find_by_hostname(hostname)
                .or_else(|| catalog.find_by_hostname_prefix(hostname))
            {
                return Some(region.name.clone());
            }
        }
    }

    marker.hostname.clone().or_else(|| marker.region_id.clone())
}

/// Region ids end up inside a `sed` expression, so only a conservative
/// character set is accepted.
pub fn is_valid_region_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str, name: &str, cns: &[&str]) -> Region {
        let servers = cns
            .iter()
            .map(|cn| Server {
                cn: cn.to_string(),
                ip: "10.0.0.1".to_string(),
            })
            .collect();
        Region {
            id: id.to_string(),
            name: name.to_string(),
            servers: HashMap::from([("wg".to_string(), servers)]),
        }
    }

    fn catalog() -> RegionCatalog {
        RegionCatalog {
            regions: vec![
                region("ca_toronto", "CA Toronto", &["toronto401", "toronto402"]),
                region("aus", "AU Sydney", &["sydney401"]),
                region("de-frankfurt", "DE Frankfurt", &["frankfurt403"]),
            ],
        }
    }

    #[test]
    fn test_resolve_by_region_id() {
        let marker = RegionMarker {
            region_id: Some("ca_toronto".to_string()),
            hostname: None,
        };
        assert_eq!(
            resolve_region(Some(&marker), Some(&catalog())),
            Some("CA Toronto".to_string())
        );
    }

    #[test]
    fn test_region_id_wins_over_hostname() {
        let marker = RegionMarker {
            region_id: Some("de-frankfurt".to_string()),
            hostname: Some("toronto401".to_string()),
        };
        assert_eq!(
            resolve_region(Some(&marker), Some(&catalog())),
            Some("DE Frankfurt".to_string())
        );
    }

    #[test]
    fn test_resolve_by_exact_hostname() {
        let marker = RegionMarker {
            region_id: None,
            hostname: Some("toronto402".to_string()),
        };
        assert_eq!(
            resolve_region(Some(&marker), Some(&catalog())),
            Some("CA Toronto".to_string())
        );
    }

    #[test]
    fn test_resolve_by_hostname_prefix() {
        // sydney428 is not in the catalog, but "sydney" matches the region name
        let marker = RegionMarker {
            region_id: None,
            hostname: Some("sydney428".to_string()),
        };
        assert_eq!(
            resolve_region(Some(&marker), Some(&catalog())),
            Some("AU Sydney".to_string())
        );
    }

    #[test]
    fn test_unmatched_hostname_is_literal() {
        let marker = RegionMarker {
            region_id: Some("nowhere".to_string()),
            hostname: Some("atlantis12".to_string()),
        };
        assert_eq!(
            resolve_region(Some(&marker), Some(&catalog())),
            Some("atlantis12".to_string())
        );
    }

    #[test]
    fn test_missing_marker_is_unknown() {
        assert_eq!(resolve_region(None, Some(&catalog())), None);
        assert_eq!(resolve_region(Some(&RegionMarker::default()), Some(&catalog())), None);
    }

    #[test]
    fn test_no_catalog_degrades_to_raw_values() {
        let marker = RegionMarker {
            region_id: Some("ca_toronto".to_string()),
            hostname: None,
        };
        assert_eq!(resolve_region(Some(&marker), None), Some("ca_toronto".to_string()));

        let marker = RegionMarker {
            region_id: Some("ca_toronto".to_string()),
            hostname: Some("toronto401".to_string()),
        };
        assert_eq!(resolve_region(Some(&marker), None), Some("toronto401".to_string()));
    }

    #[test]
    fn test_numeric_hostname_has_no_prefix_match() {
        let marker = RegionMarker {
            region_id: None,
            hostname: Some("401".to_string()),
        };
        assert_eq!(
            resolve_region(Some(&marker), Some(&catalog())),
            Some("401".to_string())
        );
    }

    #[test]
    fn test_marker_parse() {
        let marker = RegionMarker::parse("region_id=ca_toronto\nhostname=toronto401\n");
        assert_eq!(marker.region_id.as_deref(), Some("ca_toronto"));
        assert_eq!(marker.hostname.as_deref(), Some("toronto401"));

        let marker = RegionMarker::parse("  hostname=sydney428  \nfoo=bar\nregion_id=\n");
        assert_eq!(marker.region_id, None);
        assert_eq!(marker.hostname.as_deref(), Some("sydney428"));

        assert!(RegionMarker::parse("garbage\n").is_empty());
    }

    #[test]
    fn test_parse_catalog_document_ignores_signature() {
        let body = concat!(
            r#"{"groups":{},"regions":[{"id":"ca_toronto","name":"CA Toronto","port_forward":true,"#,
            r#""servers":{"wg":[{"ip":"1.2.3.4","cn":"toronto401"}]}}]}"#,
            "\n\nc2lnbmF0dXJl\n"
        );
        let catalog = parse_catalog_document(body).unwrap();
        assert_eq!(catalog.regions.len(), 1);
        assert_eq!(catalog.find_by_hostname("toronto401").map(|r| r.id.as_str()), Some("ca_toronto"));
    }

    #[test]
    fn test_parse_catalog_document_rejects_garbage() {
        assert!(parse_catalog_document("").is_err());
        assert!(parse_catalog_document("<html>").is_err());
    }

    #[test]
    fn test_sorted_by_name() {
        let catalog = catalog();
        let names: Vec<&str> = catalog.sorted_by_name().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["AU Sydney", "CA Toronto", "DE Frankfurt"]);
    }

    #[test]
    fn test_region_id_validation() {
        assert!(is_valid_region_id("ca_toronto"));
        assert!(is_valid_region_id("de-frankfurt"));
        assert!(!is_valid_region_id(""));
        assert!(!is_valid_region_id("ca/toronto"));
        assert!(!is_valid_region_id("x; rm -rf"));
    }
}
