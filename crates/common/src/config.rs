// PIA Status - Configuration
// Paths, service names, and timings of the externally managed VPN stack

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};

/// Complete configuration file (`~/.config/pia-status/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub timings: Timings,
}

/// Files read or edited by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Directory watched for state changes
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Forwarded port state file
    #[serde(default = "default_forwarded_port_file")]
    pub forwarded_port_file: PathBuf,
    /// Region marker file (`region_id=` / `hostname=` lines)
    #[serde(default = "default_region_file")]
    pub region_file: PathBuf,
    /// Credentials store edited on region switches
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    /// Kill-switch carry-over marker
    #[serde(default = "default_carry_over_marker")]
    pub carry_over_marker: PathBuf,
}

/// Network-facing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// VPN interface name
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Address pinged for the latency class (only reachable through the tunnel)
    #[serde(default = "default_latency_target")]
    pub latency_target: String,
    /// Ping timeout in seconds
    #[serde(default = "default_latency_timeout")]
    pub latency_timeout_secs: u64,
    /// Name of the nftables table installed by the kill switch
    #[serde(default = "default_killswitch_table")]
    pub killswitch_table: String,
    /// Server list URL
    #[serde(default = "default_server_list_url")]
    pub server_list_url: String,
}

/// External services and helpers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServicesConfig {
    #[serde(default = "default_vpn_service")]
    pub vpn_service: String,
    #[serde(default = "default_port_forward_service")]
    pub port_forward_service: String,
    #[serde(default = "default_watchdog_service")]
    pub watchdog_service: String,
    /// Helper taking `enable` / `disable`
    #[serde(default = "default_killswitch_helper")]
    pub killswitch_helper: String,
    /// Prefix privileged commands with `sudo -n`
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,
    /// Graphical editor the tray opens on the credentials file
    #[serde(default = "default_settings_editor")]
    pub settings_editor: String,
}

/// Settle delays and retry budget, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timings {
    /// After bringing the link down, before re-reading status
    #[serde(default = "default_disconnect_settle")]
    pub disconnect_settle_secs: u64,
    /// After restarting the VPN service, long enough for link negotiation
    #[serde(default = "default_reconnect_settle")]
    pub reconnect_settle_secs: u64,
    /// Between link down and service restart when looking for the fastest server
    #[serde(default = "default_link_down_wait")]
    pub link_down_wait_secs: u64,
    /// After toggling the kill switch
    #[serde(default = "default_killswitch_settle")]
    pub killswitch_settle_secs: u64,
    /// Kill-switch re-arm attempts
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    /// Delay between re-arm attempts
    #[serde(default = "default_readiness_interval")]
    pub readiness_interval_secs: u64,
}

// Default value functions
fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/pia")
}

fn default_forwarded_port_file() -> PathBuf {
    default_state_dir().join("forwarded_port")
}

fn default_region_file() -> PathBuf {
    default_state_dir().join("region.txt")
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("/etc/pia-credentials")
}

fn default_carry_over_marker() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pia-status")
        .join("killswitch.restore")
}

fn default_interface() -> String {
    "pia".to_string()
}

fn default_latency_target() -> String {
    "10.0.0.243".to_string()
}

fn default_latency_timeout() -> u64 {
    2
}

fn default_killswitch_table() -> String {
    "pia_killswitch".to_string()
}

fn default_server_list_url() -> String {
    "https://serverlist.piaservers.net/vpninfo/servers/v7".to_string()
}

fn default_vpn_service() -> String {
    "pia-vpn.service".to_string()
}

fn default_port_forward_service() -> String {
    "pia-port-forward.service".to_string()
}

fn default_watchdog_service() -> String {
    "pia-watchdog.timer".to_string()
}

fn default_killswitch_helper() -> String {
    "/usr/local/bin/pia-killswitch".to_string()
}

fn default_use_sudo() -> bool {
    true
}

fn default_settings_editor() -> String {
    "xed".to_string()
}

fn default_disconnect_settle() -> u64 {
    2
}

fn default_reconnect_settle() -> u64 {
    8 // wg handshake + port forward signature usually lands within this
}

fn default_link_down_wait() -> u64 {
    2
}

fn default_killswitch_settle() -> u64 {
    1
}

fn default_readiness_attempts() -> u32 {
    5
}

fn default_readiness_interval() -> u64 {
    3
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            forwarded_port_file: default_forwarded_port_file(),
            region_file: default_region_file(),
            credentials_file: default_credentials_file(),
            carry_over_marker: default_carry_over_marker(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            latency_target: default_latency_target(),
            latency_timeout_secs: default_latency_timeout(),
            killswitch_table: default_killswitch_table(),
            server_list_url: default_server_list_url(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            vpn_service: default_vpn_service(),
            port_forward_service: default_port_forward_service(),
            watchdog_service: default_watchdog_service(),
            killswitch_helper: default_killswitch_helper(),
            use_sudo: default_use_sudo(),
            settings_editor: default_settings_editor(),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            disconnect_settle_secs: default_disconnect_settle(),
            reconnect_settle_secs: default_reconnect_settle(),
            link_down_wait_secs: default_link_down_wait(),
            killswitch_settle_secs: default_killswitch_settle(),
            readiness_attempts: default_readiness_attempts(),
            readiness_interval_secs: default_readiness_interval(),
        }
    }
}

impl Timings {
    /// No waiting at all; used by tests and dry runs
    pub fn immediate() -> Self {
        Self {
            disconnect_settle_secs: 0,
            reconnect_settle_secs: 0,
            link_down_wait_secs: 0,
            killswitch_settle_secs: 0,
            readiness_attempts: default_readiness_attempts(),
            readiness_interval_secs: 0,
        }
    }

    pub fn disconnect_settle(&self) -> Duration {
        Duration::from_secs(self.disconnect_settle_secs)
    }

    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_secs(self.reconnect_settle_secs)
    }

    pub fn link_down_wait(&self) -> Duration {
        Duration::from_secs(self.link_down_wait_secs)
    }

    pub fn killswitch_settle(&self) -> Duration {
        Duration::from_secs(self.killswitch_settle_secs)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }
}

impl StatusConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.network.interface.trim().is_empty() {
            return Err(Error::Config("Interface name cannot be empty".to_string()));
        }
        if self.network.killswitch_table.trim().is_empty() {
            return Err(Error::Config(
                "Kill-switch table name cannot be empty".to_string(),
            ));
        }
        if self.network.latency_timeout_secs == 0 {
            return Err(Error::Config(
                "Latency timeout must be greater than 0".to_string(),
            ));
        }
        if self.timings.readiness_attempts == 0 {
            return Err(Error::Config(
                "Readiness attempts must be at least 1".to_string(),
            ));
        }
        if self.services.vpn_service.trim().is_empty() {
            return Err(Error::Config("VPN service name cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Load configuration from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("No configuration found, using defaults");
            info!("Configuration will be saved to: {}", config_path.display());
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("pia-status").join("config.toml"))
    }
}
