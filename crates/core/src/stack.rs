// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Side-effecting commands against the externally managed VPN stack
//!
//! Each action reports only whether the underlying command exited
//! successfully. The orchestrator decides what a failure means.

use async_trait::async_trait;
use pia_status_common::StatusConfig;
use std::sync::Arc;
use tracing::debug;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::Result;
use crate::probes::nft_has_table;

/// Fixed command vocabulary of the VPN stack
#[async_trait]
pub trait VpnStack: Send + Sync {
    /// Interface exists (no address required)
    async fn link_present(&self) -> bool;

    async fn killswitch_enabled(&self) -> bool;
    async fn enable_killswitch(&self) -> Result<()>;
    async fn disable_killswitch(&self) -> Result<()>;

    async fn pause_watchdog(&self) -> Result<()>;
    async fn resume_watchdog(&self) -> Result<()>;

    async fn stop_port_forwarding(&self) -> Result<()>;
    async fn link_down(&self) -> Result<()>;
    async fn restart_vpn(&self) -> Result<()>;

    /// Replace the value of `key` in the credentials store
    async fn set_credential(&self, key: &str, value: &str) -> Result<()>;
    /// Make the credentials store readable again after an in-place edit
    async fn relax_credentials_permissions(&self) -> Result<()>;
}

/// [`VpnStack`] driven through systemctl, wg-quick, sed, and the kill-switch helper
pub struct SystemVpnStack {
    runner: Arc<dyn CommandRunner>,
    config: Arc<StatusConfig>,
}

impl SystemVpnStack {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<StatusConfig>) -> Self {
        Self { runner, config }
    }

    fn privileged<I, S>(&self, program: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::privileged(self.config.services.use_sudo, program, args)
    }

    async fn confirm(&self, command: CommandSpec) -> Result<()> {
        self.runner
            .run(&command, None)
            .await?
            .ensure_success(&command)?;
        Ok(())
    }

    fn systemctl(&self, verb: &str, unit: &str) -> CommandSpec {
        self.privileged("systemctl", [verb, unit])
    }
}

#[async_trait]
impl VpnStack for SystemVpnStack {
    async fn link_present(&self) -> bool {
        let command = CommandSpec::new("ip", ["link", "show", self.config.network.interface.as_str()]);
        match self.runner.run(&command, None).await {
            Ok(output) => output.success,
            Err(e) => {
                debug!("Link presence check failed: {}", e);
                false
            }
        }
    }

    async fn killswitch_enabled(&self) -> bool {
        let command = self.privileged("nft", ["list", "tables"]);
        match self.runner.run(&command, None).await {
            Ok(output) if output.success => {
                nft_has_table(&output.stdout, &self.config.network.killswitch_table)
            }
            _ => false,
        }
    }

    async fn enable_killswitch(&self) -> Result<()> {
        let helper = self.config.services.killswitch_helper.clone();
        self.confirm(self.privileged(&helper, ["enable"])).await
    }

    async fn disable_killswitch(&self) -> Result<()> {
        let helper = self.config.services.killswitch_helper.clone();
        self.confirm(self.privileged(&helper, ["disable"])).await
    }

    async fn pause_watchdog(&self) -> Result<()> {
        self.confirm(self.systemctl("stop", &self.config.services.watchdog_service))
            .await
    }

    async fn resume_watchdog(&self) -> Result<()> {
        self.confirm(self.systemctl("start", &self.config.services.watchdog_service))
            .await
    }

    async fn stop_port_forwarding(&self) -> Result<()> {
        self.confirm(self.systemctl("stop", &self.config.services.port_forward_service))
            .await
    }

    async fn link_down(&self) -> Result<()> {
        let interface = self.config.network.interface.clone();
        self.confirm(self.privileged("wg-quick", ["down".to_string(), interface]))
            .await
    }

    async fn restart_vpn(&self) -> Result<()> {
        self.confirm(self.systemctl("restart", &self.config.services.vpn_service))
            .await
    }

    async fn set_credential(&self, key: &str, value: &str) -> Result<()> {
        let file = self.config.paths.credentials_file.display().to_string();
        let expression = credential_substitution(key, value);
        self.confirm(self.privileged("sed", ["-i".to_string(), expression, file]))
            .await
    }

    async fn relax_credentials_permissions(&self) -> Result<()> {
        let file = self.config.paths.credentials_file.display().to_string();
        self.confirm(self.privileged("chmod", ["644".to_string(), file]))
            .await
    }
}

/// Editor session on the credentials store, for the tray's Settings item
pub fn settings_command(config: &StatusConfig) -> CommandSpec {
    CommandSpec::privileged(
        config.services.use_sudo,
        config.services.settings_editor.as_str(),
        [config.paths.credentials_file.display().to_string()],
    )
}

/// Line-scoped `sed` substitution replacing the value of `key`
pub fn credential_substitution(key: &str, value: &str) -> String {
    format!("s/^{key}=.*/{key}={value}/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{failed, ok, ScriptedRunner};

    fn stack(runner: Arc<ScriptedRunner>, use_sudo: bool) -> SystemVpnStack {
        let mut config = StatusConfig::default();
        config.services.use_sudo = use_sudo;
        SystemVpnStack::new(runner, Arc::new(config))
    }

    #[test]
    fn test_credential_substitution() {
        assert_eq!(
            credential_substitution("PREFERRED_REGION", "ca_toronto"),
            "s/^PREFERRED_REGION=.*/PREFERRED_REGION=ca_toronto/"
        );
    }

    #[test]
    fn test_settings_command_opens_credentials_file() {
        let mut config = StatusConfig::default();
        config.paths.credentials_file = "/etc/pia-credentials".into();

        assert_eq!(
            settings_command(&config).to_string(),
            "sudo -n xed /etc/pia-credentials"
        );

        config.services.use_sudo = false;
        config.services.settings_editor = "gedit".to_string();
        assert_eq!(
            settings_command(&config).to_string(),
            "gedit /etc/pia-credentials"
        );
    }

    #[tokio::test]
    async fn test_command_lines() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let stack = stack(runner.clone(), true);

        stack.disable_killswitch().await.unwrap();
        stack.pause_watchdog().await.unwrap();
        stack.stop_port_forwarding().await.unwrap();
        stack.link_down().await.unwrap();
        stack.set_credential("AUTOCONNECT", "false").await.unwrap();
        stack.relax_credentials_permissions().await.unwrap();
        stack.restart_vpn().await.unwrap();
        stack.resume_watchdog().await.unwrap();
        stack.enable_killswitch().await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "sudo -n /usr/local/bin/pia-killswitch disable",
                "sudo -n systemctl stop pia-watchdog.timer",
                "sudo -n systemctl stop pia-port-forward.service",
                "sudo -n wg-quick down pia",
                "sudo -n sed -i s/^AUTOCONNECT=.*/AUTOCONNECT=false/ /etc/pia-credentials",
                "sudo -n chmod 644 /etc/pia-credentials",
                "sudo -n systemctl restart pia-vpn.service",
                "sudo -n systemctl start pia-watchdog.timer",
                "sudo -n /usr/local/bin/pia-killswitch enable",
            ]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(failed(1))));
        let stack = stack(runner, false);

        let err = stack.set_credential("AUTOCONNECT", "true").await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(err.to_string().starts_with("sed -i"));
    }

    #[tokio::test]
    async fn test_link_present_and_killswitch_state() {
        let runner = Arc::new(ScriptedRunner::new(|command| {
            if command.program == "ip" {
                Ok(ok("5: pia: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1420\n"))
            } else {
                Ok(ok("table inet pia_killswitch\n"))
            }
        }));
        let stack = stack(runner.clone(), false);

        assert!(stack.link_present().await);
        assert!(stack.killswitch_enabled().await);
        assert_eq!(runner.calls(), vec!["ip link show pia", "nft list tables"]);
    }
}
