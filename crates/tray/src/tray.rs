// System tray icon implementation

use anyhow::Result;
use ksni::menu::{StandardItem, SubMenu};
use pia_status_core::{
    settings_command, CommandSpec, DisplayModel, DisplayState, Engine, Error, Operation,
    Orchestrator, Outcome, RefreshHandle,
};
use std::process::Command;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::notifications::{
    show_aborted_notification, show_busy_notification, show_error_notification,
};

/// Tray icon service
struct PiaTray {
    runtime: Handle,
    orchestrator: Arc<Orchestrator>,
    refresh: RefreshHandle,
    /// (id, display name), sorted by name
    regions: Vec<(String, String)>,
    /// Editor on the credentials file
    settings: CommandSpec,
    display: Option<DisplayModel>,
    connected: bool,
}

impl PiaTray {
    /// Run an operation on the runtime and report anything other than success
    fn start(&self, operation: Operation) {
        let orchestrator = self.orchestrator.clone();
        self.runtime.spawn(async move {
            match orchestrator.run(operation.clone()).await {
                Ok(Outcome::Completed) => {}
                Ok(Outcome::Aborted { step, reason }) => {
                    show_aborted_notification(&operation, &format!("{}: {}", step, reason));
                }
                Ok(Outcome::Cancelled { completed_steps }) => {
                    info!("{} cancelled after {} steps", operation, completed_steps);
                }
                Err(Error::Busy { running }) => show_busy_notification(&operation, &running),
                Err(e) => {
                    error!("{} failed: {}", operation, e);
                    show_error_notification(&operation, &e.to_string());
                }
            }
        });
    }

    fn open_settings(&self) {
        info!("Opening settings: {}", self.settings);
        if let Err(e) = Command::new(&self.settings.program)
            .args(&self.settings.args)
            .spawn()
        {
            error!("Failed to open settings: {}", e);
            show_error_notification("open settings", &e.to_string());
        }
    }

    fn info_line(label: &str) -> ksni::MenuItem<Self> {
        ksni::MenuItem::Standard(StandardItem {
            label: label.to_string(),
            enabled: false,
            ..Default::default()
        })
    }

    fn region_menu(&self) -> ksni::MenuItem<Self> {
        if self.regions.is_empty() {
            return ksni::MenuItem::Standard(StandardItem {
                label: "Select Region (server list unavailable)".to_string(),
                enabled: false,
                ..Default::default()
            });
        }

        let submenu = self
            .regions
            .iter()
            .map(|(id, name)| {
                let region_id = id.clone();
                ksni::MenuItem::Standard(StandardItem {
                    label: name.clone(),
                    activate: Box::new(move |this: &mut Self| {
                        this.start(Operation::SwitchRegion {
                            region_id: region_id.clone(),
                        });
                    }),
                    ..Default::default()
                })
            })
            .collect();

        ksni::MenuItem::SubMenu(SubMenu {
            label: "Select Region".to_string(),
            submenu,
            ..Default::default()
        })
    }
}

impl ksni::Tray for PiaTray {
    fn icon_name(&self) -> String {
        self.display
            .as_ref()
            .map(|d| d.icon_name)
            .unwrap_or("network-vpn-disconnected")
            .to_string()
    }

    fn title(&self) -> String {
        "PIA VPN".to_string()
    }

    fn id(&self) -> String {
        "pia-status".to_string()
    }

    fn category(&self) -> ksni::Category {
        ksni::Category::ApplicationStatus
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        ksni::ToolTip {
            title: "PIA VPN".to_string(),
            description: self
                .display
                .as_ref()
                .map(|d| d.tooltip.clone())
                .unwrap_or_else(|| "Checking status...".to_string()),
            ..Default::default()
        }
    }

    fn menu(&self) -> Vec<ksni::MenuItem<Self>> {
        let mut menu = vec![];

        match &self.display {
            Some(display) => {
                menu.push(Self::info_line(&display.status_line));
                menu.push(Self::info_line(&display.region_line));
                menu.push(Self::info_line(&display.port_line));
                menu.push(Self::info_line(&display.latency_line));
                menu.push(Self::info_line(&display.killswitch_line));
            }
            None => menu.push(Self::info_line("Checking status...")),
        }

        menu.push(ksni::MenuItem::Separator);

        let (toggle_label, killswitch_label) = match &self.display {
            Some(display) => (display.toggle_label, display.killswitch_toggle_label),
            None => ("Connect", "Enable Kill Switch"),
        };

        menu.push(ksni::MenuItem::Standard(StandardItem {
            label: toggle_label.to_string(),
            activate: Box::new(|this: &mut Self| {
                let operation = if this.connected {
                    Operation::Disconnect
                } else {
                    Operation::Reconnect
                };
                this.start(operation);
            }),
            ..Default::default()
        }));

        menu.push(ksni::MenuItem::Standard(StandardItem {
            label: killswitch_label.to_string(),
            activate: Box::new(|this: &mut Self| {
                this.start(Operation::ToggleKillSwitch);
            }),
            ..Default::default()
        }));

        menu.push(self.region_menu());

        menu.push(ksni::MenuItem::Standard(StandardItem {
            label: "Find Fastest Server".to_string(),
            activate: Box::new(|this: &mut Self| {
                this.start(Operation::FindFastestServer);
            }),
            ..Default::default()
        }));

        menu.push(ksni::MenuItem::Separator);

        menu.push(ksni::MenuItem::Standard(StandardItem {
            label: "Settings...".to_string(),
            activate: Box::new(|this: &mut Self| {
                this.open_settings();
            }),
            ..Default::default()
        }));

        menu.push(ksni::MenuItem::Standard(StandardItem {
            label: "Refresh Status".to_string(),
            activate: Box::new(|this: &mut Self| {
                this.refresh.request();
            }),
            ..Default::default()
        }));

        menu.push(ksni::MenuItem::Standard(StandardItem {
            label: "Quit".to_string(),
            activate: Box::new(|_| {
                std::process::exit(0);
            }),
            ..Default::default()
        }));

        menu
    }

    fn activate(&mut self, _x: i32, _y: i32) {
        // Single click - refresh
        self.refresh.request();
    }
}

/// Run the tray icon until the status service stops
pub async fn run_tray(engine: &Engine) -> Result<()> {
    let regions = engine
        .catalog()
        .get()
        .map(|catalog| {
            catalog
                .sorted_by_name()
                .into_iter()
                .map(|region| (region.id.clone(), region.name.clone()))
                .collect()
        })
        .unwrap_or_default();

    let tray = PiaTray {
        runtime: Handle::current(),
        orchestrator: engine.orchestrator(),
        refresh: engine.refresh_handle(),
        regions,
        settings: settings_command(engine.config()),
        display: None,
        connected: false,
    };

    let service = ksni::TrayService::new(tray);
    let handle = service.handle();

    // Spawn service in background thread (ksni needs its own thread)
    std::thread::spawn(move || {
        if let Err(e) = service.run() {
            error!("Tray service stopped: {}", e);
        }
    });

    let mut status = engine.subscribe();
    let mut display = DisplayState::new();
    loop {
        let snapshot = status.borrow_and_update().clone();
        let changes = display.apply(&snapshot);

        // Only touch the tray when something visible changed
        if !changes.is_empty() {
            debug!("Re-rendering {:?}", changes.fields());
            let model = display.current().cloned();
            let connected = snapshot.connected;
            handle.update(move |tray: &mut PiaTray| {
                tray.display = model;
                tray.connected = connected;
            });
        }

        if status.changed().await.is_err() {
            info!("Status service stopped");
            break;
        }
    }

    Ok(())
}
