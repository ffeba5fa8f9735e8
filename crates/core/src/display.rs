// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

//! Display text derived from a snapshot, with field-level change detection
//!
//! Presentation layers re-render only the fields reported as changed, so an
//! unchanged label (the connect/disconnect item in particular) is never
//! rewritten. Menu lines carry only coarse values; the measured latency
//! goes in the tooltip so a jittering ping does not rebuild the menu.

use pia_status_common::StatusSnapshot;

/// Everything a presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayModel {
    pub icon_name: &'static str,
    pub status_line: String,
    pub toggle_label: &'static str,
    pub port_line: String,
    pub region_line: String,
    pub latency_line: String,
    pub killswitch_line: String,
    pub killswitch_toggle_label: &'static str,
    pub tooltip: String,
}

impl DisplayModel {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        let port = snapshot.forwarded_port.filter(|_| snapshot.connected);

        let tooltip = if snapshot.connected {
            let mut tooltip = snapshot
                .region_name
                .clone()
                .unwrap_or_else(|| "Connected".to_string());
            if let Some(port) = port {
                tooltip.push_str(&format!(" • Port: {}", port));
            }
            if let Some(ms) = snapshot.latency.millis {
                tooltip.push_str(&format!(" • {:.0} ms", ms));
            }
            tooltip
        } else {
            "Disconnected".to_string()
        };

        Self {
            icon_name: if snapshot.connected {
                "network-vpn"
            } else {
                "network-vpn-disconnected"
            },
            status_line: if snapshot.connected {
                "✓ Connected".to_string()
            } else {
                "✗ Disconnected".to_string()
            },
            toggle_label: if snapshot.connected { "Disconnect" } else { "Connect" },
            port_line: match port {
                Some(port) => format!("Port: {}", port),
                None => "Port: Not forwarded".to_string(),
            },
            region_line: format!("Region: {}", snapshot.region_display()),
            latency_line: if snapshot.connected {
                format!("Latency: {}", snapshot.latency.class)
            } else {
                "Latency: -".to_string()
            },
            killswitch_line: if snapshot.killswitch_enabled {
                "Kill switch: On".to_string()
            } else {
                "Kill switch: Off".to_string()
            },
            killswitch_toggle_label: if snapshot.killswitch_enabled {
                "Disable Kill Switch"
            } else {
                "Enable Kill Switch"
            },
            tooltip,
        }
    }
}

/// A rendered field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayField {
    Icon,
    Status,
    Toggle,
    Port,
    Region,
    Latency,
    KillSwitch,
    Tooltip,
}

/// Fields that differ from what is currently rendered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayChanges {
    fields: Vec<DisplayField>,
}

impl DisplayChanges {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: DisplayField) -> bool {
        self.fields.contains(&field)
    }

    pub fn fields(&self) -> &[DisplayField] {
        &self.fields
    }
}

/// What is currently on screen
#[derive(Debug, Default)]
pub struct DisplayState {
    current: Option<DisplayModel>,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&DisplayModel> {
        self.current.as_ref()
    }

    /// Adopt a new snapshot and report which fields need re-rendering.
    /// The first call reports every field.
    pub fn apply(&mut self, snapshot: &StatusSnapshot) -> DisplayChanges {
        let next = DisplayModel::from_snapshot(snapshot);
        let mut changes = DisplayChanges::default();

        let Some(prev) = self.current.as_ref() else {
            changes.fields = vec![
                DisplayField::Icon,
                DisplayField::Status,
                DisplayField::Toggle,
                DisplayField::Port,
                DisplayField::Region,
                DisplayField::Latency,
                DisplayField::KillSwitch,
                DisplayField::Tooltip,
            ];
            self.current = Some(next);
            return changes;
        };

        let mut mark = |changed: bool, field: DisplayField| {
            if changed {
                changes.fields.push(field);
            }
        };
        mark(prev.icon_name != next.icon_name, DisplayField::Icon);
        mark(prev.status_line != next.status_line, DisplayField::Status);
        mark(prev.toggle_label != next.toggle_label, DisplayField::Toggle);
        mark(prev.port_line != next.port_line, DisplayField::Port);
        mark(prev.region_line != next.region_line, DisplayField::Region);
        mark(prev.latency_line != next.latency_line, DisplayField::Latency);
        mark(
            prev.killswitch_line != next.killswitch_line
                || prev.killswitch_toggle_label != next.killswitch_toggle_label,
            DisplayField::KillSwitch,
        );
        mark(prev.tooltip != next.tooltip, DisplayField::Tooltip);

        self.current = Some(next);
        changes
    }
}
