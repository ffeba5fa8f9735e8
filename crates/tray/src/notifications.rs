// Desktop notifications for operation results

use notify_rust::{Notification, Timeout};
use pia_status_core::Operation;
use std::fmt::Display;
use tracing::warn;

fn show(summary: &str, body: &str, icon: &str, timeout_ms: u32) {
    if let Err(e) = Notification::new()
        .summary(summary)
        .body(body)
        .icon(icon)
        .timeout(Timeout::Milliseconds(timeout_ms))
        .show()
    {
        warn!("Failed to show notification: {}", e);
    }
}

/// A request was rejected because another operation is still running
pub fn show_busy_notification(requested: &Operation, running: &str) {
    show(
        "PIA VPN: Please wait",
        &format!("Cannot {} while {} is in progress", requested, running),
        "dialog-information",
        4000,
    );
}

/// A gating step failed; the VPN was not restarted
pub fn show_aborted_notification(operation: &Operation, reason: &str) {
    show(
        &format!("PIA VPN: {} failed", operation),
        &format!("{}\n\nThe VPN service was not restarted.", reason),
        "dialog-error",
        10000,
    );
}

pub fn show_error_notification(action: impl Display, error: &str) {
    show(
        &format!("PIA VPN: {} failed", action),
        error,
        "dialog-error",
        10000,
    );
}
