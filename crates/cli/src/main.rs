// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 PIA Status Contributors

// PIA Status - CLI Client
// Command-line interface for VPN status and connection changes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pia_status_common::{StatusConfig, StatusSnapshot};
use pia_status_core::{DisplayField, DisplayModel, DisplayState, Engine, Operation, Outcome};

#[derive(Parser)]
#[command(name = "pia-status")]
#[command(about = "PIA VPN status and control", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/pia-status/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current VPN status
    Status {
        /// Output as JSON for scripting
        #[arg(short, long)]
        json: bool,
    },

    /// List regions from the server list
    Regions {
        /// Output as JSON for scripting
        #[arg(short, long)]
        json: bool,
    },

    /// Bring the VPN down
    Disconnect,

    /// Restart the VPN service
    Reconnect,

    /// Connect to a specific region
    SwitchRegion {
        /// Region id, as listed by `pia-status regions`
        id: String,
    },

    /// Let the VPN service pick the fastest server
    Fastest,

    /// Toggle the kill switch
    Killswitch,

    /// Print status changes as they happen
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "pia_status_core=debug,pia_status_cli=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => StatusConfig::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => StatusConfig::load().context("Failed to load configuration")?,
    };

    let watch = matches!(cli.command, Commands::Watch);
    let engine = Engine::start(config, watch).await;

    let result = match cli.command {
        Commands::Status { json } => show_status(&engine, json).await,
        Commands::Regions { json } => list_regions(&engine, json),
        Commands::Disconnect => run_operation(&engine, Operation::Disconnect).await,
        Commands::Reconnect => run_operation(&engine, Operation::Reconnect).await,
        Commands::SwitchRegion { id } => {
            run_operation(&engine, Operation::SwitchRegion { region_id: id }).await
        }
        Commands::Fastest => run_operation(&engine, Operation::FindFastestServer).await,
        Commands::Killswitch => run_operation(&engine, Operation::ToggleKillSwitch).await,
        Commands::Watch => watch_status(&engine).await,
    };

    engine.shutdown();
    result
}

async fn show_status(engine: &Engine, json: bool) -> Result<()> {
    let snapshot = engine.refresh_and_wait().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    } else {
        print_status(&snapshot);
    }
    Ok(())
}

fn print_status(snapshot: &StatusSnapshot) {
    let display = DisplayModel::from_snapshot(snapshot);

    println!();
    if snapshot.connected {
        println!("{}", display.status_line.green().bold());
    } else {
        println!("{}", display.status_line.red().bold());
    }
    println!("  {}", display.region_line);
    println!("  {}", display.port_line);
    if snapshot.connected {
        println!("  Latency: {}", snapshot.latency);
    } else {
        println!("  {}", display.latency_line);
    }
    if snapshot.killswitch_enabled {
        println!("  {}", display.killswitch_line.green());
    } else {
        println!("  {}", display.killswitch_line.yellow());
    }
    println!();
}

fn list_regions(engine: &Engine, json: bool) -> Result<()> {
    let Some(catalog) = engine.catalog().get() else {
        anyhow::bail!(
            "Server list unavailable ({})",
            engine.config().network.server_list_url
        );
    };
    let regions = catalog.sorted_by_name();

    if json {
        println!("{}", serde_json::to_string_pretty(&regions)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    // Header
    table.set_header(vec![
        Cell::new("ID").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Name").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Servers").add_attribute(Attribute::Bold).fg(Color::Cyan),
    ]);

    for region in &regions {
        let servers: usize = region.servers.values().map(Vec::len).sum();
        table.add_row(vec![
            Cell::new(&region.id).fg(Color::Green),
            Cell::new(&region.name),
            Cell::new(servers).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{}", table);
    println!();
    println!("{} region(s) found", regions.len().to_string().cyan());
    println!();
    Ok(())
}

async fn run_operation(engine: &Engine, operation: Operation) -> Result<()> {
    println!("{}", format!("Starting: {}", operation).bold());

    let orchestrator = engine.orchestrator();
    let run = orchestrator.run(operation.clone());
    tokio::pin!(run);

    // Ctrl-C stops the sequence before its next step
    let outcome = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = tokio::signal::ctrl_c() => {
                if orchestrator.cancel() {
                    println!("{}", "Cancelling after the current step...".yellow());
                }
            }
        }
    }
    .with_context(|| format!("Failed to {}", operation))?;

    match &outcome {
        Outcome::Completed => {
            println!("{}", format!("✓ Finished: {}", operation).green().bold());
        }
        Outcome::Aborted { step, reason } => {
            println!("{}", format!("✗ Aborted at '{}': {}", step, reason).red().bold());
            println!("{}", "The VPN service was not restarted.".dimmed());
        }
        Outcome::Cancelled { completed_steps } => {
            println!(
                "{}",
                format!("Cancelled after {} step(s); completed steps were not undone", completed_steps)
                    .yellow()
            );
        }
    }

    let snapshot = engine.refresh_and_wait().await;
    print_status(&snapshot);

    if matches!(outcome, Outcome::Aborted { .. }) {
        anyhow::bail!("{} did not complete", operation);
    }
    Ok(())
}

async fn watch_status(engine: &Engine) -> Result<()> {
    println!(
        "{}",
        format!(
            "Watching {} (Ctrl+C to stop)",
            engine.config().paths.state_dir.display()
        )
        .dimmed()
    );

    let mut status = engine.subscribe();
    let mut display = DisplayState::new();

    loop {
        let snapshot = status.borrow_and_update().clone();
        let changes = display.apply(&snapshot);

        if !changes.is_empty() {
            if let Some(model) = display.current() {
                let time = snapshot.generated_at.format("%H:%M:%S").to_string();
                for field in changes.fields() {
                    if let Some(line) = field_line(model, *field) {
                        println!("{} {}", time.dimmed(), line);
                    }
                }
            }
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Text for a changed field; icon and tooltip have no line of their own
fn field_line(model: &DisplayModel, field: DisplayField) -> Option<String> {
    match field {
        DisplayField::Status => Some(model.status_line.clone()),
        DisplayField::Region => Some(model.region_line.clone()),
        DisplayField::Port => Some(model.port_line.clone()),
        DisplayField::Latency => Some(model.latency_line.clone()),
        DisplayField::KillSwitch => Some(model.killswitch_line.clone()),
        DisplayField::Icon | DisplayField::Toggle | DisplayField::Tooltip => None,
    }
}
