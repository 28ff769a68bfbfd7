use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use airsentry::config::Config;
use airsentry::detection::{self, EvilTwinDetector};
use airsentry::ipc::{connect_with_retry, fetch_snapshot, IpcMessage};
use airsentry::models::{Alert, DataFlag, ScanStatus, Severity, SnapshotPayload};
use airsentry::parser::SnapshotParser;
use airsentry::Daemon;
use tabled::{Table, Tabled};

#[derive(Parser)]
#[command(name = "airsentry")]
#[command(author, version, about = "Wireless recon daemon: evil-twin and traffic-anomaly detection")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scan daemon in the foreground
    Run,

    /// Show the current annotated snapshot from a running daemon
    Status {
        /// Socket path (default from config)
        #[arg(short, long)]
        socket: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Stream emitted snapshots from a running daemon
    Watch {
        /// Socket path (default from config)
        #[arg(short, long)]
        socket: Option<String>,

        /// Print full payloads as JSON lines
        #[arg(short, long)]
        json: bool,
    },

    /// Parse a capture file offline and run detection on it
    Parse {
        /// Capture snapshot to parse
        file: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Table row for the access-point listing
#[derive(Tabled)]
struct ApRow {
    #[tabled(rename = "ESSID")]
    essid: String,
    #[tabled(rename = "BSSID")]
    bssid: String,
    #[tabled(rename = "CH")]
    channel: String,
    #[tabled(rename = "PWR")]
    power: i32,
    #[tabled(rename = "Data")]
    data: i64,
    #[tabled(rename = "Delta")]
    delta: i64,
    #[tabled(rename = "Clients")]
    clients: usize,
    #[tabled(rename = "Flags")]
    flags: String,
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Run => cmd_run(config).await,
        Commands::Status { socket, json } => cmd_status(config, socket, json).await,
        Commands::Watch { socket, json } => cmd_watch(config, socket, json).await,
        Commands::Parse { file, json } => cmd_parse(config, file, json),
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

async fn cmd_run(config: Config) -> Result<()> {
    println!("Starting airsentry daemon...");

    let mut daemon = Daemon::new(config);

    // Handle signals
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    tokio::select! {
        result = daemon.run() => {
            result?;
        }
        _ = shutdown_signal => {
            println!("\nShutting down...");
            daemon.shutdown().await;
        }
    }

    Ok(())
}

async fn cmd_status(config: Config, socket: Option<String>, json: bool) -> Result<()> {
    let path = socket.unwrap_or_else(|| config.ipc.socket_path.clone());

    let payload = match fetch_snapshot(Some(&path)).await {
        Ok(payload) => payload,
        Err(e) => {
            println!("{}", "Daemon Status: UNREACHABLE".red().bold());
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", "Daemon Status: RUNNING".green().bold());
    print_snapshot(&payload);
    Ok(())
}

async fn cmd_watch(config: Config, socket: Option<String>, json: bool) -> Result<()> {
    let path = socket.unwrap_or_else(|| config.ipc.socket_path.clone());

    let mut client = connect_with_retry(Some(&path), "watch", 5, Duration::from_secs(2)).await?;
    let mut rx = client
        .receiver()
        .ok_or_else(|| anyhow::anyhow!("Receiver already taken"))?;

    println!("{}", "Watching for snapshots (Ctrl+C to stop)".dimmed());

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(IpcMessage::Snapshot(payload)) => {
                        if json {
                            println!("{}", serde_json::to_string(&payload)?);
                        } else {
                            print_emission(&payload);
                        }
                    }
                    Some(_) => {}
                    None => {
                        eprintln!("{}", "Connection to daemon closed".yellow());
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopped");
                client.disconnect().await;
                break;
            }
        }
    }

    Ok(())
}

fn cmd_parse(config: Config, file: PathBuf, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read capture file: {}", file.display()))?;

    let parser = SnapshotParser::new();
    let mut aps = parser.parse(&raw);

    let status = if aps.is_empty() {
        ScanStatus::NoData
    } else {
        ScanStatus::Success
    };

    detection::mark_duplicates(&mut aps);
    detection::apply_data_flags(&mut aps, &config.traffic);

    // Offline parse has no cross-cycle state, so only the stateless
    // duplicate-network detector applies
    let detector = EvilTwinDetector::new(config.detection.clone());
    let alerts = detector.detect(&aps);
    detection::attach_alerts(&mut aps, &alerts);

    let payload = SnapshotPayload::new(aps, status, alerts);

    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_snapshot(&payload);
    }

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();
    let toml_str = toml::to_string_pretty(&config)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &toml_str)?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

/// Full snapshot dump: summary lines, AP table, alert lines
fn print_snapshot(payload: &SnapshotPayload) {
    println!(
        "Scan:     {} ({})",
        payload.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        status_str(payload.status)
    );
    println!("Networks: {}", payload.total_networks);
    println!("Clients:  {}", payload.total_clients);

    if !payload.access_points.is_empty() {
        let rows: Vec<ApRow> = payload
            .access_points
            .iter()
            .map(|ap| {
                let mut flags = Vec::new();
                if ap.possible_evil_twin {
                    flags.push("twin?");
                }
                match ap.data_flag {
                    DataFlag::High => flags.push("data!"),
                    DataFlag::Suspicious => flags.push("data?"),
                    DataFlag::Normal => {}
                }

                ApRow {
                    essid: ap.essid.clone(),
                    bssid: ap.bssid.clone(),
                    channel: ap.channel.clone(),
                    power: ap.power,
                    data: ap.data,
                    delta: ap.delta_data,
                    clients: ap.clients.len(),
                    flags: flags.join(" "),
                }
            })
            .collect();

        println!("\n{}", Table::new(rows));
    }

    if payload.alerts.is_empty() {
        println!("\n{}", "No alerts".dimmed());
    } else {
        println!();
        for alert in &payload.alerts {
            println!("{}", alert_line(alert));
        }
    }
}

/// One-line-per-emission output for watch mode
fn print_emission(payload: &SnapshotPayload) {
    println!(
        "{} {} networks={} clients={} alerts={}",
        payload.timestamp.format("%H:%M:%S").to_string().dimmed(),
        status_str(payload.status),
        payload.total_networks,
        payload.total_clients,
        payload.alerts.len()
    );

    for alert in &payload.alerts {
        println!("  {}", alert_line(alert));
    }
}

fn status_str(status: ScanStatus) -> String {
    match status {
        ScanStatus::Success => "success".green().to_string(),
        ScanStatus::NoData => "no_data".yellow().to_string(),
        ScanStatus::NoCsv => "no_csv".yellow().to_string(),
    }
}

fn alert_line(alert: &Alert) -> String {
    let tag = format!("[{}]", alert.kind.label());
    let tag = match alert.severity {
        Severity::Critical => tag.red().bold(),
        Severity::High => tag.red(),
        Severity::Medium => tag.yellow(),
        Severity::Low => tag.normal(),
    };
    format!("{} {}", tag, alert.message)
}
