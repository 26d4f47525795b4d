use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{Command, Response};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

#[derive(Parser)]
#[command(name = "spanctl")]
#[command(about = "Control the spanwall slideshow daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Daemon address (defaults to SPANWALL_ADDR or 127.0.0.1:47615)
    #[arg(long, global = true)]
    addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check if the daemon is running
    Ping,

    /// Show daemon status and current selections
    Status,

    /// Re-detect monitors and list them
    Monitors,

    /// Show a monitor's slideshow settings
    Show {
        /// Monitor name, as listed by `spanctl monitors`
        monitor: String,
    },

    /// Set one key of a monitor's slideshow settings
    Set {
        monitor: String,

        /// images, interval, enabled or last_index
        key: String,

        /// Value as JSON (plain text is sent as a string)
        value: String,
    },

    /// Start the slideshow on a monitor
    Enable { monitor: String },

    /// Stop the slideshow on a monitor
    Disable { monitor: String },

    /// Set a monitor's rotation interval
    Interval {
        monitor: String,

        /// Seconds between rotations
        seconds: u64,
    },

    /// Add images from files, directories or glob patterns
    Add {
        monitor: String,

        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Remove an image path from a monitor
    Remove { monitor: String, path: String },

    /// Remove every image from a monitor
    Clear { monitor: String },

    /// Swap the image at INDEX with its neighbour (-1 = up, 1 = down)
    Move {
        monitor: String,
        index: usize,

        #[arg(allow_negative_numbers = true)]
        direction: i64,
    },

    /// Move the image at SRC to DEST
    Shift {
        monitor: String,
        src: usize,
        dest: usize,
    },

    /// Show global settings
    Settings,

    /// Set the interface language (tr or en)
    Language { code: String },

    /// Turn status lines on or off
    Logs {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /// Re-detect monitors and recomposite now
    Refresh,

    /// Follow the daemon's status lines
    Watch,

    /// Stop the daemon
    Kill,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let addr = cli.addr.unwrap_or_else(common::get_address);

    let command = match cli.command {
        Commands::Ping => Command::Ping,
        Commands::Status => Command::Status,
        Commands::Monitors => Command::DetectMonitors,
        Commands::Show { monitor } => Command::GetMonitorConfig { monitor },
        Commands::Set {
            monitor,
            key,
            value,
        } => Command::UpdateMonitorConfig {
            monitor,
            key,
            value: parse_value(&value),
        },
        Commands::Enable { monitor } => Command::UpdateMonitorConfig {
            monitor,
            key: "enabled".to_string(),
            value: Value::Bool(true),
        },
        Commands::Disable { monitor } => Command::UpdateMonitorConfig {
            monitor,
            key: "enabled".to_string(),
            value: Value::Bool(false),
        },
        Commands::Interval { monitor, seconds } => Command::UpdateMonitorConfig {
            monitor,
            key: "interval".to_string(),
            value: json!(seconds),
        },
        Commands::Add { monitor, sources } => Command::AddImages { monitor, sources },
        Commands::Remove { monitor, path } => Command::RemoveImage { monitor, path },
        Commands::Clear { monitor } => Command::ClearImages { monitor },
        Commands::Move {
            monitor,
            index,
            direction,
        } => Command::MoveImage {
            monitor,
            index,
            direction,
        },
        Commands::Shift { monitor, src, dest } => Command::ShiftImage { monitor, src, dest },
        Commands::Settings => Command::GetAppSettings,
        Commands::Language { code } => Command::UpdateAppSetting {
            key: "language".to_string(),
            value: Value::String(code),
        },
        Commands::Logs { state } => Command::UpdateAppSetting {
            key: "show_logs".to_string(),
            value: Value::Bool(state == "on"),
        },
        Commands::Refresh => Command::Refresh,
        Commands::Watch => {
            if let Err(e) = watch(&addr).await {
                eprintln!("Error: {:#}", e);
                eprintln!("\nIs the daemon running? Try starting it with: spanwall");
                std::process::exit(1);
            }
            return Ok(());
        }
        Commands::Kill => Command::Kill,
    };

    match send_command(&addr, command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("\nIs the daemon running? Try starting it with: spanwall");
            std::process::exit(1);
        }
    }
}

/// JSON if it parses, otherwise the raw text as a string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn connect(addr: &str) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn write_command(writer: &mut OwnedWriteHalf, command: &Command) -> Result<()> {
    let command_json = serde_json::to_string(command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn read_response(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<Response>> {
    let mut response_line = String::new();
    if reader.read_line(&mut response_line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&response_line)?))
}

async fn send_command(addr: &str, command: Command) -> Result<Response> {
    let (mut reader, mut writer) = connect(addr).await?;

    write_command(&mut writer, &command).await?;

    read_response(&mut reader)
        .await?
        .context("Daemon closed the connection without answering")
}

/// Print status lines until the daemon goes away or Ctrl-C
async fn watch(addr: &str) -> Result<()> {
    let (mut reader, mut writer) = connect(addr).await?;
    write_command(&mut writer, &Command::Subscribe).await?;

    while let Some(response) = read_response(&mut reader).await? {
        match response {
            Response::Log(message) => {
                println!("[{}] {}", chrono::Local::now().format("%H:%M"), message);
            }
            Response::Ok => println!("Watching status lines (Ctrl-C to stop)"),
            other => handle_response(other),
        }
    }

    println!("Daemon closed the connection");
    Ok(())
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Changed(true) => {
            println!("✓ Updated");
        }
        Response::Changed(false) => {
            println!("Nothing changed (unknown monitor, duplicate or index out of range)");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
        Response::Status(status) => {
            println!("Daemon Status:");
            println!("  Version: {}", status.version);
            println!("  Uptime: {}s", status.uptime_secs);
            println!("  Monitors: {}", status.monitors.len());
            println!("  Current Selections:");
            if status.selections.is_empty() {
                println!("    (none)");
            }
            for selection in status.selections {
                println!("    {} -> {}", selection.monitor, selection.image);
            }
        }
        Response::Monitors(monitors) => {
            println!("Detected Monitors:");
            for monitor in monitors {
                println!(
                    "  {} - {}x{} at ({}, {})",
                    monitor.name, monitor.width, monitor.height, monitor.x, monitor.y
                );
            }
        }
        Response::MonitorConfig(cfg) => {
            println!("Slideshow:");
            println!("  Enabled: {}", if cfg.enabled { "yes" } else { "no" });
            println!("  Interval: {}s", cfg.interval_seconds);
            println!("  Position: {}", cfg.wrapped_index().unwrap_or(0));
            println!("  Images ({}):", cfg.images.len());
            for (i, image) in cfg.images.iter().enumerate() {
                let marker = if Some(i) == cfg.wrapped_index() { '*' } else { ' ' };
                println!("   {}{:>3}  {}", marker, i, image);
            }
        }
        Response::AppSettings(settings) => {
            println!("Settings:");
            println!("  Language: {}", settings.language);
            println!(
                "  Status lines: {}",
                if settings.show_logs { "on" } else { "off" }
            );
        }
        Response::Log(message) => {
            println!("{}", message);
        }
    }
}
