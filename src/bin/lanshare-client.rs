//! lanshare client - one command per invocation

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc::UnboundedReceiver;

use lanshare::config::DEFAULT_PORT;
use lanshare::protocol::{FileDetails, FileSummary};
use lanshare::transfer::{Direction, ProgressEvent, TransferSummary, format_rate, format_size};
use lanshare::{Client, ClientEvent, Settings};

/// LAN file sharing client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host name or IP address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Configuration file (default: ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where downloads are written
    #[arg(short, long)]
    download_dir: Option<String>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List the shared files
    List,
    /// Show details for one file
    Info {
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    /// Download a file by index
    Download {
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    /// Upload a local file
    Upload { path: PathBuf },
    /// Send a message to the server
    Send {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

/// Whether an event completes the requested action.
enum Outcome {
    Pending,
    Done,
    Failed(String),
}

#[derive(Default)]
struct Terminal {
    bar: Option<ProgressBar>,
}

impl Terminal {
    fn show(&mut self, event: ClientEvent) -> Outcome {
        match event {
            ClientEvent::FileList(files) => {
                print_listing(&files);
                Outcome::Done
            }
            ClientEvent::FileInfo(details) => {
                print_details(&details);
                Outcome::Done
            }
            ClientEvent::TransferStarted {
                name,
                size,
                direction,
            } => {
                self.bar = Some(transfer_bar(&name, size, direction));
                Outcome::Pending
            }
            ClientEvent::Progress(event) => {
                self.update(&event);
                Outcome::Pending
            }
            ClientEvent::TransferFinished(summary) => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                print_summary(&summary);
                Outcome::Done
            }
            ClientEvent::TransferFailed { name, reason, .. } => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon();
                }
                Outcome::Failed(format!("{name}: {reason}"))
            }
            ClientEvent::ServerError(reason) => Outcome::Failed(reason),
            ClientEvent::ServerEcho(text) => {
                println!("Server received: {text}");
                Outcome::Done
            }
            ClientEvent::ServerText(text) => {
                println!("{text}");
                Outcome::Done
            }
            ClientEvent::Disconnected => {
                Outcome::Failed("server closed the connection".to_string())
            }
        }
    }

    fn update(&self, event: &ProgressEvent) {
        if let Some(bar) = &self.bar {
            bar.set_position(event.transferred);
            bar.set_message(format!(
                "{} ETA {}s",
                format_rate(event.throughput),
                event.eta.as_secs()
            ));
        }
    }
}

fn transfer_bar(name: &str, size: u64, direction: Direction) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "{prefix} [{bar:40.cyan/blue}] {percent:>3}% {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    bar.set_prefix(format!("{direction} {name}"));
    bar
}

fn print_listing(files: &[FileSummary]) {
    if files.is_empty() {
        println!("No files shared");
        return;
    }
    println!("{:>5}  {:<40} {:>10}  Modified", "Index", "Name", "Size");
    for (index, file) in files.iter().enumerate() {
        println!(
            "{:>5}  {:<40} {:>10}  {}",
            index,
            file.name,
            format_size(file.size as f64),
            format_timestamp(file.modified)
        );
    }
}

fn print_details(details: &FileDetails) {
    println!("Index:    {}", details.index);
    println!("Name:     {}", details.name);
    println!("Size:     {} ({} bytes)", format_size(details.size as f64), details.size);
    println!("Modified: {}", format_timestamp(details.modified));
    println!("Readable: {}", if details.readable { "yes" } else { "no" });
}

fn print_summary(summary: &TransferSummary) {
    println!(
        "{} {} complete: {} in {:.1}s ({} avg)",
        summary.direction,
        summary.filename,
        format_size(summary.bytes as f64),
        summary.elapsed.as_secs_f64(),
        format_rate(summary.average_throughput())
    );
}

/// Local time for fractional epoch seconds.
fn format_timestamp(secs: f64) -> String {
    let whole = secs.trunc() as i64;
    let nanos = (secs.fract().max(0.0) * 1e9) as u32;
    match DateTime::from_timestamp(whole, nanos) {
        Some(utc) => utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Renders events until one of them completes the action.
async fn wait(
    events: &mut UnboundedReceiver<ClientEvent>,
    terminal: &mut Terminal,
) -> Result<(), String> {
    while let Some(event) = events.recv().await {
        match terminal.show(event) {
            Outcome::Pending => continue,
            Outcome::Done => return Ok(()),
            Outcome::Failed(reason) => return Err(reason),
        }
    }
    Err("connection lost".to_string())
}

async fn upload(
    client: &Client,
    events: &mut UnboundedReceiver<ClientEvent>,
    terminal: &mut Terminal,
    path: PathBuf,
) -> Result<(), String> {
    let transfer = client.upload(&path);
    tokio::pin!(transfer);

    loop {
        tokio::select! {
            result = &mut transfer => {
                // Render whatever the transfer queued before returning.
                while let Ok(event) = events.try_recv() {
                    terminal.show(event);
                }
                return result.map(|_| ()).map_err(|e| e.to_string());
            }
            Some(event) = events.recv() => {
                if let Outcome::Failed(reason) = terminal.show(event) {
                    return Err(reason);
                }
            }
        }
    }
}

async fn run(args: Args) -> Result<(), String> {
    let mut settings = Settings::load(args.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(dir) = args.download_dir {
        settings.client.download_dir = dir;
    }
    settings.client.validate().map_err(|e| e.to_string())?;

    let addr = format!("{}:{}", args.host, args.port);
    let (client, mut events) = Client::connect(&addr, &settings.client)
        .await
        .map_err(|e| format!("cannot connect to {addr}: {e}"))?;
    let mut terminal = Terminal::default();

    let result = match args.action {
        Action::List => match client.list_files().await {
            Ok(()) => wait(&mut events, &mut terminal).await,
            Err(e) => Err(e.to_string()),
        },
        Action::Info { index } => match client.file_info(index).await {
            Ok(()) => wait(&mut events, &mut terminal).await,
            Err(e) => Err(e.to_string()),
        },
        Action::Download { index } => match client.download(index).await {
            Ok(()) => wait(&mut events, &mut terminal).await,
            Err(e) => Err(e.to_string()),
        },
        Action::Upload { path } => upload(&client, &mut events, &mut terminal, path).await,
        Action::Send { text } => match client.send_text(&text.join(" ")).await {
            Ok(()) => wait(&mut events, &mut terminal).await,
            Err(e) => Err(e.to_string()),
        },
    };

    if let Err(e) = client.disconnect().await {
        error!("Disconnect failed: {}", e);
    }
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
