//! lanshare server - Entry Point
//!
//! Serves one directory to any number of LAN peers until interrupted.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use lanshare::{Server, Settings};

/// LAN file sharing server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IP address to bind to
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to share
    #[arg(short = 's', long = "shared-dir")]
    shared_dir: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(bind) = args.bind {
        settings.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(shared_dir) = args.shared_dir {
        settings.server.shared_dir = shared_dir;
    }
    if let Err(e) = settings.server.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Launching lanshare server...");

    let server = match Server::bind(settings.server).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let handle = server.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let status = handle.status().await;
                info!(
                    "Interrupted with {} active connections, {} shared files",
                    status.connections, status.files
                );
                handle.stop();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await;
    ExitCode::SUCCESS
}
