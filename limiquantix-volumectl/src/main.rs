//! # limiquantix Volume Control
//!
//! Lists, inspects and binds block-storage volumes on this host through
//! the configured volume driver. Results are printed as JSON.
//!
//! ## Usage
//! ```bash
//! limiquantix-volumectl --config /etc/limiquantix/volumes.yaml list --devices
//! limiquantix-volumectl attach pool1.vol1
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info};

use limiquantix_common::{init_logging_with_format, LogFormat};
use limiquantix_volume::{build_driver, SessionCache, VolumeDriver};

mod cli;
mod config;

use cli::{Args, Command};

#[derive(Serialize)]
struct Attached<T: Serialize> {
    attachment_id: String,
    volume: T,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let format: LogFormat = args.log_format.parse()?;
    init_logging_with_format(&args.log_level, format)?;

    debug!(version = env!("CARGO_PKG_VERSION"), "Starting limiquantix volume control");

    let config = config::resolve(&args)?;
    debug!(config = ?config, "Volume driver configured");

    let sessions = Arc::new(SessionCache::new());
    let driver = build_driver(&config, sessions)?;

    if let Err(e) = run(driver.as_ref(), args.command).await {
        error!(error = %e, backend = driver.name(), "Volume operation failed");
        return Err(e);
    }

    Ok(())
}

async fn run(driver: &dyn VolumeDriver, command: Command) -> Result<()> {
    match command {
        Command::List(flags) => {
            let volumes = driver.volumes(flags.request()).await?;
            print_json(&volumes)
        }
        Command::Inspect { id, attachments } => {
            let volume = driver.volume_inspect(&id, attachments.request()).await?;
            print_json(&volume)
        }
        Command::Create { name, size } => {
            let volume = driver.volume_create(&name, size).await?;
            info!(volume_id = %volume.id, "Volume created");
            print_json(&volume)
        }
        Command::Remove { id } => {
            driver.volume_remove(&id).await?;
            info!(volume_id = %id, "Volume removed");
            Ok(())
        }
        Command::Attach { id } => {
            let (volume, attachment_id) = driver.volume_attach(&id).await?;
            info!(volume_id = %volume.id, attachment_id = %attachment_id, "Volume attached");
            print_json(&Attached { attachment_id, volume })
        }
        Command::Detach { id } => {
            let volume = driver.volume_detach(&id).await?;
            info!(volume_id = %volume.id, "Volume detached");
            print_json(&volume)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
