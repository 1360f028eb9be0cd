//! Photo Downloader - CLI Entry Point
//!
//! Downloads images from a memory card or folder, renaming them and sorting
//! them into folders with naming templates built from EXIF metadata.
//!
//! This binary is a thin wrapper around the library, handling argument parsing,
//! logging setup, and command dispatch. It also hosts the worker processes of
//! a download session (`photo-downloader worker <kind>`).

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use photo_download_tool::cli::{self, Args, Commands, DualWriter};
use photo_download_tool::core::config::Config;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    let args = Args::parse();
    let is_worker = matches!(args.command, Commands::Worker { .. });

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                Config::default()
            }
        }
    } else {
        Config::load_default().unwrap_or_default()
    };

    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }

    // Set up graceful shutdown handler
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    if is_worker {
        // The orchestrator shares our terminal and stops us itself
        ctrlc::set_handler(|| {}).context("Failed to set Ctrl+C handler")?;
    } else {
        ctrlc::set_handler(move || {
            if shutdown_flag_clone.load(Ordering::SeqCst) {
                // Second Ctrl+C - force exit
                eprintln!("\nForce shutdown requested. Exiting immediately...");
                std::process::exit(1);
            } else {
                shutdown_flag_clone.store(true, Ordering::SeqCst);
                eprintln!("\nCancel requested. Finishing current image... (Press Ctrl+C again to force quit)");
            }
        })
        .context("Failed to set Ctrl+C handler")?;
    }

    // Initialize logger
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    if config.logging.log_to_file {
        // Set up logging to both console and file
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.log_file)
            .with_context(|| {
                format!("Failed to open log file {}", config.logging.log_file.display())
            })?;

        Builder::new()
            .filter_level(log_level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} {} {}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .target(env_logger::Target::Pipe(Box::new(DualWriter {
                console: std::io::stderr(),
                file: log_file,
            })))
            .init();

        info!("Logging to file: {}", config.logging.log_file.display());
    } else {
        Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
            .target(env_logger::Target::Stderr)
            .init();
    }

    if !is_worker {
        info!("Photo Downloader v{}", photo_download_tool::VERSION);
    }

    // Run the command
    cli::run_command(&args, &config, shutdown_flag)?;

    Ok(())
}
