//! Library entry for the `hfscan_scanner` crate.
//!
//! Exposes `inner_main` so a workspace-level shim binary can call into the scanner logic.
//!
//! Provides commands to run the scanning orchestrator, list receivers and manage
//! logged messages.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod config;
pub mod detect;
pub mod hardware;
pub mod recordings;
pub mod registry;
pub mod store;

use std::{env, fs, path::Path, process, sync::Once};

use eyre::{Result, WrapErr as _};
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat, MessagesCommand};
use config::ScannerConfig;
use registry::DeviceRegistry;
use store::{RecentQuery, open_store};

static INIT_TRACING: Once = Once::new();

fn init_tracing(log_format: LogFormat, config: &ScannerConfig) {
    let default_level = if env::var("HFSCAN_INTEGRATION_TEST").is_ok() {
        "error".to_string()
    } else {
        config.logging.level.clone()
    };
    INIT_TRACING.call_once(move || {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The scanner's main function; can be called from a shim binary.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the message store
/// cannot be opened, or a message command fails.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    let (Command::Run(ref args)
    | Command::Devices(ref args)
    | Command::Messages {
        service: ref args, ..
    }) = invocation.command;

    let config_path = fs::canonicalize(&args.config)
        .wrap_err(format!("Config file not found at: {}", args.config))?;
    let scanner_config = config::load(&config_path).await?;
    init_tracing(args.log_format, &scanner_config);

    match invocation.command {
        Command::Run(_) => {
            let startup_span = tracing::info_span!(
                "scanner",
                ?config_path,
                pid = ?process::id(),
                version = env!("CARGO_PKG_VERSION")
            );
            info!(parent: &startup_span, "Starting scanner");
            app::start(&config_path).instrument(startup_span).await
        }
        Command::Devices(_) => {
            let found = DeviceRegistry::new(app::build_driver(&scanner_config)).list_devices();
            if let Some(fault) = found.fault {
                eyre::bail!(fault);
            }
            if found.devices.is_empty() {
                println!("No SDR devices found");
            }
            for device in found.devices {
                println!("{device}");
            }
            Ok(())
        }
        Command::Messages { command, .. } => {
            run_messages_command(&scanner_config, &config_path, command).await
        }
    }
}

async fn run_messages_command(
    scanner_config: &ScannerConfig,
    config_path: &Path,
    command: MessagesCommand,
) -> Result<()> {
    let store = open_store(scanner_config.db.as_ref(), config_path).await?;
    match command {
        MessagesCommand::Recent {
            category,
            device,
            limit,
        } => {
            let messages = store
                .recent(RecentQuery {
                    category,
                    device_id: device,
                    limit: limit.unwrap_or(scanner_config.app.messages_per_page),
                })
                .await
                .wrap_err("Failed to load messages")?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
            Ok(())
        }
        MessagesCommand::Delete { category, id } => {
            if store
                .delete(category, id)
                .await
                .wrap_err("Failed to delete message")?
            {
                println!("Deleted {category} message {id}");
                Ok(())
            } else {
                eyre::bail!("No {category} message with id {id}")
            }
        }
    }
}
