//! Command-line interface definitions for the scanner.
//!
//! This module contains the CLI argument parsing structures and enums
//! used by the `hfscan` binary.

use clap::{Parser, Subcommand, ValueEnum};

use hfscan_common::ScanCategory;

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan with every selected receiver until SIGTERM or Ctrl-C.
    Run(ServiceArgs),

    /// List the receivers the configured driver can see.
    Devices(ServiceArgs),

    /// Inspect or prune logged messages.
    Messages {
        #[command(flatten)]
        service: ServiceArgs,
        #[command(subcommand)]
        command: MessagesCommand,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

/// Arguments shared by every command.
#[derive(Debug, Parser)]
pub struct ServiceArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hfscan.toml", env = "HFSCAN_CONFIG")]
    pub config: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t)]
    pub log_format: LogFormat,
}

#[derive(Debug, Subcommand)]
pub enum MessagesCommand {
    /// Print the most recent messages as JSON, newest first.
    Recent {
        /// Only messages of this category (hfgcs, js8, adsb)
        #[arg(long)]
        category: Option<ScanCategory>,
        /// Only messages from this device
        #[arg(long)]
        device: Option<String>,
        /// Maximum number of messages; defaults to `messages_per_page`
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Delete one message.
    Delete { category: ScanCategory, id: i64 },
}
