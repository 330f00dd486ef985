//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: start the scheduler daemon
//! - shuffle/health/devices: per-device operations
//! - tagset: manage tag-based rule sets

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Artloop - automatic art rotation for networked display devices
#[derive(Parser, Debug)]
#[command(name = "artloop")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Schedule and tagset changes are written to the state file. \
A daemon started with `artloop run` reads that file once at startup, so changes \
made beside a running daemon take effect after the daemon restarts.")]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler daemon in the foreground
    Run,

    /// Shuffle a device now (ignores the recency filter and power gate)
    Shuffle {
        /// Device id to shuffle
        device: String,
    },

    /// Report pool health for a device
    Health {
        /// Device id to inspect
        device: String,
    },

    /// List devices and their schedules
    Devices,

    /// Enable auto shuffle for a device
    Enable {
        /// Device id
        device: String,
    },

    /// Disable auto shuffle for a device
    Disable {
        /// Device id
        device: String,
    },

    /// Change a device's shuffle frequency
    Frequency {
        /// Device id
        device: String,

        /// Minutes between scheduled shuffles
        minutes: u32,
    },

    /// Manage tag-based rule sets
    Tagset {
        #[command(subcommand)]
        command: TagsetCommands,
    },
}

/// Tagset subcommands
#[derive(Subcommand, Debug)]
pub enum TagsetCommands {
    /// List all tagsets
    List,

    /// Create or replace a tagset
    Set {
        /// Tagset name
        name: String,

        /// Categories to include, comma separated
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,

        /// Categories to exclude, comma separated
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Per-category weights as category=weight pairs
        #[arg(long = "weight")]
        weights: Vec<String>,
    },

    /// Delete a tagset (refused while a device references it)
    Delete {
        /// Tagset name
        name: String,
    },

    /// Set or clear a device's permanent selection
    Select {
        /// Device id
        device: String,

        /// Tagset name; omit to clear the selection
        name: Option<String>,
    },

    /// Temporarily override a device's selection
    Override {
        /// Device id
        device: String,

        /// Tagset name
        name: String,

        /// Minutes until the override expires
        #[arg(long, default_value_t = 60)]
        minutes: i64,
    },

    /// Clear a device's override immediately
    ClearOverride {
        /// Device id
        device: String,
    },
}
