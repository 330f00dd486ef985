//! CLI module for artloop - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for the scheduler
//! daemon, manual shuffles, tagset management, and pool-health reports.

pub mod commands;

pub use commands::Cli;
