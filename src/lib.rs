//! Artloop - automatic art rotation for networked display devices
//!
//! Artloop keeps a fleet of art-mode displays cycling through a shared
//! image library: tag-based rule sets decide what each device may show,
//! a weighted selector decides what comes next, and per-device timers
//! decide when.

pub mod activity;
pub mod config;
pub mod domain;
pub mod error;
pub mod guard;
pub mod health;
pub mod library;
pub mod observer;
pub mod scheduler;
pub mod selection;
pub mod store;
pub mod tagsets;
pub mod transfer;

pub use error::{ArtloopError, Result};
