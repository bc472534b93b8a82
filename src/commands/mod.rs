//! CLI command implementations for fritzbox-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `collect`: One collection pass to stdout
//! - `services`: Service and action listing
//! - `pages`: Page dump
//! - `check`: Configuration and catalog validation

pub mod check;
pub mod collect;
pub mod pages;
pub mod services;

// Re-export command functions
pub use check::command_check;
pub use collect::command_collect;
pub use pages::command_pages;
pub use services::command_services;
