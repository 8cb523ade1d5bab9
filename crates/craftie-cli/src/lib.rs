//! Craftie CLI library.
//!
//! This crate provides the CLI interface for craftie.

mod cli;
pub mod commands;
mod config;
pub mod event_loop;

pub use cli::{Cli, Commands};
pub use config::{Config, CsvConfig, SheetsConfig};
