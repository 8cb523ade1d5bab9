//! CLI subcommand implementations.

pub mod start;
pub mod sync;

use anyhow::{Context, Result};
use craftie_db::Database;
use craftie_sheets::{SheetsClient, fetch_credentials};

use crate::config::{Config, SheetsConfig};

/// Opens the session store, creating its parent directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create database directory {}", parent.display())
        })?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Fetches credentials and builds the Sheets client.
async fn connect_sheets(config: &SheetsConfig) -> Result<SheetsClient> {
    let credentials = fetch_credentials(config.credentials_helper.as_deref())
        .await
        .context("failed to get Google Sheets credentials")?;
    SheetsClient::new(&config.spreadsheet_id, &credentials)
        .context("failed to create Google Sheets client")
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
