//! Sync command: push finished sessions the live loop could not sync.

use std::io::Write;

use anyhow::{Context, Result, bail};
use craftie_core::{BatchSink, PendingSession, RetryPolicy, SheetSink, flush_with_retry};
use craftie_db::Database;
use tokio_util::sync::CancellationToken;

use super::{connect_sheets, current_thread_runtime, open_database};
use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let sheets = &config.google_sheets;
    if !sheets.enabled {
        bail!("Google Sheets sync is disabled (set google_sheets.enabled = true)");
    }
    let mut db = open_database(config)?;

    let runtime = current_thread_runtime()?;
    runtime.block_on(async {
        let client = connect_sheets(sheets).await?;
        let sink = SheetSink::new(client, &sheets.sheet_name);

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("interrupt received, cancelling sync");
                on_interrupt.cancel();
            }
        });

        let result = flush_pending(writer, &mut db, &sink, &sheets.retry_policy(), &cancel).await;
        watcher.abort();
        result.map(|_| ())
    })
}

/// Flushes every unsynced session in one batch and marks them synced.
///
/// Returns the number of sessions marked.
pub async fn flush_pending<W: Write, S: BatchSink>(
    writer: &mut W,
    db: &mut Database,
    sink: &S,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<usize> {
    let pending = db.unsynced_sessions().context("failed to list unsynced sessions")?;
    if pending.is_empty() {
        writeln!(writer, "Nothing to sync.")?;
        return Ok(0);
    }

    let sessions: Vec<PendingSession> = pending
        .iter()
        .map(|stored| PendingSession::new(stored.session.clone(), stored.sheet_row))
        .collect();
    let attempt = flush_with_retry(sink, &sessions, policy, cancel)
        .await
        .context("failed to sync sessions to Google Sheets")?;

    let ids: Vec<i64> = pending.iter().map(|stored| stored.id).collect();
    let marked = db
        .mark_sessions_synced(&ids)
        .context("failed to mark sessions as synced")?;
    tracing::debug!(marked, attempt, "batch sync complete");
    writeln!(writer, "Synced {marked} session(s) on attempt {attempt}.")?;
    Ok(marked)
}
