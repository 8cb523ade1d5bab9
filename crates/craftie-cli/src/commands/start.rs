//! Start command: track a session live until it ends, then record it.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use craftie_core::row::{format_clock, format_hms};
use craftie_core::{
    CsvSink, EndTimer, Session, SheetSink, SheetSyncState, SyncOrchestrator, parse_duration,
};
use craftie_db::Database;
use craftie_sheets::SheetsClient;

use super::{connect_sheets, current_thread_runtime, open_database};
use crate::Config;
use crate::event_loop::{StopReason, run_session, shutdown_signal};

#[derive(Debug, Clone, Default)]
pub struct StartArgs {
    pub project: String,
    pub task: String,
    pub notes: String,
    pub duration: Option<String>,
}

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &StartArgs) -> Result<()> {
    let duration = match args.duration.as_deref().map(str::trim) {
        Some(expr) if !expr.is_empty() => {
            Some(parse_duration(expr).context("invalid --duration")?)
        }
        _ => None,
    };
    let db = open_database(config)?;

    let runtime = current_thread_runtime()?;
    runtime.block_on(track(writer, config, args, duration, &db))
}

async fn track<W: Write>(
    writer: &mut W,
    config: &Config,
    args: &StartArgs,
    duration: Option<Duration>,
    db: &Database,
) -> Result<()> {
    let mut orchestrator = build_orchestrator(config).await?;
    if !orchestrator.has_sinks() {
        tracing::warn!("no sinks enabled; the session will only be recorded locally");
    }
    let shutdown = shutdown_signal().context("failed to install signal handlers")?;

    let mut session = Session::start(&args.project, &args.task, &args.notes);
    let timer = duration
        .map(EndTimer::after)
        .transpose()
        .context("invalid --duration")?;

    writeln!(
        writer,
        "Started session for project '{}' at {}",
        session.project(),
        format_clock(session.start_time())
    )?;
    if let Some(timer) = &timer {
        writeln!(writer, "Session ends at {}", format_clock(timer.ends_at()))?;
    }
    writer.flush()?;

    let outcome = run_session(
        &mut session,
        &mut orchestrator,
        timer.as_ref(),
        config.sync_interval(),
        shutdown,
        |report| {
            for sink in report.created() {
                if let Err(e) = writeln!(writer, "{sink} row created") {
                    tracing::warn!(error = %e, "failed to write progress");
                }
            }
        },
    )
    .await;

    let reason = match outcome.reason {
        StopReason::Signal => "stopped",
        StopReason::Timer => "time is up",
    };
    writeln!(
        writer,
        "Session ended ({reason}) after {}",
        format_hms(session.current_duration())
    )?;

    let synced = outcome.final_report.sheet_succeeded();
    let sheet_row = orchestrator.sheet_state().map(SheetSyncState::row_number);
    match db.insert_session(&session, synced, sheet_row) {
        Ok(id) => tracing::debug!(id, synced, ?sheet_row, "session recorded"),
        Err(e) => tracing::warn!(error = %e, "failed to record session"),
    }
    Ok(())
}

async fn build_orchestrator(config: &Config) -> Result<SyncOrchestrator<SheetsClient>> {
    let mut orchestrator = SyncOrchestrator::new();
    if config.csv.enabled {
        orchestrator = orchestrator.with_csv(CsvSink::new(&config.csv.path));
    }
    if config.google_sheets.enabled {
        let client = connect_sheets(&config.google_sheets).await?;
        orchestrator = orchestrator.with_sheet(SheetSink::new(
            client,
            &config.google_sheets.sheet_name,
        ));
    }
    Ok(orchestrator)
}
