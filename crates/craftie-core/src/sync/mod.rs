//! Live sync of a running session into its sinks.
//!
//! Each sink moves through `Uninitialized -> Initialized` exactly once per
//! session: the first save creates the row and captures a handle (a byte
//! offset for CSV, a row number for the spreadsheet), every later save
//! rewrites the row through that handle.

mod batch;
mod csv_file;
mod sheet;

#[cfg(test)]
pub(crate) mod mock;

use std::path::PathBuf;

use thiserror::Error;

use crate::session::Session;

pub use batch::{BatchSink, BatchSyncError, PendingSession, RetryPolicy, flush_with_retry};
pub use csv_file::{CsvSink, CsvSyncState};
pub use sheet::{SheetSink, SheetSyncState, SheetsApi, quote_sheet_name, row_number_from_range};

/// Errors from writing a session row to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode CSV row: {0}")]
    Csv(#[from] csv::Error),

    #[error("{} is {len} bytes, shorter than the session row offset {offset}", path.display())]
    OffsetBeyondEnd { path: PathBuf, len: u64, offset: u64 },

    #[error("spreadsheet request failed: {0}")]
    Remote(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("could not parse a row number from updated range {0:?}")]
    RowNumber(String),
}

/// A sink that holds one row per session.
#[allow(async_fn_in_trait)]
pub trait RowSink {
    /// Handle captured on the first write, used to address the row afterwards.
    type State;

    fn name(&self) -> &'static str;

    /// Creates the session's row and returns its handle.
    async fn init_row(&self, session: &Session) -> Result<Self::State, SinkError>;

    /// Rewrites the session's row in place.
    async fn sync_row(&self, state: &Self::State, session: &Session) -> Result<(), SinkError>;
}

/// What happened to one sink during a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    /// The row was created on this save.
    Initialized,
    /// An existing row was rewritten.
    Synced,
    Failed(String),
}

impl SinkOutcome {
    pub const fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Per-sink outcomes of one [`SyncOrchestrator::save_session`] call.
///
/// A `None` field means the sink is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub csv: Option<SinkOutcome>,
    pub sheet: Option<SinkOutcome>,
}

impl SaveReport {
    /// Names of the sinks that created their row on this save.
    pub fn created(&self) -> Vec<&'static str> {
        [("csv", &self.csv), ("sheet", &self.sheet)]
            .into_iter()
            .filter(|(_, outcome)| matches!(outcome, Some(SinkOutcome::Initialized)))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn sheet_succeeded(&self) -> bool {
        self.sheet.as_ref().is_some_and(SinkOutcome::is_ok)
    }
}

struct SinkSlot<S: RowSink> {
    sink: S,
    state: Option<S::State>,
}

impl<S: RowSink> SinkSlot<S> {
    const fn new(sink: S) -> Self {
        Self { sink, state: None }
    }

    async fn save(&mut self, session: &Session) -> SinkOutcome {
        let name = self.sink.name();
        let result = if let Some(state) = &self.state {
            self.sink
                .sync_row(state, session)
                .await
                .map(|()| SinkOutcome::Synced)
        } else {
            match self.sink.init_row(session).await {
                Ok(state) => {
                    self.state = Some(state);
                    Ok(SinkOutcome::Initialized)
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(outcome) => {
                tracing::debug!(sink = name, ?outcome, "saved session row");
                outcome
            }
            Err(e) => {
                tracing::warn!(sink = name, error = %e, "failed to sync session row");
                SinkOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Fans a session out to every enabled sink.
///
/// Sinks are independent: a failure in one is logged and reported, and never
/// stops the other from being attempted. Retrying is left to the next save.
pub struct SyncOrchestrator<A: SheetsApi> {
    csv: Option<SinkSlot<CsvSink>>,
    sheet: Option<SinkSlot<SheetSink<A>>>,
}

impl<A: SheetsApi> Default for SyncOrchestrator<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SheetsApi> SyncOrchestrator<A> {
    /// An orchestrator with no sinks enabled.
    pub const fn new() -> Self {
        Self {
            csv: None,
            sheet: None,
        }
    }

    #[must_use]
    pub fn with_csv(mut self, sink: CsvSink) -> Self {
        self.csv = Some(SinkSlot::new(sink));
        self
    }

    #[must_use]
    pub fn with_sheet(mut self, sink: SheetSink<A>) -> Self {
        self.sheet = Some(SinkSlot::new(sink));
        self
    }

    pub const fn has_sinks(&self) -> bool {
        self.csv.is_some() || self.sheet.is_some()
    }

    pub fn csv_state(&self) -> Option<&CsvSyncState> {
        self.csv.as_ref().and_then(|slot| slot.state.as_ref())
    }

    pub fn sheet_state(&self) -> Option<&SheetSyncState> {
        self.sheet.as_ref().and_then(|slot| slot.state.as_ref())
    }

    /// Writes the session's current projection to every enabled sink.
    pub async fn save_session(&mut self, session: &Session) -> SaveReport {
        let csv = match &mut self.csv {
            Some(slot) => Some(slot.save(session).await),
            None => None,
        };
        let sheet = match &mut self.sheet {
            Some(slot) => Some(slot.save(session).await),
            None => None,
        };
        SaveReport { csv, sheet }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockSheets;
    use super::*;

    use chrono::{DateTime, TimeDelta, Utc};
    use tempfile::TempDir;

    fn stopped_session() -> Session {
        let start = DateTime::parse_from_rfc3339("2025-03-10T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Session::from_parts(
            start,
            Some(start + TimeDelta::minutes(20)),
            "quilt",
            "",
            "",
        )
    }

    #[tokio::test]
    async fn no_sinks_reports_nothing() {
        let mut orchestrator = SyncOrchestrator::<&MockSheets>::new();
        assert!(!orchestrator.has_sinks());
        let report = orchestrator.save_session(&stopped_session()).await;
        assert_eq!(report, SaveReport::default());
        assert!(report.created().is_empty());
    }

    #[tokio::test]
    async fn first_save_initializes_then_syncs() {
        let dir = TempDir::new().unwrap();
        let mock = MockSheets::default();
        let mut orchestrator = SyncOrchestrator::new()
            .with_csv(CsvSink::new(dir.path().join("sessions.csv")))
            .with_sheet(SheetSink::new(&mock, "Crafts"));
        let session = stopped_session();

        let first = orchestrator.save_session(&session).await;
        assert_eq!(first.csv, Some(SinkOutcome::Initialized));
        assert_eq!(first.sheet, Some(SinkOutcome::Initialized));
        assert_eq!(first.created(), vec!["csv", "sheet"]);

        let second = orchestrator.save_session(&session).await;
        assert_eq!(second.csv, Some(SinkOutcome::Synced));
        assert_eq!(second.sheet, Some(SinkOutcome::Synced));
        assert!(second.created().is_empty());
        assert!(second.sheet_succeeded());

        assert!(orchestrator.csv_state().is_some());
        assert_eq!(orchestrator.sheet_state().unwrap().row_number(), 2);
        assert_eq!(mock.append_count(), 1);
    }

    #[tokio::test]
    async fn failing_csv_does_not_block_sheet() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mock = MockSheets::default();
        let mut orchestrator = SyncOrchestrator::new()
            .with_csv(CsvSink::new(blocker.join("sessions.csv")))
            .with_sheet(SheetSink::new(&mock, "Crafts"));
        let session = stopped_session();

        let first = orchestrator.save_session(&session).await;
        assert!(matches!(first.csv, Some(SinkOutcome::Failed(_))));
        assert_eq!(first.sheet, Some(SinkOutcome::Initialized));

        let second = orchestrator.save_session(&session).await;
        assert!(matches!(second.csv, Some(SinkOutcome::Failed(_))));
        assert_eq!(second.sheet, Some(SinkOutcome::Synced));
        assert!(orchestrator.csv_state().is_none());
    }

    #[tokio::test]
    async fn failing_sheet_does_not_block_csv() {
        let dir = TempDir::new().unwrap();
        let mock = MockSheets::failing();
        let mut orchestrator = SyncOrchestrator::new()
            .with_csv(CsvSink::new(dir.path().join("sessions.csv")))
            .with_sheet(SheetSink::new(&mock, "Crafts"));

        let report = orchestrator.save_session(&stopped_session()).await;
        assert_eq!(report.csv, Some(SinkOutcome::Initialized));
        assert!(matches!(report.sheet, Some(SinkOutcome::Failed(_))));
        assert!(!report.sheet_succeeded());
        assert!(orchestrator.sheet_state().is_none());
    }

    #[tokio::test]
    async fn failed_init_is_retried_on_next_save() {
        let dir = TempDir::new().unwrap();
        let mock = MockSheets::failing();
        let mut orchestrator = SyncOrchestrator::new()
            .with_csv(CsvSink::new(dir.path().join("sessions.csv")))
            .with_sheet(SheetSink::new(&mock, "Crafts"));
        let session = stopped_session();

        orchestrator.save_session(&session).await;
        mock.set_failing(false);
        let report = orchestrator.save_session(&session).await;
        assert_eq!(report.sheet, Some(SinkOutcome::Initialized));
        assert_eq!(report.csv, Some(SinkOutcome::Synced));
    }
}
