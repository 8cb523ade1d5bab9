//! Core domain logic for craftie.
//!
//! This crate contains:
//! - Session: the unit of tracked work and its elapsed-time arithmetic
//! - Timer: duration expressions and the optional end-of-session deadline
//! - Row projection: the fixed column layout shared by every sink
//! - Sync: CSV and spreadsheet backends, the orchestrator, and batch retry

pub mod row;
pub mod session;
pub mod sync;
pub mod timer;

pub use row::{HEADERS, IN_PROGRESS, RowProjection};
pub use session::Session;
pub use sync::{
    BatchSink, BatchSyncError, CsvSink, CsvSyncState, PendingSession, RetryPolicy, RowSink,
    SaveReport, SheetSink, SheetSyncState, SheetsApi, SinkError, SinkOutcome, SyncOrchestrator,
    flush_with_retry,
};
pub use timer::{DurationError, EndTimer, parse_duration};
