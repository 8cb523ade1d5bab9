//! Spreadsheet sink.
//!
//! The first save appends the session's row and remembers the row number the
//! remote reports back; every later save updates exactly that row.

use super::batch::{BatchSink, PendingSession};
use super::{RowSink, SinkError};
use crate::row::{HEADERS, RowProjection};
use crate::session::Session;

/// The subset of a spreadsheet values API the sinks need.
///
/// Ranges are A1 notation (`'Sheet'!A1:G1`). Values are written so that
/// formulas are evaluated.
#[allow(async_fn_in_trait)]
pub trait SheetsApi {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, Self::Error>;

    async fn update_values(&self, range: &str, rows: &[Vec<String>]) -> Result<(), Self::Error>;

    /// Appends rows after the last table row and returns the updated range.
    async fn append_values(&self, range: &str, rows: &[Vec<String>])
    -> Result<String, Self::Error>;
}

impl<T: SheetsApi> SheetsApi for &T {
    type Error = T::Error;

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, Self::Error> {
        (**self).get_values(range).await
    }

    async fn update_values(&self, range: &str, rows: &[Vec<String>]) -> Result<(), Self::Error> {
        (**self).update_values(range, rows).await
    }

    async fn append_values(
        &self,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<String, Self::Error> {
        (**self).append_values(range, rows).await
    }
}

/// Row handle for a session in the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetSyncState {
    row_number: u32,
}

impl SheetSyncState {
    /// 1-based row number.
    pub const fn row_number(&self) -> u32 {
        self.row_number
    }
}

/// Writes session rows into one sheet of a spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetSink<A> {
    api: A,
    sheet_name: String,
}

/// Quotes a sheet name for A1 notation, doubling embedded single quotes.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Extracts the first row number from an A1 range such as `'Sheet'!A5:G5`.
///
/// A missing or zero row number is an error.
pub fn row_number_from_range(range: &str) -> Result<u32, SinkError> {
    let bad = || SinkError::RowNumber(range.to_string());
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let first_cell = cells.split(':').next().unwrap_or(cells);
    let digits = first_cell.trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '$');
    let row: u32 = digits.parse().map_err(|_| bad())?;
    if row == 0 {
        return Err(bad());
    }
    Ok(row)
}

fn remote<E: std::error::Error + Send + Sync + 'static>(err: E) -> SinkError {
    SinkError::Remote(Box::new(err))
}

impl<A: SheetsApi> SheetSink<A> {
    pub fn new(api: A, sheet_name: impl Into<String>) -> Self {
        Self {
            api,
            sheet_name: sheet_name.into(),
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn header_range(&self) -> String {
        format!("{}!A1:G1", quote_sheet_name(&self.sheet_name))
    }

    fn table_range(&self) -> String {
        format!("{}!A:G", quote_sheet_name(&self.sheet_name))
    }

    fn row_range(&self, row: u32) -> String {
        format!("{}!A{row}:G{row}", quote_sheet_name(&self.sheet_name))
    }

    /// Writes the header row if the sheet has none.
    async fn ensure_header(&self) -> Result<(), SinkError> {
        let range = self.header_range();
        let existing = self.api.get_values(&range).await.map_err(remote)?;
        let has_header = existing
            .first()
            .is_some_and(|row| row.iter().any(|cell| !cell.is_empty()));
        if has_header {
            return Ok(());
        }

        tracing::debug!(sheet = %self.sheet_name, "writing header row");
        let header = vec![HEADERS.iter().map(ToString::to_string).collect()];
        self.api
            .update_values(&range, &header)
            .await
            .map_err(remote)
    }
}

impl<A: SheetsApi> RowSink for SheetSink<A> {
    type State = SheetSyncState;

    fn name(&self) -> &'static str {
        "sheet"
    }

    async fn init_row(&self, session: &Session) -> Result<SheetSyncState, SinkError> {
        self.ensure_header().await?;

        let row = vec![RowProjection::of(session).into_sheet_row()];
        let updated = self
            .api
            .append_values(&self.table_range(), &row)
            .await
            .map_err(remote)?;
        let row_number = row_number_from_range(&updated)?;

        tracing::debug!(sheet = %self.sheet_name, row_number, "created sheet row");
        Ok(SheetSyncState { row_number })
    }

    async fn sync_row(&self, state: &SheetSyncState, session: &Session) -> Result<(), SinkError> {
        let row = vec![RowProjection::of(session).into_sheet_row()];
        self.api
            .update_values(&self.row_range(state.row_number), &row)
            .await
            .map_err(remote)
    }
}

impl<A: SheetsApi> BatchSink for SheetSink<A> {
    /// Rewrites rows the live loop already created and appends the rest in
    /// one call.
    async fn write_sessions(&self, sessions: &[PendingSession]) -> Result<(), SinkError> {
        if sessions.is_empty() {
            return Ok(());
        }
        self.ensure_header().await?;

        let mut appended = Vec::new();
        for pending in sessions {
            let row = RowProjection::of(&pending.session).into_sheet_row();
            match pending.sheet_row {
                Some(row_number) => {
                    self.api
                        .update_values(&self.row_range(row_number), &[row])
                        .await
                        .map_err(remote)?;
                }
                None => appended.push(row),
            }
        }
        let updated = sessions.len() - appended.len();
        if appended.is_empty() {
            tracing::debug!(sheet = %self.sheet_name, updated, "rewrote session rows");
            return Ok(());
        }

        let range = self
            .api
            .append_values(&self.table_range(), &appended)
            .await
            .map_err(remote)?;
        tracing::debug!(
            sheet = %self.sheet_name,
            updated,
            appended = appended.len(),
            %range,
            "wrote session rows"
        );
        Ok(())
    }
}
