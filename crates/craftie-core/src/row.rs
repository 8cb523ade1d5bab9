//! Row projection shared by the CSV and spreadsheet sinks.

use std::fmt::Display;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};

use crate::session::Session;

/// Column headers, in sink order.
pub const HEADERS: [&str; 7] = [
    "Project",
    "Task",
    "Date",
    "Start Time",
    "End Time",
    "Duration",
    "Notes",
];

/// End-time marker written while a session is still running.
pub const IN_PROGRESS: &str = "In Progress";

/// Spreadsheet formula for a finished row's duration: End Time (E) minus Start Time (D).
pub const DURATION_FORMULA: &str = r#"=INDIRECT("E"&ROW())-INDIRECT("D"&ROW())"#;

const DATE_FORMAT: &str = "%Y-%m-%d";
const CLOCK_FORMAT: &str = "%H:%M:%S";

/// The fixed-column view of a session at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowProjection {
    pub project: String,
    pub task: String,
    pub date: String,
    pub start_clock: String,
    pub end_clock: String,
    pub duration: String,
    pub notes: String,
    ended: bool,
}

impl RowProjection {
    /// Projects the session as of now, in local time.
    pub fn of(session: &Session) -> Self {
        Self::at(session, Utc::now(), &Local)
    }

    /// Projects the session as observed at `now`, rendering clocks in `tz`.
    pub fn at<Tz>(session: &Session, now: DateTime<Utc>, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let start = session.start_time().with_timezone(tz);
        let end_clock = session.end_time().map_or_else(
            || IN_PROGRESS.to_string(),
            |end| end.with_timezone(tz).format(CLOCK_FORMAT).to_string(),
        );

        Self {
            project: session.project().to_string(),
            task: session.task().to_string(),
            date: start.format(DATE_FORMAT).to_string(),
            start_clock: start.format(CLOCK_FORMAT).to_string(),
            end_clock,
            duration: format_hms(session.duration_at(now)),
            notes: session.notes().to_string(),
            ended: !session.is_running(),
        }
    }

    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Literal cells, as written to the CSV file.
    pub fn into_record(self) -> Vec<String> {
        vec![
            self.project,
            self.task,
            self.date,
            self.start_clock,
            self.end_clock,
            self.duration,
            self.notes,
        ]
    }

    /// Spreadsheet cells: a finished row computes its duration remotely.
    pub fn into_sheet_row(self) -> Vec<String> {
        let ended = self.ended;
        let mut row = self.into_record();
        if ended {
            row[5] = DURATION_FORMULA.to_string();
        }
        row
    }
}

/// Formats a duration as `HH:MM:SS`; hours keep growing past 24.
pub fn format_hms(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Formats an instant as a local wall-clock time, matching the sink columns.
pub fn format_clock(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format(CLOCK_FORMAT).to_string()
}
