//! The tracked work session.
//!
//! A [`Session`] is created when tracking starts and stopped exactly once when
//! tracking ends. Its duration is always derived from the timestamps, never
//! stored, so every read reflects the current wall clock.

use chrono::{DateTime, TimeDelta, Utc};

/// One continuous, named interval of tracked work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    project: String,
    task: String,
    notes: String,
}

impl Session {
    /// Starts a new session at the current instant.
    pub fn start(
        project: impl Into<String>,
        task: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self::from_parts(Utc::now(), None, project, task, notes)
    }

    /// Rebuilds a session from stored timestamps.
    ///
    /// An end time earlier than the start time is clamped to the start time.
    pub fn from_parts(
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        project: impl Into<String>,
        task: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            start_time,
            end_time: end_time.map(|end| end.max(start_time)),
            project: project.into(),
            task: task.into(),
            notes: notes.into(),
        }
    }

    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub const fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub const fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    /// Stops the session now.
    ///
    /// Returns `false` without touching the end time if the session was
    /// already stopped.
    pub fn stop(&mut self) -> bool {
        self.stop_at(Utc::now())
    }

    /// Stops the session at the given instant, clamped to the start time.
    pub fn stop_at(&mut self, at: DateTime<Utc>) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(at.max(self.start_time));
        true
    }

    /// Elapsed time: `end - start` once stopped, `now - start` while running.
    pub fn current_duration(&self) -> TimeDelta {
        self.duration_at(Utc::now())
    }

    /// Elapsed time as observed at `now`. Never negative.
    pub fn duration_at(&self, now: DateTime<Utc>) -> TimeDelta {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).max(TimeDelta::zero())
    }
}
