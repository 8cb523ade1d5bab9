//! CSV file sink.
//!
//! The session's row is always the last one in the file. It is rewritten by
//! truncating the file back to the byte offset where the row starts and
//! writing the fresh projection there; bytes before the offset are never
//! touched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::{RowSink, SinkError};
use crate::row::{HEADERS, RowProjection};
use crate::session::Session;

/// Appends one row per session to a local CSV file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

/// Where this session's row begins in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSyncState {
    file_path: PathBuf,
    row_offset: u64,
}

impl CsvSyncState {
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub const fn row_offset(&self) -> u64 {
        self.row_offset
    }
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn init_file(&self, session: &Session) -> Result<CsvSyncState, SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        FileExt::lock_exclusive(&file).map_err(|e| self.io_error(e))?;

        if file_len(&file).map_err(|e| self.io_error(e))? == 0 {
            let header = encode_record(HEADERS)?;
            file.write_all(&header).map_err(|e| self.io_error(e))?;
        } else if !ends_with_newline(&mut file).map_err(|e| self.io_error(e))? {
            // Our row must start on a line of its own.
            file.write_all(b"\n").map_err(|e| self.io_error(e))?;
        }
        let row_offset = file_len(&file).map_err(|e| self.io_error(e))?;

        let row = encode_record(RowProjection::of(session).into_record())?;
        file.write_all(&row).map_err(|e| self.io_error(e))?;
        file.flush().map_err(|e| self.io_error(e))?;

        tracing::debug!(path = ?self.path, row_offset, "created csv row");
        Ok(CsvSyncState {
            file_path: self.path.clone(),
            row_offset,
        })
    }

    fn rewrite_row(state: &CsvSyncState, session: &Session) -> Result<(), SinkError> {
        let io_error = |source| SinkError::Io {
            path: state.file_path.clone(),
            source,
        };
        let row = encode_record(RowProjection::of(session).into_record())?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(&state.file_path)
            .map_err(io_error)?;
        FileExt::lock_exclusive(&file).map_err(io_error)?;

        let len = file_len(&file).map_err(io_error)?;
        if len < state.row_offset {
            return Err(SinkError::OffsetBeyondEnd {
                path: state.file_path.clone(),
                len,
                offset: state.row_offset,
            });
        }

        file.set_len(state.row_offset).map_err(io_error)?;
        file.seek(SeekFrom::Start(state.row_offset))
            .map_err(io_error)?;
        file.write_all(&row).map_err(io_error)?;
        file.flush().map_err(io_error)?;
        Ok(())
    }
}

impl RowSink for CsvSink {
    type State = CsvSyncState;

    fn name(&self) -> &'static str {
        "csv"
    }

    async fn init_row(&self, session: &Session) -> Result<CsvSyncState, SinkError> {
        self.init_file(session)
    }

    async fn sync_row(&self, state: &CsvSyncState, session: &Session) -> Result<(), SinkError> {
        Self::rewrite_row(state, session)
    }
}

fn file_len(file: &File) -> io::Result<u64> {
    file.metadata().map(|meta| meta.len())
}

/// Whether a non-empty file's last byte is `\n`.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Encodes one record with RFC 4180 quoting and a `\n` terminator.
fn encode_record<I, T>(fields: I) -> Result<Vec<u8>, SinkError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| SinkError::Csv(e.into_error().into()))
}
