//! Raw loader: copies the data lake's daily logs into the warehouse.
//!
//! One file is one transaction. Lines are parsed independently: a malformed
//! line is logged and skipped while the rest of its file still loads. A file
//! that cannot be read or inserted is rolled back and reported, and loading
//! moves on to the next file. Nothing is de-duplicated, so loading the same
//! files twice stores every row twice.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::{PipelineError, Result};
use crate::metrics::{self, LINES_SKIPPED, ROWS_LOADED};
use crate::models::{MessageRecord, RawMessage};

/// A file that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a load run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub files_loaded: usize,
    pub files_failed: usize,
    pub rows_inserted: usize,
    pub lines_skipped: usize,
    pub failures: Vec<FileFailure>,
}

/// Rows parsed from one file
#[derive(Debug, Default)]
struct ParsedFile {
    rows: Vec<RawMessage>,
    skipped: usize,
}

/// Loads `{root}/{channel}/*.json` into the raw message table
pub struct RawLoader {
    db: Database,
    root: PathBuf,
}

impl RawLoader {
    pub fn new(db: Database, root: impl Into<PathBuf>) -> Self {
        Self { db, root: root.into() }
    }

    /// Load every log file under the root, channel by channel
    pub fn load_all(&self) -> Result<LoadReport> {
        if !self.root.is_dir() {
            return Err(PipelineError::InvalidInput(format!(
                "data lake directory not found: {}",
                self.root.display()
            )));
        }

        let mut report = LoadReport::default();
        for channel_dir in sorted_entries(&self.root, |p| p.is_dir())? {
            let Some(channel) = channel_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            info!(channel = %channel, "Processing channel");

            let files = sorted_entries(&channel_dir, |p| {
                p.is_file() && p.extension().is_some_and(|ext| ext == "json")
            })?;
            for file in files {
                match self.load_file(&channel, &file) {
                    Ok((inserted, skipped)) => {
                        report.files_loaded += 1;
                        report.rows_inserted += inserted;
                        report.lines_skipped += skipped;
                    }
                    Err(e) if e.is_fatal() => {
                        error!(file = %file.display(), error = %e, "Aborting load");
                        return Err(e);
                    }
                    Err(e) => {
                        error!(file = %file.display(), error = %e, "Failed to load file, rolled back");
                        report.files_failed += 1;
                        report.failures.push(FileFailure {
                            path: file.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            files = report.files_loaded,
            failed = report.files_failed,
            rows = report.rows_inserted,
            skipped_lines = report.lines_skipped,
            "Finished loading data to the warehouse"
        );
        Ok(report)
    }

    /// Load one daily log; returns `(rows inserted, lines skipped)`
    pub fn load_file(&self, channel: &str, path: &Path) -> Result<(usize, usize)> {
        info!(file = %path.display(), "Loading file");
        let content = fs::read(path)?;
        let parsed = parse_log(channel, path, &content);
        metrics::increment(LINES_SKIPPED, parsed.skipped);

        if parsed.rows.is_empty() {
            warn!(file = %path.display(), "No data in file");
            return Ok((0, parsed.skipped));
        }

        let inserted = self.db.insert_raw_messages(&parsed.rows)?;
        metrics::increment(ROWS_LOADED, inserted);
        info!(file = %path.display(), rows = inserted, "Loaded messages");
        Ok((inserted, parsed.skipped))
    }
}

/// Split raw file bytes into lines; a line that is not UTF-8 only loses itself
fn parse_log(channel: &str, path: &Path, content: &[u8]) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    for (index, bytes) in content.split(|b| *b == b'\n').enumerate() {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        let result = std::str::from_utf8(bytes)
            .map_err(|e| PipelineError::Other(format!("invalid UTF-8: {e}")))
            .and_then(|line| {
                if line.trim().is_empty() {
                    Ok(None)
                } else {
                    parse_line(channel, line).map(Some)
                }
            });
        match result {
            Ok(Some(row)) => parsed.rows.push(row),
            Ok(None) => {}
            Err(e) => {
                warn!(file = %path.display(), line = index + 1, error = %e, "Skipping malformed line");
                parsed.skipped += 1;
            }
        }
    }
    parsed
}

/// Parse one log line; the channel always comes from the directory name
fn parse_line(channel: &str, line: &str) -> Result<RawMessage> {
    let mut record: MessageRecord = serde_json::from_str(line)?;
    record.channel_name = channel.to_string();
    record.validate()?;
    Ok(RawMessage {
        record,
        raw_data: line.to_string(),
    })
}

fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if keep(&path) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}
