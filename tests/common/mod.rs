#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sheet_bridge::error::{SyncError, SyncResult};
use sheet_bridge::mapper::RelationalRecord;
use sheet_bridge::sink::{RelationalSink, SinkFailure};
use sheet_bridge::source::SheetSource;
use sheet_bridge::store::{TableHandle, TabularStore};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Serves table text from memory.
#[derive(Default)]
pub struct MapSource {
    pub tables: HashMap<String, String>,
}

impl MapSource {
    pub fn with(mut self, table: &str, text: &str) -> Self {
        self.tables.insert(table.to_string(), text.to_string());
        self
    }
}

impl SheetSource for MapSource {
    fn fetch_text(&self, table: &str) -> SyncResult<String> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| SyncError::Retrieval(format!("Failed to fetch {table}: 404")))
    }
}

/// Records every batch it receives and can reject one chosen batch.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Vec<(String, Vec<RelationalRecord>)>,
    /// (table, 1-based batch number) to reject.
    pub fail_on: Option<(String, usize)>,
    calls: HashMap<String, usize>,
}

impl RecordingSink {
    pub fn failing_on(table: &str, batch: usize) -> Self {
        Self {
            fail_on: Some((table.to_string(), batch)),
            ..Self::default()
        }
    }

    pub fn sizes(&self, table: &str) -> Vec<usize> {
        self.batches
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, rows)| rows.len())
            .collect()
    }
}

impl RelationalSink for RecordingSink {
    fn upsert(&mut self, table: &str, rows: &[RelationalRecord]) -> Result<(), SinkFailure> {
        let call = self.calls.entry(table.to_string()).or_insert(0);
        *call += 1;
        if let Some((fail_table, fail_batch)) = &self.fail_on
            && fail_table == table
            && *fail_batch == *call
        {
            return Err(SinkFailure {
                status: 409,
                body: "duplicate key value violates unique constraint".to_string(),
            });
        }
        self.batches.push((table.to_string(), rows.to_vec()));
        Ok(())
    }
}

/// A store whose every operation fails.
pub struct BrokenStore;

impl TabularStore for BrokenStore {
    fn ensure_table(&mut self, name: &str, _headers: &[String]) -> SyncResult<TableHandle> {
        Err(SyncError::Retrieval(format!(
            "You do not have permission to access {name}"
        )))
    }

    fn read_all(&self, _table: &TableHandle) -> SyncResult<Vec<Vec<String>>> {
        Err(SyncError::Retrieval("unreachable".to_string()))
    }

    fn replace_data_rows(&mut self, _table: &TableHandle, _rows: &[Vec<String>]) -> SyncResult<()> {
        Err(SyncError::Write("unreachable".to_string()))
    }
}

/// Delegates to a memory store but rejects writes to one table.
pub struct ReadOnlyTableStore {
    pub inner: sheet_bridge::store::MemoryStore,
    pub read_only: String,
}

impl TabularStore for ReadOnlyTableStore {
    fn ensure_table(&mut self, name: &str, headers: &[String]) -> SyncResult<TableHandle> {
        self.inner.ensure_table(name, headers)
    }

    fn read_all(&self, table: &TableHandle) -> SyncResult<Vec<Vec<String>>> {
        self.inner.read_all(table)
    }

    fn replace_data_rows(&mut self, table: &TableHandle, rows: &[Vec<String>]) -> SyncResult<()> {
        if table.name() == self.read_only {
            return Err(SyncError::Write(format!(
                "The sheet {} is protected",
                table.name()
            )));
        }
        self.inner.replace_data_rows(table, rows)
    }
}
