//! The sheet-like tabular store.
//!
//! Pipelines only see the narrow [`TabularStore`] contract: make sure a table
//! exists with the right header, read all of its rows, and swap out every
//! data row in one go. Two implementations ship with the crate:
//!
//! - [`MemoryStore`], an ordered list of named tables held in memory,
//! - [`CsvDirStore`], one `<Table>.csv` file per table inside a directory.
//!
//! Both honour the primary-table rule: when the primary table is missing,
//! the first pre-existing table is renamed to it instead of creating a new
//! one. Tables reserved for other record kinds are never taken over.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    delimited,
    error::{SyncError, SyncResult},
    io_utils,
    schema::{PRIMARY_TABLE, TableSchema},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    name: String,
}

impl TableHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub trait TabularStore {
    /// Creates `name` with `headers` if missing, or reinitialises it when its
    /// first cell does not match the first header. Idempotent.
    fn ensure_table(&mut self, name: &str, headers: &[String]) -> SyncResult<TableHandle>;

    /// Full contents, header row included.
    fn read_all(&self, table: &TableHandle) -> SyncResult<Vec<Vec<String>>>;

    /// Clears every row after the header, then appends `rows`.
    fn replace_data_rows(&mut self, table: &TableHandle, rows: &[Vec<String>]) -> SyncResult<()>;
}

fn builtin_tables() -> Vec<String> {
    TableSchema::builtin()
        .into_iter()
        .map(|schema| schema.table)
        .collect()
}

fn header_matches(existing: &[Vec<String>], headers: &[String]) -> bool {
    match existing.first() {
        Some(first_row) => first_row.first() == headers.first(),
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Vec<(String, Vec<Vec<String>>)>,
    primary: String,
    reserved: Vec<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            primary: PRIMARY_TABLE.to_string(),
            reserved: builtin_tables(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a table with raw rows, header first.
    pub fn with_table(mut self, name: &str, rows: Vec<Vec<String>>) -> Self {
        match self.tables.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = rows,
            None => self.tables.push((name.to_string(), rows)),
        }
        self
    }

    /// Names the primary table may not adopt. Defaults to the built-in tables.
    pub fn with_reserved_tables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn table(&self, name: &str) -> Option<&[Vec<String>]> {
        self.tables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn rows_mut(&mut self, name: &str) -> SyncResult<&mut Vec<Vec<String>>> {
        self.tables
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, rows)| rows)
            .ok_or_else(|| SyncError::Retrieval(format!("Table '{name}' does not exist")))
    }
}

impl TabularStore for MemoryStore {
    fn ensure_table(&mut self, name: &str, headers: &[String]) -> SyncResult<TableHandle> {
        if self.table(name).is_none() {
            let adoptable = if name == self.primary {
                self.tables
                    .iter()
                    .position(|(existing, _)| !self.reserved.contains(existing))
            } else {
                None
            };
            match adoptable {
                Some(idx) => {
                    debug!("Adopting table '{}' as '{name}'", self.tables[idx].0);
                    self.tables[idx].0 = name.to_string();
                }
                None => self.tables.push((name.to_string(), Vec::new())),
            }
        }
        let rows = self.rows_mut(name)?;
        if !header_matches(rows, headers) {
            rows.clear();
            rows.push(headers.to_vec());
        }
        Ok(TableHandle {
            name: name.to_string(),
        })
    }

    fn read_all(&self, table: &TableHandle) -> SyncResult<Vec<Vec<String>>> {
        self.table(table.name())
            .map(|rows| rows.to_vec())
            .ok_or_else(|| SyncError::Retrieval(format!("Table '{}' does not exist", table.name)))
    }

    fn replace_data_rows(&mut self, table: &TableHandle, rows: &[Vec<String>]) -> SyncResult<()> {
        let existing = self.rows_mut(table.name())?;
        existing.truncate(1);
        existing.extend(rows.iter().cloned());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CsvDirStore {
    root: PathBuf,
    primary: String,
    reserved: Vec<String>,
}

impl CsvDirStore {
    pub fn open(root: impl Into<PathBuf>) -> SyncResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|err| SyncError::retrieval(format!("Opening store {root:?}"), err))?;
        info!(
            "Using CSV store at {:?} (delimiter '{}')",
            root,
            io_utils::printable_delimiter(io_utils::DEFAULT_CSV_DELIMITER)
        );
        Ok(Self {
            root,
            primary: PRIMARY_TABLE.to_string(),
            reserved: builtin_tables(),
        })
    }

    /// Names the primary table may not adopt. Defaults to the built-in tables.
    pub fn with_reserved_tables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.csv"))
    }

    fn first_existing_table(&self) -> SyncResult<Option<PathBuf>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|err| SyncError::retrieval(format!("Listing {:?}", self.root), err))?;
        let mut tables = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .filter(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| !self.reserved.iter().any(|r| r == stem))
            })
            .collect::<Vec<_>>();
        tables.sort();
        Ok(tables.into_iter().next())
    }

    fn read_path(&self, path: &Path) -> SyncResult<Vec<Vec<String>>> {
        let text = fs::read_to_string(path)
            .map_err(|err| SyncError::retrieval(format!("Reading {path:?}"), err))?;
        Ok(delimited::parse(&text))
    }

    fn write_path(&self, path: &Path, rows: &[Vec<String>]) -> SyncResult<()> {
        io_utils::write_rows_atomically(path, rows)
            .map_err(|err| SyncError::write(format!("Writing {path:?}"), format!("{err:#}")))
    }
}

impl TabularStore for CsvDirStore {
    fn ensure_table(&mut self, name: &str, headers: &[String]) -> SyncResult<TableHandle> {
        let path = self.table_path(name);
        if !path.exists() && name == self.primary
            && let Some(existing) = self.first_existing_table()?
        {
            info!("Adopting {:?} as table '{name}'", existing);
            fs::rename(&existing, &path)
                .map_err(|err| SyncError::write(format!("Renaming {existing:?}"), err))?;
        }
        let rows = if path.exists() {
            self.read_path(&path)?
        } else {
            Vec::new()
        };
        if !header_matches(&rows, headers) {
            debug!("Initialising table '{name}' with {} column(s)", headers.len());
            self.write_path(&path, &[headers.to_vec()])?;
        }
        Ok(TableHandle {
            name: name.to_string(),
        })
    }

    fn read_all(&self, table: &TableHandle) -> SyncResult<Vec<Vec<String>>> {
        self.read_path(&self.table_path(table.name()))
    }

    fn replace_data_rows(&mut self, table: &TableHandle, rows: &[Vec<String>]) -> SyncResult<()> {
        let path = self.table_path(table.name());
        let mut contents = self
            .read_path(&path)
            .map_err(|err| SyncError::Write(err.to_string()))?;
        contents.truncate(1);
        contents.extend(rows.iter().cloned());
        self.write_path(&path, &contents)
    }
}
