//! Raw delimited-text sources feeding the migration.
//!
//! The migration reads each table as exported text rather than through the
//! [`crate::store::TabularStore`] contract, so it can run against the hosted
//! spreadsheet's CSV export without any write access.

use std::path::PathBuf;

use log::debug;
use reqwest::{Url, blocking::Client};

use crate::error::{SyncError, SyncResult};

pub const DEFAULT_EXPORT_BASE: &str = "https://docs.google.com";

pub trait SheetSource: Sync {
    /// Returns the table's full contents as delimited text.
    fn fetch_text(&self, table: &str) -> SyncResult<String>;
}

/// Fetches tables from the spreadsheet CSV export endpoint.
#[derive(Debug, Clone)]
pub struct SheetExportSource {
    client: Client,
    base_url: String,
    sheet_id: String,
}

impl SheetExportSource {
    pub fn new(sheet_id: &str) -> Self {
        Self::with_base_url(DEFAULT_EXPORT_BASE, sheet_id)
    }

    pub fn with_base_url(base_url: &str, sheet_id: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            sheet_id: sheet_id.to_string(),
        }
    }

    pub fn export_url(&self, table: &str) -> SyncResult<Url> {
        let base = format!(
            "{}/spreadsheets/d/{}/gviz/tq",
            self.base_url, self.sheet_id
        );
        Url::parse_with_params(&base, &[("tqx", "out:csv"), ("sheet", table)])
            .map_err(|err| SyncError::Config(format!("Invalid export URL '{base}': {err}")))
    }
}

impl SheetSource for SheetExportSource {
    fn fetch_text(&self, table: &str) -> SyncResult<String> {
        let url = self.export_url(table)?;
        debug!("Fetching {table} from {url}");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::retrieval(format!("Failed to fetch {table}"), err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Retrieval(format!(
                "Failed to fetch {table}: {}",
                status.as_u16()
            )));
        }
        response
            .text()
            .map_err(|err| SyncError::retrieval(format!("Failed to read {table}"), err))
    }
}

/// Reads `<root>/<table>.csv` files, e.g. a directory written by
/// [`crate::store::CsvDirStore`] or a manual export.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SheetSource for DirSource {
    fn fetch_text(&self, table: &str) -> SyncResult<String> {
        let path = self.root.join(format!("{table}.csv"));
        std::fs::read_to_string(&path)
            .map_err(|err| {
                SyncError::retrieval(format!("Failed to fetch {table} from {path:?}"), err)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_url_encodes_table_name() {
        let source = SheetExportSource::with_base_url("https://sheets.test/", "abc123");
        let url = source.export_url("Fly Stocks").unwrap();
        assert!(url
            .as_str()
            .starts_with("https://sheets.test/spreadsheets/d/abc123/gviz/tq?"));
        let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                ("tqx".to_string(), "out:csv".to_string()),
                ("sheet".to_string(), "Fly Stocks".to_string())
            ]
        );
    }

    #[test]
    fn dir_source_reports_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirSource::new(dir.path()).fetch_text("Pins").unwrap_err();
        assert!(err.to_string().contains("Failed to fetch Pins"));
    }
}
