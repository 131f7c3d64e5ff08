//! The relational upsert sink.

use log::{debug, info};
use reqwest::blocking::Client;

use crate::mapper::RelationalRecord;

/// Why the sink refused a batch. `status` is 0 when no response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailure {
    pub status: u16,
    pub body: String,
}

pub trait RelationalSink {
    /// Upserts one batch into `table`, merging on primary-key conflicts.
    fn upsert(&mut self, table: &str, rows: &[RelationalRecord]) -> Result<(), SinkFailure>;
}

/// PostgREST-style endpoint: `POST {url}/rest/v1/{table}` with a
/// merge-duplicates preference.
#[derive(Debug, Clone)]
pub struct RestSink {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestSink {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }
}

impl RelationalSink for RestSink {
    fn upsert(&mut self, table: &str, rows: &[RelationalRecord]) -> Result<(), SinkFailure> {
        let response = self
            .client
            .post(self.endpoint(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows)
            .send()
            .map_err(|err| SinkFailure {
                status: 0,
                body: err.to_string(),
            })?;
        let status = response.status();
        if status.is_success() {
            debug!("{table}: {} row(s) accepted ({})", rows.len(), status.as_u16());
            return Ok(());
        }
        let body = failure_body(response.text());
        Err(SinkFailure {
            status: status.as_u16(),
            body,
        })
    }
}

/// Keeps the read error as the body when the backend's message cannot be read.
fn failure_body<E: std::fmt::Display>(read: Result<String, E>) -> String {
    read.unwrap_or_else(|err| format!("<unreadable response body: {err}>"))
}

/// Accepts every batch without sending anything; used for `--dry-run`.
#[derive(Debug, Default)]
pub struct DryRunSink {
    pub batches: Vec<(String, usize)>,
}

impl RelationalSink for DryRunSink {
    fn upsert(&mut self, table: &str, rows: &[RelationalRecord]) -> Result<(), SinkFailure> {
        info!("[dry-run] {table}: would upsert {} row(s)", rows.len());
        self.batches.push((table.to_string(), rows.len()));
        Ok(())
    }
}
