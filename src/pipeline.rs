//! Sync operations.
//!
//! - [`snapshot`]: read every table from a tabular store into one combined
//!   JSON object keyed by relational table name.
//! - [`replace`]: swap the full contents of every table present in a
//!   payload; absent tables are untouched.
//! - [`migrate`]: pull raw delimited text for every table, map it to
//!   relational form and upsert it into a sink in fixed-size batches.
//!
//! [`handle_get`] and [`handle_post`] wrap the first two for request
//! handlers: failures come back in-band as `{"error": ...}`.

use std::thread;

use heck::ToLowerCamelCase;
use log::{info, warn};
use serde_json::{Map, Value, json};

use crate::{
    coerce::CoercionReport,
    delimited,
    error::{SyncError, SyncResult},
    mapper::{FieldMapper, RelationalRecord},
    schema::TableSchema,
    sink::RelationalSink,
    source::SheetSource,
    store::TabularStore,
};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Reads every table in `schemas` and returns `{ <relational_table>: [...] }`.
pub fn snapshot<T: TabularStore + ?Sized>(
    store: &mut T,
    schemas: &[TableSchema],
) -> SyncResult<Map<String, Value>> {
    let mut combined = Map::new();
    for schema in schemas {
        let handle = store.ensure_table(&schema.table, &schema.headers())?;
        let rows = store.read_all(&handle)?;
        let mapper = FieldMapper::new(schema);
        let records = match rows.split_first() {
            Some((header, body)) => {
                let header = header.iter().map(|h| h.trim().to_string()).collect::<Vec<_>>();
                body.iter()
                    .filter_map(|row| mapper.to_snapshot(&header, row))
                    .map(Value::Object)
                    .collect::<Vec<_>>()
            }
            None => Vec::new(),
        };
        info!("{}: read {} record(s)", schema.table, records.len());
        combined.insert(schema.relational_table.clone(), Value::Array(records));
    }
    Ok(combined)
}

/// Rows written per table by [`replace`], in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub counts: Vec<(String, usize)>,
}

impl ReplaceSummary {
    pub fn count(&self, relational_table: &str) -> usize {
        self.counts
            .iter()
            .find(|(table, _)| table == relational_table)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// `{ "success": true, "stockCount": n, ... }`, one count per schema.
    pub fn to_response(&self, schemas: &[TableSchema]) -> Value {
        let mut response = Map::new();
        response.insert("success".to_string(), Value::Bool(true));
        for schema in schemas {
            response.insert(
                count_key(&schema.relational_table),
                json!(self.count(&schema.relational_table)),
            );
        }
        Value::Object(response)
    }
}

fn count_key(relational_table: &str) -> String {
    let singular = match relational_table.strip_suffix("sses") {
        Some(stem) => format!("{stem}ss"),
        None => relational_table
            .strip_suffix('s')
            .unwrap_or(relational_table)
            .to_string(),
    };
    format!("{singular}_count").to_lower_camel_case()
}

/// Replaces the data rows of every table present in `payload`.
///
/// The whole payload is validated before anything is written. A store
/// failure part way through leaves earlier tables written.
pub fn replace<T: TabularStore + ?Sized>(
    store: &mut T,
    schemas: &[TableSchema],
    payload: &Value,
) -> SyncResult<ReplaceSummary> {
    let payload = payload
        .as_object()
        .ok_or_else(|| SyncError::Payload("expected a JSON object".to_string()))?;

    let mut pending = Vec::new();
    for schema in schemas {
        let records = match payload.get(&schema.relational_table) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(SyncError::Payload(format!(
                    "'{}' must be an array",
                    schema.relational_table
                )));
            }
        };
        let mapper = FieldMapper::new(schema);
        let rows = records
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                item.as_object()
                    .map(|record| mapper.to_positional_row(record))
                    .ok_or_else(|| {
                        SyncError::Payload(format!(
                            "{}[{idx}] must be an object",
                            schema.relational_table
                        ))
                    })
            })
            .collect::<SyncResult<Vec<_>>>()?;
        pending.push((schema, rows));
    }

    let mut summary = ReplaceSummary::default();
    for (schema, rows) in pending {
        let handle = store.ensure_table(&schema.table, &schema.headers())?;
        store.replace_data_rows(&handle, &rows)?;
        info!("{}: wrote {} row(s)", schema.table, rows.len());
        summary
            .counts
            .push((schema.relational_table.clone(), rows.len()));
    }
    Ok(summary)
}

/// GET handler: the combined snapshot, or `{"error": message}`.
pub fn handle_get<T: TabularStore + ?Sized>(store: &mut T, schemas: &[TableSchema]) -> Value {
    match snapshot(store, schemas) {
        Ok(combined) => Value::Object(combined),
        Err(err) => error_payload(&err),
    }
}

/// POST handler: replace summary, or `{"error": message}`.
pub fn handle_post<T: TabularStore + ?Sized>(
    store: &mut T,
    schemas: &[TableSchema],
    body: &str,
) -> Value {
    let outcome = serde_json::from_str::<Value>(body)
        .map_err(|err| SyncError::Parse(format!("request body is not JSON: {err}")))
        .and_then(|payload| replace(store, schemas, &payload));
    match outcome {
        Ok(summary) => summary.to_response(schemas),
        Err(err) => error_payload(&err),
    }
}

fn error_payload(err: &SyncError) -> Value {
    warn!("Request failed: {err}");
    json!({ "error": err.to_string() })
}

/// Outcome of migrating one table.
#[derive(Debug, Clone, Default)]
pub struct TableMigration {
    pub table: String,
    /// Data rows found in the source text.
    pub fetched: usize,
    /// Rows left after dropping those without a primary key.
    pub kept: usize,
    pub upserted: usize,
    pub batches: usize,
    pub degraded: CoercionReport,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub tables: Vec<TableMigration>,
}

impl MigrationReport {
    pub fn total_upserted(&self) -> usize {
        self.tables.iter().map(|t| t.upserted).sum()
    }
}

/// Parses and maps one table's raw text into relational records.
pub fn prepare_table(schema: &TableSchema, text: &str) -> (TableMigration, Vec<RelationalRecord>) {
    let mapper = FieldMapper::new(schema);
    let records = delimited::parse_records(text);
    let mut outcome = TableMigration {
        table: schema.relational_table.clone(),
        fetched: records.len(),
        ..TableMigration::default()
    };
    let rows = records
        .iter()
        .filter(|record| mapper.has_key(record))
        .map(|record| mapper.to_relational(record, &mut outcome.degraded))
        .collect::<Vec<_>>();
    outcome.kept = rows.len();
    (outcome, rows)
}

/// Upserts `rows` in order, one batch at a time, stopping at the first
/// rejected batch. Returns the number of batches sent.
pub fn upsert_batches<K: RelationalSink + ?Sized>(
    sink: &mut K,
    table: &str,
    rows: &[RelationalRecord],
    batch_size: usize,
) -> SyncResult<usize> {
    if batch_size == 0 {
        return Err(SyncError::Config("batch size must be positive".to_string()));
    }
    if rows.is_empty() {
        info!("{table}: 0 rows, skipping");
        return Ok(0);
    }
    let mut sent = 0usize;
    for (idx, batch) in rows.chunks(batch_size).enumerate() {
        sink.upsert(table, batch)
            .map_err(|failure| SyncError::UpstreamBatch {
                table: table.to_string(),
                batch: idx + 1,
                status: failure.status,
                body: failure.body,
            })?;
        sent += 1;
    }
    info!("{table}: {} rows upserted in {sent} batch(es)", rows.len());
    Ok(sent)
}

/// Fetches every table concurrently, then maps and upserts them one table
/// at a time in schema order. The first failure aborts the run; batches
/// already accepted stay committed.
pub fn migrate<S, K>(
    source: &S,
    sink: &mut K,
    schemas: &[TableSchema],
    batch_size: usize,
) -> SyncResult<MigrationReport>
where
    S: SheetSource + ?Sized,
    K: RelationalSink + ?Sized,
{
    if batch_size == 0 {
        return Err(SyncError::Config("batch size must be positive".to_string()));
    }

    let fetched = thread::scope(|scope| {
        let handles = schemas
            .iter()
            .map(|schema| scope.spawn(move || source.fetch_text(&schema.table)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(SyncError::Retrieval("table fetch panicked".to_string()))
                })
            })
            .collect::<SyncResult<Vec<_>>>()
    })?;

    let mut report = MigrationReport::default();
    for (schema, text) in schemas.iter().zip(fetched) {
        let (mut outcome, rows) = prepare_table(schema, &text);
        info!(
            "{}: {} row(s) fetched, {} with a primary key",
            schema.table, outcome.fetched, outcome.kept
        );
        if !outcome.degraded.is_empty() {
            warn!(
                "{}: {} value(s) degraded during coercion",
                schema.table,
                outcome.degraded.total()
            );
        }
        outcome.batches = upsert_batches(sink, &schema.relational_table, &rows, batch_size)?;
        outcome.upserted = rows.len();
        report.tables.push(outcome);
    }
    Ok(report)
}
