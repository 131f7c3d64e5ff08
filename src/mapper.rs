//! Schema-driven translation between the record shapes.
//!
//! A [`FieldMapper`] binds one [`TableSchema`] and converts between:
//!
//! - **tabular records**: header-keyed string cells as read from a sheet,
//! - **relational records**: snake_case keys with native JSON values,
//! - **positional rows**: cells in sheet header order, ready to write,
//! - **snapshot records**: the UI read shape, tabular names with string
//!   values except for boolean fields.

use log::debug;
use serde_json::{Map, Value};

use crate::{
    coerce::{self, CoercionReport},
    delimited::TabularRecord,
    schema::{FieldKind, FieldSpec, TableSchema},
};

pub type RelationalRecord = Map<String, Value>;

#[derive(Debug, Clone, Copy)]
pub struct FieldMapper<'a> {
    schema: &'a TableSchema,
}

impl<'a> FieldMapper<'a> {
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'a TableSchema {
        self.schema
    }

    /// True when the row carries a non-empty primary key.
    pub fn has_key(&self, row: &TabularRecord) -> bool {
        self.schema
            .key_field()
            .and_then(|key| tabular_cell(key, row))
            .is_some_and(|value| !value.is_empty())
    }

    /// Converts a tabular row into relational form.
    ///
    /// Fields whose column is absent from `row` are left out entirely;
    /// present-but-empty cells become explicit nulls.
    pub fn to_relational(
        &self,
        row: &TabularRecord,
        report: &mut CoercionReport,
    ) -> RelationalRecord {
        let mut record = RelationalRecord::new();
        for field in &self.schema.fields {
            let Some(raw) = tabular_cell(field, row) else {
                continue;
            };
            let coerced = coerce::to_relational_value(raw, field.kind);
            if coerced.is_degraded() {
                debug!(
                    "{}.{}: could not coerce '{}' as {}",
                    self.schema.table, field.name, raw, field.kind
                );
                report.record(&field.name);
            }
            record.insert(field.relational_name().into_owned(), coerced.into_value());
        }
        record
    }

    /// Converts a relational record (or a UI payload keyed by tabular names)
    /// into tabular form, one cell per declared field.
    pub fn to_tabular(&self, record: &RelationalRecord) -> TabularRecord {
        self.schema
            .fields
            .iter()
            .map(|field| {
                let value = relational_value(field, record);
                (field.name.clone(), coerce::to_tabular_value(value, field.kind))
            })
            .collect()
    }

    /// Cells in sheet header order; absent fields become empty cells.
    pub fn to_positional_row(&self, record: &RelationalRecord) -> Vec<String> {
        self.schema
            .fields
            .iter()
            .filter(|field| field.positional)
            .map(|field| coerce::to_tabular_value(relational_value(field, record), field.kind))
            .collect()
    }

    /// Builds the snapshot shape for one stored row, or `None` when the
    /// row's primary key cell is empty.
    pub fn to_snapshot(&self, header: &[String], row: &[String]) -> Option<RelationalRecord> {
        let key_idx = self
            .schema
            .key_field()
            .and_then(|key| header.iter().position(|h| key.matches_header(h)))
            .unwrap_or(0);
        if row.get(key_idx).is_none_or(|cell| cell.is_empty()) {
            return None;
        }

        let mut record = RelationalRecord::new();
        for (name, cell) in header.iter().zip(row) {
            if name.is_empty() || cell.is_empty() {
                continue;
            }
            record.insert(name.clone(), Value::String(cell.clone()));
        }
        for field in self
            .schema
            .fields
            .iter()
            .filter(|f| f.kind == FieldKind::Boolean)
        {
            match record.get(&field.name) {
                Some(Value::String(text)) if text == "true" => {
                    record.insert(field.name.clone(), Value::Bool(true));
                }
                Some(_) => {
                    record.remove(&field.name);
                }
                None => {}
            }
        }
        Some(record)
    }
}

/// First non-empty cell among the field's tabular names, else the first
/// present one.
fn tabular_cell<'r>(field: &FieldSpec, row: &'r TabularRecord) -> Option<&'r str> {
    let mut first_present = None;
    for name in field.tabular_names() {
        if let Some(value) = row.get(name) {
            if !value.is_empty() {
                return Some(value.as_str());
            }
            first_present.get_or_insert(value.as_str());
        }
    }
    first_present
}

fn relational_value<'r>(field: &FieldSpec, record: &'r RelationalRecord) -> Option<&'r Value> {
    let relational = field.relational_name();
    record
        .get(&*relational)
        .or_else(|| field.tabular_names().find_map(|name| record.get(name)))
}
