//! Per-field type coercion between string cells and relational values.
//!
//! Coercion never fails. Each primitive returns a [`Coerced`] that says
//! whether the input converted cleanly, was empty, or had to fall back to a
//! safe value; callers fold the outcomes into a [`CoercionReport`] so that
//! degraded fields can be logged and counted without aborting a sync.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::schema::FieldKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// The input converted cleanly.
    Value(Value),
    /// The input was empty and maps to null.
    Empty,
    /// The input could not be converted; carries the fallback value.
    Degraded(Value),
}

impl Coerced {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Coerced::Degraded(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Coerced::Value(value) | Coerced::Degraded(value) => value,
            Coerced::Empty => Value::Null,
        }
    }
}

/// Counts degraded cells per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercionReport {
    counts: BTreeMap<String, usize>,
}

impl CoercionReport {
    pub fn record(&mut self, field: &str) {
        *self.counts.entry(field.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &CoercionReport) {
        for (field, count) in &other.counts {
            *self.counts.entry(field.clone()).or_insert(0) += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn count(&self, field: &str) -> usize {
        self.counts.get(field).copied().unwrap_or(0)
    }

    pub fn entries(&self) -> Vec<(String, usize)> {
        self.counts
            .iter()
            .map(|(field, count)| (field.clone(), *count))
            .collect()
    }
}

/// Converts one tabular cell to its relational value.
///
/// Order matters: the exact literals `"true"`/`"false"` win for every field,
/// then the kind-specific rule applies.
pub fn to_relational_value(raw: &str, kind: FieldKind) -> Coerced {
    if raw.is_empty() {
        return Coerced::Empty;
    }
    match raw {
        "true" => return Coerced::Value(Value::Bool(true)),
        "false" => return Coerced::Value(Value::Bool(false)),
        _ => {}
    }
    match kind {
        FieldKind::Text | FieldKind::Boolean => Coerced::Value(Value::String(raw.to_string())),
        FieldKind::Number => coerce_number(raw),
        FieldKind::Structured => coerce_structured(raw),
        FieldKind::Timestamp => coerce_timestamp(raw),
    }
}

pub fn coerce_number(raw: &str) -> Coerced {
    let trimmed = raw.trim();
    let Ok(parsed) = trimmed.parse::<f64>() else {
        return Coerced::Degraded(Value::Null);
    };
    if !parsed.is_finite() {
        return Coerced::Degraded(Value::Null);
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Coerced::Value(Value::Number(int.into()));
    }
    if parsed.fract() == 0.0 && parsed.abs() < 9.0e15 {
        return Coerced::Value(Value::Number((parsed as i64).into()));
    }
    match Number::from_f64(parsed) {
        Some(number) => Coerced::Value(Value::Number(number)),
        None => Coerced::Degraded(Value::Null),
    }
}

/// JSON-decodes a structured cell, keeping the raw text when it is not JSON.
pub fn coerce_structured(raw: &str) -> Coerced {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Coerced::Value(value),
        Err(_) => Coerced::Degraded(Value::String(raw.to_string())),
    }
}

pub fn coerce_timestamp(raw: &str) -> Coerced {
    match parse_timestamp(raw.trim()) {
        Some(parsed) => Coerced::Value(Value::String(format_timestamp(&parsed))),
        None => Coerced::Degraded(Value::Null),
    }
}

/// Canonical absolute-time rendering: `2024-05-06T14:30:00.000Z`.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(parsed.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return parsed.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Renders a relational value as a tabular cell.
///
/// Missing values become the empty string. Boolean fields always render as
/// `"true"` or `"false"` by truthiness.
pub fn to_tabular_value(value: Option<&Value>, kind: FieldKind) -> String {
    if kind == FieldKind::Boolean {
        return is_truthy(value).to_string();
    }
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(structured @ (Value::Array(_) | Value::Object(_))) => {
            serde_json::to_string(structured).unwrap_or_default()
        }
    }
}

/// Empty strings, zero, null and `false` are false; the literal `"false"` too.
/// Anything else, including arrays and objects, is true.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty() && text != "false",
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}
