//! Declarative table schemas.
//!
//! Each record kind is described by one [`TableSchema`]: the ordered field
//! list (whose positional members form the sheet header row), a kind tag per
//! field that selects its coercion rule, and the tabular→relational rename.
//! The engine in [`crate::mapper`] is generic over these values, so adding or
//! changing a record kind is a data change rather than new code.
//!
//! Relational names default to the snake_case spelling of the tabular name
//! (`parentCrossId` → `parent_cross_id`); `relational_name` overrides it.

use std::{
    borrow::Cow, collections::HashSet, fmt, fs::File, io::BufReader, path::Path, str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};

/// The table that inherits a pre-existing unnamed sheet on first use.
pub const PRIMARY_TABLE: &str = "Stocks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Boolean,
    Number,
    Structured,
    Timestamp,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Boolean => "boolean",
            FieldKind::Number => "number",
            FieldKind::Structured => "structured",
            FieldKind::Timestamp => "timestamp",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["text", "boolean", "number", "structured", "timestamp"]
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(FieldKind::Text),
            "boolean" | "bool" => Ok(FieldKind::Boolean),
            "number" | "numeric" | "integer" | "float" => Ok(FieldKind::Number),
            "structured" | "json" => Ok(FieldKind::Structured),
            "timestamp" | "datetime" | "date" => Ok(FieldKind::Timestamp),
            _ => Err(anyhow!(
                "Unknown field kind '{value}'. Supported kinds: {}",
                FieldKind::variants().join(", ")
            )),
        }
    }
}

fn default_positional() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "relational_name"
    )]
    pub rename: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
    /// Positional fields are sheet columns; the rest only exist relationally.
    #[serde(default = "default_positional")]
    pub positional: bool,
    /// Legacy tabular headers accepted when reading this field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            rename: None,
            kind,
            positional: true,
            aliases: Vec::new(),
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn renamed(mut self, relational: &str) -> Self {
        self.rename = Some(relational.to_string());
        self
    }

    pub fn non_positional(mut self) -> Self {
        self.positional = false;
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn relational_name(&self) -> Cow<'_, str> {
        match self.rename.as_deref().filter(|value| !value.is_empty()) {
            Some(explicit) => Cow::Borrowed(explicit),
            None => {
                let converted = self.name.to_snake_case();
                if converted == self.name {
                    Cow::Borrowed(self.name.as_str())
                } else {
                    Cow::Owned(converted)
                }
            }
        }
    }

    /// Tabular names this field answers to, canonical name first.
    pub fn tabular_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(|a| a.as_str()))
    }

    pub fn matches_header(&self, header: &str) -> bool {
        self.tabular_names().any(|name| name == header)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Tabular (sheet) table name.
    pub table: String,
    pub relational_table: String,
    /// Tabular name of the primary key field.
    pub key: String,
    pub fields: Vec<FieldSpec>,
}

impl TableSchema {
    pub fn new(table: &str, relational_table: &str, key: &str, fields: Vec<FieldSpec>) -> Self {
        Self {
            table: table.to_string(),
            relational_table: relational_table.to_string(),
            key: key.to_string(),
            fields,
        }
    }

    pub fn stocks() -> Self {
        use FieldKind::*;
        let fields = vec![
            FieldSpec::text("id"),
            FieldSpec::text("name"),
            FieldSpec::text("genotype"),
            FieldSpec::text("variant"),
            FieldSpec::text("category"),
            FieldSpec::text("location"),
            FieldSpec::text("source"),
            FieldSpec::text("sourceId"),
            FieldSpec::text("flybaseId"),
            FieldSpec::text("maintainer"),
            FieldSpec::text("notes"),
            FieldSpec::new("isGift", Boolean),
            FieldSpec::text("giftFrom"),
            FieldSpec::new("createdAt", Timestamp),
            FieldSpec::new("lastFlipped", Timestamp),
            FieldSpec::new("copies", Number),
            FieldSpec::text("janeliaLine").non_positional(),
            FieldSpec::new("updatedAt", Timestamp).non_positional(),
        ];
        Self::new("Stocks", "stocks", "id", fields)
    }

    pub fn crosses() -> Self {
        use FieldKind::*;
        let fields = vec![
            FieldSpec::text("id"),
            FieldSpec::text("parentA"),
            FieldSpec::text("parentB"),
            FieldSpec::text("temperature"),
            FieldSpec::new("setupDate", Timestamp),
            FieldSpec::text("status"),
            FieldSpec::text("owner"),
            FieldSpec::text("notes"),
            FieldSpec::new("targetCount", Number),
            FieldSpec::new("collected", Structured),
            FieldSpec::new("vials", Structured),
            FieldSpec::new("virginsCollected", Number),
            FieldSpec::new("manualFlipDate", Timestamp),
            FieldSpec::new("manualEcloseDate", Timestamp),
            FieldSpec::new("manualVirginDate", Timestamp),
            FieldSpec::text("crossType"),
            FieldSpec::text("parentCrossId"),
            FieldSpec::text("experimentType"),
            FieldSpec::new("experimentDate", Timestamp),
            FieldSpec::new("retinalStartDate", Timestamp),
            FieldSpec::new("waitStartDate", Timestamp),
            FieldSpec::new("ripeningStartDate", Timestamp),
            FieldSpec::new("updatedAt", Timestamp).non_positional(),
        ];
        Self::new("Crosses", "crosses", "id", fields)
    }

    pub fn pins() -> Self {
        let fields = vec![
            FieldSpec::text("user")
                .renamed("user_name")
                .with_aliases(&["userName", "user_name"]),
            FieldSpec::text("hash"),
        ];
        Self::new("Pins", "pins", "user", fields)
    }

    /// The three record kinds, in the order they are synced.
    pub fn builtin() -> Vec<Self> {
        vec![Self::stocks(), Self::crosses(), Self::pins()]
    }

    /// Finds a schema by tabular or relational table name, ignoring case.
    pub fn find<'s>(schemas: &'s [TableSchema], name: &str) -> Option<&'s TableSchema> {
        schemas.iter().find(|schema| {
            schema.table.eq_ignore_ascii_case(name)
                || schema.relational_table.eq_ignore_ascii_case(name)
        })
    }

    /// Sheet header row: positional fields in declaration order.
    pub fn headers(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.positional)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.matches_header(name))
    }

    pub fn key_field(&self) -> Option<&FieldSpec> {
        self.field(&self.key)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.table.trim().is_empty(), "Table name must not be empty");
        ensure!(
            !self.fields.is_empty(),
            "Table '{}' does not declare any fields",
            self.table
        );
        let mut seen = HashSet::new();
        for field in &self.fields {
            ensure!(
                seen.insert(field.name.as_str()),
                "Table '{}' declares field '{}' more than once",
                self.table,
                field.name
            );
        }
        let key = self
            .key_field()
            .ok_or_else(|| anyhow!("Key '{}' is not a field of '{}'", self.key, self.table))?;
        ensure!(
            key.positional,
            "Key '{}' of '{}' must be a sheet column",
            self.key,
            self.table
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let schema: TableSchema = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing schema YAML {path:?}"))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema YAML")
    }
}
