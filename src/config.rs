//! Settings file support.
//!
//! Everything here can also be given on the command line or through the
//! environment; flag/env values win over the file. The file is plain YAML:
//!
//! ```yaml
//! store: ./sheets
//! sheet_id: 1FAY6...
//! sink_url: https://project.example.co
//! sink_key: publishable-key
//! batch_size: 50
//! schemas:
//!   - schemas/crosses.yaml
//! ```

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{pipeline::DEFAULT_BATCH_SIZE, schema::TableSchema};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub store: Option<PathBuf>,
    pub sheet_id: Option<String>,
    pub export_base_url: Option<String>,
    pub sink_url: Option<String>,
    pub sink_key: Option<String>,
    pub batch_size: Option<usize>,
    /// Schema files overriding (by table name) or extending the built-ins.
    pub schemas: Vec<PathBuf>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening settings {path:?}"))?;
        let mut settings: Settings = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing settings {path:?}"))?;
        settings.base_dir = path.parent().map(Path::to_path_buf);
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Relative paths in the file are resolved against the file's directory.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn store_path(&self, cli: Option<&Path>) -> Option<PathBuf> {
        cli.map(Path::to_path_buf)
            .or_else(|| self.store.as_deref().map(|p| self.resolve_path(p)))
    }

    pub fn batch_size(&self, cli: Option<usize>) -> Result<usize> {
        let size = cli.or(self.batch_size).unwrap_or(DEFAULT_BATCH_SIZE);
        ensure!(size > 0, "Batch size must be positive");
        Ok(size)
    }

    /// Built-in schemas with any configured schema files applied on top.
    pub fn schemas(&self) -> Result<Vec<TableSchema>> {
        let mut schemas = TableSchema::builtin();
        for path in &self.schemas {
            let path = self.resolve_path(path);
            let custom = TableSchema::load(&path)
                .with_context(|| format!("Loading schema from {path:?}"))?;
            match schemas.iter_mut().find(|s| s.table == custom.table) {
                Some(existing) => *existing = custom,
                None => schemas.push(custom),
            }
        }
        Ok(schemas)
    }
}

pub fn pick<T>(cli: Option<T>, file: Option<T>) -> Option<T> {
    cli.or(file)
}
