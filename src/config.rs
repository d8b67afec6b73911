use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::table::{IdentifierAllocator, TableSchema};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("unknown table {name} (known: {known})")]
    UnknownTable { name: String, known: String },
}

/// Shape of `config.json`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    endpoint_url: Option<String>,
    page_size: Option<usize>,
    staleness_window_secs: Option<u64>,
    tables: Vec<TableSchema>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint_url: Option<String>,
    pub page_size: Option<usize>,
    pub staleness_window: Duration,
    pub tables: Vec<TableSchema>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            page_size: None,
            staleness_window: IdentifierAllocator::DEFAULT_STALENESS_WINDOW,
            tables: TableSchema::builtin(),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tablemate").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads `explicit` if given (it must exist), otherwise the default path
    /// if it exists, otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loading config");
        Self::from_json(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        if file.page_size == Some(0) {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()));
        }
        let mut config = Self {
            endpoint_url: file.endpoint_url,
            page_size: file.page_size,
            ..Self::default()
        };
        if let Some(secs) = file.staleness_window_secs {
            config.staleness_window = Duration::from_secs(secs);
        }
        for table in file.tables {
            validate_table(&table)?;
            match config.tables.iter_mut().find(|t| t.name == table.name) {
                Some(existing) => *existing = table,
                None => config.tables.push(table),
            }
        }
        Ok(config)
    }

    /// The named table with the global page size override applied.
    pub fn table(&self, name: &str) -> Result<TableSchema, ConfigError> {
        let mut table = self
            .tables
            .iter()
            .find(|table| table.name == name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTable {
                name: name.to_string(),
                known: self
                    .tables
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        if let Some(size) = self.page_size {
            table.page_size = size;
        }
        Ok(table)
    }
}

fn validate_table(table: &TableSchema) -> Result<(), ConfigError> {
    if table.name.trim().is_empty() {
        return Err(ConfigError::Invalid("table name must not be empty".to_string()));
    }
    if table.fields.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "table {} has no fields",
            table.name
        )));
    }
    if table.page_size == 0 {
        return Err(ConfigError::Invalid(format!(
            "table {} has a zero page size",
            table.name
        )));
    }
    if table.fields.iter().any(|field| field.name == "id") {
        return Err(ConfigError::Invalid(format!(
            "table {}: id is managed by tablemate and cannot be a field",
            table.name
        )));
    }
    if !table.is_sortable(&table.default_sort.field) {
        return Err(ConfigError::Invalid(format!(
            "table {}: default sort field {} is not a field",
            table.name, table.default_sort.field
        )));
    }
    Ok(())
}
