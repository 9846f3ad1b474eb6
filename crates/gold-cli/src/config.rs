//! Loading pipeline and database configuration files.
//!
//! The format follows the file extension: `.json` or `.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use gold_model::PipelineConfig;
use gold_store::DatabaseConfig;

/// Database settings live under a `database` key.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatabaseFile {
    database: DatabaseConfig,
}

pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    load(path)
}

/// Read `path`, or fall back to the default settings when `None`.
pub fn load_database_config(path: Option<&Path>) -> Result<DatabaseConfig> {
    match path {
        Some(path) => Ok(load::<DatabaseFile>(path)?.database),
        None => Ok(DatabaseConfig::default()),
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("parse JSON config {}", path.display())),
        Some("toml") => {
            toml::from_str(&text).with_context(|| format!("parse TOML config {}", path.display()))
        }
        _ => bail!(
            "unsupported config format for {} (expected .json or .toml)",
            path.display()
        ),
    }
}
