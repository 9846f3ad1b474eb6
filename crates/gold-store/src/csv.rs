//! Directory-backed store: one subdirectory per schema, one CSV per table.
//!
//! ```text
//! root/
//!   silver/standardized_parameters.csv
//!   gold/gold_parameters.csv
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use polars::prelude::{CsvReadOptions, CsvWriter, DataFrame, SerReader, SerWriter};
use tracing::{debug, info};

use gold_model::ExistsPolicy;

use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};
use crate::query::{TableQuery, validate_identifier};
use crate::store::{DataStore, check_append_columns, frame_columns, is_system_schema};

/// Rows used for CSV type inference.
const INFER_SCHEMA_ROWS: usize = 100;

#[derive(Debug, Clone)]
pub struct CsvStore {
    root: PathBuf,
    schema_input: String,
    schema_output: String,
    connected: bool,
}

impl CsvStore {
    pub fn new(
        root: impl Into<PathBuf>,
        schema_input: impl Into<String>,
        schema_output: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            schema_input: schema_input.into(),
            schema_output: schema_output.into(),
            connected: false,
        }
    }

    /// Store rooted at `root` using the schemas named in `config`.
    pub fn from_config(root: impl Into<PathBuf>, config: &DatabaseConfig) -> Self {
        Self::new(root, &config.schema_input, &config.schema_output)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn schema_dir(&self, schema: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_identifier(schema)?))
    }

    fn table_path(&self, schema: &str, table: &str) -> Result<PathBuf> {
        let dir = self.schema_dir(schema)?;
        Ok(dir.join(format!("{}.csv", validate_identifier(table)?)))
    }

    fn existing_table(&self, schema: &str, table: &str) -> Result<PathBuf> {
        let dir = self.schema_dir(schema)?;
        if !dir.is_dir() {
            return Err(StoreError::SchemaNotFound {
                schema: schema.to_string(),
            });
        }
        let path = self.table_path(schema, table)?;
        if !path.is_file() {
            return Err(StoreError::TableNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            });
        }
        Ok(path)
    }
}

/// Read a CSV file with a header row, optionally stopping after `n_rows`.
fn read_csv(path: &Path, n_rows: Option<usize>) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_n_rows(n_rows)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| StoreError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn write_csv(data: &DataFrame, path: &Path, append: bool) -> Result<()> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = if append {
        OpenOptions::new().append(true).open(path).map_err(io_err)?
    } else {
        File::create(path).map_err(io_err)?
    };
    let mut data = data.clone();
    CsvWriter::new(&mut file)
        .include_header(!append)
        .finish(&mut data)?;
    Ok(())
}

/// Sorted entry names under `dir` accepted by `select`.
fn list_dir(dir: &Path, select: impl Fn(&Path) -> Option<String>) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        if let Some(name) = select(&entry.path()) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

impl DataStore for CsvStore {
    fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        if !self.root.is_dir() {
            return Err(StoreError::DirectoryNotFound {
                path: self.root.clone(),
            });
        }
        debug!(root = %self.root.display(), "csv store connected");
        self.connected = true;
        Ok(())
    }

    fn execute_query(&mut self, sql: &str) -> Result<DataFrame> {
        self.connect()?;
        let query = TableQuery::parse(sql)?;
        let schema = query.schema.as_deref().unwrap_or(&self.schema_input);
        let path = self.existing_table(schema, &query.table)?;
        let data = read_csv(&path, query.limit)?;
        debug!(path = %path.display(), rows = data.height(), "query executed");
        Ok(data)
    }

    fn get_schema_names(&mut self) -> Result<Vec<String>> {
        self.connect()?;
        list_dir(&self.root, |path| {
            let name = path.file_name()?.to_str()?;
            (path.is_dir() && validate_identifier(name).is_ok() && !is_system_schema(name))
                .then(|| name.to_string())
        })
    }

    fn get_tables(&mut self, schema: Option<&str>) -> Result<Vec<String>> {
        self.connect()?;
        let schema = schema.unwrap_or(&self.schema_input);
        let dir = self.schema_dir(schema)?;
        if !dir.is_dir() {
            return Err(StoreError::SchemaNotFound {
                schema: schema.to_string(),
            });
        }
        list_dir(&dir, |path| {
            if !path.is_file() || path.extension()?.to_str()? != "csv" {
                return None;
            }
            Some(path.file_stem()?.to_str()?.to_string())
        })
    }

    fn get_columns(&mut self, table: &str, schema: Option<&str>) -> Result<Vec<String>> {
        self.connect()?;
        let schema = schema.unwrap_or(&self.schema_input);
        let path = self.existing_table(schema, table)?;
        Ok(frame_columns(&read_csv(&path, Some(1))?))
    }

    fn get_input_schema(&self) -> &str {
        &self.schema_input
    }

    fn get_output_schema(&self) -> &str {
        &self.schema_output
    }

    fn write_table(
        &mut self,
        data: &DataFrame,
        table: &str,
        schema: Option<&str>,
        policy: ExistsPolicy,
    ) -> Result<usize> {
        self.connect()?;
        let schema = schema.unwrap_or(&self.schema_output).to_string();
        let dir = self.schema_dir(&schema)?;
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = self.table_path(&schema, table)?;

        let append = match (path.is_file(), policy) {
            (true, ExistsPolicy::Fail) => {
                return Err(StoreError::TableExists {
                    schema,
                    table: table.to_string(),
                });
            }
            (true, ExistsPolicy::Append) => {
                let existing = frame_columns(&read_csv(&path, Some(1))?);
                check_append_columns(&schema, table, &existing, &frame_columns(data))?;
                true
            }
            _ => false,
        };
        write_csv(data, &path, append)?;
        info!(
            path = %path.display(),
            rows = data.height(),
            policy = policy.as_str(),
            "table written"
        );
        Ok(data.height())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use polars::prelude::{IntoColumn, NamedFrom, Series};
    use tempfile::TempDir;

    use super::*;

    fn store_with_input(csv: &str) -> (TempDir, CsvStore) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("silver")).unwrap();
        let mut file = File::create(dir.path().join("silver/vitals.csv")).unwrap();
        write!(file, "{csv}").unwrap();
        let store = CsvStore::new(dir.path(), "silver", "gold");
        (dir, store)
    }

    #[test]
    fn reads_input_table() {
        let (_dir, mut store) =
            store_with_input("subject_id,charttime,HR\n1,2024-05-01 09:00:00,80\n2,2024-05-01 09:30:00,95\n");
        let df = store.execute_query("SELECT * FROM silver.vitals").unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(store.get_tables(None).unwrap(), vec!["vitals"]);
        assert_eq!(
            store.get_columns("vitals", None).unwrap(),
            vec!["subject_id", "charttime", "HR"]
        );
        assert_eq!(store.get_schema_names().unwrap(), vec!["silver"]);
    }

    #[test]
    fn missing_root_fails_to_connect() {
        let mut store = CsvStore::new("/nonexistent/gold-store-root", "silver", "gold");
        assert!(matches!(
            store.connect(),
            Err(StoreError::DirectoryNotFound { .. })
        ));
    }

    #[test]
    fn write_then_append() {
        let (dir, mut store) = store_with_input("subject_id,HR\n1,80\n");
        let df = DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 2]).into_column(),
            Series::new("HR".into(), vec![80.5, 91.0]).into_column(),
        ])
        .unwrap();

        store
            .write_table(&df, "gold_parameters", None, ExistsPolicy::Replace)
            .unwrap();
        assert!(dir.path().join("gold/gold_parameters.csv").is_file());
        store
            .write_table(&df, "gold_parameters", None, ExistsPolicy::Append)
            .unwrap();

        let back = store
            .execute_query("SELECT * FROM gold.gold_parameters")
            .unwrap();
        assert_eq!(back.height(), 4);

        let err = store
            .write_table(&df, "gold_parameters", None, ExistsPolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, StoreError::TableExists { .. }));
    }

    #[test]
    fn rejects_path_like_table_names() {
        let (_dir, mut store) = store_with_input("a\n1\n");
        let df = DataFrame::new(vec![Series::new("a".into(), vec![1i64]).into_column()]).unwrap();
        let err = store
            .write_table(&df, "../escape", None, ExistsPolicy::Replace)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier { .. }));
    }
}
