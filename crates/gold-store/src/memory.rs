//! In-memory store, used by tests and for handing pre-loaded data around.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;
use tracing::{debug, info};

use gold_model::ExistsPolicy;

use crate::error::{Result, StoreError};
use crate::query::{TableQuery, validate_identifier};
use crate::store::{DataStore, check_append_columns, frame_columns, is_system_schema};

/// Tables held in memory, keyed by schema then table name.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    schema_input: String,
    schema_output: String,
    schemas: BTreeMap<String, BTreeMap<String, DataFrame>>,
    connected: bool,
}

impl MemoryStore {
    /// Empty store with the given input and output schemas.
    pub fn new(schema_input: impl Into<String>, schema_output: impl Into<String>) -> Self {
        let schema_input = schema_input.into();
        let schema_output = schema_output.into();
        let mut schemas = BTreeMap::new();
        schemas.insert(schema_input.clone(), BTreeMap::new());
        schemas.insert(schema_output.clone(), BTreeMap::new());
        Self {
            schema_input,
            schema_output,
            schemas,
            connected: false,
        }
    }

    /// Builder-style [`MemoryStore::insert_table`].
    #[must_use]
    pub fn with_table(mut self, schema: &str, table: &str, data: DataFrame) -> Self {
        self.insert_table(schema, table, data);
        self
    }

    /// Insert or replace a table.
    pub fn insert_table(&mut self, schema: &str, table: &str, data: DataFrame) {
        self.schemas
            .entry(schema.to_string())
            .or_default()
            .insert(table.to_string(), data);
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&DataFrame> {
        self.schemas.get(schema)?.get(table)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn schema_tables(&self, schema: &str) -> Result<&BTreeMap<String, DataFrame>> {
        self.schemas
            .get(schema)
            .ok_or_else(|| StoreError::SchemaNotFound {
                schema: schema.to_string(),
            })
    }

    fn lookup(&self, schema: &str, table: &str) -> Result<&DataFrame> {
        self.schema_tables(schema)?
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("silver", "gold")
    }
}

impl DataStore for MemoryStore {
    fn connect(&mut self) -> Result<()> {
        if !self.connected {
            debug!(schemas = self.schemas.len(), "memory store connected");
            self.connected = true;
        }
        Ok(())
    }

    fn execute_query(&mut self, sql: &str) -> Result<DataFrame> {
        self.connect()?;
        let query = TableQuery::parse(sql)?;
        let schema = query.schema.as_deref().unwrap_or(&self.schema_input);
        let data = self.lookup(schema, &query.table)?;
        let data = match query.limit {
            Some(n) => data.head(Some(n)),
            None => data.clone(),
        };
        debug!(schema, table = %query.table, rows = data.height(), "query executed");
        Ok(data)
    }

    fn get_schema_names(&mut self) -> Result<Vec<String>> {
        self.connect()?;
        Ok(self
            .schemas
            .keys()
            .filter(|name| !is_system_schema(name))
            .cloned()
            .collect())
    }

    fn get_tables(&mut self, schema: Option<&str>) -> Result<Vec<String>> {
        self.connect()?;
        let schema = schema.unwrap_or(&self.schema_input);
        Ok(self.schema_tables(schema)?.keys().cloned().collect())
    }

    fn get_columns(&mut self, table: &str, schema: Option<&str>) -> Result<Vec<String>> {
        self.connect()?;
        let schema = schema.unwrap_or(&self.schema_input);
        Ok(frame_columns(self.lookup(schema, table)?))
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
        let schema = validate_identifier(schema.unwrap_or(&self.schema_output))?;
        let table = validate_identifier(table)?;
        let tables = self.schemas.entry(schema.clone()).or_default();

        let written = match (tables.get(&table), policy) {
            (Some(_), ExistsPolicy::Fail) => {
                return Err(StoreError::TableExists { schema, table });
            }
            (Some(existing), ExistsPolicy::Append) => {
                check_append_columns(&schema, &table, &frame_columns(existing), &frame_columns(data))?;
                existing.vstack(data)?
            }
            _ => data.clone(),
        };
        let rows = data.height();
        tables.insert(table.clone(), written);
        info!(schema = %schema, table = %table, rows, policy = policy.as_str(), "table written");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::{IntoColumn, NamedFrom, Series};

    use super::*;

    fn vitals() -> DataFrame {
        DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 2, 3]).into_column(),
            Series::new("HR".into(), vec![80.0, 95.0, 72.0]).into_column(),
        ])
        .unwrap()
    }

    #[test]
    fn query_defaults_to_input_schema() {
        let mut store = MemoryStore::default().with_table("silver", "vitals", vitals());
        assert!(!store.is_connected());
        let df = store.execute_query("SELECT * FROM vitals LIMIT 2").unwrap();
        assert!(store.is_connected());
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn missing_table_is_an_error() {
        let mut store = MemoryStore::default();
        let err = store.execute_query("SELECT * FROM silver.nope").unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound { .. }));
    }

    #[test]
    fn introspection() {
        let mut store = MemoryStore::default()
            .with_table("silver", "vitals", vitals())
            .with_table("pg_catalog", "pg_class", vitals());
        assert_eq!(store.get_schema_names().unwrap(), vec!["gold", "silver"]);
        assert_eq!(store.get_tables(None).unwrap(), vec!["vitals"]);
        assert_eq!(
            store.get_columns("vitals", Some("silver")).unwrap(),
            vec!["subject_id", "HR"]
        );
    }

    #[test]
    fn write_policies() {
        let mut store = MemoryStore::default();
        store
            .write_table(&vitals(), "out", None, ExistsPolicy::Fail)
            .unwrap();
        let err = store
            .write_table(&vitals(), "out", None, ExistsPolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, StoreError::TableExists { .. }));

        store
            .write_table(&vitals(), "out", None, ExistsPolicy::Append)
            .unwrap();
        assert_eq!(store.table("gold", "out").unwrap().height(), 6);

        store
            .write_table(&vitals(), "out", None, ExistsPolicy::Replace)
            .unwrap();
        assert_eq!(store.table("gold", "out").unwrap().height(), 3);
    }

    #[test]
    fn append_rejects_different_columns() {
        let mut store = MemoryStore::default().with_table("gold", "out", vitals());
        let other = vitals().drop("HR").unwrap();
        let err = store
            .write_table(&other, "out", None, ExistsPolicy::Append)
            .unwrap_err();
        assert!(matches!(err, StoreError::ColumnMismatch { .. }));
    }
}
