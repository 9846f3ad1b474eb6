//! The store collaborator the pipeline loads from and persists to.

use polars::prelude::DataFrame;

use gold_model::ExistsPolicy;

use crate::error::{Result, StoreError};

/// A source and sink of named tables grouped into schemas.
///
/// Implementations connect lazily and at most once; every method that needs
/// the backing store calls [`DataStore::connect`] itself.
pub trait DataStore {
    /// Open the underlying connection. Repeated calls are no-ops.
    fn connect(&mut self) -> Result<()>;

    /// Run a read query and return its rows.
    fn execute_query(&mut self, sql: &str) -> Result<DataFrame>;

    /// User schemas, sorted. System schemas are never listed.
    fn get_schema_names(&mut self) -> Result<Vec<String>>;

    /// Tables in `schema`, or in the input schema when `None`.
    fn get_tables(&mut self, schema: Option<&str>) -> Result<Vec<String>>;

    /// Column names of `table` in `schema` (input schema when `None`).
    fn get_columns(&mut self, table: &str, schema: Option<&str>) -> Result<Vec<String>>;

    fn get_input_schema(&self) -> &str;

    fn get_output_schema(&self) -> &str;

    /// Write `data` to `table` in `schema` (output schema when `None`).
    /// Returns the number of rows written.
    fn write_table(
        &mut self,
        data: &DataFrame,
        table: &str,
        schema: Option<&str>,
        policy: ExistsPolicy,
    ) -> Result<usize>;
}

/// Catalog schemas that introspection hides.
pub fn is_system_schema(name: &str) -> bool {
    name.starts_with("pg_") || name == "information_schema"
}

pub(crate) fn frame_columns(data: &DataFrame) -> Vec<String> {
    data.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Appends must match the existing columns exactly, including order.
pub(crate) fn check_append_columns(
    schema: &str,
    table: &str,
    existing: &[String],
    incoming: &[String],
) -> Result<()> {
    if existing == incoming {
        return Ok(());
    }
    Err(StoreError::ColumnMismatch {
        schema: schema.to_string(),
        table: table.to_string(),
        expected: existing.join(", "),
        found: incoming.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_schemas() {
        assert!(is_system_schema("pg_catalog"));
        assert!(is_system_schema("information_schema"));
        assert!(!is_system_schema("gold"));
    }

    #[test]
    fn append_column_order_matters() {
        let a = vec!["subject_id".to_string(), "HR".to_string()];
        let b = vec!["HR".to_string(), "subject_id".to_string()];
        assert!(check_append_columns("gold", "t", &a, &a).is_ok());
        assert!(matches!(
            check_append_columns("gold", "t", &a, &b),
            Err(StoreError::ColumnMismatch { .. })
        ));
    }
}
