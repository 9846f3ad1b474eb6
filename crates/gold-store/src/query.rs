//! The narrow query dialect stores understand.
//!
//! Loads are whole-table reads, so only `SELECT * FROM [schema.]table`
//! with an optional `LIMIT n` and trailing semicolon is accepted. Keywords
//! are case-insensitive.

use crate::error::{Result, StoreError};

/// A parsed table read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub schema: Option<String>,
    pub table: String,
    pub limit: Option<usize>,
}

impl TableQuery {
    /// Parse a query string.
    pub fn parse(sql: &str) -> Result<Self> {
        let unsupported = || StoreError::UnsupportedQuery {
            query: sql.trim().to_string(),
        };
        let body = sql.trim().trim_end_matches(';').trim_end();
        let tokens: Vec<&str> = body.split_whitespace().collect();

        let (target, rest) = match tokens.as_slice() {
            [select, star, from, target, rest @ ..]
                if select.eq_ignore_ascii_case("select")
                    && *star == "*"
                    && from.eq_ignore_ascii_case("from") =>
            {
                (*target, rest)
            }
            _ => return Err(unsupported()),
        };

        let limit = match rest {
            [] => None,
            [keyword, n] if keyword.eq_ignore_ascii_case("limit") => {
                Some(n.parse::<usize>().map_err(|_| unsupported())?)
            }
            _ => return Err(unsupported()),
        };

        let (schema, table) = match target.split_once('.') {
            Some((schema, table)) => (Some(validate_identifier(schema)?), table),
            None => (None, target),
        };
        Ok(Self {
            schema,
            table: validate_identifier(table)?,
            limit,
        })
    }

    /// `SELECT * FROM {schema}.{table}`.
    pub fn render(schema: &str, table: &str) -> String {
        format!("SELECT * FROM {schema}.{table}")
    }
}

/// Accept ASCII letters, digits and underscores only.
pub fn validate_identifier(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(StoreError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_table() {
        let query = TableQuery::parse("SELECT * FROM silver.standardized_parameters").unwrap();
        assert_eq!(query.schema.as_deref(), Some("silver"));
        assert_eq!(query.table, "standardized_parameters");
        assert_eq!(query.limit, None);
    }

    #[test]
    fn parses_limit_and_semicolon() {
        let query = TableQuery::parse("select * from vitals limit 10;").unwrap();
        assert_eq!(query.schema, None);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn rejects_other_statements() {
        for sql in [
            "SELECT subject_id FROM silver.vitals",
            "DELETE FROM silver.vitals",
            "SELECT * FROM silver.vitals WHERE 1 = 1",
            "SELECT * FROM ../etc.passwd",
        ] {
            assert!(TableQuery::parse(sql).is_err(), "{sql}");
        }
    }

    #[test]
    fn render_matches_parse() {
        let sql = TableQuery::render("silver", "vitals");
        let query = TableQuery::parse(&sql).unwrap();
        assert_eq!(query.schema.as_deref(), Some("silver"));
        assert_eq!(query.table, "vitals");
    }
}
