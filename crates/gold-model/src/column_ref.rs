//! Column references used by derived parameters and score components.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reference to a wide-table column.
///
/// Configuration may name a column by its human-readable concept name or by
/// a numeric concept identifier (`3027018`). A string made only of digits is
/// treated the same as the integer form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    /// Numeric concept identifier.
    Id(i64),
    /// Column or concept name.
    Name(String),
}

impl ColumnRef {
    /// Build a reference from raw text, detecting digit-only identifiers.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty()
            && trimmed.chars().all(|c| c.is_ascii_digit())
            && let Ok(id) = trimmed.parse::<i64>()
        {
            return Self::Id(id);
        }
        Self::Name(raw.to_string())
    }

    /// Returns the numeric identifier if this reference is one.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(name) => {
                let trimmed = name.trim();
                if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                    trimmed.parse().ok()
                } else {
                    None
                }
            }
        }
    }

    /// True when the reference is a numeric identifier.
    pub fn is_id(&self) -> bool {
        self.as_id().is_some()
    }

    /// The column name this reference would have in a wide table.
    pub fn key(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<i64> for ColumnRef {
    fn from(value: i64) -> Self {
        Self::Id(value)
    }
}
