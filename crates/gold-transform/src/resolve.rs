//! Resolution of configured column references against a table's columns.
//!
//! A reference may be a numeric concept identifier or a name. Resolution
//! tries an ordered list of strategies and reports which one matched, or
//! every strategy it attempted when nothing did.

use std::collections::BTreeMap;
use std::fmt;

use gold_model::ColumnRef;

/// One way of matching a reference to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    /// Column named exactly after a numeric identifier.
    ExactId,
    /// Column named exactly after the reference.
    ExactName,
    /// Known alternative names for common clinical parameters.
    AliasTable,
    /// First column whose name contains the reference.
    SubstringMatch,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactId => "exact-id",
            Self::ExactName => "exact-name",
            Self::AliasTable => "alias-table",
            Self::SubstringMatch => "substring-match",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        column: String,
        strategy: ResolutionStrategy,
    },
    Unresolved {
        reference: ColumnRef,
        attempted: Vec<ResolutionStrategy>,
    },
}

impl Resolution {
    /// The resolved column name, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Resolved { column, .. } => Some(column),
            Self::Unresolved { .. } => None,
        }
    }
}

/// Alternative column names for parameters commonly used by clinical scores.
const DEFAULT_ALIASES: [(&str, &[&str]); 5] = [
    ("MAP", &["Mean arterial pressure"]),
    (
        "Platelets",
        &["Platelets [#/volume] in Blood", "Thrombocytes", "Platelet count"],
    ),
    (
        "Bilirubin.total",
        &[
            "Bilirubin.total [Mass/volume] in Serum or Plasma",
            "Total bilirubin",
            "Bilirubin",
        ],
    ),
    (
        "Creatinine",
        &[
            "Creatinine [Mass/volume] in Serum or Plasma",
            "Serum creatinine",
            "Creatinine level",
        ],
    ),
    (
        "PaO2_FiO2_ratio",
        &[
            "PaO2/FiO2",
            "P/F ratio",
            "Oxygen [Partial pressure] in Arterial blood",
            "PaO2",
        ],
    ),
];

/// Ordered list of resolution strategies plus an alias table.
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    strategies: Vec<ResolutionStrategy>,
    aliases: BTreeMap<String, Vec<String>>,
}

impl ColumnResolver {
    pub fn new(strategies: Vec<ResolutionStrategy>) -> Self {
        Self {
            strategies,
            aliases: BTreeMap::new(),
        }
    }

    /// Exact identifier, then exact name. Used for derived-parameter inputs.
    pub fn exact() -> Self {
        Self::new(vec![ResolutionStrategy::ExactId, ResolutionStrategy::ExactName])
    }

    /// All strategies with the built-in alias table. Used for score components.
    pub fn clinical() -> Self {
        let mut resolver = Self::new(vec![
            ResolutionStrategy::ExactId,
            ResolutionStrategy::ExactName,
            ResolutionStrategy::AliasTable,
            ResolutionStrategy::SubstringMatch,
        ]);
        for (name, aliases) in DEFAULT_ALIASES {
            for alias in aliases {
                resolver = resolver.with_alias(name, *alias);
            }
        }
        resolver
    }

    /// Register an alternative column name for `name`. Earlier aliases win.
    #[must_use]
    pub fn with_alias(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.entry(name.into()).or_default().push(alias.into());
        self
    }

    pub fn strategies(&self) -> &[ResolutionStrategy] {
        &self.strategies
    }

    /// Resolve `reference` against `columns`, trying strategies in order.
    pub fn resolve(&self, reference: &ColumnRef, columns: &[String]) -> Resolution {
        let mut attempted = Vec::with_capacity(self.strategies.len());
        for &strategy in &self.strategies {
            attempted.push(strategy);
            if let Some(column) = self.try_strategy(strategy, reference, columns) {
                return Resolution::Resolved {
                    column: column.to_string(),
                    strategy,
                };
            }
        }
        Resolution::Unresolved {
            reference: reference.clone(),
            attempted,
        }
    }

    fn try_strategy<'a>(
        &self,
        strategy: ResolutionStrategy,
        reference: &ColumnRef,
        columns: &'a [String],
    ) -> Option<&'a str> {
        let find = |name: &str| columns.iter().find(|c| c.as_str() == name).map(String::as_str);
        match strategy {
            ResolutionStrategy::ExactId => {
                let id = reference.as_id()?.to_string();
                find(&id)
            }
            ResolutionStrategy::ExactName => find(&reference.key()),
            ResolutionStrategy::AliasTable => {
                let name = reference.key();
                self.aliases
                    .get(&name)?
                    .iter()
                    .find_map(|alias| find(alias))
            }
            ResolutionStrategy::SubstringMatch => {
                if reference.is_id() {
                    return None;
                }
                let name = reference.key();
                if name.is_empty() {
                    return None;
                }
                columns
                    .iter()
                    .find(|c| c.contains(name.as_str()))
                    .map(String::as_str)
            }
        }
    }
}

impl Default for ColumnResolver {
    fn default() -> Self {
        Self::clinical()
    }
}
