//! Structured diagnostics produced by the transformation stages.
//!
//! Item-level problems (a derived parameter that cannot be computed, a score
//! component whose parameter is missing) never fail a run. They are recorded
//! here and returned alongside the transformed table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Pivot,
    Aggregate,
    Impute,
    Derive,
    Score,
    Save,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Pivot => "pivot",
            Self::Aggregate => "aggregate",
            Self::Impute => "impute",
            Self::Derive => "derive",
            Self::Score => "score",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, e.g. a lenient fallback was applied.
    Info,
    /// Data-quality finding; computation continued unchanged.
    Warning,
    /// The item was skipped.
    Skipped,
}

/// What went wrong with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A required column is not present in the table.
    MissingColumn,
    /// A score component parameter could not be resolved to a column.
    UnresolvedParameter,
    /// `scores` does not hold `thresholds + 1` entries.
    InvalidThresholds,
    /// Formula parsing or evaluation failed.
    FormulaError,
    /// A column contains no usable values.
    EmptyColumn,
    /// A derived parameter produced no values at all.
    EmptyResult,
    /// A component produced no valid sub-scores and was left out of the total.
    NoValidScores,
    /// Values outside the expected clinical range.
    OutOfRange,
    /// Total scores above the warning ceiling.
    HighScore,
    /// Unrecognized method name in configuration.
    UnknownMethod,
    /// Non-numeric entries were coerced to missing.
    Coerced,
    /// An output column would overwrite an existing key column.
    NameConflict,
    /// Rows with a missing grouping key were left out of grouping.
    MissingKey,
}

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// The configured item this refers to (parameter, component, column).
    pub item: String,
    pub message: String,
    /// Number of affected rows, when meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl Diagnostic {
    pub fn new(
        stage: Stage,
        severity: Severity,
        kind: DiagnosticKind,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            severity,
            kind,
            item: item.into(),
            message: message.into(),
            count: None,
        }
    }

    /// Shorthand for an item that was skipped.
    pub fn skipped(
        stage: Stage,
        kind: DiagnosticKind,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(stage, Severity::Skipped, kind, item, message)
    }

    /// Shorthand for a data-quality warning.
    pub fn warning(
        stage: Stage,
        kind: DiagnosticKind,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(stage, Severity::Warning, kind, item, message)
    }

    #[must_use]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.item, self.message)?;
        if let Some(count) = self.count {
            write!(f, " ({count} rows)")?;
        }
        Ok(())
    }
}

/// All diagnostics of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn skipped_count(&self) -> usize {
        self.count_severity(Severity::Skipped)
    }

    pub fn warning_count(&self) -> usize {
        self.count_severity(Severity::Warning)
    }

    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.stage == stage)
    }

    fn count_severity(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts() {
        let mut report = RunReport::default();
        report.extend([
            Diagnostic::skipped(
                Stage::Derive,
                DiagnosticKind::MissingColumn,
                "pf_ratio",
                "required column FiO2 not found",
            ),
            Diagnostic::warning(
                Stage::Score,
                DiagnosticKind::HighScore,
                "sofa",
                "total above 15",
            )
            .with_count(3),
        ]);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.for_stage(Stage::Score).count(), 1);
    }

    #[test]
    fn display_includes_count() {
        let diagnostic =
            Diagnostic::warning(Stage::Score, DiagnosticKind::OutOfRange, "renal", "high")
                .with_count(2);
        assert_eq!(diagnostic.to_string(), "[score] renal: high (2 rows)");
    }

    #[test]
    fn serializes_snake_case() {
        let diagnostic = Diagnostic::skipped(
            Stage::Score,
            DiagnosticKind::InvalidThresholds,
            "liver",
            "4 thresholds need 5 scores",
        );
        let json = serde_json::to_string(&diagnostic).unwrap();
        assert!(json.contains("\"invalid_thresholds\""));
        assert!(json.contains("\"skipped\""));
        assert!(!json.contains("count"));
    }
}
