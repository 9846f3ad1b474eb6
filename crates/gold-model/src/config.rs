//! Pipeline configuration.
//!
//! These types mirror the user-authored pipeline file. Every struct uses
//! `#[serde(default)]`, so a mapping only needs the keys it overrides.
//! Loading the file is the caller's job; the engine consumes parsed values.

use serde::{Deserialize, Serialize};

use crate::column_ref::ColumnRef;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source table in the input schema.
    pub input_table: String,
    /// Target table in the output schema.
    pub output_table: String,
    pub pivot: PivotConfig,
    pub aggregation: AggregationConfig,
    pub imputation: ImputationConfig,
    pub derived_parameters: Vec<DerivedParameter>,
    pub clinical_scores: Vec<ClinicalScore>,
    pub save: SaveConfig,

    // Stage toggles, applied in this order.
    pub pivot_data: bool,
    pub aggregate_data: bool,
    pub impute_missing_values: bool,
    pub calculate_derived_parameters: bool,
    pub calculate_clinical_scores: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_table: "standardized_parameters".to_string(),
            output_table: "gold_parameters".to_string(),
            pivot: PivotConfig::default(),
            aggregation: AggregationConfig::default(),
            imputation: ImputationConfig::default(),
            derived_parameters: Vec::new(),
            clinical_scores: Vec::new(),
            save: SaveConfig::default(),
            pivot_data: true,
            aggregate_data: true,
            impute_missing_values: true,
            calculate_derived_parameters: true,
            calculate_clinical_scores: true,
        }
    }
}

/// Long-to-wide reshape settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    /// Columns identifying one output row.
    pub index_cols: Vec<String>,
    /// Column holding observation values.
    pub value_col: String,
    /// Column whose distinct values become output columns.
    pub pivot_col: String,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            index_cols: vec!["subject_id".to_string(), "charttime".to_string()],
            value_col: "value".to_string(),
            pivot_col: "concept_name".to_string(),
        }
    }
}

/// Time-window aggregation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Window size as an offset string such as `1H`, `30min` or `1d`.
    pub time_window: String,
    /// Reducer name: `mean`, `median`, `max` or `min`.
    pub method: String,
    /// Explicit timestamp column; detected when absent.
    pub time_column: Option<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            time_window: "1H".to_string(),
            method: "mean".to_string(),
            time_column: None,
        }
    }
}

/// Reducer applied to each numeric column within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Mean,
    Median,
    Max,
    Min,
}

impl AggregationMethod {
    /// Parse a reducer name, returning `None` for unrecognized names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Some(Self::Mean),
            "median" => Some(Self::Median),
            "max" | "maximum" => Some(Self::Max),
            "min" | "minimum" => Some(Self::Min),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// Missing-value imputation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    /// Strategy name, see [`ImputationMethod::from_name`].
    pub method: String,
    /// Grouping columns; names absent from the table are ignored.
    pub group_by: Vec<String>,
    /// Fill value for the `constant` strategy.
    pub constant_value: f64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            method: "locf".to_string(),
            group_by: vec!["subject_id".to_string()],
            constant_value: 0.0,
        }
    }
}

/// Imputation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationMethod {
    /// Last observation carried forward.
    CarryForward,
    /// Next observation carried backward.
    CarryBackward,
    MeanFill,
    MedianFill,
    ZeroFill,
    ConstantFill(f64),
    /// Most recent valid value at or before each row's timestamp.
    LastKnown,
}

impl ImputationMethod {
    /// Parse a strategy name. `constant` takes its fill value from `constant`.
    ///
    /// Accepted names: `locf`/`ffill`/`carry_forward`, `nocb`/`bfill`/`carry_backward`,
    /// `mean`, `median`, `zero`, `constant`, `last`/`last_known`.
    pub fn from_name(name: &str, constant: f64) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "locf" | "ffill" | "carry_forward" | "forward" => Some(Self::CarryForward),
            "nocb" | "bfill" | "carry_backward" | "backward" => Some(Self::CarryBackward),
            "mean" => Some(Self::MeanFill),
            "median" => Some(Self::MedianFill),
            "zero" => Some(Self::ZeroFill),
            "constant" => Some(Self::ConstantFill(constant)),
            "last" | "last_known" => Some(Self::LastKnown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CarryForward => "locf",
            Self::CarryBackward => "nocb",
            Self::MeanFill => "mean",
            Self::MedianFill => "median",
            Self::ZeroFill => "zero",
            Self::ConstantFill(_) => "constant",
            Self::LastKnown => "last",
        }
    }
}

/// A column computed from a formula over existing columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedParameter {
    /// Output column name.
    pub name: String,
    /// Arithmetic expression, e.g. `$["PaO2"] / $["FiO2"] * 100`.
    pub formula: String,
    /// Columns that must exist before the formula is evaluated.
    pub required_columns: Vec<ColumnRef>,
}

/// Threshold direction for a score component.
///
/// Deserialization is lenient: `ascending` in any case is ascending and any
/// other string is descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Direction {
    /// Higher values are worse: `value > threshold` raises the sub-score.
    Ascending,
    /// Lower values are worse: `value < threshold` raises the sub-score.
    Descending,
}

impl Direction {
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("ascending") {
            Self::Ascending
        } else {
            Self::Descending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

impl From<String> for Direction {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

/// A composite clinical score such as SOFA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalScore {
    /// Output column for the total; components are stored as `{name}_{component}`.
    pub name: String,
    pub components: Vec<ScoreComponent>,
    /// Totals are clipped to this ceiling.
    pub max_score: f64,
    /// Totals above this value are reported, never altered.
    pub warn_above: f64,
}

impl Default for ClinicalScore {
    fn default() -> Self {
        Self {
            name: String::new(),
            components: Vec::new(),
            max_score: 24.0,
            warn_above: 15.0,
        }
    }
}

/// One thresholded component of a clinical score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub name: String,
    pub parameter: ColumnRef,
    #[serde(default)]
    pub thresholds: Vec<f64>,
    /// Must hold exactly `thresholds.len() + 1` entries.
    #[serde(default)]
    pub scores: Vec<f64>,
    /// Defaults per component category when absent.
    #[serde(default)]
    pub direction: Option<Direction>,
    /// Values outside `[lo, hi]` get a missing sub-score.
    #[serde(default)]
    pub valid_range: Option<(f64, f64)>,
}

/// Behavior when the output table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistsPolicy {
    Fail,
    #[default]
    Replace,
    Append,
}

impl ExistsPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

/// Persistence settings for the final table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Output schema; the store's configured output schema when absent.
    pub schema: Option<String>,
    pub if_exists: ExistsPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gold_layer_conventions() {
        let config = PipelineConfig::default();
        assert_eq!(config.input_table, "standardized_parameters");
        assert_eq!(config.pivot.index_cols, vec!["subject_id", "charttime"]);
        assert_eq!(config.aggregation.time_window, "1H");
        assert_eq!(config.imputation.method, "locf");
        assert!(config.pivot_data && config.calculate_clinical_scores);
    }

    #[test]
    fn partial_mapping_fills_defaults() {
        let json = r#"{
            "aggregation": {"method": "max"},
            "impute_missing_values": false,
            "clinical_scores": [{
                "name": "sofa",
                "components": [{
                    "name": "cardiovascular",
                    "parameter": "MAP",
                    "thresholds": [70],
                    "scores": [0, 1]
                }]
            }]
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.aggregation.method, "max");
        assert_eq!(config.aggregation.time_window, "1H");
        assert!(!config.impute_missing_values);
        let score = &config.clinical_scores[0];
        assert_eq!(score.max_score, 24.0);
        assert_eq!(score.components[0].direction, None);
    }

    #[test]
    fn method_names() {
        assert_eq!(AggregationMethod::from_name("MEDIAN"), Some(AggregationMethod::Median));
        assert_eq!(AggregationMethod::from_name("sum"), None);
        assert_eq!(
            ImputationMethod::from_name("constant", 2.5),
            Some(ImputationMethod::ConstantFill(2.5))
        );
        assert_eq!(ImputationMethod::from_name("last", 0.0), Some(ImputationMethod::LastKnown));
        assert_eq!(ImputationMethod::from_name("spline", 0.0), None);
    }

    #[test]
    fn unrecognized_direction_is_descending() {
        let json = r#"{"name": "liver", "parameter": "Bilirubin", "direction": "up"}"#;
        let component: ScoreComponent = serde_json::from_str(json).unwrap();
        assert_eq!(component.direction, Some(Direction::Descending));
        let json = r#"{"name": "renal", "parameter": "Creatinine", "direction": "Ascending"}"#;
        let component: ScoreComponent = serde_json::from_str(json).unwrap();
        assert_eq!(component.direction, Some(Direction::Ascending));
    }

    #[test]
    fn component_from_toml() {
        let text = r#"
            name = "cns"
            parameter = 4253928
            thresholds = [15, 13, 10, 6]
            scores = [0, 1, 2, 3, 4]
            direction = "descending"
            valid_range = [3, 15]
        "#;
        let component: ScoreComponent = toml::from_str(text).unwrap();
        assert_eq!(component.parameter, ColumnRef::Id(4253928));
        assert_eq!(component.direction, Some(Direction::Descending));
        assert_eq!(component.valid_range, Some((3.0, 15.0)));
    }
}
