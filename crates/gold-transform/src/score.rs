//! Composite clinical scores such as SOFA.
//!
//! Every component maps one parameter through ordered thresholds to a
//! sub-score. Components are processed in configured order and summed into
//! the total, which is clipped to `[0, max_score]`. A component that cannot
//! be computed is skipped with a diagnostic; the remaining components still
//! count.

use polars::prelude::DataFrame;
use tracing::{debug, info, info_span, warn};

use gold_common::{column_f64_values, f64_column};
use gold_model::{ClinicalScore, Diagnostic, DiagnosticKind, Direction, ScoreComponent, Stage};

use crate::data_utils::{column_names, summarize};
use crate::error::Result;
use crate::output::StageOutput;
use crate::resolve::{ColumnResolver, Resolution};

/// Known component categories, matched on the component name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentCategory {
    Respiratory,
    Coagulation,
    Liver,
    Cardiovascular,
    Neurological,
    Renal,
    Other,
}

impl ComponentCategory {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "respiratory" | "respiration" => Self::Respiratory,
            "coagulation" => Self::Coagulation,
            "liver" | "hepatic" => Self::Liver,
            "cardiovascular" => Self::Cardiovascular,
            "cns" | "neurological" | "gcs" => Self::Neurological,
            "renal" | "kidney" => Self::Renal,
            _ => Self::Other,
        }
    }

    /// Lower values are worse unless the category says otherwise.
    pub fn default_direction(self) -> Direction {
        match self {
            Self::Liver | Self::Renal => Direction::Ascending,
            _ => Direction::Descending,
        }
    }

    /// Parameter values above this are clinically implausible.
    pub fn plausible_max(self) -> Option<f64> {
        match self {
            Self::Respiratory | Self::Coagulation => Some(1000.0),
            Self::Liver => Some(50.0),
            Self::Cardiovascular => Some(200.0),
            Self::Renal => Some(20.0),
            Self::Neurological | Self::Other => None,
        }
    }

    /// Domain outside which a value gets no sub-score (Glasgow coma scale).
    pub fn default_valid_range(self) -> Option<(f64, f64)> {
        match self {
            Self::Neurological => Some((3.0, 15.0)),
            _ => None,
        }
    }
}

/// Map parameter values to sub-scores.
///
/// Every row starts at `scores[0]`; for each threshold in order, rows past it
/// (above for ascending, below for descending) take `scores[i + 1]`, so later
/// thresholds win. A missing value keeps `scores[0]`. Values outside
/// `valid_range` get a missing sub-score.
///
/// `scores` should hold `thresholds.len() + 1` entries. Surplus thresholds
/// are ignored and an empty `scores` yields no sub-scores at all.
pub fn component_scores(
    values: &[Option<f64>],
    thresholds: &[f64],
    scores: &[f64],
    direction: Direction,
    valid_range: Option<(f64, f64)>,
) -> Vec<Option<f64>> {
    let Some((&base, raised)) = scores.split_first() else {
        return vec![None; values.len()];
    };
    values
        .iter()
        .map(|value| {
            let Some(v) = *value else {
                return Some(base);
            };
            if let Some((lo, hi)) = valid_range
                && (v < lo || v > hi)
            {
                return None;
            }
            let mut score = base;
            for (threshold, next) in thresholds.iter().zip(raised) {
                let past = match direction {
                    Direction::Ascending => v > *threshold,
                    Direction::Descending => v < *threshold,
                };
                if past {
                    score = *next;
                }
            }
            Some(score)
        })
        .collect()
}

/// Compute every configured score, adding the total column and one
/// `{score}_{component}` column per computed component.
pub fn calculate_clinical_scores(data: &DataFrame, scores: &[ClinicalScore]) -> Result<StageOutput> {
    let span = info_span!("score", scores = scores.len());
    let _guard = span.enter();

    let resolver = ColumnResolver::clinical();
    let mut out = data.clone();
    let mut diagnostics = Vec::new();

    for score in scores {
        if score.name.trim().is_empty() {
            diagnostics.push(Diagnostic::skipped(
                Stage::Score,
                DiagnosticKind::MissingColumn,
                "<unnamed>",
                "clinical score has no name",
            ));
            continue;
        }
        score_one(&mut out, score, &resolver, &mut diagnostics)?;
    }

    info!(columns = out.width(), diagnostics = diagnostics.len(), "clinical scores complete");
    Ok(StageOutput::with_diagnostics(out, diagnostics))
}

fn score_one(
    out: &mut DataFrame,
    score: &ClinicalScore,
    resolver: &ColumnResolver,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    let span = info_span!("clinical_score", score = %score.name);
    let _guard = span.enter();

    let mut total = vec![0.0; out.height()];
    let mut contributing = 0usize;

    for component in &score.components {
        let Some(sub_scores) = evaluate_component(out, score, component, resolver, diagnostics)?
        else {
            continue;
        };
        if sub_scores.iter().any(Option::is_some) {
            for (sum, sub) in total.iter_mut().zip(&sub_scores) {
                *sum += sub.unwrap_or(0.0);
            }
            contributing += 1;
        } else {
            diagnostics.push(component_diagnostic(
                score,
                component,
                DiagnosticKind::NoValidScores,
                "no valid sub-scores, left out of the total".to_string(),
            ));
        }
        out.with_column(f64_column(
            &format!("{}_{}", score.name, component.name),
            sub_scores,
        ))?;
    }

    if contributing == 0 {
        warn!("no component contributed to the total");
        diagnostics.push(Diagnostic::warning(
            Stage::Score,
            DiagnosticKind::NoValidScores,
            score.name.as_str(),
            "no component contributed, total is 0",
        ));
    }

    let ceiling = score.max_score.max(0.0);
    for sum in &mut total {
        *sum = sum.clamp(0.0, ceiling);
    }
    let high = total.iter().filter(|&&t| t > score.warn_above).count();
    if high > 0 {
        warn!(rows = high, ceiling = score.warn_above, "unusually high total scores");
        diagnostics.push(
            Diagnostic::warning(
                Stage::Score,
                DiagnosticKind::HighScore,
                score.name.as_str(),
                format!("total above {}", score.warn_above),
            )
            .with_count(high as u64),
        );
    }

    let total: Vec<Option<f64>> = total.into_iter().map(Some).collect();
    if let Some(summary) = summarize(&total) {
        debug!(min = summary.min, max = summary.max, mean = summary.mean, "total score computed");
    }
    out.with_column(f64_column(&score.name, total))?;
    Ok(())
}

/// Resolve and score one component. `None` means it was skipped.
fn evaluate_component(
    out: &DataFrame,
    score: &ClinicalScore,
    component: &ScoreComponent,
    resolver: &ColumnResolver,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<Vec<Option<f64>>>> {
    let column = match resolver.resolve(&component.parameter, &column_names(out)) {
        Resolution::Resolved { column, strategy } => {
            debug!(component = %component.name, %column, %strategy, "parameter resolved");
            column
        }
        Resolution::Unresolved { reference, attempted } => {
            let tried: Vec<&str> = attempted.iter().map(|s| s.as_str()).collect();
            diagnostics.push(component_diagnostic(
                score,
                component,
                DiagnosticKind::UnresolvedParameter,
                format!("parameter {reference} not found (tried {})", tried.join(", ")),
            ));
            return Ok(None);
        }
    };

    if component.scores.len() != component.thresholds.len() + 1 {
        diagnostics.push(component_diagnostic(
            score,
            component,
            DiagnosticKind::InvalidThresholds,
            format!(
                "{} thresholds need {} scores, got {}",
                component.thresholds.len(),
                component.thresholds.len() + 1,
                component.scores.len()
            ),
        ));
        return Ok(None);
    }

    let values = column_f64_values(out.column(&column)?)?;
    let Some(summary) = summarize(&values) else {
        diagnostics.push(component_diagnostic(
            score,
            component,
            DiagnosticKind::EmptyColumn,
            format!("column {column} has no values"),
        ));
        return Ok(None);
    };

    let category = ComponentCategory::from_name(&component.name);
    if let Some(limit) = category.plausible_max()
        && summary.max > limit
    {
        let above = values.iter().flatten().filter(|&&v| v > limit).count();
        diagnostics.push(
            Diagnostic::warning(
                Stage::Score,
                DiagnosticKind::OutOfRange,
                format!("{}_{}", score.name, component.name),
                format!("{column} values unusually high (max {})", summary.max),
            )
            .with_count(above as u64),
        );
    }

    let direction = component
        .direction
        .unwrap_or_else(|| category.default_direction());
    let valid_range = component
        .valid_range
        .or_else(|| category.default_valid_range());
    debug!(
        component = %component.name,
        direction = direction.as_str(),
        min = summary.min,
        max = summary.max,
        mean = summary.mean,
        "scoring component"
    );

    let sub_scores = component_scores(
        &values,
        &component.thresholds,
        &component.scores,
        direction,
        valid_range,
    );

    if let Some((lo, hi)) = valid_range {
        let outside = values
            .iter()
            .flatten()
            .filter(|&&v| v < lo || v > hi)
            .count();
        if outside > 0 {
            diagnostics.push(
                Diagnostic::warning(
                    Stage::Score,
                    DiagnosticKind::OutOfRange,
                    format!("{}_{}", score.name, component.name),
                    format!("{column} values outside valid range [{lo}, {hi}], sub-score left missing"),
                )
                .with_count(outside as u64),
            );
        }
    }
    Ok(Some(sub_scores))
}

fn component_diagnostic(
    score: &ClinicalScore,
    component: &ScoreComponent,
    kind: DiagnosticKind,
    message: String,
) -> Diagnostic {
    warn!(component = %component.name, %message, "component skipped");
    let item = format!("{}_{}", score.name, component.name);
    match kind {
        DiagnosticKind::NoValidScores => Diagnostic::warning(Stage::Score, kind, item, message),
        _ => Diagnostic::skipped(Stage::Score, kind, item, message),
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::{AnyValue, IntoColumn, NamedFrom, Series};

    use gold_model::ColumnRef;

    use super::*;

    fn component(
        name: &str,
        parameter: &str,
        thresholds: &[f64],
        scores: &[f64],
    ) -> ScoreComponent {
        ScoreComponent {
            name: name.to_string(),
            parameter: ColumnRef::from(parameter),
            thresholds: thresholds.to_vec(),
            scores: scores.to_vec(),
            direction: None,
            valid_range: None,
        }
    }

    fn sofa(components: Vec<ScoreComponent>) -> ClinicalScore {
        ClinicalScore {
            name: "sofa".to_string(),
            components,
            ..ClinicalScore::default()
        }
    }

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("Mean arterial pressure".into(), vec![Some(75.0), Some(50.0), None])
                .into_column(),
            Series::new("Creatinine".into(), vec![Some(1.0), Some(4.0), Some(6.0)]).into_column(),
            Series::new("GCS".into(), vec![Some(15.0), Some(2.0), Some(8.0)]).into_column(),
        ])
        .unwrap()
    }

    fn values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        column_f64_values(df.column(name).unwrap()).unwrap()
    }

    #[test]
    fn cardiovascular_descending_through_alias() {
        let score = sofa(vec![component(
            "cardiovascular",
            "MAP",
            &[70.0, 65.0, 60.0, 55.0],
            &[0.0, 1.0, 2.0, 3.0, 4.0],
        )]);
        let out = calculate_clinical_scores(&frame(), &[score]).unwrap();
        assert_eq!(
            values(&out.data, "sofa_cardiovascular"),
            vec![Some(0.0), Some(4.0), Some(0.0)]
        );
        assert_eq!(values(&out.data, "sofa"), vec![Some(0.0), Some(4.0), Some(0.0)]);
    }

    #[test]
    fn renal_defaults_to_ascending() {
        let score = sofa(vec![component(
            "renal",
            "Creatinine",
            &[1.2, 2.0, 3.5, 5.0],
            &[0.0, 1.0, 2.0, 3.0, 4.0],
        )]);
        let out = calculate_clinical_scores(&frame(), &[score]).unwrap();
        assert_eq!(
            values(&out.data, "sofa_renal"),
            vec![Some(0.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn gcs_outside_range_is_missing_and_adds_nothing() {
        let score = sofa(vec![component(
            "cns",
            "GCS",
            &[15.0, 13.0, 10.0, 6.0],
            &[0.0, 1.0, 2.0, 3.0, 4.0],
        )]);
        let out = calculate_clinical_scores(&frame(), &[score]).unwrap();
        assert_eq!(values(&out.data, "sofa_cns"), vec![Some(0.0), None, Some(3.0)]);
        assert_eq!(values(&out.data, "sofa"), vec![Some(0.0), Some(0.0), Some(3.0)]);
        let range = out
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::OutOfRange)
            .unwrap();
        assert_eq!(range.count, Some(1));
    }

    #[test]
    fn invalid_and_unresolved_components_are_skipped() {
        let score = sofa(vec![
            component("liver", "Bilirubin.total", &[1.2], &[0.0, 1.0]),
            component("renal", "Creatinine", &[1.2, 2.0], &[0.0, 1.0]),
            component("cardiovascular", "MAP", &[70.0], &[0.0, 1.0]),
        ]);
        let out = calculate_clinical_scores(&frame(), &[score]).unwrap();
        let kinds: Vec<DiagnosticKind> = out.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::UnresolvedParameter, DiagnosticKind::InvalidThresholds]
        );
        assert!(out.data.column("sofa_liver").is_err());
        assert!(out.data.column("sofa_renal").is_err());
        assert_eq!(values(&out.data, "sofa"), vec![Some(0.0), Some(1.0), Some(0.0)]);
    }

    #[test]
    fn total_is_clipped_and_high_scores_reported() {
        let df = DataFrame::new(vec![
            Series::new("a".into(), vec![10.0, 1.0]).into_column(),
        ])
        .unwrap();
        let score = ClinicalScore {
            name: "burden".to_string(),
            components: vec![
                ScoreComponent {
                    direction: Some(Direction::Ascending),
                    ..component("first", "a", &[5.0], &[0.0, 14.0])
                },
                ScoreComponent {
                    direction: Some(Direction::Ascending),
                    ..component("second", "a", &[5.0], &[0.0, 14.0])
                },
            ],
            max_score: 24.0,
            warn_above: 15.0,
        };
        let out = calculate_clinical_scores(&df, &[score]).unwrap();
        assert_eq!(out.data.column("burden").unwrap().get(0).unwrap(), AnyValue::Float64(24.0));
        let high = out
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::HighScore)
            .unwrap();
        assert_eq!(high.count, Some(1));
    }

    #[test]
    fn empty_parameter_column_is_skipped() {
        let df = DataFrame::new(vec![
            Series::new("Platelets".into(), vec![None::<f64>, None]).into_column(),
        ])
        .unwrap();
        let score = sofa(vec![component(
            "coagulation",
            "Platelets",
            &[150.0],
            &[0.0, 1.0],
        )]);
        let out = calculate_clinical_scores(&df, &[score]).unwrap();
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::EmptyColumn);
        assert_eq!(values(&out.data, "sofa"), vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn implausible_values_are_reported_not_altered() {
        let df = DataFrame::new(vec![
            Series::new("Creatinine".into(), vec![1.0, 25.0]).into_column(),
        ])
        .unwrap();
        let score = sofa(vec![component("renal", "Creatinine", &[1.2], &[0.0, 1.0])]);
        let out = calculate_clinical_scores(&df, &[score]).unwrap();
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::OutOfRange);
        assert_eq!(values(&out.data, "sofa_renal"), vec![Some(0.0), Some(1.0)]);
    }

    #[test]
    fn component_scores_without_score_list_are_missing() {
        let subs = component_scores(&[Some(1.0), None], &[], &[], Direction::Ascending, None);
        assert_eq!(subs, vec![None, None]);
    }
}
