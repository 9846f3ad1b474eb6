//! Ordered stage execution.
//!
//! # Standard Pipeline Order
//!
//! 1. **PivotStep** - long to wide
//! 2. **AggregateStep** - time windows
//! 3. **ImputeStep** - missing values
//! 4. **DeriveStep** - derived parameters
//! 5. **ScoreStep** - clinical scores
//!
//! Each step is skipped when its configuration toggle is off.

use std::time::Instant;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{debug, info, info_span};

use gold_model::{PipelineConfig, RunReport, Stage};
use gold_transform::impute::missing_counts;
use gold_transform::{
    StageOutput, aggregate_time_windows, calculate_clinical_scores, calculate_derived_parameters,
    impute_missing_values, pivot_long_to_wide,
};

use crate::error::{PipelineError, Result};

/// One stage of the pipeline.
pub trait PipelineStep: Send + Sync {
    /// Transform `data` according to `config`.
    fn execute(
        &self,
        data: &DataFrame,
        config: &PipelineConfig,
    ) -> gold_transform::Result<StageOutput>;

    fn stage(&self) -> Stage;

    /// Whether the configuration turns this step off.
    fn should_skip(&self, config: &PipelineConfig) -> bool;
}

/// Shape of the table after one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub executed: bool,
    pub rows: usize,
    pub columns: usize,
    /// Missing cells across numeric columns.
    pub missing_values: usize,
    pub diagnostics: usize,
    pub elapsed_ms: u64,
}

impl StageSummary {
    fn measure(
        stage: Stage,
        executed: bool,
        data: &DataFrame,
        diagnostics: usize,
        started: Instant,
    ) -> Result<Self> {
        let missing = missing_counts(data, &[])
            .map_err(|source| PipelineError::Transform { stage, source })?;
        Ok(Self {
            stage,
            executed,
            rows: data.height(),
            columns: data.width(),
            missing_values: missing.values().sum(),
            diagnostics,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Result of running every step over a table.
#[derive(Debug, Clone)]
pub struct StepsOutcome {
    pub data: DataFrame,
    pub report: RunReport,
    pub stages: Vec<StageSummary>,
}

/// An ordered list of steps.
pub struct StepPipeline {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Default for StepPipeline {
    fn default() -> Self {
        build_default_pipeline()
    }
}

impl StepPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    #[must_use]
    pub fn add_step(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn remove_step(mut self, stage: Stage) -> Self {
        self.steps.retain(|s| s.stage() != stage);
        self
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.steps.iter().map(|s| s.stage()).collect()
    }

    /// Run all steps in order, each on the previous step's output.
    pub fn execute(&self, data: DataFrame, config: &PipelineConfig) -> Result<StepsOutcome> {
        let mut data = data;
        let mut report = RunReport::default();
        let mut stages = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let stage = step.stage();
            let started = Instant::now();
            if step.should_skip(config) {
                debug!(stage = %stage, "stage disabled");
                stages.push(StageSummary::measure(stage, false, &data, 0, started)?);
                continue;
            }

            let span = info_span!("stage", stage = %stage);
            let _guard = span.enter();
            let (next, diagnostics) = step
                .execute(&data, config)
                .map_err(|source| PipelineError::Transform { stage, source })?
                .into_parts();
            data = next;
            let summary = StageSummary::measure(stage, true, &data, diagnostics.len(), started)?;
            info!(
                rows = summary.rows,
                columns = summary.columns,
                diagnostics = summary.diagnostics,
                elapsed_ms = summary.elapsed_ms,
                "stage complete"
            );
            report.extend(diagnostics);
            stages.push(summary);
        }

        Ok(StepsOutcome {
            data,
            report,
            stages,
        })
    }
}

// ============================================================================
// Standard Steps
// ============================================================================

pub struct PivotStep;

impl PipelineStep for PivotStep {
    fn execute(&self, data: &DataFrame, config: &PipelineConfig) -> gold_transform::Result<StageOutput> {
        pivot_long_to_wide(data, &config.pivot)
    }

    fn stage(&self) -> Stage {
        Stage::Pivot
    }

    fn should_skip(&self, config: &PipelineConfig) -> bool {
        !config.pivot_data
    }
}

pub struct AggregateStep;

impl PipelineStep for AggregateStep {
    fn execute(&self, data: &DataFrame, config: &PipelineConfig) -> gold_transform::Result<StageOutput> {
        aggregate_time_windows(data, &config.aggregation)
    }

    fn stage(&self) -> Stage {
        Stage::Aggregate
    }

    fn should_skip(&self, config: &PipelineConfig) -> bool {
        !config.aggregate_data
    }
}

pub struct ImputeStep;

impl PipelineStep for ImputeStep {
    fn execute(&self, data: &DataFrame, config: &PipelineConfig) -> gold_transform::Result<StageOutput> {
        impute_missing_values(data, &config.imputation)
    }

    fn stage(&self) -> Stage {
        Stage::Impute
    }

    fn should_skip(&self, config: &PipelineConfig) -> bool {
        !config.impute_missing_values
    }
}

pub struct DeriveStep;

impl PipelineStep for DeriveStep {
    fn execute(&self, data: &DataFrame, config: &PipelineConfig) -> gold_transform::Result<StageOutput> {
        calculate_derived_parameters(data, &config.derived_parameters)
    }

    fn stage(&self) -> Stage {
        Stage::Derive
    }

    fn should_skip(&self, config: &PipelineConfig) -> bool {
        !config.calculate_derived_parameters
    }
}

pub struct ScoreStep;

impl PipelineStep for ScoreStep {
    fn execute(&self, data: &DataFrame, config: &PipelineConfig) -> gold_transform::Result<StageOutput> {
        calculate_clinical_scores(data, &config.clinical_scores)
    }

    fn stage(&self) -> Stage {
        Stage::Score
    }

    fn should_skip(&self, config: &PipelineConfig) -> bool {
        !config.calculate_clinical_scores
    }
}

/// Pivot, aggregate, impute, derive, score.
pub fn build_default_pipeline() -> StepPipeline {
    StepPipeline::new()
        .add_step(Box::new(PivotStep))
        .add_step(Box::new(AggregateStep))
        .add_step(Box::new(ImputeStep))
        .add_step(Box::new(DeriveStep))
        .add_step(Box::new(ScoreStep))
}

#[cfg(test)]
mod tests {
    use polars::prelude::{IntoColumn, NamedFrom, Series};

    use super::*;

    fn wide() -> DataFrame {
        DataFrame::new(vec![
            Series::new("subject_id".into(), vec![1i64, 1]).into_column(),
            Series::new("HR".into(), vec![Some(80.0), None]).into_column(),
        ])
        .unwrap()
    }

    #[test]
    fn default_order() {
        assert_eq!(
            build_default_pipeline().stages(),
            vec![
                Stage::Pivot,
                Stage::Aggregate,
                Stage::Impute,
                Stage::Derive,
                Stage::Score
            ]
        );
    }

    #[test]
    fn disabled_steps_pass_data_through() {
        let config = PipelineConfig {
            pivot_data: false,
            aggregate_data: false,
            ..PipelineConfig::default()
        };
        let outcome = build_default_pipeline().execute(wide(), &config).unwrap();
        assert!(!outcome.stages[0].executed);
        assert!(!outcome.stages[1].executed);
        assert_eq!(outcome.stages[1].missing_values, 1);
        assert!(outcome.stages[2].executed);
        assert_eq!(outcome.stages[2].missing_values, 0);
        assert_eq!(outcome.data.height(), 2);
    }

    #[test]
    fn removed_step_does_not_run() {
        let pipeline = build_default_pipeline().remove_step(Stage::Impute);
        assert_eq!(pipeline.stages().len(), 4);
        let config = PipelineConfig {
            pivot_data: false,
            aggregate_data: false,
            ..PipelineConfig::default()
        };
        let outcome = pipeline.execute(wide(), &config).unwrap();
        assert_eq!(outcome.stages.last().unwrap().missing_values, 1);
    }
}
