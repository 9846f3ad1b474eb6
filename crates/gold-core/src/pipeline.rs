//! The gold-layer pipeline: load, transform, optionally save.

use polars::prelude::DataFrame;
use tracing::{info, info_span};

use gold_model::{ExistsPolicy, PipelineConfig, RunReport};
use gold_store::{DataStore, TableQuery};

use crate::error::Result;
use crate::step::{StageSummary, StepPipeline, build_default_pipeline};

/// Where a run takes its input from.
#[derive(Debug, Clone, Default)]
pub enum PipelineInput {
    /// `SELECT * FROM {input_schema}.{input_table}`.
    #[default]
    Default,
    /// An explicit query, run as is.
    Query(String),
    /// Data already in memory; the store is not read.
    Data(DataFrame),
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub data: DataFrame,
    pub report: RunReport,
    pub stages: Vec<StageSummary>,
    pub input_rows: usize,
    /// Rows written, when the run was saved.
    pub saved_rows: Option<usize>,
}

/// Runs the configured stages against tables from a [`DataStore`].
pub struct Pipeline<S> {
    config: PipelineConfig,
    store: S,
    steps: StepPipeline,
}

impl<S: DataStore> Pipeline<S> {
    pub fn new(config: PipelineConfig, store: S) -> Self {
        Self {
            config,
            store,
            steps: build_default_pipeline(),
        }
    }

    /// Replace the step list.
    #[must_use]
    pub fn with_steps(mut self, steps: StepPipeline) -> Self {
        self.steps = steps;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Read `table` from `schema`, defaulting to the configured input table
    /// and the store's input schema.
    pub fn load_table(&mut self, table: Option<&str>, schema: Option<&str>) -> Result<DataFrame> {
        let table = table.unwrap_or(&self.config.input_table);
        let schema = schema.unwrap_or(self.store.get_input_schema());
        let query = TableQuery::render(schema, table);
        Ok(self.store.execute_query(&query)?)
    }

    /// Resolve `input` into a table.
    pub fn load(&mut self, input: PipelineInput) -> Result<DataFrame> {
        match input {
            PipelineInput::Default => self.load_table(None, None),
            PipelineInput::Query(sql) => Ok(self.store.execute_query(&sql)?),
            PipelineInput::Data(data) => Ok(data),
        }
    }

    /// Apply the enabled stages to `data` without touching the store.
    pub fn transform(&self, data: DataFrame) -> Result<PipelineRun> {
        let input_rows = data.height();
        let outcome = self.steps.execute(data, &self.config)?;
        Ok(PipelineRun {
            data: outcome.data,
            report: outcome.report,
            stages: outcome.stages,
            input_rows,
            saved_rows: None,
        })
    }

    /// Load and transform.
    pub fn run(&mut self, input: PipelineInput) -> Result<PipelineRun> {
        let span = info_span!("pipeline");
        let _guard = span.enter();

        let data = self.load(input)?;
        info!(rows = data.height(), columns = data.width(), "input loaded");
        let run = self.transform(data)?;
        info!(
            rows = run.data.height(),
            columns = run.data.width(),
            skipped = run.report.skipped_count(),
            warnings = run.report.warning_count(),
            "pipeline complete"
        );
        Ok(run)
    }

    /// Load, transform and persist using the configured save settings.
    pub fn run_and_save(&mut self, input: PipelineInput) -> Result<PipelineRun> {
        let mut run = self.run(input)?;
        run.saved_rows = Some(self.save(&run.data)?);
        Ok(run)
    }

    /// Persist `data` to the configured output table.
    pub fn save(&mut self, data: &DataFrame) -> Result<usize> {
        let schema = self.config.save.schema.clone();
        let table = self.config.output_table.clone();
        self.save_to(data, Some(&table), schema.as_deref(), self.config.save.if_exists)
    }

    /// Persist `data`, defaulting to the configured output table and the
    /// store's output schema.
    pub fn save_to(
        &mut self,
        data: &DataFrame,
        table: Option<&str>,
        schema: Option<&str>,
        policy: ExistsPolicy,
    ) -> Result<usize> {
        let table = table.unwrap_or(&self.config.output_table);
        Ok(self.store.write_table(data, table, schema, policy)?)
    }
}
