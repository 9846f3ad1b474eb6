//! Gold-layer pipeline orchestration.
//!
//! A [`Pipeline`] loads a table from a [`gold_store::DataStore`], runs the
//! enabled stages in their fixed order (pivot, aggregate, impute, derive,
//! score) and optionally writes the result back. Item-level problems are
//! collected in the run's [`gold_model::RunReport`]; only structural
//! failures end a run with a [`PipelineError`].
//!
//! # Example
//!
//! ```ignore
//! use gold_core::{Pipeline, PipelineInput};
//! use gold_model::PipelineConfig;
//! use gold_store::CsvStore;
//!
//! let store = CsvStore::new("warehouse", "silver", "gold");
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), store);
//! let run = pipeline.run_and_save(PipelineInput::Default)?;
//! println!("{} rows, {} skipped items", run.data.height(), run.report.skipped_count());
//! ```

mod error;
mod pipeline;
pub mod step;

pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineInput, PipelineRun};
pub use step::{PipelineStep, StageSummary, StepPipeline, build_default_pipeline};
