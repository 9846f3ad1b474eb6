//! Run-level errors.

use gold_model::Stage;
use gold_store::StoreError;
use gold_transform::TransformError;
use thiserror::Error;

/// Structural failures that abort a pipeline run.
///
/// Item-level problems are diagnostics in the run report, never errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage could not process the table at all.
    #[error("{stage} stage failed: {source}")]
    Transform {
        stage: Stage,
        #[source]
        source: TransformError,
    },

    /// Loading or persisting through the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
