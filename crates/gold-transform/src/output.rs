//! Stage result type.

use gold_model::Diagnostic;
use polars::prelude::DataFrame;

/// A transformed table together with the diagnostics raised while producing it.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub data: DataFrame,
    pub diagnostics: Vec<Diagnostic>,
}

impl StageOutput {
    pub fn new(data: DataFrame) -> Self {
        Self {
            data,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(data: DataFrame, diagnostics: Vec<Diagnostic>) -> Self {
        Self { data, diagnostics }
    }

    /// Split into the table and its diagnostics.
    pub fn into_parts(self) -> (DataFrame, Vec<Diagnostic>) {
        (self.data, self.diagnostics)
    }
}
