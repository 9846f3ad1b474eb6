//! Derived parameters computed from configured formulas.
//!
//! Each parameter is independent: a missing input, a malformed formula or an
//! all-missing result skips that parameter with a diagnostic and the run
//! continues with the next one.

use std::collections::HashMap;

use polars::prelude::DataFrame;
use tracing::{debug, info, info_span, warn};

use gold_common::{column_f64_values, f64_column, is_numeric_dtype};
use gold_model::{ColumnRef, DerivedParameter, Diagnostic, DiagnosticKind, Severity, Stage};

use crate::data_utils::{column_names, summarize};
use crate::error::Result;
use crate::expr::{self, ExprError};
use crate::output::StageOutput;
use crate::resolve::{ColumnResolver, Resolution};

/// Evaluate every derived parameter in order, appending one column each.
///
/// Later parameters may reference columns produced by earlier ones.
pub fn calculate_derived_parameters(
    data: &DataFrame,
    parameters: &[DerivedParameter],
) -> Result<StageOutput> {
    let span = info_span!("derive", parameters = parameters.len());
    let _guard = span.enter();

    let resolver = ColumnResolver::exact();
    let mut out = data.clone();
    let mut diagnostics = Vec::new();
    let mut computed = 0usize;

    for parameter in parameters {
        if derive_one(&mut out, parameter, &resolver, &mut diagnostics)? {
            computed += 1;
        }
    }

    info!(computed, skipped = parameters.len() - computed, "derived parameters complete");
    Ok(StageOutput::with_diagnostics(out, diagnostics))
}

/// Compute one parameter into `out`. Returns whether a column was added.
fn derive_one(
    out: &mut DataFrame,
    parameter: &DerivedParameter,
    resolver: &ColumnResolver,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<bool> {
    let name = parameter.name.as_str();
    let skip = |kind, message: String| {
        warn!(parameter = %name, %message, "skipping derived parameter");
        Diagnostic::skipped(Stage::Derive, kind, name, message)
    };

    if name.trim().is_empty() {
        diagnostics.push(skip(
            DiagnosticKind::FormulaError,
            "derived parameter has no name".to_string(),
        ));
        return Ok(false);
    }

    let columns = column_names(out);
    let mut required = Vec::with_capacity(parameter.required_columns.len());
    let mut missing = Vec::new();
    for reference in &parameter.required_columns {
        match resolver.resolve(reference, &columns) {
            Resolution::Resolved { column, .. } => required.push(column),
            Resolution::Unresolved { reference, .. } => missing.push(reference.to_string()),
        }
    }
    if !missing.is_empty() {
        diagnostics.push(skip(
            DiagnosticKind::MissingColumn,
            format!("required column(s) not found: {}", missing.join(", ")),
        ));
        return Ok(false);
    }

    let formula = match expr::parse(&parameter.formula) {
        Ok(formula) => formula,
        Err(err) => {
            diagnostics.push(skip(
                DiagnosticKind::FormulaError,
                format!("invalid formula '{}': {err}", parameter.formula),
            ));
            return Ok(false);
        }
    };

    for column in &required {
        coerce_numeric(out, column, diagnostics)?;
    }

    let inputs = formula_inputs(out, &formula.references(), resolver, &columns)?;
    let values = match formula.evaluate(&inputs, out.height()) {
        Ok(values) => values,
        Err(err) => {
            diagnostics.push(skip(DiagnosticKind::FormulaError, evaluation_message(&err)));
            return Ok(false);
        }
    };

    let Some(summary) = summarize(&values) else {
        diagnostics.push(skip(
            DiagnosticKind::EmptyResult,
            "formula produced no values".to_string(),
        ));
        return Ok(false);
    };
    debug!(
        parameter = %name,
        count = summary.count,
        min = summary.min,
        max = summary.max,
        mean = summary.mean,
        "derived parameter computed"
    );
    out.with_column(f64_column(name, values))?;
    Ok(true)
}

/// Rewrite a non-numeric column as `Float64`, unparsable entries missing.
fn coerce_numeric(out: &mut DataFrame, column: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<()> {
    let source = out.column(column)?;
    if is_numeric_dtype(source.dtype()) {
        return Ok(());
    }
    let present_before = source.len() - source.null_count();
    let values = column_f64_values(source)?;
    let lost = present_before.saturating_sub(values.iter().flatten().count());
    debug!(column, lost, "coerced column to numeric");
    let mut diagnostic = Diagnostic::new(
        Stage::Derive,
        Severity::Info,
        DiagnosticKind::Coerced,
        column,
        "column converted to numeric",
    );
    if lost > 0 {
        diagnostic = diagnostic.with_count(lost as u64);
    }
    diagnostics.push(diagnostic);
    out.with_column(f64_column(column, values))?;
    Ok(())
}

/// Values for every reference in a formula, keyed by [`ColumnRef::key`].
/// Unresolvable references are left out and fail at evaluation.
fn formula_inputs(
    data: &DataFrame,
    references: &[ColumnRef],
    resolver: &ColumnResolver,
    columns: &[String],
) -> Result<HashMap<String, Vec<Option<f64>>>> {
    let mut inputs = HashMap::new();
    for reference in references {
        if let Resolution::Resolved { column, .. } = resolver.resolve(reference, columns) {
            inputs.insert(reference.key(), column_f64_values(data.column(&column)?)?);
        }
    }
    Ok(inputs)
}

fn evaluation_message(err: &ExprError) -> String {
    format!("evaluation failed: {err}")
}
