use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::Table;
use serde::Serialize;
use tracing::{debug, info, info_span};

use gold_core::{Pipeline, PipelineInput, PipelineRun, StageSummary};
use gold_model::Diagnostic;
use gold_store::{CsvStore, DataStore};

use gold_cli::config::{load_database_config, load_pipeline_config};

use crate::cli::{ColumnsArgs, RunArgs, StoreArgs, TablesArgs};
use crate::summary::apply_table_style;

/// A finished run and where its output went.
pub struct RunResult {
    pub run: PipelineRun,
    /// `schema.table` when the output was saved.
    pub saved_to: Option<String>,
}

/// JSON shape of `--report`.
#[derive(Serialize)]
struct ReportFile<'a> {
    input_rows: usize,
    output_rows: usize,
    output_columns: usize,
    saved_to: Option<&'a str>,
    saved_rows: Option<usize>,
    skipped: usize,
    warnings: usize,
    stages: &'a [StageSummary],
    diagnostics: &'a [Diagnostic],
}

pub fn run_pipeline(args: &RunArgs) -> Result<RunResult> {
    let span = info_span!("run", config = %args.config.display());
    let _guard = span.enter();

    let mut config = load_pipeline_config(&args.config)?;
    if let Some(table) = &args.output_table {
        config.output_table.clone_from(table);
    }
    if let Some(schema) = &args.output_schema {
        config.save.schema = Some(schema.clone());
    }
    if let Some(policy) = args.if_exists {
        config.save.if_exists = policy.into();
    }

    let store = open_store(&args.store)?;
    let mut pipeline = Pipeline::new(config, store);
    let input = args
        .query
        .clone()
        .map_or(PipelineInput::Default, PipelineInput::Query);

    let (run, saved_to) = if args.save {
        let target = format!(
            "{}.{}",
            pipeline
                .config()
                .save
                .schema
                .as_deref()
                .unwrap_or(pipeline.store().get_output_schema()),
            pipeline.config().output_table
        );
        let run = pipeline.run_and_save(input).context("run pipeline")?;
        info!(table = %target, rows = ?run.saved_rows, "output saved");
        (run, Some(target))
    } else {
        (pipeline.run(input).context("run pipeline")?, None)
    };

    let result = RunResult { run, saved_to };
    if let Some(path) = &args.report {
        write_report(&result, path)?;
    }
    Ok(result)
}

fn write_report(result: &RunResult, path: &Path) -> Result<()> {
    let run = &result.run;
    let report = ReportFile {
        input_rows: run.input_rows,
        output_rows: run.data.height(),
        output_columns: run.data.width(),
        saved_to: result.saved_to.as_deref(),
        saved_rows: run.saved_rows,
        skipped: run.report.skipped_count(),
        warnings: run.report.warning_count(),
        stages: &run.stages,
        diagnostics: &run.report.diagnostics,
    };
    let json = serde_json::to_string_pretty(&report).context("serialize run report")?;
    fs::write(path, json).with_context(|| format!("write report {}", path.display()))?;
    debug!(path = %path.display(), "run report written");
    Ok(())
}

pub fn run_schemas(args: &StoreArgs) -> Result<()> {
    let mut store = open_store(args)?;
    let schemas = store.get_schema_names().context("list schemas")?;
    let mut table = Table::new();
    table.set_header(vec!["Schema", "Role"]);
    apply_table_style(&mut table);
    for schema in schemas {
        let role = if schema == store.get_input_schema() {
            "input"
        } else if schema == store.get_output_schema() {
            "output"
        } else {
            ""
        };
        table.add_row(vec![schema.as_str(), role]);
    }
    println!("{table}");
    Ok(())
}

pub fn run_tables(args: &TablesArgs) -> Result<()> {
    let mut store = open_store(&args.store)?;
    let tables = store
        .get_tables(args.schema.as_deref())
        .context("list tables")?;
    let schema = args
        .schema
        .clone()
        .unwrap_or_else(|| store.get_input_schema().to_string());
    let mut table = Table::new();
    table.set_header(vec!["Schema", "Table"]);
    apply_table_style(&mut table);
    for name in tables {
        table.add_row(vec![schema.as_str(), name.as_str()]);
    }
    println!("{table}");
    Ok(())
}

pub fn run_columns(args: &ColumnsArgs) -> Result<()> {
    let mut store = open_store(&args.store)?;
    let columns = store
        .get_columns(&args.table, args.schema.as_deref())
        .with_context(|| format!("list columns of {}", args.table))?;
    let mut table = Table::new();
    table.set_header(vec!["#", "Column"]);
    apply_table_style(&mut table);
    for (index, column) in columns.iter().enumerate() {
        table.add_row(vec![(index + 1).to_string(), column.clone()]);
    }
    println!("{table}");
    Ok(())
}

fn open_store(args: &StoreArgs) -> Result<CsvStore> {
    let database = load_database_config(args.database.as_deref())?;
    debug!(
        connection = %database.redacted(),
        input = %database.schema_input,
        output = %database.schema_output,
        "database settings loaded"
    );
    let mut store = CsvStore::from_config(&args.data_dir, &database);
    store
        .connect()
        .with_context(|| format!("open store {}", args.data_dir.display()))?;
    Ok(store)
}
