use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use gold_model::{Diagnostic, Severity};

use crate::commands::RunResult;

pub fn print_summary(result: &RunResult) {
    let run = &result.run;
    println!(
        "Input: {} rows -> Output: {} rows x {} columns",
        run.input_rows,
        run.data.height(),
        run.data.width()
    );
    if let Some(target) = &result.saved_to {
        println!("Saved: {target} ({} rows)", run.saved_rows.unwrap_or(0));
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Ran"),
        header_cell("Rows"),
        header_cell("Columns"),
        header_cell("Missing"),
        header_cell("Diagnostics"),
        header_cell("Time (ms)"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    for index in 2..7 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for stage in &run.stages {
        table.add_row(vec![
            Cell::new(stage.stage.as_str())
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            ran_cell(stage.executed),
            Cell::new(stage.rows),
            Cell::new(stage.columns),
            count_cell(stage.missing_values, Color::Yellow),
            count_cell(stage.diagnostics, Color::Yellow),
            dim_cell(stage.elapsed_ms),
        ]);
    }
    println!("{table}");
    print_diagnostic_table(&run.report.diagnostics);
}

fn print_diagnostic_table(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    let mut ordered: Vec<&Diagnostic> = diagnostics.iter().collect();
    ordered.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(a.stage.cmp(&b.stage))
            .then(a.item.cmp(&b.item))
    });

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Severity"),
        header_cell("Item"),
        header_cell("Kind"),
        header_cell("Rows"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 4, CellAlignment::Right);
    for diagnostic in ordered {
        table.add_row(vec![
            Cell::new(diagnostic.stage.as_str()),
            severity_cell(diagnostic.severity),
            Cell::new(&diagnostic.item),
            Cell::new(format!("{:?}", diagnostic.kind)),
            diagnostic
                .count
                .map_or_else(|| dim_cell("-"), Cell::new),
            Cell::new(&diagnostic.message),
        ]);
    }
    println!();
    println!("Diagnostics:");
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(100);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn ran_cell(executed: bool) -> Cell {
    if executed {
        Cell::new("✓")
            .fg(Color::Green)
            .add_attribute(Attribute::Bold)
    } else {
        dim_cell("off")
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Skipped => Cell::new("SKIPPED")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
        Severity::Info => dim_cell("INFO"),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
