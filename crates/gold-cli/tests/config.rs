//! Loading configuration files.

use std::io::Write;

use tempfile::Builder;

use gold_cli::config::{load_database_config, load_pipeline_config};
use gold_model::{ColumnRef, Direction, ExistsPolicy};

fn file_with(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{content}").unwrap();
    file
}

#[test]
fn toml_pipeline_config() {
    let file = file_with(
        ".toml",
        r#"
input_table = "vitals_long"
impute_missing_values = false

[aggregation]
time_window = "4H"
method = "median"

[save]
if_exists = "append"

[[clinical_scores]]
name = "sofa"

[[clinical_scores.components]]
name = "cardiovascular"
parameter = "MAP"
thresholds = [70, 65, 60, 55]
scores = [0, 1, 2, 3, 4]
direction = "descending"

[[clinical_scores.components]]
name = "renal"
parameter = 3016723
thresholds = [1.2, 2.0, 3.5, 5.0]
scores = [0, 1, 2, 3, 4]
"#,
    );
    let config = load_pipeline_config(file.path()).unwrap();
    assert_eq!(config.input_table, "vitals_long");
    assert_eq!(config.output_table, "gold_parameters");
    assert!(!config.impute_missing_values);
    assert!(config.pivot_data);
    assert_eq!(config.aggregation.time_window, "4H");
    assert_eq!(config.save.if_exists, ExistsPolicy::Append);

    let components = &config.clinical_scores[0].components;
    assert_eq!(components[0].direction, Some(Direction::Descending));
    assert_eq!(components[1].parameter, ColumnRef::Id(3016723));
}

#[test]
fn json_pipeline_config() {
    let file = file_with(
        ".json",
        r#"{
            "derived_parameters": [
                {"name": "shock_index", "formula": "HR / SBP", "required_columns": ["HR", "SBP"]}
            ]
        }"#,
    );
    let config = load_pipeline_config(file.path()).unwrap();
    assert_eq!(config.derived_parameters.len(), 1);
    assert_eq!(config.derived_parameters[0].required_columns[1], ColumnRef::from("SBP"));
}

#[test]
fn unknown_extension_is_rejected() {
    let file = file_with(".yaml", "input_table: x\n");
    let err = load_pipeline_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("unsupported config format"));
}

#[test]
fn database_section() {
    let file = file_with(
        ".toml",
        r#"
[database]
user = "etl"
password = "pw"
host = "warehouse"
schema_input = "silver_v2"
"#,
    );
    let database = load_database_config(Some(file.path())).unwrap();
    assert_eq!(database.schema_input, "silver_v2");
    assert_eq!(database.schema_output, "gold");
    assert_eq!(
        database.connection_string(),
        "postgresql://etl:pw@warehouse:5432/clinical"
    );
    assert_eq!(load_database_config(None).unwrap().schema_input, "silver");
}
