//! Property-based tests for the transformation stages.
//!
//! These tests verify invariants that must hold for all inputs.

use std::collections::HashMap;

use polars::prelude::{DataFrame, IntoColumn, NamedFrom, Series};
use proptest::prelude::*;

use gold_common::{any_to_string, column_f64_values};
use gold_model::{
    ClinicalScore, ColumnRef, Direction, ImputationConfig, PivotConfig, ScoreComponent,
};
use gold_transform::score::component_scores;
use gold_transform::{
    Granularity, calculate_clinical_scores, impute_missing_values, pivot_long_to_wide,
    unpivot_wide_to_long,
};

// ============================================================================
// Strategies
// ============================================================================

fn granularity() -> impl Strategy<Value = Granularity> {
    (1i64..10_000_000).prop_map(|ms| Granularity::from_millis(ms).unwrap())
}

/// Sorted, distinct thresholds with matching increasing scores.
fn thresholds_and_scores() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    prop::collection::btree_set(0i32..500, 1..6).prop_map(|set| {
        let thresholds: Vec<f64> = set.into_iter().map(f64::from).collect();
        let scores: Vec<f64> = (0..=thresholds.len()).map(|i| i as f64).collect();
        (thresholds, scores)
    })
}

fn optional_value() -> impl Strategy<Value = Option<f64>> {
    prop::option::of(-100.0f64..600.0)
}

/// Wide rows: (subject, hour, value).
fn wide_rows() -> impl Strategy<Value = Vec<(i64, u32, Option<f64>)>> {
    prop::collection::vec((1i64..4, 0u32..24, prop::option::of(0.0f64..200.0)), 1..40)
}

/// Long rows: (subject, time label, concept, value).
fn long_rows() -> impl Strategy<Value = Vec<(i64, u32, usize, f64)>> {
    prop::collection::vec((1i64..4, 0u32..4, 0usize..3, 0.0f64..200.0), 1..40)
}

const CONCEPTS: [&str; 3] = ["HR", "MAP", "RR"];

fn wide_frame(rows: &[(i64, u32, Option<f64>)]) -> DataFrame {
    let subjects: Vec<i64> = rows.iter().map(|r| r.0).collect();
    let times: Vec<String> = rows
        .iter()
        .map(|r| format!("2024-01-01 {:02}:00:00", r.1))
        .collect();
    let values: Vec<Option<f64>> = rows.iter().map(|r| r.2).collect();
    DataFrame::new(vec![
        Series::new("subject_id".into(), subjects).into_column(),
        Series::new("charttime".into(), times).into_column(),
        Series::new("HR".into(), values).into_column(),
    ])
    .unwrap()
}

// ============================================================================
// Window flooring
// ============================================================================

proptest! {
    #[test]
    fn window_contains_its_timestamps(
        g in granularity(),
        ts in -10_000_000_000i64..10_000_000_000,
    ) {
        let start = g.floor(ts);
        prop_assert!(start <= ts);
        prop_assert!(ts < start + g.as_millis());
        prop_assert_eq!(start.rem_euclid(g.as_millis()), 0);
    }
}

// ============================================================================
// Component scores
// ============================================================================

proptest! {
    #[test]
    fn sub_scores_come_from_the_score_list(
        (thresholds, scores) in thresholds_and_scores(),
        values in prop::collection::vec(optional_value(), 0..50),
        ascending in any::<bool>(),
    ) {
        let direction = if ascending { Direction::Ascending } else { Direction::Descending };
        let subs = component_scores(&values, &thresholds, &scores, direction, None);
        prop_assert_eq!(subs.len(), values.len());
        for sub in subs {
            let sub = sub.expect("no valid range means no missing sub-score");
            prop_assert!(scores.contains(&sub));
        }
    }

    #[test]
    fn ascending_scores_never_decrease(
        (thresholds, scores) in thresholds_and_scores(),
        mut values in prop::collection::vec(-100.0f64..600.0, 1..50),
    ) {
        values.sort_by(f64::total_cmp);
        let values: Vec<Option<f64>> = values.into_iter().map(Some).collect();
        let subs = component_scores(&values, &thresholds, &scores, Direction::Ascending, None);
        let subs: Vec<f64> = subs.into_iter().flatten().collect();
        prop_assert!(subs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn descending_scores_never_increase(
        (mut thresholds, scores) in thresholds_and_scores(),
        mut values in prop::collection::vec(-100.0f64..600.0, 1..50),
    ) {
        thresholds.reverse();
        values.sort_by(f64::total_cmp);
        let values: Vec<Option<f64>> = values.into_iter().map(Some).collect();
        let subs = component_scores(&values, &thresholds, &scores, Direction::Descending, None);
        let subs: Vec<f64> = subs.into_iter().flatten().collect();
        prop_assert!(subs.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn totals_stay_within_bounds(
        values in prop::collection::vec(optional_value(), 1..30),
        component_scores_cfg in prop::collection::vec(
            (0i32..500, -10i32..20, -10i32..20),
            1..5,
        ),
        max_score in 1.0f64..30.0,
    ) {
        let df = DataFrame::new(vec![Series::new("x".into(), values).into_column()]).unwrap();
        let components = component_scores_cfg
            .iter()
            .enumerate()
            .map(|(i, (threshold, low, high))| ScoreComponent {
                name: format!("c{i}"),
                parameter: ColumnRef::from("x"),
                thresholds: vec![f64::from(*threshold)],
                scores: vec![f64::from(*low), f64::from(*high)],
                direction: Some(Direction::Ascending),
                valid_range: None,
            })
            .collect();
        let score = ClinicalScore {
            name: "total".to_string(),
            components,
            max_score,
            warn_above: 15.0,
        };
        let out = calculate_clinical_scores(&df, &[score]).unwrap();
        let totals = column_f64_values(out.data.column("total").unwrap()).unwrap();
        for total in totals {
            let total = total.expect("totals are never missing");
            prop_assert!((0.0..=max_score).contains(&total));
        }
    }
}

// ============================================================================
// Imputation
// ============================================================================

proptest! {
    #[test]
    fn imputation_is_idempotent(
        rows in wide_rows(),
        method in prop::sample::select(vec![
            "locf", "nocb", "mean", "median", "zero", "constant", "last",
        ]),
    ) {
        let config = ImputationConfig {
            method: method.to_string(),
            constant_value: -1.0,
            ..ImputationConfig::default()
        };
        let once = impute_missing_values(&wide_frame(&rows), &config).unwrap().data;
        let twice = impute_missing_values(&once, &config).unwrap().data;
        prop_assert!(once.equals_missing(&twice));
    }
}

// ============================================================================
// Reshape round trip
// ============================================================================

proptest! {
    #[test]
    fn pivot_then_unpivot_reproduces_means(rows in long_rows()) {
        let long = DataFrame::new(vec![
            Series::new("subject_id".into(), rows.iter().map(|r| r.0).collect::<Vec<_>>())
                .into_column(),
            Series::new(
                "charttime".into(),
                rows.iter().map(|r| format!("t{}", r.1)).collect::<Vec<_>>(),
            )
            .into_column(),
            Series::new(
                "concept_name".into(),
                rows.iter().map(|r| CONCEPTS[r.2]).collect::<Vec<_>>(),
            )
            .into_column(),
            Series::new("value".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>())
                .into_column(),
        ])
        .unwrap();

        let mut expected: HashMap<(String, String, String), (f64, usize)> = HashMap::new();
        for (subject, time, concept, value) in &rows {
            let entry = expected
                .entry((subject.to_string(), format!("t{time}"), CONCEPTS[*concept].to_string()))
                .or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        let config = PivotConfig::default();
        let wide = pivot_long_to_wide(&long, &config).unwrap().data;
        let back = unpivot_wide_to_long(&wide, &config.index_cols, "concept_name", "value").unwrap();
        prop_assert_eq!(back.height(), expected.len());

        let subjects = back.column("subject_id").unwrap();
        let times = back.column("charttime").unwrap();
        let concepts = back.column("concept_name").unwrap();
        let values = column_f64_values(back.column("value").unwrap()).unwrap();
        for (row, value) in values.iter().enumerate() {
            let key = (
                any_to_string(subjects.get(row).unwrap()),
                any_to_string(times.get(row).unwrap()),
                any_to_string(concepts.get(row).unwrap()),
            );
            let (sum, count) = expected[&key];
            let mean = sum / count as f64;
            prop_assert!((value.unwrap() - mean).abs() < 1e-9);
        }
    }
}
