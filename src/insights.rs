//! Descriptive statistics over the loaded dataset.
//!
//! A column counts as numeric when at least one of its values has a numeric
//! prefix. Mean, minimum and maximum are computed over the parseable values
//! only; text and empty cells are left out rather than counted as zero.

use crate::dataset::RowDataset;
use serde::Serialize;

pub const NO_DATA: &str = "No data available for analysis.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    /// How many rows contributed a value.
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub numeric: Vec<ColumnStats>,
    pub categorical: Vec<String>,
}

pub fn column_stats(dataset: &RowDataset, column: &str) -> Option<ColumnStats> {
    let values: Vec<f64> = dataset
        .column_values(column)
        .filter_map(|v| v.parse_float())
        .collect();

    if values.is_empty() {
        return None;
    }

    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(ColumnStats {
        column: column.to_string(),
        count: values.len(),
        mean: sum / values.len() as f64,
        min,
        max,
    })
}

pub fn profile(dataset: &RowDataset) -> DatasetProfile {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();

    for column in dataset.columns() {
        match column_stats(dataset, column) {
            Some(stats) => numeric.push(stats),
            None => categorical.push(column.clone()),
        }
    }

    DatasetProfile {
        row_count: dataset.len(),
        column_count: dataset.columns().len(),
        numeric,
        categorical,
    }
}

/// Fixed two-decimal display with exact halves rounded away from zero.
///
/// `{:.2}` rounds an exact tie to even. A double lies exactly halfway between
/// two hundredths only when it is an odd number of eighths.
fn two_decimals(value: f64) -> String {
    let eighths = value * 8.0;
    if eighths.is_finite() && eighths.fract() == 0.0 && eighths % 2.0 != 0.0 {
        let hundredths = (value.abs() * 100.0).ceil();
        return format!("{:.2}", value.signum() * hundredths / 100.0);
    }
    format!("{:.2}", value)
}

/// Human readable insight lines: overall shape, numeric columns, one line per
/// numeric column, then the categorical count.
pub fn analyze(dataset: &RowDataset) -> Vec<String> {
    if dataset.is_empty() {
        return vec![NO_DATA.to_string()];
    }

    let profile = profile(dataset);
    let mut insights = vec![format!(
        "Dataset contains {} rows and {} columns.",
        profile.row_count, profile.column_count
    )];

    if !profile.numeric.is_empty() {
        let names: Vec<&str> = profile.numeric.iter().map(|s| s.column.as_str()).collect();
        insights.push(format!(
            "Found {} numeric columns: {}.",
            names.len(),
            names.join(", ")
        ));

        for stats in &profile.numeric {
            insights.push(format!(
                "{}: Average = {}, Range = {} to {}.",
                stats.column,
                two_decimals(stats.mean),
                stats.min,
                stats.max
            ));
        }
    }

    if !profile.categorical.is_empty() {
        insights.push(format!(
            "Found {} categorical columns with unique values distributions.",
            profile.categorical.len()
        ));
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CellValue, Record};

    fn dataset(rows: Vec<Vec<(&str, CellValue)>>) -> RowDataset {
        RowDataset::from_records(
            rows.into_iter()
                .map(|pairs| {
                    pairs
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect::<Record>()
                })
                .collect(),
        )
    }

    #[test]
    fn empty_dataset_yields_single_statement() {
        let insights = analyze(&RowDataset::default());
        assert_eq!(insights, vec![NO_DATA.to_string()]);
    }

    #[test]
    fn mean_ignores_unparseable_values() {
        let data = dataset(vec![
            vec![("Score", 10.0.into())],
            vec![("Score", "n/a".into())],
            vec![("Score", "20".into())],
            vec![("Score", CellValue::Empty)],
        ]);

        let stats = column_stats(&data, "Score").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, 15.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 20.0);
    }

    #[test]
    fn statements_follow_fixed_order() {
        let data = dataset(vec![
            vec![("City", "Oslo".into()), ("Temp", 3.5.into()), ("Rain", 10.0.into())],
            vec![("City", "Rome".into()), ("Temp", 18.3.into()), ("Rain", 2.0.into())],
        ]);

        let insights = analyze(&data);
        assert_eq!(
            insights,
            vec![
                "Dataset contains 2 rows and 3 columns.".to_string(),
                "Found 2 numeric columns: Temp, Rain.".to_string(),
                "Temp: Average = 10.90, Range = 3.5 to 18.3.".to_string(),
                "Rain: Average = 6.00, Range = 2 to 10.".to_string(),
                "Found 1 categorical columns with unique values distributions.".to_string(),
            ]
        );
    }

    #[test]
    fn halfway_means_round_up() {
        let data = dataset(vec![vec![("V", 1.0.into())], vec![("V", 1.25.into())]]);
        let insights = analyze(&data);
        assert_eq!(insights[2], "V: Average = 1.13, Range = 1 to 1.25.");
    }

    #[test]
    fn two_decimal_display() {
        assert_eq!(two_decimals(1.125), "1.13");
        assert_eq!(two_decimals(2.375), "2.38");
        assert_eq!(two_decimals(-1.125), "-1.13");
        assert_eq!(two_decimals(0.625), "0.63");
        // Not exact halves in binary, so they round by their true value
        assert_eq!(two_decimals(1.005), "1.00");
        assert_eq!(two_decimals(2.675), "2.67");
        assert_eq!(two_decimals(1.25), "1.25");
        assert_eq!(two_decimals(10.9), "10.90");
        assert_eq!(two_decimals(7.0), "7.00");
    }

    #[test]
    fn one_parseable_value_makes_a_column_numeric() {
        let data = dataset(vec![
            vec![("Code", "A1".into())],
            vec![("Code", "7 items".into())],
        ]);

        let profile = profile(&data);
        assert_eq!(profile.numeric.len(), 1);
        assert_eq!(profile.numeric[0].mean, 7.0);
        assert!(profile.categorical.is_empty());
    }

    #[test]
    fn sample_dataset_profile() {
        let profile = profile(&RowDataset::sample());
        assert_eq!(profile.categorical, vec!["Month".to_string()]);
        let sales = &profile.numeric[0];
        assert_eq!(sales.column, "Sales");
        assert_eq!(sales.min, 12000.0);
        assert_eq!(sales.max, 28000.0);
    }
}
