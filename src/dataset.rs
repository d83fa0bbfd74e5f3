use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref FLOAT_PREFIX_REGEX: Regex =
        Regex::new(r"^[+-]?(Infinity|([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?)").unwrap();
}

/// Number of rows shown by [`RowDataset::preview`].
pub const PREVIEW_ROWS: usize = 10;

const EMPTY_CELL: &CellValue = &CellValue::Empty;

/// A single scalar read from a spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Reads a leading floating point number the way a browser's `parseFloat`
    /// does: surrounding junk after the number is ignored, anything without a
    /// numeric prefix yields `None`.
    pub fn parse_float(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_nan() => None,
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_float_prefix(s),
            CellValue::Empty => None,
        }
    }

    /// Numeric value for charting; anything unparseable counts as zero.
    pub fn as_chart_value(&self) -> f64 {
        match self.parse_float() {
            Some(v) if v != 0.0 => v,
            _ => 0.0,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

pub fn parse_float_prefix(input: &str) -> Option<f64> {
    let trimmed = input.trim_start();
    let matched = FLOAT_PREFIX_REGEX.find(trimmed)?.as_str();

    let (negative, unsigned) = match matched.as_bytes().first() {
        Some(b'-') => (true, &matched[1..]),
        Some(b'+') => (false, &matched[1..]),
        _ => (false, matched),
    };

    let magnitude = if unsigned == "Infinity" {
        f64::INFINITY
    } else {
        unsigned.parse::<f64>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// One decoded row before the column schema is fixed: column name to value,
/// in sheet order. Cells that were empty in the sheet are simply absent.
pub type Record = IndexMap<String, CellValue>;

/// The table currently loaded in the workspace.
///
/// The column set is taken from the keys of the first record and every row is
/// stored against that schema: values for unknown columns are dropped and
/// missing values become [`CellValue::Empty`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowDataset {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

/// First rows of a dataset, already flattened to display strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub truncated: bool,
}

impl RowDataset {
    pub fn from_records(records: Vec<Record>) -> Self {
        let columns: Vec<String> = records
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|column| record.swap_remove(column).unwrap_or_default())
                    .collect()
            })
            .collect();

        RowDataset { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Value of `column` in row `row`; out-of-range lookups read as empty.
    pub fn value(&self, row: usize, column: &str) -> &CellValue {
        match (self.rows.get(row), self.column_index(column)) {
            (Some(values), Some(idx)) => values.get(idx).unwrap_or(EMPTY_CELL),
            _ => EMPTY_CELL,
        }
    }

    /// All values of one column in row order. An unknown column yields one
    /// empty value per row.
    pub fn column_values<'a>(
        &'a self,
        column: &str,
    ) -> impl Iterator<Item = &'a CellValue> + use<'a> {
        let idx = self.column_index(column);
        self.rows.iter().map(move |values| match idx {
            Some(i) => &values[i],
            None => EMPTY_CELL,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Initial axis choice: first column for X, second (if any) for Y.
    pub fn default_axes(&self) -> Option<(String, String)> {
        let x = self.columns.first()?.clone();
        let y = self.columns.get(1).unwrap_or(&x).clone();
        Some((x, y))
    }

    pub fn preview(&self) -> Preview {
        Preview {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .take(PREVIEW_ROWS)
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
            total_rows: self.rows.len(),
            truncated: self.rows.len() > PREVIEW_ROWS,
        }
    }

    /// Built-in twelve month business table used for demos.
    pub fn sample() -> Self {
        const MONTHS: [(&str, f64, f64, f64); 12] = [
            ("Jan", 12000.0, 8000.0, 4000.0),
            ("Feb", 15000.0, 9000.0, 6000.0),
            ("Mar", 18000.0, 11000.0, 7000.0),
            ("Apr", 14000.0, 8500.0, 5500.0),
            ("May", 20000.0, 12000.0, 8000.0),
            ("Jun", 22000.0, 13000.0, 9000.0),
            ("Jul", 25000.0, 15000.0, 10000.0),
            ("Aug", 23000.0, 14000.0, 9000.0),
            ("Sep", 21000.0, 13500.0, 7500.0),
            ("Oct", 19000.0, 12000.0, 7000.0),
            ("Nov", 24000.0, 14500.0, 9500.0),
            ("Dec", 28000.0, 16000.0, 12000.0),
        ];

        let records = MONTHS
            .iter()
            .map(|&(month, sales, expenses, profit)| {
                let mut record = Record::new();
                record.insert("Month".to_string(), month.into());
                record.insert("Sales".to_string(), sales.into());
                record.insert("Expenses".to_string(), expenses.into());
                record.insert("Profit".to_string(), profit.into());
                record
            })
            .collect();

        Self::from_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, CellValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn float_prefix_follows_browser_rules() {
        assert_eq!(parse_float_prefix("42"), Some(42.0));
        assert_eq!(parse_float_prefix("  -3.5kg"), Some(-3.5));
        assert_eq!(parse_float_prefix(".25"), Some(0.25));
        assert_eq!(parse_float_prefix("1e3 units"), Some(1000.0));
        assert_eq!(parse_float_prefix("7."), Some(7.0));
        assert_eq!(parse_float_prefix("-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_float_prefix("abc"), None);
        assert_eq!(parse_float_prefix(""), None);
        assert_eq!(parse_float_prefix("-"), None);
    }

    #[test]
    fn columns_come_from_first_record() {
        let dataset = RowDataset::from_records(vec![
            record(&[("Name", "a".into()), ("Score", 1.0.into())]),
            record(&[("Score", 2.0.into()), ("Extra", "dropped".into())]),
        ]);

        assert_eq!(dataset.columns(), &["Name".to_string(), "Score".to_string()]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.value(1, "Name"), &CellValue::Empty);
        assert_eq!(dataset.value(1, "Score"), &CellValue::Number(2.0));
        assert!(!dataset.has_column("Extra"));
    }

    #[test]
    fn empty_records_give_empty_schema() {
        let dataset = RowDataset::from_records(Vec::new());
        assert!(dataset.is_empty());
        assert!(dataset.columns().is_empty());
        assert_eq!(dataset.default_axes(), None);
    }

    #[test]
    fn chart_value_zeroes_unparseable_cells() {
        assert_eq!(CellValue::from("12.5").as_chart_value(), 12.5);
        assert_eq!(CellValue::from("n/a").as_chart_value(), 0.0);
        assert_eq!(CellValue::Empty.as_chart_value(), 0.0);
    }

    #[test]
    fn preview_truncates_to_ten_rows() {
        let records = (0..15)
            .map(|i| record(&[("i", (i as f64).into())]))
            .collect();
        let preview = RowDataset::from_records(records).preview();

        assert_eq!(preview.rows.len(), PREVIEW_ROWS);
        assert_eq!(preview.total_rows, 15);
        assert!(preview.truncated);
        assert_eq!(preview.rows[3], vec!["3".to_string()]);
    }

    #[test]
    fn sample_has_twelve_rows_four_columns() {
        let sample = RowDataset::sample();
        assert_eq!(sample.len(), 12);
        assert_eq!(sample.columns().len(), 4);
        assert_eq!(
            sample.default_axes(),
            Some(("Month".to_string(), "Sales".to_string()))
        );
    }

    #[test]
    fn cell_values_serialize_as_plain_json_scalars() {
        let json = serde_json::to_string(&vec![
            CellValue::Number(1.5),
            CellValue::Text("x".into()),
            CellValue::Empty,
        ])
        .unwrap();
        assert_eq!(json, r#"[1.5,"x",null]"#);
    }
}
