//! Renderer-agnostic chart descriptions.
//!
//! A [`ChartSpec`] carries everything a plotting front-end needs (labels,
//! values, colours, axis titles) without depending on one. 2D kinds map onto a
//! bar/line/pie style description, the 3D kinds onto point-cloud and surface
//! descriptions.

use crate::dataset::{CellValue, RowDataset};
use crate::error::ChartError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FILL_COLOR: &str = "rgba(102, 126, 234, 0.2)";
pub const BORDER_COLOR: &str = "rgba(102, 126, 234, 1)";
pub const COLOR_SCALE: &str = "Viridis";

/// Upper bound on the side of the 3D surface grid.
pub const MAX_SURFACE_SIDE: usize = 10;

/// Supported chart types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartKind {
    #[serde(rename = "bar")]
    Bar,
    #[serde(rename = "line")]
    Line,
    #[serde(rename = "pie")]
    Pie,
    /// Line chart with the area below the line filled
    #[serde(rename = "area")]
    Area,
    #[serde(rename = "3d-scatter")]
    Scatter3d,
    #[serde(rename = "3d-surface")]
    Surface3d,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::Bar,
        ChartKind::Line,
        ChartKind::Pie,
        ChartKind::Area,
        ChartKind::Scatter3d,
        ChartKind::Surface3d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Area => "area",
            ChartKind::Scatter3d => "3d-scatter",
            ChartKind::Surface3d => "3d-surface",
        }
    }

    pub fn is_3d(&self) -> bool {
        matches!(self, ChartKind::Scatter3d | ChartKind::Surface3d)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ChartError::UnknownKind(s.to_string()))
    }
}

/// Underlying 2D renderer type. `area` is drawn as a filled line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanarType {
    Bar,
    Line,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Background {
    Single(String),
    PerPoint(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueAxis {
    pub begin_at_zero: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanarChart {
    pub render_type: PlanarType,
    pub title: String,
    pub dataset_label: String,
    pub labels: Vec<CellValue>,
    pub values: Vec<f64>,
    pub background: Background,
    pub border_color: String,
    pub border_width: u32,
    pub fill: bool,
    pub show_legend: bool,
    /// `None` hides the value scale entirely (pie charts).
    pub value_axis: Option<ValueAxis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scatter3d {
    pub title: String,
    pub x: Vec<CellValue>,
    pub y: Vec<f64>,
    /// Row position; there is no real third data column.
    pub z: Vec<f64>,
    pub marker_size: u32,
    pub color_scale: String,
    pub axis_titles: [String; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface3d {
    pub title: String,
    pub size: usize,
    pub x: Vec<usize>,
    pub y: Vec<usize>,
    /// `z[i][j]` is the Y value at flattened row index `i * size + j`.
    pub z: Vec<Vec<f64>>,
    pub color_scale: String,
    pub axis_titles: [String; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "renderer", rename_all = "camelCase")]
pub enum ChartBody {
    Planar(PlanarChart),
    Scatter3d(Scatter3d),
    Surface3d(Surface3d),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x_axis: String,
    pub y_axis: String,
    pub body: ChartBody,
}

impl ChartSpec {
    pub fn title(&self) -> &str {
        match &self.body {
            ChartBody::Planar(chart) => &chart.title,
            ChartBody::Scatter3d(chart) => &chart.title,
            ChartBody::Surface3d(chart) => &chart.title,
        }
    }
}

/// Hue for point `index` out of `count`, evenly spread over [0, 360).
pub fn hue(index: usize, count: usize) -> f64 {
    (index as f64 * 360.0 / count as f64) % 360.0
}

/// One HSL colour per data point for pie slices.
pub fn palette(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("hsl({}, 70%, 60%)", hue(i, count)))
        .collect()
}

/// Side length of the 3D surface grid for `rows` data rows.
pub fn surface_side(rows: usize) -> usize {
    ((rows as f64).sqrt().floor() as usize).min(MAX_SURFACE_SIDE)
}

/// Builds the chart description for the selected axes.
///
/// An empty axis name means "not selected". Either axis missing, an axis that
/// is not a column of the dataset, or an empty dataset is a validation error.
pub fn build_chart(
    dataset: &RowDataset,
    x_axis: &str,
    y_axis: &str,
    kind: ChartKind,
) -> Result<ChartSpec, ChartError> {
    if x_axis.is_empty() || y_axis.is_empty() {
        return Err(ChartError::MissingAxis);
    }
    if dataset.is_empty() {
        return Err(ChartError::EmptyDataset);
    }
    if !dataset.has_column(x_axis) || !dataset.has_column(y_axis) {
        return Err(ChartError::MissingAxis);
    }

    let labels: Vec<CellValue> = dataset.column_values(x_axis).cloned().collect();
    let values: Vec<f64> = dataset
        .column_values(y_axis)
        .map(CellValue::as_chart_value)
        .collect();

    let body = match kind {
        ChartKind::Scatter3d => ChartBody::Scatter3d(Scatter3d {
            title: format!("3D Scatter: {} vs {}", y_axis, x_axis),
            x: labels,
            z: (0..values.len()).map(|i| i as f64).collect(),
            y: values,
            marker_size: 8,
            color_scale: COLOR_SCALE.to_string(),
            axis_titles: [x_axis.to_string(), y_axis.to_string(), "Index".to_string()],
        }),
        ChartKind::Surface3d => ChartBody::Surface3d(surface(&values, y_axis)),
        planar => ChartBody::Planar(planar_chart(planar, labels, values, x_axis, y_axis)),
    };

    Ok(ChartSpec {
        kind,
        x_axis: x_axis.to_string(),
        y_axis: y_axis.to_string(),
        body,
    })
}

fn planar_chart(
    kind: ChartKind,
    labels: Vec<CellValue>,
    values: Vec<f64>,
    x_axis: &str,
    y_axis: &str,
) -> PlanarChart {
    let title = format!("{} vs {}", y_axis, x_axis);
    let is_pie = kind == ChartKind::Pie;

    let render_type = match kind {
        ChartKind::Bar => PlanarType::Bar,
        ChartKind::Pie => PlanarType::Pie,
        _ => PlanarType::Line,
    };

    let background = if is_pie {
        Background::PerPoint(palette(values.len()))
    } else {
        Background::Single(FILL_COLOR.to_string())
    };

    PlanarChart {
        render_type,
        dataset_label: title.clone(),
        title,
        labels,
        values,
        background,
        border_color: BORDER_COLOR.to_string(),
        border_width: 2,
        fill: kind == ChartKind::Area,
        show_legend: is_pie,
        value_axis: (!is_pie).then_some(ValueAxis {
            begin_at_zero: true,
        }),
    }
}

// The grid ignores the X column entirely; values are laid out row-major in
// dataset order. Only meaningful for small demo tables.
fn surface(values: &[f64], y_axis: &str) -> Surface3d {
    let size = surface_side(values.len());
    let z = (0..size)
        .map(|i| {
            (0..size)
                .map(|j| values.get(i * size + j).copied().unwrap_or(0.0))
                .collect()
        })
        .collect();

    Surface3d {
        title: format!("3D Surface: {} Distribution", y_axis),
        size,
        x: (0..size).collect(),
        y: (0..size).collect(),
        z,
        color_scale: COLOR_SCALE.to_string(),
        axis_titles: [
            "X Grid".to_string(),
            "Y Grid".to_string(),
            y_axis.to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;

    fn numbered(n: usize) -> RowDataset {
        let records = (0..n)
            .map(|i| {
                let mut r = Record::new();
                r.insert("Idx".to_string(), CellValue::Number(i as f64));
                r.insert("Val".to_string(), CellValue::Number((i * 10) as f64));
                r
            })
            .collect();
        RowDataset::from_records(records)
    }

    fn planar(spec: &ChartSpec) -> &PlanarChart {
        match &spec.body {
            ChartBody::Planar(chart) => chart,
            other => panic!("expected planar chart, got {:?}", other),
        }
    }

    #[test]
    fn kind_names_round_trip_through_from_str() {
        for kind in ChartKind::ALL {
            assert_eq!(kind.as_str().parse::<ChartKind>().unwrap(), kind);
        }
        assert!(matches!(
            "radar".parse::<ChartKind>(),
            Err(ChartError::UnknownKind(_))
        ));
    }

    #[test]
    fn area_is_filled_line() {
        let spec = build_chart(&RowDataset::sample(), "Month", "Sales", ChartKind::Area).unwrap();
        let chart = planar(&spec);
        assert_eq!(chart.render_type, PlanarType::Line);
        assert!(chart.fill);
        assert_eq!(chart.value_axis, Some(ValueAxis { begin_at_zero: true }));
    }

    #[test]
    fn pie_gets_one_evenly_spaced_color_per_point() {
        let spec = build_chart(&numbered(6), "Idx", "Val", ChartKind::Pie).unwrap();
        let chart = planar(&spec);

        let Background::PerPoint(colors) = &chart.background else {
            panic!("pie should have per-point colours");
        };
        assert_eq!(colors.len(), 6);
        assert_eq!(colors[0], "hsl(0, 70%, 60%)");
        assert_eq!(colors[1], "hsl(60, 70%, 60%)");
        assert_eq!(colors[5], "hsl(300, 70%, 60%)");
        assert!(chart.value_axis.is_none());
        assert!(chart.show_legend);
    }

    #[test]
    fn hues_stay_below_full_circle() {
        for count in 1..20 {
            for i in 0..count {
                let h = hue(i, count);
                assert!((0.0..360.0).contains(&h));
            }
        }
    }

    #[test]
    fn bar_uses_single_translucent_fill() {
        let spec = build_chart(&RowDataset::sample(), "Month", "Profit", ChartKind::Bar).unwrap();
        let chart = planar(&spec);
        assert_eq!(chart.background, Background::Single(FILL_COLOR.to_string()));
        assert_eq!(chart.title, "Profit vs Month");
        assert_eq!(chart.labels[0], CellValue::Text("Jan".into()));
        assert_eq!(chart.values[0], 4000.0);
        assert!(!chart.fill);
    }

    #[test]
    fn unparseable_values_become_zero() {
        let spec = build_chart(&RowDataset::sample(), "Sales", "Month", ChartKind::Line).unwrap();
        assert!(planar(&spec).values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn scatter_uses_row_position_as_depth() {
        let spec = build_chart(&numbered(4), "Idx", "Val", ChartKind::Scatter3d).unwrap();
        let ChartBody::Scatter3d(chart) = &spec.body else {
            panic!("expected scatter");
        };
        assert_eq!(chart.z, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(chart.axis_titles[2], "Index");
    }

    #[test]
    fn surface_reshapes_values_into_square_grid() {
        let spec = build_chart(&numbered(10), "Idx", "Val", ChartKind::Surface3d).unwrap();
        let ChartBody::Surface3d(chart) = &spec.body else {
            panic!("expected surface");
        };
        assert_eq!(chart.size, 3);
        assert_eq!(chart.z[1], vec![30.0, 40.0, 50.0]);
        assert_eq!(chart.title, "3D Surface: Val Distribution");
    }

    #[test]
    fn surface_side_is_capped() {
        assert_eq!(surface_side(0), 0);
        assert_eq!(surface_side(3), 1);
        assert_eq!(surface_side(99), 9);
        assert_eq!(surface_side(10_000), MAX_SURFACE_SIDE);
    }

    #[test]
    fn missing_selection_is_rejected() {
        let data = RowDataset::sample();
        assert_eq!(
            build_chart(&data, "", "Sales", ChartKind::Bar),
            Err(ChartError::MissingAxis)
        );
        assert_eq!(
            build_chart(&data, "Month", "Nope", ChartKind::Bar),
            Err(ChartError::MissingAxis)
        );
        assert_eq!(
            build_chart(&RowDataset::default(), "a", "b", ChartKind::Bar),
            Err(ChartError::EmptyDataset)
        );
    }
}
