#![cfg(feature = "web")]
//! PNG rendering of chart descriptions.
//!
//! Every [`ChartSpec`] can be drawn with plotters into an in-memory RGB buffer
//! and encoded as PNG. [`ChartDisplay`] owns the chart currently on screen and
//! releases it before drawing a replacement.

use crate::chart::{ChartBody, ChartSpec, PlanarChart, PlanarType, Scatter3d, Surface3d, hue};
use crate::error::RenderError;
use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::io::Cursor;
use std::ops::Range;

const ACCENT: RGBColor = RGBColor(102, 126, 234);

/// Output size of rendered charts
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Width of the image in pixels
    pub width: u32,

    /// Height of the image in pixels
    pub height: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

/// Draws a chart and returns the PNG bytes.
///
/// # Arguments
/// * `spec` - Chart description produced by [`crate::chart::build_chart`]
/// * `options` - Image dimensions
///
/// # Returns
/// * PNG image data, or the drawing/encoding error
pub fn render_png(spec: &ChartSpec, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; width as usize * height as usize * 3];

    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(drawing)?;

        match &spec.body {
            ChartBody::Planar(chart) => match chart.render_type {
                PlanarType::Bar => draw_bar(&root, chart, spec)?,
                PlanarType::Line => draw_line(&root, chart, spec)?,
                PlanarType::Pie => draw_pie(&root, chart)?,
            },
            ChartBody::Scatter3d(chart) => draw_scatter(&root, chart)?,
            ChartBody::Surface3d(chart) => draw_surface(&root, chart)?,
        }

        root.present().map_err(drawing)?;
    }

    encode_png(pixels, width, height)
}

fn drawing<E: std::fmt::Display>(err: E) -> RenderError {
    RenderError::Drawing(err.to_string())
}

fn encode_png(pixels: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
    let image = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| RenderError::Drawing("pixel buffer does not match image size".into()))?;

    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}

/// Value axis that always includes zero and never collapses to a point.
fn value_range(values: &[f64]) -> Range<f64> {
    let finite = || values.iter().copied().filter(|v| v.is_finite());
    let min = finite().fold(0.0, f64::min);
    let max = finite().fold(0.0, f64::max);
    let span = if max - min > 0.0 { max - min } else { 1.0 };
    min..max + span * 0.05
}

fn category_range(count: usize) -> Range<f64> {
    -0.5..(count.max(1) as f64 - 0.5)
}

fn draw_bar<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    chart: &PlanarChart,
    spec: &ChartSpec,
) -> Result<(), RenderError> {
    let mut ctx = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(category_range(chart.values.len()), value_range(&chart.values))
        .map_err(drawing)?;

    let label_of = |x: &f64| label_at(chart, *x);
    ctx.configure_mesh()
        .disable_x_mesh()
        .x_desc(spec.x_axis.as_str())
        .y_desc(spec.y_axis.as_str())
        .x_label_formatter(&label_of)
        .draw()
        .map_err(drawing)?;

    ctx.draw_series(chart.values.iter().enumerate().map(|(i, &v)| {
        let x = i as f64;
        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, v)], ACCENT.mix(0.2).filled())
    }))
    .map_err(drawing)?;

    ctx.draw_series(chart.values.iter().enumerate().map(|(i, &v)| {
        let x = i as f64;
        Rectangle::new(
            [(x - 0.4, 0.0), (x + 0.4, v)],
            ACCENT.stroke_width(chart.border_width),
        )
    }))
    .map_err(drawing)?;

    Ok(())
}

fn draw_line<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    chart: &PlanarChart,
    spec: &ChartSpec,
) -> Result<(), RenderError> {
    let mut ctx = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(category_range(chart.values.len()), value_range(&chart.values))
        .map_err(drawing)?;

    let label_of = |x: &f64| label_at(chart, *x);
    ctx.configure_mesh()
        .x_desc(spec.x_axis.as_str())
        .y_desc(spec.y_axis.as_str())
        .x_label_formatter(&label_of)
        .draw()
        .map_err(drawing)?;

    let points = chart
        .values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v));

    if chart.fill {
        ctx.draw_series(
            AreaSeries::new(points, 0.0, ACCENT.mix(0.2))
                .border_style(ACCENT.stroke_width(chart.border_width)),
        )
        .map_err(drawing)?;
    } else {
        ctx.draw_series(LineSeries::new(points, ACCENT.stroke_width(chart.border_width)))
            .map_err(drawing)?;
    }

    Ok(())
}

fn label_at(chart: &PlanarChart, x: f64) -> String {
    let rounded = x.round();
    if rounded < 0.0 || (x - rounded).abs() > 0.01 {
        return String::new();
    }
    chart
        .labels
        .get(rounded as usize)
        .map(|label| label.to_string())
        .unwrap_or_default()
}

// Slices are drawn straight onto the pixel area; negative values get no
// slice, and an all-zero series leaves the canvas blank.
fn draw_pie<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    chart: &PlanarChart,
) -> Result<(), RenderError> {
    let total: f64 = chart.values.iter().filter(|v| **v > 0.0).sum();
    if total <= 0.0 || !total.is_finite() {
        return Ok(());
    }

    let (width, height) = root.dim_in_pixel();
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    let radius = width.min(height) as f64 * 0.4;
    let count = chart.values.len();

    let mut start = -std::f64::consts::FRAC_PI_2;
    for (i, &value) in chart.values.iter().enumerate() {
        if value <= 0.0 {
            continue;
        }
        let sweep = value / total * std::f64::consts::TAU;
        let steps = ((sweep.to_degrees()).ceil() as usize).max(1);

        let mut points = vec![(center.0 as i32, center.1 as i32)];
        for step in 0..=steps {
            let angle = start + sweep * step as f64 / steps as f64;
            points.push((
                (center.0 + radius * angle.cos()) as i32,
                (center.1 + radius * angle.sin()) as i32,
            ));
        }

        let color = HSLColor(hue(i, count) / 360.0, 0.7, 0.6);
        root.draw(&Polygon::new(points, color.filled()))
            .map_err(drawing)?;
        start += sweep;
    }

    Ok(())
}

fn draw_scatter<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    chart: &Scatter3d,
) -> Result<(), RenderError> {
    let n = chart.y.len().max(1) as f64;
    let mut ctx = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 24).into_font())
        .margin(20)
        .build_cartesian_3d(0.0..n, value_range(&chart.y), 0.0..n)
        .map_err(drawing)?;

    ctx.configure_axes().draw().map_err(drawing)?;

    // X labels may be text, so points sit at their row position on that axis.
    ctx.draw_series(
        chart
            .y
            .iter()
            .zip(&chart.z)
            .enumerate()
            .map(|(i, (&y, &z))| Circle::new((i as f64, y, z), 4, ACCENT.filled())),
    )
    .map_err(drawing)?;

    Ok(())
}

fn draw_surface<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    chart: &Surface3d,
) -> Result<(), RenderError> {
    let side = chart.size.max(1) as f64;
    let flat: Vec<f64> = chart.z.iter().flatten().copied().collect();

    let mut ctx = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 24).into_font())
        .margin(20)
        .build_cartesian_3d(0.0..side, value_range(&flat), 0.0..side)
        .map_err(drawing)?;

    ctx.configure_axes().draw().map_err(drawing)?;

    let cell = |x: f64, z: f64| {
        chart
            .z
            .get(x as usize)
            .and_then(|row| row.get(z as usize))
            .copied()
            .unwrap_or(0.0)
    };

    ctx.draw_series(
        SurfaceSeries::xoz(
            (0..chart.size).map(|i| i as f64),
            (0..chart.size).map(|j| j as f64),
            cell,
        )
        .style(ACCENT.mix(0.5).filled()),
    )
    .map_err(drawing)?;

    Ok(())
}

/// A chart that has been drawn and can be downloaded.
#[derive(Debug, Clone)]
pub struct RenderedChart {
    pub spec: ChartSpec,
    pub png: Vec<u8>,
}

/// Owns the single chart on display. Showing a new chart releases the old
/// one first.
#[derive(Debug, Default)]
pub struct ChartDisplay {
    options: RenderOptions,
    current: Option<RenderedChart>,
}

impl ChartDisplay {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            current: None,
        }
    }

    pub fn show(&mut self, spec: ChartSpec) -> Result<&RenderedChart, RenderError> {
        self.release();
        let png = render_png(&spec, &self.options)?;
        Ok(self.current.insert(RenderedChart { spec, png }))
    }

    pub fn release(&mut self) {
        if let Some(old) = self.current.take() {
            debug!("Released {} chart '{}'", old.spec.kind, old.spec.title());
        }
    }

    pub fn current(&self) -> Option<&RenderedChart> {
        self.current.as_ref()
    }

    /// PNG bytes of the chart on display.
    pub fn download(&self) -> Result<&[u8], RenderError> {
        self.current
            .as_ref()
            .map(|chart| chart.png.as_slice())
            .ok_or(RenderError::NothingRendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartKind, build_chart};
    use crate::dataset::RowDataset;

    const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

    fn small() -> RenderOptions {
        RenderOptions {
            width: 240,
            height: 180,
        }
    }

    #[test]
    fn every_kind_renders_to_png() {
        let data = RowDataset::sample();
        for kind in ChartKind::ALL {
            let spec = build_chart(&data, "Month", "Sales", kind).unwrap();
            let png = render_png(&spec, &small()).unwrap();
            assert_eq!(&png[..4], &PNG_MAGIC, "{} did not produce a PNG", kind);
        }
    }

    #[test]
    fn value_range_includes_zero() {
        assert_eq!(value_range(&[5.0, 10.0]).start, 0.0);
        assert_eq!(value_range(&[-4.0, -2.0]).start, -4.0);
        let flat = value_range(&[0.0, 0.0]);
        assert!(flat.end > flat.start);
    }

    #[test]
    fn display_replaces_previous_chart() {
        let data = RowDataset::sample();
        let mut display = ChartDisplay::new(small());
        assert!(matches!(display.download(), Err(RenderError::NothingRendered)));

        display
            .show(build_chart(&data, "Month", "Sales", ChartKind::Bar).unwrap())
            .unwrap();
        display
            .show(build_chart(&data, "Month", "Profit", ChartKind::Pie).unwrap())
            .unwrap();

        let current = display.current().unwrap();
        assert_eq!(current.spec.kind, ChartKind::Pie);
        assert_eq!(&display.download().unwrap()[..4], &PNG_MAGIC);

        display.release();
        assert!(display.current().is_none());
    }
}
