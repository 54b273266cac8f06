/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright (c) 2019, Clemens Lutz <lutzcle@cml.li>
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 */

//! Renders pivot tables as line graphs and heatmaps.
//!
//! Both chart types treat the value columns as categories: column `i` is
//! drawn at x-coordinate `i` and labeled with the column header.

use crate::colormap::{annotation_color, normalize, ColorMap};
use crate::error::{ErrorKind, Result};
use crate::pivot::{PivotRow, PivotTable};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::fs;
use std::iter;
use std::path::Path;

pub const LINE_GRAPH_SIZE: (u32, u32) = (1000, 600);
pub const HEATMAP_SIZE: (u32, u32) = (1200, 800);

const COLORBAR_WIDTH: u32 = 150;
const COLORBAR_LABEL: &str = "Bandwidth (MB/s)";
const COLORBAR_STEPS: usize = 240;
const MISSING_COLOR: RGBColor = RGBColor(235, 235, 235);
const FONT: &str = "sans-serif";
const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

// matplotlib's default color cycle
const SERIES_COLORS: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

/// Caption and axis descriptions of a chart
#[derive(Clone, Debug)]
pub struct ChartLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageFormat {
    Bitmap,
    Svg,
}

impl ImageFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => ImageFormat::Svg,
            _ => ImageFormat::Bitmap,
        }
    }
}

/// Plots one line per table row over the value columns.
pub fn line_graph(table: &PivotTable, labels: &ChartLabels, path: &Path) -> Result<()> {
    let (_, max) = checked_value_range(table)?;
    register_font()?;
    create_parent_dir(path)?;

    match ImageFormat::from_path(path) {
        ImageFormat::Svg => {
            let root = SVGBackend::new(path, LINE_GRAPH_SIZE).into_drawing_area();
            draw_line_graph(&root, table, labels, max)?;
        }
        ImageFormat::Bitmap => {
            let root = BitMapBackend::new(path, LINE_GRAPH_SIZE).into_drawing_area();
            draw_line_graph(&root, table, labels, max)?;
        }
    }

    Ok(())
}

/// Plots the table as a grid of colored cells, annotated with their values.
pub fn heatmap<C: ColorMap>(
    table: &PivotTable,
    labels: &ChartLabels,
    colormap: &C,
    path: &Path,
) -> Result<()> {
    let range = checked_value_range(table)?;
    register_font()?;
    create_parent_dir(path)?;

    match ImageFormat::from_path(path) {
        ImageFormat::Svg => {
            let root = SVGBackend::new(path, HEATMAP_SIZE).into_drawing_area();
            draw_heatmap(&root, table, labels, colormap, range)?;
        }
        ImageFormat::Bitmap => {
            let root = BitMapBackend::new(path, HEATMAP_SIZE).into_drawing_area();
            draw_heatmap(&root, table, labels, colormap, range)?;
        }
    }

    Ok(())
}

fn checked_value_range(table: &PivotTable) -> Result<(f64, f64)> {
    if table.rows().is_empty() {
        return Err(ErrorKind::InvalidArgument(format!(
            "Table '{}' has no rows to plot",
            table.index_name()
        ))
        .into());
    }

    table.value_range().ok_or_else(|| {
        ErrorKind::InvalidArgument(format!(
            "Table '{}' has no values to plot",
            table.index_name()
        ))
        .into()
    })
}

/// Makes the bundled font available to plotters, independent of system fonts.
fn register_font() -> Result<()> {
    plotters::style::register_font(FONT, FontStyle::Normal, FONT_DATA).map_err(|_| {
        ErrorKind::PlotError(format!("Failed to load the '{}' font", FONT)).into()
    })
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Label of the category at `x`, empty between categories
fn category_label(x: f64, labels: &[String]) -> String {
    let i = x.round();
    if (x - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    labels.get(i as usize).cloned().unwrap_or_default()
}

/// Splits a row into runs of consecutive present values.
fn present_segments(row: &PivotRow) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();

    for (x, value) in row.values.iter().enumerate() {
        match value {
            Some(v) => current.push((x as f64, *v)),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

fn draw_line_graph<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    table: &PivotTable,
    labels: &ChartLabels,
    max: f64,
) -> Result<()> {
    root.fill(&WHITE)?;

    let columns = table.columns();
    let y_max = if max > 0.0 { max * 1.1 } else { 1.0 };

    let mut chart = ChartBuilder::on(root)
        .caption(&labels.title, (FONT, 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(80)
        .build_cartesian_2d(-0.5..(columns.len() as f64 - 0.5), 0.0..y_max)?;

    let x_label_formatter = |x: &f64| category_label(*x, columns);
    chart
        .configure_mesh()
        .x_labels(columns.len())
        .x_label_formatter(&x_label_formatter)
        .x_desc(labels.x_label.as_str())
        .y_desc(labels.y_label.as_str())
        .draw()?;

    // Legend title
    chart
        .draw_series(iter::empty::<Circle<(f64, f64), i32>>())?
        .label(table.index_name());

    for (i, row) in table.rows().iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        let segments = present_segments(row);

        for segment in &segments {
            chart.draw_series(LineSeries::new(segment.iter().copied(), color.stroke_width(2)))?;
        }

        chart
            .draw_series(
                segments
                    .iter()
                    .flatten()
                    .map(|&point| Circle::new(point, 4, color.filled())),
            )?
            .label(row.key.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x - 10, y), (x + 10, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_heatmap<DB: DrawingBackend, C: ColorMap>(
    root: &DrawingArea<DB, Shift>,
    table: &PivotTable,
    labels: &ChartLabels,
    colormap: &C,
    (min, max): (f64, f64),
) -> Result<()> {
    root.fill(&WHITE)?;

    let (width, _) = root.dim_in_pixel();
    let (heat_area, colorbar_area) =
        root.split_horizontally(width.saturating_sub(COLORBAR_WIDTH) as i32);

    let columns = table.columns();
    let rows = table.rows();

    // The first row is drawn at the top
    let row_labels: Vec<String> = rows.iter().rev().map(|row| row.key.clone()).collect();
    let longest_label = row_labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let y_label_area = (longest_label as u32 * 8 + 50).max(80).min(480);

    let mut chart = ChartBuilder::on(&heat_area)
        .caption(&labels.title, (FONT, 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(y_label_area)
        .build_cartesian_2d(
            -0.5..(columns.len() as f64 - 0.5),
            -0.5..(rows.len() as f64 - 0.5),
        )?;

    let x_label_formatter = |x: &f64| category_label(*x, columns);
    let y_label_formatter = |y: &f64| category_label(*y, &row_labels);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(columns.len())
        .y_labels(rows.len())
        .x_label_formatter(&x_label_formatter)
        .y_label_formatter(&y_label_formatter)
        .x_desc(labels.x_label.as_str())
        .y_desc(labels.y_label.as_str())
        .draw()?;

    for (r, row) in rows.iter().enumerate() {
        let y = (rows.len() - 1 - r) as f64;

        for (c, value) in row.values.iter().enumerate() {
            let x = c as f64;
            let fill = value.map_or(MISSING_COLOR, |v| colormap.color(normalize(v, min, max)));

            chart.draw_series(iter::once(Rectangle::new(
                [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
                fill.filled(),
            )))?;

            if let Some(v) = value {
                let style = (FONT, 16)
                    .into_font()
                    .color(&annotation_color(&fill))
                    .pos(Pos::new(HPos::Center, VPos::Center));
                chart.draw_series(iter::once(Text::new(format!("{:.2}", v), (x, y), style)))?;
            }
        }
    }

    draw_colorbar(&colorbar_area, colormap, (min, max))?;

    root.present()?;
    Ok(())
}

fn draw_colorbar<DB: DrawingBackend, C: ColorMap>(
    area: &DrawingArea<DB, Shift>,
    colormap: &C,
    (min, max): (f64, f64),
) -> Result<()> {
    let (lo, hi) = if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    };

    let mut bar = ChartBuilder::on(area)
        .margin_top(60)
        .margin_bottom(60)
        .margin_left(10)
        .margin_right(30)
        .x_label_area_size(0)
        .y_label_area_size(80)
        .build_cartesian_2d(0.0..1.0, lo..hi)?;

    bar.configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(0)
        .y_desc(COLORBAR_LABEL)
        .draw()?;

    let step = (hi - lo) / COLORBAR_STEPS as f64;
    bar.draw_series((0..COLORBAR_STEPS).map(|i| {
        let y0 = lo + step * i as f64;
        let y1 = y0 + step;
        let color = colormap.color(normalize(0.5 * (y0 + y1), min, max));
        Rectangle::new([(0.0, y0), (1.0, y1)], color.filled())
    }))?;

    Ok(())
}
