//! SVG chart rendering.
//!
//! Four archetypes: a ranked horizontal bar for one dimension, a stacked
//! horizontal bar for two, the review x question appraisal heatmap, and the
//! bibliometric network plot. Score-like dimensions use the fixed colours of
//! the [`ScoreScale`] in scale order; everything else takes the categorical
//! palette in order of appearance.

use crate::appraisal::{ScoreScale, LONG_COLUMNS};
use crate::crosstab::CrossTab;
use crate::error::{ReviewError, Result};
use crate::network::NetworkLayout;
use crate::table::{Cell, Table};
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

const CHART_WIDTH: u32 = 900;
const ROW_HEIGHT: u32 = 28;
const MIN_HEIGHT: u32 = 320;
const CAPTION_SIZE: u32 = 20;
const LABEL_CHAR_WIDTH: u32 = 7;
const MAX_LABEL_AREA: u32 = 340;
const NETWORK_SIZE: u32 = 900;

/// Colour-blind friendly categorical palette
const CATEGORICAL: [RGBColor; 10] = [
    RGBColor(0, 114, 178),
    RGBColor(230, 159, 0),
    RGBColor(0, 158, 115),
    RGBColor(204, 121, 167),
    RGBColor(86, 180, 233),
    RGBColor(213, 94, 0),
    RGBColor(240, 228, 66),
    RGBColor(145, 30, 180),
    RGBColor(170, 110, 40),
    RGBColor(0, 0, 0),
];

/// Fill for missing or off-scale scores
const UNSCORED: RGBColor = RGBColor(189, 189, 189);
const EDGE_COLOR: RGBColor = RGBColor(120, 120, 120);
const NODE_COLOR: RGBColor = RGBColor(0, 114, 178);

/// Label shown for an empty category
pub const MISSING_LABEL: &str = "NA";

/// Top-to-bottom order of bar categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarOrder {
    /// Largest total at the top
    #[default]
    Count,
    /// Natural label order (numbers numerically), first at the top
    Label,
}

/// Quantity on the value axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarMeasure {
    #[default]
    Percent,
    Count,
}

/// Colour assignment for the stacked dimension
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteKind {
    #[default]
    Categorical,
    /// Fixed colours of the appraisal score scale
    Score,
}

fn render_err<E: std::fmt::Display>(e: E) -> ReviewError {
    ReviewError::Render(e.to_string())
}

/// Parse `#RRGGBB`
pub fn parse_hex(color: &str) -> Result<RGBColor> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(ReviewError::Config(format!("Invalid colour '{}'", color)));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| ReviewError::Config(format!("Invalid colour '{}'", color)))
    };
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

fn label_of(cell: &Cell) -> String {
    cell.clone().unwrap_or_else(|| MISSING_LABEL.to_string())
}

/// Label order: missing last; numbers only when every present label parses
fn label_cmp(a: &Cell, b: &Cell, numeric: bool) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.as_deref(), b.as_deref()) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) if numeric => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.total_cmp(&y),
            _ => a.cmp(b),
        },
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Dimension-one categories from top to bottom
fn category_order(tab: &CrossTab, order: BarOrder) -> Vec<Cell> {
    let mut totals = tab.dim1_totals();
    match order {
        // dim1_totals keeps first appearance; re-sort so stacked totals rank too
        BarOrder::Count => totals.sort_by(|a, b| b.1.cmp(&a.1)),
        BarOrder::Label => {
            let numeric = totals
                .iter()
                .filter_map(|(c, _)| c.as_deref())
                .all(|c| c.parse::<f64>().is_ok());
            totals.sort_by(|a, b| label_cmp(&a.0, &b.0, numeric))
        }
    }
    totals.into_iter().map(|(c, _)| c).collect()
}

fn chart_height(rows: usize) -> u32 {
    (rows as u32 * ROW_HEIGHT + 140).max(MIN_HEIGHT)
}

fn label_area(labels: &[String]) -> u32 {
    let longest = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;
    (longest * LABEL_CHAR_WIDTH + 16).min(MAX_LABEL_AREA)
}

fn measure_of(measure: BarMeasure, count: usize, percent: f64) -> f64 {
    match measure {
        BarMeasure::Percent => percent,
        BarMeasure::Count => count as f64,
    }
}

fn axis_desc(measure: BarMeasure) -> &'static str {
    match measure {
        BarMeasure::Percent => "Percent of total",
        BarMeasure::Count => "Count",
    }
}

/// Chart with a caption and a note instead of data
pub fn render_empty(path: &Path, title: &str) -> Result<()> {
    let root = SVGBackend::new(path, (CHART_WIDTH, MIN_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    root.draw(&Text::new(
        title.to_string(),
        (20, 20),
        ("sans-serif", CAPTION_SIZE).into_font(),
    ))
    .map_err(render_err)?;
    root.draw(&Text::new(
        "No data".to_string(),
        ((CHART_WIDTH / 2) as i32 - 30, (MIN_HEIGHT / 2) as i32),
        ("sans-serif", 16).into_font(),
    ))
    .map_err(render_err)?;
    root.present().map_err(render_err)?;
    warn!(path = %path.display(), "Rendered empty chart");
    Ok(())
}

/// Horizontal bar chart of a one-dimension cross-tab.
pub fn render_ranked_bar(
    path: &Path,
    title: &str,
    tab: &CrossTab,
    order: BarOrder,
    measure: BarMeasure,
) -> Result<()> {
    if tab.is_empty() {
        return render_empty(path, title);
    }

    let categories = category_order(tab, order);
    let labels: Vec<String> = categories.iter().map(label_of).collect();
    let n = categories.len();
    let values: Vec<f64> = categories
        .iter()
        .map(|c| {
            tab.rows
                .iter()
                .filter(|r| &r.dim1 == c)
                .map(|r| measure_of(measure, r.count, r.percent))
                .sum()
        })
        .collect();
    let x_max = values.iter().cloned().fold(0.0, f64::max) * 1.1;

    let root = SVGBackend::new(path, (CHART_WIDTH, chart_height(n))).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", CAPTION_SIZE))
        .x_label_area_size(40)
        .y_label_area_size(label_area(&labels))
        .build_cartesian_2d(0.0..x_max.max(1.0), (0..n).into_segmented())
        .map_err(render_err)?;

    // segment 0 is the bottom row
    let label_at = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) if *i < n => labels[n - 1 - i].clone(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&label_at)
        .x_desc(axis_desc(measure))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(values.iter().enumerate().map(|(pos, &v)| {
            let i = n - 1 - pos;
            let mut bar = Rectangle::new(
                [(0.0, SegmentValue::Exact(i)), (v, SegmentValue::Exact(i + 1))],
                CATEGORICAL[0].filled(),
            );
            bar.set_margin(4, 4, 0, 0);
            bar
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), bars = n, "Rendered bar chart");
    Ok(())
}

/// Stack series of a two-dimension cross-tab with their colours
fn stack_series(
    tab: &CrossTab,
    palette: &PaletteKind,
    scale: &ScoreScale,
) -> Result<Vec<(Cell, RGBColor)>> {
    let mut values = tab.dim2_values();
    match palette {
        PaletteKind::Categorical => Ok(values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (v, CATEGORICAL[i % CATEGORICAL.len()]))
            .collect()),
        PaletteKind::Score => {
            let rank = |v: &Cell| {
                v.as_deref()
                    .and_then(|s| scale.position(s))
                    .unwrap_or(scale.levels.len())
            };
            values.sort_by_key(|v| rank(v));
            values
                .into_iter()
                .map(|v| {
                    let color = match v.as_deref().and_then(|s| scale.level(s)) {
                        Some(level) => parse_hex(&level.color)?,
                        None => {
                            warn!(score = ?v, "Score not on the scale");
                            UNSCORED
                        }
                    };
                    Ok((v, color))
                })
                .collect()
        }
    }
}

/// Horizontal stacked bar chart of a two-dimension cross-tab.
pub fn render_stacked_bar(
    path: &Path,
    title: &str,
    tab: &CrossTab,
    order: BarOrder,
    measure: BarMeasure,
    palette: &PaletteKind,
    scale: &ScoreScale,
) -> Result<()> {
    if tab.is_empty() {
        return render_empty(path, title);
    }

    let categories = category_order(tab, order);
    let labels: Vec<String> = categories.iter().map(label_of).collect();
    let series = stack_series(tab, palette, scale)?;
    let n = categories.len();

    let value = |c: &Cell, s: &Cell| -> f64 {
        tab.rows
            .iter()
            .filter(|r| &r.dim1 == c && &r.dim2 == s)
            .map(|r| measure_of(measure, r.count, r.percent))
            .sum()
    };
    let totals: Vec<f64> = categories
        .iter()
        .map(|c| series.iter().map(|(s, _)| value(c, s)).sum())
        .collect();
    let x_max = totals.iter().cloned().fold(0.0, f64::max) * 1.1;

    let root = SVGBackend::new(path, (CHART_WIDTH, chart_height(n))).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", CAPTION_SIZE))
        .x_label_area_size(40)
        .y_label_area_size(label_area(&labels))
        .build_cartesian_2d(0.0..x_max.max(1.0), (0..n).into_segmented())
        .map_err(render_err)?;

    let label_at = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) if *i < n => labels[n - 1 - i].clone(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&label_at)
        .x_desc(axis_desc(measure))
        .draw()
        .map_err(render_err)?;

    let mut offsets = vec![0.0_f64; n];
    for (s, color) in &series {
        let mut bars = Vec::new();
        for (pos, c) in categories.iter().enumerate() {
            let v = value(c, s);
            if v <= 0.0 {
                continue;
            }
            let i = n - 1 - pos;
            let mut bar = Rectangle::new(
                [
                    (offsets[pos], SegmentValue::Exact(i)),
                    (offsets[pos] + v, SegmentValue::Exact(i + 1)),
                ],
                color.filled(),
            );
            bar.set_margin(4, 4, 0, 0);
            bars.push(bar);
            offsets[pos] += v;
        }

        let color = *color;
        chart
            .draw_series(bars)
            .map_err(render_err)?
            .label(label_of(s))
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), bars = n, series = series.len(), "Rendered stacked bar chart");
    Ok(())
}

/// Review x question grid coloured by score.
///
/// `long` is the `(id, question, score)` table; reviews run top to bottom
/// and questions left to right in order of first appearance.
pub fn render_heatmap(path: &Path, title: &str, long: &Table, scale: &ScoreScale) -> Result<()> {
    if long.is_empty() {
        return render_empty(path, title);
    }

    let [id_col, question_col, score_col] = LONG_COLUMNS;
    let ids = long.column_values(id_col)?;
    let questions = long.column_values(question_col)?;
    let scores = long.column_values(score_col)?;

    let mut reviews: Vec<&str> = Vec::new();
    let mut items: Vec<&str> = Vec::new();
    for (id, q) in ids.iter().zip(&questions) {
        let (Some(id), Some(q)) = (id, q) else {
            continue;
        };
        if !reviews.contains(id) {
            reviews.push(*id);
        }
        if !items.contains(q) {
            items.push(*q);
        }
    }
    let (nr, nq) = (reviews.len(), items.len());

    let colors: Vec<RGBColor> = scale
        .levels
        .iter()
        .map(|l| parse_hex(&l.color))
        .collect::<Result<_>>()?;

    let review_labels: Vec<String> = reviews.iter().map(|r| r.to_string()).collect();
    let root = SVGBackend::new(path, (CHART_WIDTH, chart_height(nr))).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", CAPTION_SIZE))
        .x_label_area_size(40)
        .y_label_area_size(label_area(&review_labels))
        .build_cartesian_2d((0..nq).into_segmented(), (0..nr).into_segmented())
        .map_err(render_err)?;

    let x_label = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) if *i < nq => items[*i].to_string(),
        _ => String::new(),
    };
    let y_label = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) if *i < nr => review_labels[nr - 1 - i].clone(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(nq)
        .y_labels(nr)
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .x_desc("Question")
        .draw()
        .map_err(render_err)?;

    // one series per level so each gets a legend entry; the last is off-scale
    let mut cells: Vec<Vec<Rectangle<(SegmentValue<usize>, SegmentValue<usize>)>>> =
        (0..=scale.levels.len()).map(|_| Vec::new()).collect();
    for ((id, q), score) in ids.iter().zip(&questions).zip(&scores) {
        let (Some(id), Some(q)) = (id, q) else {
            continue;
        };
        let qi = items.iter().position(|x| x == q).unwrap_or(0);
        let ri = nr - 1 - reviews.iter().position(|x| x == id).unwrap_or(0);
        let level = score.and_then(|s| scale.position(s));
        let (slot, color) = match level {
            Some(l) => (l, colors[l]),
            None => (scale.levels.len(), UNSCORED),
        };
        let mut cell = Rectangle::new(
            [
                (SegmentValue::Exact(qi), SegmentValue::Exact(ri)),
                (SegmentValue::Exact(qi + 1), SegmentValue::Exact(ri + 1)),
            ],
            color.filled(),
        );
        cell.set_margin(1, 1, 1, 1);
        cells[slot].push(cell);
    }

    let mut legend: Vec<(String, RGBColor)> = scale
        .levels
        .iter()
        .zip(&colors)
        .map(|(l, c)| (l.label.clone(), *c))
        .collect();
    legend.push(("Not scored".to_string(), UNSCORED));

    for (slot, (name, color)) in cells.into_iter().zip(legend) {
        if slot.is_empty() && name == "Not scored" {
            continue;
        }
        chart
            .draw_series(slot)
            .map_err(render_err)?
            .label(name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.9))
        .border_style(&BLACK)
        .draw()
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), reviews = nr, questions = nq, "Rendered appraisal heatmap");
    Ok(())
}

/// Positioned network: edges width-scaled by weight, nodes sized by degree.
pub fn render_network(path: &Path, title: &str, layout: &NetworkLayout) -> Result<()> {
    if layout.nodes.is_empty() {
        return render_empty(path, title);
    }

    let root = SVGBackend::new(path, (NETWORK_SIZE, NETWORK_SIZE)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption(title, ("sans-serif", CAPTION_SIZE))
        .build_cartesian_2d(-0.05_f64..1.05, -0.05_f64..1.05)
        .map_err(render_err)?;

    let max_weight = layout.max_weight().max(1) as f64;
    chart
        .draw_series(layout.edges.iter().map(|e| {
            let a = &layout.nodes[e.source];
            let b = &layout.nodes[e.target];
            let width = 1.0 + 4.0 * e.weight as f64 / max_weight;
            PathElement::new(
                vec![(a.x as f64, a.y as f64), (b.x as f64, b.y as f64)],
                EDGE_COLOR.mix(0.5).stroke_width(width.round() as u32),
            )
        }))
        .map_err(render_err)?;

    chart
        .draw_series(layout.nodes.iter().map(|node| {
            Circle::new(
                (node.x as f64, node.y as f64),
                node.size.round() as i32,
                NODE_COLOR.mix(0.8).filled(),
            )
        }))
        .map_err(render_err)?;

    chart
        .draw_series(layout.nodes.iter().map(|node| {
            Text::new(
                node.label.clone(),
                (node.x as f64, node.y as f64),
                ("sans-serif", node.label_size as f64).into_font(),
            )
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), nodes = layout.nodes.len(), edges = layout.edges.len(), "Rendered network");
    Ok(())
}
