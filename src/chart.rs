use crate::models::{ChartKind, ColumnKind, Dataset, Value};
use crate::ui::escape_html;
use serde::Serialize;
use std::fmt::{self, Write};

const WIDTH: f64 = 600.0;
const LINE_HEIGHT: f64 = 260.0;
const BAR_HEIGHT: f64 = 360.0;
const PADDING_X: f64 = 56.0;
const PADDING_Y: f64 = 34.0;
const TOP: f64 = 24.0;
const Y_TICKS: usize = 4;
const MAX_X_LABELS: usize = 8;
pub const BAR_TICK_ROTATION: i32 = 45;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartError {
    UnknownColumn(String),
    NotNumeric(String),
    DuplicateColumn(String),
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartError::UnknownColumn(name) => write!(f, "column '{name}' does not exist"),
            ChartError::NotNumeric(name) => write!(f, "column '{name}' is not numeric"),
            ChartError::DuplicateColumn(name) => {
                write!(f, "the column label '{name}' is not unique")
            }
        }
    }
}

impl std::error::Error for ChartError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub index: Value,
    pub value: Option<f64>,
}

/// Y values indexed by X, one point per row of the view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub x: String,
    pub y: String,
    pub points: Vec<SeriesPoint>,
    #[serde(skip)]
    continuous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub tick_rotation: i32,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartData {
    Line(LineSeries),
    Bar(BarChart),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedChart {
    #[serde(flatten)]
    pub data: ChartData,
    #[serde(skip)]
    pub svg: String,
}

pub type ChartOutcome = Result<RenderedChart, ChartError>;

pub fn render(view: &Dataset, kind: ChartKind, x: &str, y: &str) -> ChartOutcome {
    match kind {
        ChartKind::Line => {
            let series = line_series(view, x, y)?;
            let svg = line_svg(&series);
            Ok(RenderedChart {
                data: ChartData::Line(series),
                svg,
            })
        }
        ChartKind::Bar => {
            let chart = bar_chart(view, x, y)?;
            let svg = bar_svg(&chart);
            Ok(RenderedChart {
                data: ChartData::Bar(chart),
                svg,
            })
        }
    }
}

fn numeric_index(view: &Dataset, y: &str) -> Result<usize, ChartError> {
    let index = view
        .column_index(y)
        .ok_or_else(|| ChartError::UnknownColumn(y.to_string()))?;
    if !view.columns[index].kind.is_numeric() {
        return Err(ChartError::NotNumeric(y.to_string()));
    }
    Ok(index)
}

pub fn line_series(view: &Dataset, x: &str, y: &str) -> Result<LineSeries, ChartError> {
    let x_index = view
        .column_index(x)
        .ok_or_else(|| ChartError::UnknownColumn(x.to_string()))?;
    let y_index = numeric_index(view, y)?;
    if x_index == y_index {
        return Err(ChartError::DuplicateColumn(x.to_string()));
    }

    let points = view
        .rows
        .iter()
        .map(|row| SeriesPoint {
            index: row.get(x_index).cloned().unwrap_or(Value::Missing),
            value: row.get(y_index).and_then(Value::as_f64),
        })
        .collect();

    let x_kind = view.columns[x_index].kind;
    Ok(LineSeries {
        x: x.to_string(),
        y: y.to_string(),
        points,
        continuous: x_kind.is_numeric() || x_kind == ColumnKind::DateTime,
    })
}

pub fn bar_chart(view: &Dataset, x: &str, y: &str) -> Result<BarChart, ChartError> {
    let x_index = view
        .column_index(x)
        .ok_or_else(|| ChartError::UnknownColumn(x.to_string()))?;
    let y_index = numeric_index(view, y)?;

    let bars = view
        .rows
        .iter()
        .map(|row| Bar {
            label: row.get(x_index).map(Value::to_text).unwrap_or_default(),
            value: row.get(y_index).and_then(Value::as_f64),
        })
        .collect();

    Ok(BarChart {
        title: format!("{y} berdasarkan {x}"),
        x_label: x.to_string(),
        y_label: y.to_string(),
        tick_rotation: BAR_TICK_ROTATION,
        bars,
    })
}

fn x_position(value: &Value) -> Option<f64> {
    match value {
        Value::DateTime(ts) => Some(ts.and_utc().timestamp() as f64),
        other => other.as_f64(),
    }
}

struct YScale {
    min: f64,
    max: f64,
    top: f64,
    bottom: f64,
}

impl YScale {
    fn new(values: impl Iterator<Item = f64>, top: f64, bottom: f64) -> Self {
        let (mut min, mut max) = values
            .filter(|v| v.is_finite())
            .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if min == max {
            min -= 1.0;
            max += 1.0;
        }
        Self {
            min,
            max,
            top,
            bottom,
        }
    }

    // Halved operands keep spans wider than f64::MAX finite.
    fn y(&self, value: f64) -> f64 {
        let fraction = (value / 2.0 - self.min / 2.0) / (self.max / 2.0 - self.min / 2.0);
        self.bottom - fraction * (self.bottom - self.top)
    }

    fn tick(&self, i: usize) -> f64 {
        let t = i as f64 / Y_TICKS as f64;
        self.min * (1.0 - t) + self.max * t
    }

    fn grid(&self, svg: &mut String, left: f64, right: f64) {
        for i in 0..=Y_TICKS {
            let value = self.tick(i);
            let y = self.y(value);
            let _ = write!(
                svg,
                r#"<line class="chart-grid" x1="{left}" y1="{y:.2}" x2="{right}" y2="{y:.2}" /><text class="chart-label" x="{}" y="{:.2}" text-anchor="end">{}</text>"#,
                left - 10.0,
                y + 4.0,
                format_axis_value(value)
            );
        }
        let zero = self.y(0.0);
        let _ = write!(
            svg,
            r#"<line class="chart-axis" x1="{left}" y1="{zero:.2}" x2="{right}" y2="{zero:.2}" />"#
        );
    }
}

fn format_axis_value(value: f64) -> String {
    if value.abs() >= 1e15 {
        return format!("{value:e}");
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

fn empty_svg(height: f64) -> String {
    format!(
        r#"<svg class="chart" viewBox="0 0 {WIDTH} {height}" role="img"><text class="chart-label" x="50%" y="50%" text-anchor="middle">No data to plot</text></svg>"#
    )
}

pub fn line_svg(series: &LineSeries) -> String {
    // (x position, label, y value) for every plottable row.
    let mut points: Vec<(f64, String, f64)> = series
        .points
        .iter()
        .enumerate()
        .filter_map(|(row, point)| {
            let value = point.value.filter(|v| v.is_finite())?;
            let position = if series.continuous {
                x_position(&point.index)?
            } else {
                row as f64
            };
            Some((position, point.index.to_text(), value))
        })
        .collect();
    if points.is_empty() {
        return empty_svg(LINE_HEIGHT);
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let left = PADDING_X;
    let right = WIDTH - PADDING_X;
    let scale = YScale::new(points.iter().map(|p| p.2), TOP, LINE_HEIGHT - PADDING_Y);

    let (x_min, x_max) = if series.continuous {
        (points[0].0, points[points.len() - 1].0)
    } else {
        (0.0, (series.points.len().saturating_sub(1)) as f64)
    };
    let x = |position: f64| {
        if x_max > x_min {
            left + (position - x_min) * (right - left) / (x_max - x_min)
        } else {
            (left + right) / 2.0
        }
    };

    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 {WIDTH} {LINE_HEIGHT}" role="img" aria-label="{} by {}">"#,
        escape_html(&series.y),
        escape_html(&series.x)
    );
    scale.grid(&mut svg, left, right);

    let path = points
        .iter()
        .enumerate()
        .map(|(i, (position, _, value))| {
            format!(
                "{} {:.2} {:.2}",
                if i == 0 { 'M' } else { 'L' },
                x(*position),
                scale.y(*value)
            )
        })
        .collect::<Vec<_>>()
        .join(" ");
    let _ = write!(svg, r#"<path class="chart-line" d="{path}" />"#);

    let label_every = points.len().div_ceil(MAX_X_LABELS).max(1);
    for (i, (position, label, value)) in points.iter().enumerate() {
        let cx = x(*position);
        let _ = write!(
            svg,
            r#"<circle class="chart-point" cx="{cx:.2}" cy="{:.2}" r="4"><title>{}: {}</title></circle>"#,
            scale.y(*value),
            escape_html(label),
            format_axis_value(*value)
        );
        if i % label_every == 0 {
            let _ = write!(
                svg,
                r#"<text class="chart-label" x="{cx:.2}" y="{}" text-anchor="middle">{}</text>"#,
                LINE_HEIGHT - PADDING_Y + 18.0,
                escape_html(label)
            );
        }
    }
    svg.push_str("</svg>");
    svg
}

pub fn bar_svg(chart: &BarChart) -> String {
    if chart.bars.is_empty() {
        return empty_svg(BAR_HEIGHT);
    }

    let left = PADDING_X;
    let right = WIDTH - PADDING_X / 2.0;
    let top = TOP + 24.0;
    let bottom = BAR_HEIGHT - 110.0;
    let scale = YScale::new(chart.bars.iter().filter_map(|bar| bar.value), top, bottom);

    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 {WIDTH} {BAR_HEIGHT}" role="img" aria-label="{}">"#,
        escape_html(&chart.title)
    );
    let _ = write!(
        svg,
        r#"<text class="chart-title" x="{}" y="{}" text-anchor="middle">{}</text>"#,
        (left + right) / 2.0,
        TOP,
        escape_html(&chart.title)
    );
    scale.grid(&mut svg, left, right);

    let slot = (right - left) / chart.bars.len() as f64;
    let bar_width = slot * 0.8;
    let zero = scale.y(0.0);
    for (i, bar) in chart.bars.iter().enumerate() {
        let center = left + slot * (i as f64 + 0.5);
        if let Some(value) = bar.value.filter(|v| v.is_finite()) {
            let y = scale.y(value);
            let _ = write!(
                svg,
                r#"<rect class="chart-bar" x="{:.2}" y="{:.2}" width="{bar_width:.2}" height="{:.2}"><title>{}: {}</title></rect>"#,
                center - bar_width / 2.0,
                y.min(zero),
                (zero - y).abs(),
                escape_html(&bar.label),
                format_axis_value(value)
            );
        }
        let label_y = bottom + 14.0;
        let _ = write!(
            svg,
            r#"<text class="chart-label" x="{center:.2}" y="{label_y}" text-anchor="end" transform="rotate(-{} {center:.2} {label_y})">{}</text>"#,
            chart.tick_rotation,
            escape_html(&bar.label)
        );
    }

    let _ = write!(
        svg,
        r#"<text class="chart-axis-label" x="{}" y="{}" text-anchor="middle">{}</text>"#,
        (left + right) / 2.0,
        BAR_HEIGHT - 8.0,
        escape_html(&chart.x_label)
    );
    let mid = (top + bottom) / 2.0;
    let _ = write!(
        svg,
        r#"<text class="chart-axis-label" x="14" y="{mid}" text-anchor="middle" transform="rotate(-90 14 {mid})">{}</text>"#,
        escape_html(&chart.y_label)
    );
    svg.push_str("</svg>");
    svg
}
