//! SVG chart renderer
//!
//! `render` lays out one line chart for a series set and returns a
//! [`ChartHandle`] that owns the drawn elements. Visibility is changed only
//! through [`ChartHandle::update_visibility`]; `to_svg` serialises the
//! current state.

use chrono::{DateTime, FixedOffset, TimeZone};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

use crate::data::{MetricKind, Operation, TimeRange};
use crate::format::{self, format_tooltip_time, format_value_with_unit};
use crate::series::SeriesSet;
use crate::visibility::VisibilitySet;

/// Markers are skipped on long ranges once a chart has this many points
pub const MARKER_DENSITY_LIMIT: usize = 200;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 320.0;
const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 44.0;
const Y_TICKS: usize = 5;

/// Colors for chart lines
pub const CHART_COLORS: [&str; 10] = [
    "#58a6ff", "#3fb950", "#f85149", "#a371f7", "#d29922", "#79c0ff", "#56d364", "#ff7b72",
    "#bc8cff", "#e3b341",
];

/// A CSS color value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Color(pub String);

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Assigns colors to groups
pub trait ColorScheme {
    fn color_for(&self, key: &str) -> Color;
}

/// Fixed palette indexed by a stable hash of the key
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<String>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(CHART_COLORS.iter().map(|c| c.to_string()).collect())
    }
}

impl Palette {
    pub fn new(colors: Vec<String>) -> Self {
        Self { colors }
    }
}

impl ColorScheme for Palette {
    fn color_for(&self, key: &str) -> Color {
        if self.colors.is_empty() {
            return Color("currentColor".to_string());
        }
        // FNV-1a, so a group keeps its color across charts and runs
        let hash = key.bytes().fold(0xcbf29ce484222325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x100000001b3)
        });
        Color(self.colors[(hash % self.colors.len() as u64) as usize].clone())
    }
}

/// Display options for one chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub title: String,
    pub y_axis_label: String,
    pub metric_kind: MetricKind,
    pub time_range: TimeRange,
    /// Operations shown before the first visibility sync; all when `None`
    pub default_visible_operations: Option<BTreeSet<Operation>>,
}

/// Axis tick at a pixel position
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub position: f64,
    pub label: String,
}

/// One drawn series line
#[derive(Debug, Clone, PartialEq)]
pub struct LineElement {
    pub key: String,
    pub group: String,
    pub operation: Operation,
    pub color: Color,
    pub path: String,
    pub opacity: f64,
}

/// One drawn point marker
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub cx: f64,
    pub cy: f64,
    pub tooltip: String,
    pub test_url: Option<String>,
    pub opacity: f64,
}

/// Rendered chart state owned by the dashboard controller
#[derive(Debug, Clone, PartialEq)]
pub struct ChartHandle {
    container: String,
    options: ChartOptions,
    y_domain: (f64, f64),
    x_ticks: Vec<Tick>,
    y_ticks: Vec<Tick>,
    lines: BTreeMap<String, LineElement>,
    markers: BTreeMap<String, Vec<Marker>>,
}

/// Render a chart, or `None` when there is nothing to plot
pub fn render(
    container: &str,
    set: &SeriesSet,
    options: &ChartOptions,
    colors: &dyn ColorScheme,
) -> Option<ChartHandle> {
    let (t_min, t_max) = set.time_range()?;
    let (v_min, v_max) = set.value_range()?;

    let y_domain = y_domain(v_min, v_max);
    let x_scale = TimeScale::new(t_min, t_max);
    let y_scale = |v: f64| {
        let (lo, hi) = y_domain;
        MARGIN_TOP + plot_height() * (1.0 - (v - lo) / (hi - lo))
    };

    let initially_visible = |op: Operation| {
        options
            .default_visible_operations
            .as_ref()
            .map_or(true, |ops| ops.contains(&op))
    };

    // Density counts only the points drawn visible
    let visible_points: usize = set
        .series
        .values()
        .filter(|s| initially_visible(s.operation))
        .map(|s| s.points.len())
        .sum();
    let show_markers =
        options.time_range.is_short() || visible_points < MARKER_DENSITY_LIMIT;

    let mut lines = BTreeMap::new();
    let mut markers = BTreeMap::new();

    for (key, series) in &set.series {
        let opacity = if initially_visible(series.operation) { 1.0 } else { 0.0 };
        let color = colors.color_for(&series.group);

        let mut path = String::new();
        for (i, point) in series.points.iter().enumerate() {
            let x = x_scale.position(&point.timestamp);
            let y = y_scale(point.value);
            let cmd = if i == 0 { "M" } else { " L" };
            let _ = write!(path, "{} {:.1} {:.1}", cmd, x, y);
        }

        if show_markers {
            let series_markers = series
                .points
                .iter()
                .map(|point| Marker {
                    cx: x_scale.position(&point.timestamp),
                    cy: y_scale(point.value),
                    tooltip: format!(
                        "{}\n{}\n{}",
                        key,
                        format_tooltip_time(&point.timestamp),
                        format_value_with_unit(options.metric_kind, point.value)
                    ),
                    test_url: point.test_url.clone(),
                    opacity,
                })
                .collect();
            markers.insert(key.clone(), series_markers);
        }

        lines.insert(
            key.clone(),
            LineElement {
                key: key.clone(),
                group: series.group.clone(),
                operation: series.operation,
                color,
                path,
                opacity,
            },
        );
    }

    let y_ticks = (0..Y_TICKS)
        .map(|i| {
            let fraction = i as f64 / (Y_TICKS - 1) as f64;
            let value = y_domain.0 + (y_domain.1 - y_domain.0) * fraction;
            Tick {
                position: y_scale(value),
                label: format::format_value(options.metric_kind, value),
            }
        })
        .collect();

    Some(ChartHandle {
        container: container.to_string(),
        options: options.clone(),
        y_domain,
        x_ticks: x_scale.ticks(options.time_range),
        y_ticks,
        lines,
        markers,
    })
}

/// Y domain padded by 10% of the value span, never below zero
pub fn y_domain(min: f64, max: f64) -> (f64, f64) {
    let span = max - min;
    let pad = if span > 0.0 {
        span * 0.1
    } else if max != 0.0 {
        max.abs() * 0.1
    } else {
        1.0
    };
    ((min - pad).max(0.0), max + pad)
}

fn plot_width() -> f64 {
    CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT
}

fn plot_height() -> f64 {
    CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
}

struct TimeScale {
    min: DateTime<FixedOffset>,
    max: DateTime<FixedOffset>,
}

impl TimeScale {
    fn new(min: DateTime<FixedOffset>, max: DateTime<FixedOffset>) -> Self {
        Self { min, max }
    }

    fn span_ms(&self) -> i64 {
        (self.max - self.min).num_milliseconds()
    }

    fn position(&self, t: &DateTime<FixedOffset>) -> f64 {
        let span = self.span_ms();
        if span == 0 {
            return MARGIN_LEFT + plot_width() / 2.0;
        }
        let offset = (*t - self.min).num_milliseconds() as f64;
        MARGIN_LEFT + plot_width() * offset / span as f64
    }

    fn ticks(&self, range: TimeRange) -> Vec<Tick> {
        let span = self.span_ms();
        if span == 0 {
            return vec![Tick {
                position: self.position(&self.min),
                label: format::format_tick_time(&self.min, range),
            }];
        }

        let count = format::x_tick_count(range);
        (0..count)
            .filter_map(|i| {
                let offset = span * i as i64 / (count - 1) as i64;
                let t = self.min.timezone().timestamp_millis_opt(
                    self.min.timestamp_millis() + offset,
                );
                t.single().map(|t| Tick {
                    position: self.position(&t),
                    label: format::format_tick_time(&t, range),
                })
            })
            .collect()
    }
}

impl ChartHandle {
    /// Show exactly the lines whose group and operation are in `visible`
    pub fn update_visibility(&mut self, visible: &VisibilitySet) {
        for line in self.lines.values_mut() {
            let opacity = if visible.is_visible(&line.group, line.operation) {
                1.0
            } else {
                0.0
            };
            line.opacity = opacity;
            if let Some(markers) = self.markers.get_mut(&line.key) {
                for marker in markers {
                    marker.opacity = opacity;
                }
            }
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn options(&self) -> &ChartOptions {
        &self.options
    }

    pub fn y_domain(&self) -> (f64, f64) {
        self.y_domain
    }

    pub fn x_ticks(&self) -> &[Tick] {
        &self.x_ticks
    }

    pub fn y_ticks(&self) -> &[Tick] {
        &self.y_ticks
    }

    pub fn lines(&self) -> impl Iterator<Item = &LineElement> {
        self.lines.values()
    }

    pub fn line(&self, key: &str) -> Option<&LineElement> {
        self.lines.get(key)
    }

    pub fn markers(&self, key: &str) -> &[Marker] {
        self.markers.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn shows_markers(&self) -> bool {
        !self.markers.is_empty()
    }

    /// Keys of lines currently drawn fully opaque
    pub fn visible_keys(&self) -> BTreeSet<String> {
        self.lines
            .values()
            .filter(|l| l.opacity > 0.0)
            .map(|l| l.key.clone())
            .collect()
    }

    /// Serialise the chart to an inline SVG element
    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        // Writing to a String cannot fail
        let _ = self.write_svg(&mut svg);
        svg
    }

    fn write_svg(&self, out: &mut String) -> fmt::Result {
        let left = MARGIN_LEFT;
        let right = CHART_WIDTH - MARGIN_RIGHT;
        let bottom = CHART_HEIGHT - MARGIN_BOTTOM;

        writeln!(
            out,
            r#"<svg id="{}-svg" class="chart" viewBox="0 0 {} {}" preserveAspectRatio="xMidYMid meet" role="img">"#,
            escape_xml(&self.container),
            CHART_WIDTH,
            CHART_HEIGHT
        )?;
        writeln!(out, "<title>{}</title>", escape_xml(&self.options.title))?;

        for tick in &self.y_ticks {
            writeln!(
                out,
                r#"<line class="grid" x1="{left:.1}" y1="{y:.1}" x2="{right:.1}" y2="{y:.1}"/>"#,
                y = tick.position
            )?;
            writeln!(
                out,
                r#"<text class="axis-label" x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"#,
                left - 6.0,
                tick.position + 4.0,
                escape_xml(&tick.label)
            )?;
        }

        for tick in &self.x_ticks {
            writeln!(
                out,
                r#"<line class="grid" x1="{x:.1}" y1="{MARGIN_TOP:.1}" x2="{x:.1}" y2="{bottom:.1}"/>"#,
                x = tick.position
            )?;
            writeln!(
                out,
                r#"<text class="axis-label" x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
                tick.position,
                bottom + 18.0,
                escape_xml(&tick.label)
            )?;
        }

        writeln!(
            out,
            r#"<line class="axis" x1="{left:.1}" y1="{bottom:.1}" x2="{right:.1}" y2="{bottom:.1}"/>"#
        )?;
        writeln!(
            out,
            r#"<line class="axis" x1="{left:.1}" y1="{MARGIN_TOP:.1}" x2="{left:.1}" y2="{bottom:.1}"/>"#
        )?;
        writeln!(
            out,
            r#"<text class="axis-title" transform="translate(14 {:.1}) rotate(-90)" text-anchor="middle">{}</text>"#,
            MARGIN_TOP + plot_height() / 2.0,
            escape_xml(&self.options.y_axis_label)
        )?;

        for line in self.lines.values() {
            let dash = match line.operation {
                Operation::Read => "",
                Operation::Write => r#" stroke-dasharray="6 3""#,
            };
            writeln!(
                out,
                r#"<path class="series-line" data-key="{}" data-group="{}" data-op="{}" d="{}" fill="none" stroke="{}" stroke-width="2"{} opacity="{}"/>"#,
                escape_xml(&line.key),
                escape_xml(&line.group),
                line.operation,
                line.path,
                escape_xml(&line.color.0),
                dash,
                line.opacity
            )?;

            for marker in self.markers(&line.key) {
                let circle = format!(
                    r#"<circle class="series-marker" data-key="{}" data-group="{}" data-op="{}" cx="{:.1}" cy="{:.1}" r="3.5" fill="{}" opacity="{}"><title>{}</title></circle>"#,
                    escape_xml(&line.key),
                    escape_xml(&line.group),
                    line.operation,
                    marker.cx,
                    marker.cy,
                    escape_xml(&line.color.0),
                    marker.opacity,
                    escape_xml(&marker.tooltip)
                );
                match &marker.test_url {
                    Some(url) => writeln!(
                        out,
                        r#"<a href="{}" target="_blank" rel="noopener">{}</a>"#,
                        escape_xml(url),
                        circle
                    )?,
                    None => writeln!(out, "{}", circle)?,
                }
            }
        }

        writeln!(out, "</svg>")
    }
}

/// Escape text for use in SVG attributes and text nodes
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
