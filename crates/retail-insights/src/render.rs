//! Chart rendering
//!
//! Draws a [`ChartPayload`] as a standalone SVG and wraps it in an embeddable
//! `<img>` tag. The first column gives the categories (or x values), the
//! second column the plotted values.

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::error::{InsightsError, Result};
use crate::model::{ChartPayload, ChartType};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 480.0;
const LEFT: f64 = 90.0;
const RIGHT: f64 = 30.0;
const TOP: f64 = 50.0;
const BOTTOM: f64 = 90.0;
const Y_TICKS: usize = 5;
const MAX_X_LABELS: usize = 20;

const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#17becf",
];

/// `<img>` tag with the chart inlined as base64 SVG
pub fn render_chart(payload: &ChartPayload) -> Result<String> {
    let svg = render_svg(payload)?;
    Ok(format!(
        "<img src='data:image/svg+xml;base64,{}' alt='{}' />",
        STANDARD.encode(svg.as_bytes()),
        payload.chart_type.title()
    ))
}

pub fn render_svg(payload: &ChartPayload) -> Result<String> {
    payload.validate()?;
    if payload.columns.len() < 2 {
        return Err(InsightsError::Render(
            "at least two columns are needed to plot".into(),
        ));
    }
    if payload.data.is_empty() {
        return Err(InsightsError::Render("no data to plot".into()));
    }

    let labels: Vec<String> = payload.data.iter().map(|row| label(&row[0])).collect();
    let values: Vec<f64> = payload
        .data
        .iter()
        .map(|row| numeric(&row[1], &payload.columns[1]))
        .collect::<Result<_>>()?;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = write!(
        svg,
        r#"<text x="{}" y="28" text-anchor="middle" font-size="18">{}</text>"#,
        WIDTH / 2.0,
        escape(&payload.chart_type.title())
    );

    match payload.chart_type {
        ChartType::Pie => draw_pie(&mut svg, &labels, &values)?,
        ChartType::Scatter => {
            let xs: Option<Vec<f64>> = payload
                .data
                .iter()
                .map(|row| numeric(&row[0], &payload.columns[0]).ok())
                .collect();
            let plot = Plot::new(&values);
            plot.draw_axes(&mut svg, &payload.columns[0], &payload.columns[1]);
            match xs {
                Some(xs) => plot.draw_scatter_numeric(&mut svg, &xs, &values),
                None => {
                    plot.draw_categories(&mut svg, &labels);
                    plot.draw_points(&mut svg, &values, false);
                }
            }
        }
        ChartType::Bar | ChartType::Line => {
            let plot = Plot::new(&values);
            plot.draw_axes(&mut svg, &payload.columns[0], &payload.columns[1]);
            plot.draw_categories(&mut svg, &labels);
            if payload.chart_type == ChartType::Bar {
                plot.draw_bars(&mut svg, &values);
            } else {
                plot.draw_points(&mut svg, &values, true);
            }
        }
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Cartesian plot area with a value axis
struct Plot {
    y_min: f64,
    y_max: f64,
    count: usize,
}

impl Plot {
    fn new(values: &[f64]) -> Self {
        let lo = values.iter().copied().fold(0.0_f64, f64::min);
        let hi = values.iter().copied().fold(0.0_f64, f64::max);
        Self {
            y_min: lo,
            y_max: if (hi - lo).abs() < f64::EPSILON { lo + 1.0 } else { hi },
            count: values.len(),
        }
    }

    const fn plot_width() -> f64 {
        WIDTH - LEFT - RIGHT
    }

    const fn plot_height() -> f64 {
        HEIGHT - TOP - BOTTOM
    }

    fn y(&self, value: f64) -> f64 {
        TOP + Self::plot_height() * (1.0 - (value - self.y_min) / (self.y_max - self.y_min))
    }

    #[allow(clippy::cast_precision_loss)]
    fn slot(&self) -> f64 {
        Self::plot_width() / self.count.max(1) as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn x_center(&self, idx: usize) -> f64 {
        LEFT + self.slot() * (idx as f64 + 0.5)
    }

    #[allow(clippy::cast_precision_loss)]
    fn draw_axes(&self, svg: &mut String, x_title: &str, y_title: &str) {
        let bottom = TOP + Self::plot_height();
        let _ = write!(
            svg,
            r##"<line x1="{LEFT}" y1="{TOP}" x2="{LEFT}" y2="{bottom}" stroke="#333"/><line x1="{LEFT}" y1="{bottom}" x2="{}" y2="{bottom}" stroke="#333"/>"##,
            WIDTH - RIGHT
        );

        for tick in 0..=Y_TICKS {
            let value = self.y_min + (self.y_max - self.y_min) * tick as f64 / Y_TICKS as f64;
            let y = self.y(value);
            let _ = write!(
                svg,
                r##"<line x1="{}" y1="{y:.1}" x2="{LEFT}" y2="{y:.1}" stroke="#333"/><text x="{}" y="{:.1}" text-anchor="end">{}</text>"##,
                LEFT - 5.0,
                LEFT - 8.0,
                y + 4.0,
                format_number(value)
            );
        }

        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="{}" text-anchor="middle">{}</text>"#,
            LEFT + Self::plot_width() / 2.0,
            HEIGHT - 10.0,
            escape(x_title)
        );
        let _ = write!(
            svg,
            r#"<text x="20" y="{:.1}" text-anchor="middle" transform="rotate(-90 20 {:.1})">{}</text>"#,
            TOP + Self::plot_height() / 2.0,
            TOP + Self::plot_height() / 2.0,
            escape(y_title)
        );
    }

    fn draw_categories(&self, svg: &mut String, labels: &[String]) {
        let step = labels.len().div_ceil(MAX_X_LABELS).max(1);
        let y = TOP + Self::plot_height() + 16.0;
        for (idx, text) in labels.iter().enumerate().step_by(step) {
            let x = self.x_center(idx);
            let _ = write!(
                svg,
                r#"<text x="{x:.1}" y="{y:.1}" text-anchor="end" transform="rotate(-30 {x:.1} {y:.1})">{}</text>"#,
                escape(text)
            );
        }
    }

    fn draw_bars(&self, svg: &mut String, values: &[f64]) {
        let width = self.slot() * 0.7;
        let base = self.y(0.0_f64.clamp(self.y_min, self.y_max));
        for (idx, value) in values.iter().enumerate() {
            let top = self.y(*value);
            let _ = write!(
                svg,
                r#"<rect x="{:.1}" y="{:.1}" width="{width:.1}" height="{:.1}" fill="{}"/>"#,
                self.x_center(idx) - width / 2.0,
                top.min(base),
                (base - top).abs(),
                PALETTE[0]
            );
        }
    }

    fn draw_points(&self, svg: &mut String, values: &[f64], connect: bool) {
        let points: Vec<(f64, f64)> = values
            .iter()
            .enumerate()
            .map(|(idx, value)| (self.x_center(idx), self.y(*value)))
            .collect();
        if connect {
            let path: Vec<String> = points.iter().map(|(x, y)| format!("{x:.1},{y:.1}")).collect();
            let _ = write!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
                path.join(" "),
                PALETTE[0]
            );
        }
        for (x, y) in points {
            let _ = write!(svg, r#"<circle cx="{x:.1}" cy="{y:.1}" r="3" fill="{}"/>"#, PALETTE[0]);
        }
    }

    fn draw_scatter_numeric(&self, svg: &mut String, xs: &[f64], values: &[f64]) {
        let x_min = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = if (x_max - x_min).abs() < f64::EPSILON { 1.0 } else { x_max - x_min };

        let y = TOP + Self::plot_height() + 16.0;
        for (x_value, anchor) in [(x_min, "start"), (x_max, "end")] {
            let x = LEFT + Self::plot_width() * (x_value - x_min) / span;
            let _ = write!(
                svg,
                r#"<text x="{x:.1}" y="{y:.1}" text-anchor="{anchor}">{}</text>"#,
                format_number(x_value)
            );
        }
        for (x_value, value) in xs.iter().zip(values) {
            let x = LEFT + Self::plot_width() * (x_value - x_min) / span;
            let _ = write!(
                svg,
                r#"<circle cx="{x:.1}" cy="{:.1}" r="4" fill="{}" fill-opacity="0.8"/>"#,
                self.y(*value),
                PALETTE[0]
            );
        }
    }
}

fn draw_pie(svg: &mut String, labels: &[String], values: &[f64]) -> Result<()> {
    if values.iter().any(|v| *v < 0.0) {
        return Err(InsightsError::Render(
            "pie charts cannot show negative values".into(),
        ));
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(InsightsError::Render("pie chart values sum to zero".into()));
    }

    let (cx, cy, r) = (WIDTH * 0.38, HEIGHT / 2.0 + 15.0, HEIGHT * 0.36);
    let mut angle = -std::f64::consts::FRAC_PI_2;

    for (idx, (text, value)) in labels.iter().zip(values).enumerate() {
        let share = value / total;
        let sweep = share * std::f64::consts::TAU;
        let color = PALETTE[idx % PALETTE.len()];

        if share >= 1.0 - f64::EPSILON {
            let _ = write!(svg, r#"<circle cx="{cx:.1}" cy="{cy:.1}" r="{r:.1}" fill="{color}"/>"#);
        } else if share > 0.0 {
            let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
            let end = angle + sweep;
            let (x2, y2) = (cx + r * end.cos(), cy + r * end.sin());
            let large = u8::from(sweep > std::f64::consts::PI);
            let _ = write!(
                svg,
                r#"<path d="M{cx:.1},{cy:.1} L{x1:.1},{y1:.1} A{r:.1},{r:.1} 0 {large} 1 {x2:.1},{y2:.1} Z" fill="{color}" stroke="white"/>"#
            );
        }

        if share > 0.0 {
            let mid = angle + sweep / 2.0;
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" fill="white">{:.1}%</text>"#,
                cx + r * 0.65 * mid.cos(),
                cy + r * 0.65 * mid.sin(),
                share * 100.0
            );
        }
        angle += sweep;

        #[allow(clippy::cast_precision_loss)]
        let legend_y = TOP + 20.0 * idx as f64;
        let _ = write!(
            svg,
            r#"<rect x="{:.1}" y="{legend_y:.1}" width="12" height="12" fill="{color}"/><text x="{:.1}" y="{:.1}">{}</text>"#,
            WIDTH * 0.72,
            WIDTH * 0.72 + 18.0,
            legend_y + 10.0,
            escape(text)
        );
    }
    Ok(())
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn numeric(value: &Value, column: &str) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).ok_or_else(|| {
        InsightsError::Render(format!("value {value} in column '{column}' is not numeric"))
    })
}

fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1e9 {
        format!("{:.1}B", value / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.1}M", value / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.1}k", value / 1e3)
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
