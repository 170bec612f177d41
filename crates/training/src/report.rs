//! Training-curve rendering.
//!
//! Writes a standalone SVG with two stacked panels over a shared epoch axis:
//! train/validation loss on top, train/validation accuracy below. Every data
//! point gets a marker, so a one-epoch history still shows up.

use crate::history::TrainingHistory;
use std::fs;
use std::io;
use std::path::Path;

const WIDTH: f32 = 960.0;
const HEIGHT: f32 = 660.0;
const MARGIN_LEFT: f32 = 70.0;
const MARGIN_RIGHT: f32 = 30.0;
const PANEL_HEIGHT: f32 = 240.0;
const PANEL_TOPS: [f32; 2] = [50.0, 380.0];

const TRAIN_LOSS_COLOR: &str = "#1f77b4";
const VAL_LOSS_COLOR: &str = "#d62728";
const TRAIN_ACC_COLOR: &str = "#2ca02c";
const VAL_ACC_COLOR: &str = "#ff7f0e";

/// Render the history to an SVG file at `path`.
pub fn render_curves(history: &TrainingHistory, path: &Path) -> io::Result<()> {
    fs::write(path, curves_svg(history))
}

struct Panel {
    top: f32,
    y_max: f32,
}

impl Panel {
    fn x(&self, index: usize, count: usize) -> f32 {
        let span = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        if count <= 1 {
            MARGIN_LEFT + span / 2.0
        } else {
            MARGIN_LEFT + span * index as f32 / (count - 1) as f32
        }
    }

    fn y(&self, value: f32) -> f32 {
        let unit = (value / self.y_max).clamp(0.0, 1.0);
        self.top + PANEL_HEIGHT - unit * PANEL_HEIGHT
    }

    fn bottom(&self) -> f32 {
        self.top + PANEL_HEIGHT
    }
}

fn series(panel: &Panel, values: &[f32], color: &str) -> String {
    let count = values.len();
    let points: Vec<(f32, f32)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (panel.x(i, count), panel.y(v)))
        .collect();
    let mut out = String::new();
    if points.len() > 1 {
        let joined: Vec<String> = points.iter().map(|(x, y)| format!("{x:.1},{y:.1}")).collect();
        out.push_str(&format!(
            "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"2\" points=\"{}\"/>\n",
            joined.join(" ")
        ));
    }
    for (x, y) in &points {
        out.push_str(&format!(
            "<circle cx=\"{x:.1}\" cy=\"{y:.1}\" r=\"3\" fill=\"{color}\"/>\n"
        ));
    }
    out
}

fn panel_frame(panel: &Panel, title: &str, tick_format: impl Fn(f32) -> String) -> String {
    let right = WIDTH - MARGIN_RIGHT;
    let mut out = String::new();
    out.push_str(&format!(
        "<text x=\"{MARGIN_LEFT}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"16\">{title}</text>\n",
        panel.top - 12.0
    ));
    out.push_str(&format!(
        "<rect x=\"{MARGIN_LEFT}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{PANEL_HEIGHT}\" fill=\"none\" stroke=\"#999\"/>\n",
        panel.top,
        right - MARGIN_LEFT
    ));
    for step in 0..=4 {
        let value = panel.y_max * step as f32 / 4.0;
        let y = panel.y(value);
        out.push_str(&format!(
            "<line x1=\"{MARGIN_LEFT}\" y1=\"{y:.1}\" x2=\"{right:.1}\" y2=\"{y:.1}\" stroke=\"#e0e0e0\"/>\n"
        ));
        out.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"11\" text-anchor=\"end\">{}</text>\n",
            MARGIN_LEFT - 8.0,
            y + 4.0,
            tick_format(value)
        ));
    }
    out
}

fn epoch_labels(panel: &Panel, epochs: &[usize]) -> String {
    let count = epochs.len();
    let step = (count / 10).max(1);
    let mut out = String::new();
    for (i, epoch) in epochs.iter().enumerate() {
        if i % step != 0 && i != count - 1 {
            continue;
        }
        out.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"11\" text-anchor=\"middle\">{epoch}</text>\n",
            panel.x(i, count),
            panel.bottom() + 16.0
        ));
    }
    out
}

fn legend(panel: &Panel, entries: &[(&str, &str)]) -> String {
    let mut out = String::new();
    let mut x = MARGIN_LEFT + 10.0;
    let y = panel.top + 16.0;
    for (label, color) in entries {
        out.push_str(&format!(
            "<rect x=\"{x:.1}\" y=\"{:.1}\" width=\"12\" height=\"12\" fill=\"{color}\"/>\n",
            y - 10.0
        ));
        out.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{y:.1}\" font-family=\"sans-serif\" font-size=\"12\">{label}</text>\n",
            x + 16.0
        ));
        x += 150.0;
    }
    out
}

fn curves_svg(history: &TrainingHistory) -> String {
    let metrics = history.epochs();
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" viewBox=\"0 0 {WIDTH} {HEIGHT}\">\n"
    ));
    svg.push_str(&format!(
        "<rect width=\"{WIDTH}\" height=\"{HEIGHT}\" fill=\"white\"/>\n"
    ));

    if metrics.is_empty() {
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"16\" text-anchor=\"middle\">no epochs recorded</text>\n",
            WIDTH / 2.0,
            HEIGHT / 2.0
        ));
        svg.push_str("</svg>\n");
        return svg;
    }

    let loss_max = metrics
        .iter()
        .flat_map(|m| [m.train_loss, m.val_loss])
        .fold(0.0f32, f32::max)
        .max(1e-6)
        * 1.05;
    let loss_panel = Panel {
        top: PANEL_TOPS[0],
        y_max: loss_max,
    };
    let acc_panel = Panel {
        top: PANEL_TOPS[1],
        y_max: 1.0,
    };
    let epochs: Vec<usize> = metrics.iter().map(|m| m.epoch).collect();

    svg.push_str(&panel_frame(&loss_panel, "loss", |v| format!("{v:.2}")));
    svg.push_str(&epoch_labels(&loss_panel, &epochs));
    let train_loss: Vec<f32> = metrics.iter().map(|m| m.train_loss).collect();
    let val_loss: Vec<f32> = metrics.iter().map(|m| m.val_loss).collect();
    svg.push_str(&series(&loss_panel, &train_loss, TRAIN_LOSS_COLOR));
    svg.push_str(&series(&loss_panel, &val_loss, VAL_LOSS_COLOR));
    svg.push_str(&legend(
        &loss_panel,
        &[
            ("train loss", TRAIN_LOSS_COLOR),
            ("val loss", VAL_LOSS_COLOR),
        ],
    ));

    svg.push_str(&panel_frame(&acc_panel, "accuracy", |v| format!("{v:.1}")));
    svg.push_str(&epoch_labels(&acc_panel, &epochs));
    let train_acc: Vec<f32> = metrics.iter().map(|m| m.train_accuracy).collect();
    let val_acc: Vec<f32> = metrics.iter().map(|m| m.val_accuracy).collect();
    svg.push_str(&series(&acc_panel, &train_acc, TRAIN_ACC_COLOR));
    svg.push_str(&series(&acc_panel, &val_acc, VAL_ACC_COLOR));
    svg.push_str(&legend(
        &acc_panel,
        &[
            ("train accuracy", TRAIN_ACC_COLOR),
            ("val accuracy", VAL_ACC_COLOR),
        ],
    ));

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EpochMetrics;

    fn history(n: usize) -> TrainingHistory {
        let mut history = TrainingHistory::new();
        for epoch in 1..=n {
            history.push(EpochMetrics {
                epoch,
                train_loss: 1.0 / epoch as f32,
                train_accuracy: 0.5 + 0.1 * epoch as f32,
                val_loss: 1.2 / epoch as f32,
                val_accuracy: 0.4 + 0.1 * epoch as f32,
            });
        }
        history
    }

    #[test]
    fn svg_contains_both_panels_and_all_series() {
        let svg = curves_svg(&history(3));
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(">loss</text>"));
        assert!(svg.contains(">accuracy</text>"));
        for label in ["train loss", "val loss", "train accuracy", "val accuracy"] {
            assert!(svg.contains(label), "missing series label {label}");
        }
        assert!(svg.contains("<polyline"));
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn single_epoch_history_still_draws_markers() {
        let svg = curves_svg(&history(1));
        assert!(!svg.contains("<polyline"));
        assert!(svg.contains("<circle"));
    }

    #[test]
    fn empty_history_renders_a_placeholder() {
        let svg = curves_svg(&TrainingHistory::new());
        assert!(svg.contains("no epochs recorded"));
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn render_writes_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("curves.svg");
        render_curves(&history(2), &path)?;
        let text = std::fs::read_to_string(&path)?;
        assert!(text.starts_with("<svg"));
        Ok(())
    }
}
