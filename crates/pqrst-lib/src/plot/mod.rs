use serde::{Deserialize, Serialize};

use crate::signal::{FiducialKind, Waveform};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

/// `0xRRGGBB`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Isolated markers, e.g. fiducial points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

impl Series {
    pub fn name(&self) -> &str {
        match self {
            Series::Line(line) => &line.name,
            Series::Scatter(scatter) => &scatter.name,
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Scatter(scatter) => &scatter.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every series; `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

fn marker_color(kind: FiducialKind) -> Color {
    match kind {
        FiducialKind::POnset => Color(0x2CA02C),
        FiducialKind::Q => Color(0x1F77B4),
        FiducialKind::R => Color(0xD62728),
        FiducialKind::S => Color(0x9467BD),
        FiducialKind::TEnd => Color(0xFF7F0E),
    }
}

fn time_points(lead: &Waveform) -> Vec<[f64; 2]> {
    let dt = 1.0 / lead.fs();
    lead.points()
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect()
}

/// A lead against time (s), decimated to `max_points`, with one marker series
/// per detected fiducial kind. Markers are never decimated.
///
/// `raw`, when given, is drawn first as a light dashed line under the lead.
pub fn figure_from_waveform(lead: &Waveform, raw: Option<&Waveform>, max_points: usize) -> Figure {
    let mut fig = Figure::new(Some(lead.label().to_string()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("amplitude (mV)".into());
    if let Some(raw) = raw {
        fig.add_series(Series::Line(LineSeries {
            name: raw.label().to_string(),
            points: decimate_points(&time_points(raw), max_points),
            style: Style {
                width: 1.0,
                dash: Some([4.0, 2.0]),
                color: Color(0xA0A0A0),
            },
        }));
    }
    fig.add_series(Series::Line(LineSeries {
        name: lead.label().to_string(),
        points: decimate_points(&time_points(lead), max_points),
        style: Style {
            width: 1.4,
            dash: None,
            color: Color(0x202020),
        },
    }));
    if let Some(fiducials) = lead.fiducials() {
        let dt = 1.0 / lead.fs();
        let x = lead.points();
        for (kind, indices) in fiducials.iter() {
            if indices.is_empty() {
                continue;
            }
            fig.add_series(Series::Scatter(ScatterSeries {
                name: kind.name().to_string(),
                points: indices.iter().map(|&i| [i as f64 * dt, x[i]]).collect(),
                radius: 3,
                color: marker_color(kind),
            }));
        }
    }
    fig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Fiducials;

    #[test]
    fn decimation_keeps_bucket_starts() {
        let points: Vec<[f64; 2]> = (0..10).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 5);
        assert_eq!(out.len(), 5);
        assert_eq!(out[1], [2.0, 0.0]);
        assert_eq!(decimate_points(&points, 20).len(), 10);
    }

    #[test]
    fn waveform_figure_has_markers() {
        let mut f = Fiducials::new();
        f.insert(FiducialKind::R, vec![1, 3], 4).unwrap();
        let lead = Waveform::new("II", vec![0.0, 1.0, 0.0, 2.0], 2)
            .unwrap()
            .with_fiducials(f)
            .unwrap();
        let fig = figure_from_waveform(&lead, None, 1024);
        assert_eq!(fig.series.len(), 2);
        assert_eq!(fig.series[1].name(), "R");
        assert_eq!(fig.series[1].points(), &[[0.5, 1.0], [1.5, 2.0]]);
        assert_eq!(fig.bounds(), Some((0.0, 1.5, 0.0, 2.0)));
        assert_eq!(Color(0x102030).rgb(), (0x10, 0x20, 0x30));
    }

    #[test]
    fn raw_overlay_is_drawn_under_the_lead() {
        let raw = Waveform::new("II", vec![0.5, 1.5, 0.5, 2.5, -1.0, 0.0], 2).unwrap();
        let lead = Waveform::new("II (treated)", vec![0.0, 1.0, 0.0, 2.0, 0.0, 0.0], 2).unwrap();
        let fig = figure_from_waveform(&lead, Some(&raw), 3);
        let names: Vec<_> = fig.series.iter().map(Series::name).collect();
        assert_eq!(names, ["II", "II (treated)"]);
        match &fig.series[0] {
            Series::Line(line) => {
                assert_eq!(line.points, vec![[0.0, 0.5], [1.0, 0.5], [2.0, -1.0]]);
                assert!(line.style.dash.is_some());
            }
            Series::Scatter(_) => panic!("raw overlay should be a line"),
        }
        assert_eq!(fig.bounds(), Some((0.0, 2.0, -1.0, 0.5)));
    }

    #[test]
    fn empty_figure_has_no_bounds() {
        assert_eq!(Figure::new(None::<String>).bounds(), None);
    }
}
