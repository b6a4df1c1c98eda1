//! One interaction of the dashboard: load, clean, compute overlays and build
//! every chart for the selected race, from scratch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::charts::{self, ChartSpec, Overlays};
use crate::frame::{clean_table, RaceFrame, RaceSummary};
use crate::geometry::DerivedGeometry;
use crate::workbook::Workbook;
use crate::{DashboardConfig, RaceError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardRequest {
    pub race: String,
    /// Keep the starting strokes in every chart.
    #[serde(default)]
    pub show_start: bool,
    #[serde(default)]
    pub overlays: Overlays,
}

impl DashboardRequest {
    pub fn new(race: impl Into<String>) -> Self {
        Self {
            race: race.into(),
            show_start: false,
            overlays: Overlays::default(),
        }
    }

    pub fn stroke_threshold(&self, config: &DashboardConfig) -> u32 {
        if self.show_start {
            0
        } else {
            config.stroke_threshold
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dashboard {
    pub race: String,
    pub summary: RaceSummary,
    pub geometry: Option<DerivedGeometry>,
    /// Line chart, both scatter charts and the box plot, in display order.
    pub charts: Vec<ChartSpec>,
    pub course_map: Option<ChartSpec>,
}

/// Load and clean one race worksheet into a frame.
pub fn load_race(
    workbook: &Workbook,
    race: &str,
    config: &DashboardConfig,
) -> Result<RaceFrame, RaceError> {
    let raw = workbook.load_raw_table(race, config.layout)?;
    debug!("race '{}': {} raw rows", race, raw.rows.len());
    let table = clean_table(raw)?;
    RaceFrame::from_table(&table)
}

/// Build every chart for an already loaded frame.
pub fn render_dashboard(
    frame: &RaceFrame,
    request: &DashboardRequest,
    config: &DashboardConfig,
) -> Result<Dashboard, RaceError> {
    let threshold = request.stroke_threshold(config);
    let summary = frame.summary(config.pace.reference_m)?;

    let geometry = if request.overlays.any() {
        Some(DerivedGeometry::compute(
            &frame.filter_strokes(threshold),
            request.overlays,
            config,
        )?)
    } else {
        None
    };

    let charts = vec![
        charts::speed_stroke_rate_chart(
            frame,
            threshold,
            request.overlays,
            geometry.as_ref(),
            config,
        )?,
        charts::speed_by_stroke_rate_chart(frame, threshold, config),
        charts::stroke_rate_by_speed_chart(frame, threshold, config),
        charts::speed_box_chart(frame, threshold, config),
    ];

    let course_map = match charts::course_map(frame, config) {
        Ok(spec) => Some(spec),
        Err(RaceError::NoCoordinates) => {
            warn!("race '{}': no GPS coordinates, skipping course map", frame.race());
            None
        }
        Err(err) => return Err(err),
    };

    Ok(Dashboard {
        race: frame.race().to_string(),
        summary,
        geometry,
        charts,
        course_map,
    })
}

pub fn build_dashboard(
    workbook: &Workbook,
    request: &DashboardRequest,
    config: &DashboardConfig,
) -> Result<Dashboard, RaceError> {
    config.validate()?;
    let frame = load_race(workbook, &request.race, config)?;
    render_dashboard(&frame, request, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::record;
    use crate::ChartKind;

    fn frame() -> RaceFrame {
        RaceFrame::from_records(
            "Final",
            (1..=12).map(|n| record(n as f64 * 40.0, 4.0 + (n % 3) as f64 * 0.2, n)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn plain_dashboard_has_four_charts() {
        let cfg = DashboardConfig::default();
        let dash = render_dashboard(&frame(), &DashboardRequest::new("Final"), &cfg).unwrap();
        let kinds: Vec<ChartKind> = dash.charts.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChartKind::SpeedStrokeRate,
                ChartKind::SpeedByStrokeRate,
                ChartKind::StrokeRateBySpeed,
                ChartKind::SpeedByStrokeRateBox,
            ]
        );
        assert!(dash.geometry.is_none());
        assert!(dash.course_map.is_none());
        assert_eq!(dash.summary.samples, 12);
    }

    #[test]
    fn show_start_disables_filter() {
        let cfg = DashboardConfig::default();
        let mut request = DashboardRequest::new("Final");
        assert_eq!(request.stroke_threshold(&cfg), 5);
        request.show_start = true;
        assert_eq!(request.stroke_threshold(&cfg), 0);
        let dash = render_dashboard(&frame(), &request, &cfg).unwrap();
        assert_eq!(dash.charts[1].data[0]["x"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn high_stroke_band_follows_configured_start_strokes() {
        let cfg = DashboardConfig::default();
        let request = DashboardRequest {
            race: "Final".into(),
            show_start: true,
            overlays: Overlays {
                split_lines: false,
                breakdown: true,
            },
        };
        let dash = render_dashboard(&frame(), &request, &cfg).unwrap();
        let geometry = dash.geometry.unwrap();
        assert!(geometry.pace_lines.is_empty());
        // strokes 6..=9, even though the starting strokes are plotted
        assert_eq!(geometry.breakdown.unwrap().high_strokes, (240.0, 360.0));
    }

    #[test]
    fn split_lines_survive_sparse_start_strokes() {
        let records = [1, 2, 12, 14, 16, 18, 20]
            .into_iter()
            .map(|n| record(n as f64 * 10.0, 4.0 + (n % 3) as f64 * 0.2, n))
            .collect();
        let frame = RaceFrame::from_records("Final", records).unwrap();
        let cfg = DashboardConfig::default();
        let mut request = DashboardRequest {
            race: "Final".into(),
            show_start: false,
            overlays: Overlays {
                split_lines: true,
                breakdown: false,
            },
        };
        let dash = render_dashboard(&frame, &request, &cfg).unwrap();
        assert_eq!(dash.charts.len(), 4);
        let geometry = dash.geometry.unwrap();
        assert!(geometry.breakdown.is_none());
        assert!(!geometry.pace_lines.is_empty());

        // no stroke count between 5 and 10 for the start band
        request.overlays.breakdown = true;
        assert_eq!(
            render_dashboard(&frame, &request, &cfg).unwrap_err(),
            RaceError::EmptyInterval { lower: 5, upper: 10 }
        );
    }
}
