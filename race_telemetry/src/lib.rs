//! Rowing race telemetry: workbook loading, frame cleaning, derived race
//! geometry and Plotly-compatible chart specifications.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod charts;
pub mod dashboard;
pub mod frame;
pub mod geometry;
pub mod labels;
pub mod workbook;

pub use charts::{ChartKind, ChartSpec, Overlays};
pub use dashboard::{build_dashboard, load_race, render_dashboard, Dashboard, DashboardRequest};
pub use frame::{clean_table, CleanTable, Column, RaceFrame, RaceRecord, RaceSummary};
pub use geometry::{
    DerivedGeometry, IntervalBounds, PaceLine, PaceSettings, RaceBreakdown, SpeedExtremes,
};
pub use labels::Labels;
pub use workbook::{list_races, Cell, RawTable, SheetLayout, Workbook};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RaceError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("not a readable spreadsheet: {0}")]
    InvalidFormat(String),
    #[error("no race worksheet named '{0}'")]
    UnknownRace(String),
    #[error("column '{column}' row {row}: expected a time of day, found {found}")]
    MalformedTime {
        column: String,
        row: usize,
        found: String,
    },
    #[error("no samples with a stroke count between {lower} and {upper}")]
    EmptyInterval { lower: u32, upper: u32 },
    #[error("column '{0}' is not numeric")]
    NonNumericColumn(String),
    #[error("required column '{0}' is missing")]
    MissingColumn(String),
    #[error("column '{column}' row {row}: value is missing")]
    MissingValue { column: String, row: usize },
    #[error("column '{column}' decreases at row {row}")]
    NonMonotonic { column: String, row: usize },
    #[error("race '{0}' has no samples")]
    EmptyFrame(String),
    #[error("race has no GPS coordinates")]
    NoCoordinates,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// X axis range shared by the distance-based charts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum XRange {
    /// `[0, max distance * pad]` of the plotted samples.
    Observed { pad: f64 },
    /// Fixed-distance race formats, e.g. `0..1000`.
    Fixed { min: f64, max: f64 },
}

impl Default for XRange {
    fn default() -> Self {
        XRange::Observed { pad: 1.05 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub marker_size: f64,
    pub zoom: u8,
    pub style: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            marker_size: 6.0,
            zoom: 14,
            style: "open-street-map".to_string(),
        }
    }
}

/// Deployment configuration, constructed once and passed by reference into
/// every stage of the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub layout: SheetLayout,
    /// Samples with `total_strokes <= stroke_threshold` are the starting
    /// strokes; 0 disables the filter.
    pub stroke_threshold: u32,
    pub high_stroke_window: u32,
    pub interval_bounds: IntervalBounds,
    pub pace: PaceSettings,
    pub x_range: XRange,
    pub color_scale: String,
    pub map: MapConfig,
    pub labels: Labels,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            layout: SheetLayout::STANDARD,
            stroke_threshold: 5,
            high_stroke_window: 5,
            interval_bounds: IntervalBounds::Exclusive,
            pace: PaceSettings::default(),
            x_range: XRange::default(),
            color_scale: "Aggrnyl".to_string(),
            map: MapConfig::default(),
            labels: Labels::default(),
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), RaceError> {
        self.layout.validate()?;
        if self.pace.step_s <= 0 {
            return Err(RaceError::InvalidParameter(
                "pace step must be positive".into(),
            ));
        }
        if !(self.pace.reference_m > 0.0) {
            return Err(RaceError::InvalidParameter(
                "pace reference distance must be positive".into(),
            ));
        }
        if self.high_stroke_window == 0 {
            return Err(RaceError::InvalidParameter(
                "high stroke window must be at least one stroke".into(),
            ));
        }
        match self.x_range {
            XRange::Observed { pad } if !(pad > 0.0) => Err(RaceError::InvalidParameter(
                "x range pad must be positive".into(),
            )),
            XRange::Fixed { min, max } if !(max > min) => Err(RaceError::InvalidParameter(
                "fixed x range must have max > min".into(),
            )),
            _ => Ok(()),
        }
    }
}
