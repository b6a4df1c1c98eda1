//! Derived race geometry: pace threshold lines, quarter-distance boundaries,
//! the high-stroke-count start interval and speed extremes.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::charts::Overlays;
use crate::frame::RaceFrame;
use crate::{DashboardConfig, RaceError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaceSettings {
    /// Split reference distance (500 m).
    pub reference_m: f64,
    /// Spacing between threshold lines, seconds of split.
    pub step_s: i64,
    /// Extremes for the threshold lines ignore samples at or below this
    /// stroke count, whatever filter the caller applied.
    pub stroke_floor: u32,
    /// Upper bound on the number of threshold lines; wider ranges give none.
    pub max_lines: usize,
}

impl Default for PaceSettings {
    fn default() -> Self {
        Self {
            reference_m: 500.0,
            step_s: 5,
            stroke_floor: 5,
            max_lines: 120,
        }
    }
}

/// Horizontal split line: `label` is `M:SS`, `speed` the matching speed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PaceLine {
    pub label: String,
    pub pace_s: i64,
    pub speed: f64,
}

/// Which stroke counts belong to the high-stroke interval after the start.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalBounds {
    /// `start < strokes < start + window`
    #[default]
    Exclusive,
    /// `start + 1 <= strokes <= start + window`
    Inclusive,
}

impl IntervalBounds {
    fn contains(self, strokes: u32, start: u32, window: u32) -> bool {
        match self {
            IntervalBounds::Exclusive => strokes > start && strokes < start.saturating_add(window),
            IntervalBounds::Inclusive => strokes > start && strokes <= start.saturating_add(window),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpeedExtremes {
    pub max_speed: f64,
    /// Every distance where the maximum speed occurs.
    pub fastest: Vec<f64>,
    pub min_speed: f64,
    pub slowest: Vec<f64>,
}

fn split_label(pace_s: i64) -> String {
    let minutes = pace_s.div_euclid(60);
    format!("{}:{:02}", minutes, pace_s - 60 * minutes)
}

/// Split paces bracketing `max_speed`/`min_speed`, rounded outwards to
/// multiples of `step_s`. `None` when a pace is not a finite whole number of
/// seconds that fits an `i64`.
pub fn pace_limits(max_speed: f64, min_speed: f64, settings: &PaceSettings) -> Option<(i64, i64)> {
    let step = settings.step_s as f64;
    let fastest = step * ((settings.reference_m / max_speed) / step).floor();
    let slowest = step * ((settings.reference_m / min_speed) / step).ceil();
    let in_range = |v: f64| v.is_finite() && v.abs() < i64::MAX as f64 / 2.0;
    (in_range(fastest) && in_range(slowest)).then(|| (fastest as i64, slowest as i64))
}

pub fn pace_lines_between(max_speed: f64, min_speed: f64, settings: &PaceSettings) -> Vec<PaceLine> {
    if settings.step_s <= 0 || !(max_speed > 0.0) || !(min_speed > 0.0) {
        return Vec::new();
    }
    let Some((limit_max, limit_min)) = pace_limits(max_speed, min_speed, settings) else {
        warn!("pace range for {max_speed} - {min_speed} m/s is out of range, no split lines");
        return Vec::new();
    };
    // a zero split has no speed
    let limit_max = limit_max.max(settings.step_s);
    if limit_max > limit_min {
        return Vec::new();
    }
    let count = (limit_min - limit_max) / settings.step_s + 1;
    if count as u64 > settings.max_lines as u64 {
        warn!(
            "{} split lines between {} and {} exceed the limit of {}, skipping",
            count,
            split_label(limit_max),
            split_label(limit_min),
            settings.max_lines
        );
        return Vec::new();
    }
    let mut lines = Vec::with_capacity(count as usize);
    let mut current = Some(limit_max);
    while let Some(pace) = current.filter(|&p| p <= limit_min) {
        lines.push(PaceLine {
            label: split_label(pace),
            pace_s: pace,
            speed: settings.reference_m / pace as f64,
        });
        current = pace.checked_add(settings.step_s);
    }
    lines
}

/// Threshold lines from the frame's speed range. Only samples past the
/// settings' stroke floor with a positive speed count towards the range.
pub fn pace_thresholds(frame: &RaceFrame, settings: &PaceSettings) -> Vec<PaceLine> {
    let speeds = frame
        .records()
        .iter()
        .filter(|r| r.total_strokes > settings.stroke_floor && r.speed_mps > 0.0)
        .map(|r| OrderedFloat(r.speed_mps));
    let (Some(max), Some(min)) = (speeds.clone().max(), speeds.min()) else {
        return Vec::new();
    };
    pace_lines_between(max.0, min.0, settings)
}

/// `(q/4) * max distance` for q in 0..=4.
pub fn quarter_boundaries(frame: &RaceFrame) -> [f64; 5] {
    let max = frame.max_distance().unwrap_or(0.0);
    [0.0, 0.25 * max, 0.5 * max, 0.75 * max, max]
}

/// Distances of the first and last sample inside the high-stroke window.
pub fn high_stroke_interval(
    frame: &RaceFrame,
    start: u32,
    window: u32,
    bounds: IntervalBounds,
) -> Result<(f64, f64), RaceError> {
    let mut inside = frame
        .records()
        .iter()
        .filter(|r| bounds.contains(r.total_strokes, start, window))
        .map(|r| r.distance_m);
    let first = inside.next().ok_or(RaceError::EmptyInterval {
        lower: start,
        upper: start.saturating_add(window),
    })?;
    let last = inside.last().unwrap_or(first);
    Ok((first, last))
}

pub fn speed_extremes(frame: &RaceFrame) -> Result<SpeedExtremes, RaceError> {
    let records = frame.records();
    let speeds = records.iter().map(|r| OrderedFloat(r.speed_mps));
    let (Some(max), Some(min)) = (speeds.clone().max(), speeds.min()) else {
        return Err(RaceError::EmptyFrame(frame.race().to_string()));
    };
    let at = |speed: f64| {
        records
            .iter()
            .filter(|r| r.speed_mps == speed)
            .map(|r| r.distance_m)
            .collect::<Vec<_>>()
    };
    Ok(SpeedExtremes {
        max_speed: max.0,
        fastest: at(max.0),
        min_speed: min.0,
        slowest: at(min.0),
    })
}

/// Start band, quarter boundaries and speed extremes of the breakdown overlay.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RaceBreakdown {
    pub quarters: [f64; 5],
    pub high_strokes: (f64, f64),
    pub extremes: SpeedExtremes,
}

impl RaceBreakdown {
    pub fn compute(frame: &RaceFrame, config: &DashboardConfig) -> Result<Self, RaceError> {
        Ok(Self {
            quarters: quarter_boundaries(frame),
            high_strokes: high_stroke_interval(
                frame,
                config.stroke_threshold,
                config.high_stroke_window,
                config.interval_bounds,
            )?,
            extremes: speed_extremes(frame)?,
        })
    }
}

/// Overlay geometry of one (already stroke-filtered) race frame. Only the
/// parts the requested overlays draw are computed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DerivedGeometry {
    pub pace_lines: Vec<PaceLine>,
    pub breakdown: Option<RaceBreakdown>,
}

impl DerivedGeometry {
    pub fn compute(
        frame: &RaceFrame,
        overlays: Overlays,
        config: &DashboardConfig,
    ) -> Result<Self, RaceError> {
        let pace_lines = if overlays.split_lines {
            pace_thresholds(frame, &config.pace)
        } else {
            Vec::new()
        };
        let breakdown = if overlays.breakdown {
            Some(RaceBreakdown::compute(frame, config)?)
        } else {
            None
        };
        Ok(Self {
            pace_lines,
            breakdown,
        })
    }
}
