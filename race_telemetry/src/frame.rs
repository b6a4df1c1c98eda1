//! Frame cleaning: canonical headers, numeric coercion, derived time columns
//! and typed race records.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::workbook::{Cell, RawTable};
use crate::RaceError;

/// Canonical column names after header normalisation.
pub mod columns {
    pub const DISTANCE: &str = "distance_gps";
    pub const SPEED: &str = "speed_gps";
    pub const STROKE_RATE: &str = "stroke_rate";
    pub const ELAPSED_TIME: &str = "elapsed_time";
    pub const SPLIT: &str = "split_gps";
    pub const TOTAL_STROKES: &str = "total_strokes";
    pub const DISTANCE_PER_STROKE: &str = "distance_per_stroke_gps";
    pub const HEART_RATE: &str = "heart_rate";
    pub const LAT: &str = "gps_lat";
    pub const LON: &str = "gps_lon";
    pub const ELAPSED_SECONDS: &str = "elapsed_time_sec";
    pub const SPLIT_SECONDS: &str = "split_sec";
}

/// Lower-case, spaces to underscores, drop `(`, `)` and `.`, `/` to `_per_`.
pub fn normalize_header(raw: &str) -> String {
    raw.to_lowercase()
        .replace(' ', "_")
        .replace(['(', ')', '.'], "")
        .replace('/', "_per_")
}

pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    raw.iter().map(|h| normalize_header(h)).collect()
}

#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    /// Left as read when numeric conversion did not apply.
    Raw(Vec<Cell>),
}

impl Column {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Raw(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cell_to_number(cell: &Cell) -> Result<Option<f64>, ()> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(v) => Ok(v.is_finite().then_some(*v)),
        Cell::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(|v| v.is_finite().then_some(v))
            .map_err(|_| ()),
        Cell::Bool(_) | Cell::Time(_) => Err(()),
    }
}

/// Convert a column to numbers. Fails (softly) when any cell is not numeric
/// or the column holds no values at all.
pub fn coerce_numeric(name: &str, cells: &[Cell]) -> Result<Vec<Option<f64>>, RaceError> {
    let values = cells
        .iter()
        .map(cell_to_number)
        .collect::<Result<Vec<_>, ()>>()
        .map_err(|_| RaceError::NonNumericColumn(name.to_string()))?;
    if values.iter().all(Option::is_none) {
        return Err(RaceError::NonNumericColumn(name.to_string()));
    }
    Ok(values)
}

/// `hour*3600 + minute*60 + second + microsecond*1e-6`.
pub fn time_of_day_seconds(t: NaiveTime) -> f64 {
    let micros = (t.nanosecond() % 1_000_000_000) / 1_000;
    t.hour() as f64 * 3600.0 + t.minute() as f64 * 60.0 + t.second() as f64 + micros as f64 * 1e-6
}

fn parse_time_text(text: &str) -> Option<NaiveTime> {
    let trimmed = text.trim();
    let padded = match trimmed.matches(':').count() {
        1 => format!("00:{trimmed}"),
        2 => trimmed.to_string(),
        _ => {
            return NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.time())
        }
    };
    NaiveTime::parse_from_str(&padded, "%H:%M:%S%.f").ok()
}

/// Seconds since midnight of a time-of-day cell.
pub fn derive_time_seconds(column: &str, row: usize, cell: &Cell) -> Result<f64, RaceError> {
    let time = match cell {
        Cell::Time(t) => Some(*t),
        Cell::Text(s) => parse_time_text(s),
        _ => None,
    };
    time.map(time_of_day_seconds)
        .ok_or_else(|| RaceError::MalformedTime {
            column: column.to_string(),
            row,
            found: cell.describe(),
        })
}

fn derive_time_column(
    columns: &[(String, Column)],
    source: &str,
) -> Result<Vec<Option<f64>>, RaceError> {
    let column = columns
        .iter()
        .find(|(name, _)| name == source)
        .map(|(_, col)| col)
        .ok_or_else(|| RaceError::MissingColumn(source.to_string()))?;
    match column {
        Column::Raw(cells) => cells
            .iter()
            .enumerate()
            .map(|(row, cell)| derive_time_seconds(source, row, cell).map(Some))
            .collect(),
        Column::Numeric(values) => {
            let found = values
                .first()
                .copied()
                .flatten()
                .map_or_else(|| "an empty cell".to_string(), |v| format!("number {v}"));
            Err(RaceError::MalformedTime {
                column: source.to_string(),
                row: 0,
                found,
            })
        }
    }
}

/// Cleaned worksheet: canonical column names, numeric columns converted and
/// the derived `elapsed_time_sec` / `split_sec` columns appended.
#[derive(Clone, Debug, PartialEq)]
pub struct CleanTable {
    pub race: String,
    columns: Vec<(String, Column)>,
    rows: usize,
}

impl CleanTable {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, col)| col)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Columns that stayed unconverted.
    pub fn non_numeric(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, col)| !col.is_numeric())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    fn numeric(&self, name: &str) -> Result<&[Option<f64>], RaceError> {
        match self.column(name) {
            Some(Column::Numeric(values)) => Ok(values),
            Some(Column::Raw(_)) => Err(RaceError::NonNumericColumn(name.to_string())),
            None => Err(RaceError::MissingColumn(name.to_string())),
        }
    }

    fn optional_numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name) {
            Some(Column::Numeric(values)) => Some(values),
            Some(Column::Raw(_)) => {
                warn!("race '{}': optional column '{}' is not numeric, ignoring", self.race, name);
                None
            }
            None => None,
        }
    }
}

pub fn clean_table(raw: RawTable) -> Result<CleanTable, RaceError> {
    let names = normalize_headers(&raw.headers);
    let rows = raw.rows.len();
    let mut columns: Vec<(String, Column)> = Vec::with_capacity(names.len() + 2);
    for (idx, name) in names.into_iter().enumerate() {
        let cells = raw.column(idx);
        let column = match coerce_numeric(&name, &cells) {
            Ok(values) => Column::Numeric(values),
            Err(err) => {
                debug!("race '{}': {}, keeping raw values", raw.race, err);
                Column::Raw(cells)
            }
        };
        columns.push((name, column));
    }

    let elapsed = derive_time_column(&columns, columns::ELAPSED_TIME)?;
    let split = derive_time_column(&columns, columns::SPLIT)?;
    columns.push((columns::ELAPSED_SECONDS.to_string(), Column::Numeric(elapsed)));
    columns.push((columns::SPLIT_SECONDS.to_string(), Column::Numeric(split)));

    let unconverted: Vec<&str> = columns
        .iter()
        .filter(|(name, col)| {
            !col.is_numeric() && name != columns::ELAPSED_TIME && name != columns::SPLIT
        })
        .map(|(name, _)| name.as_str())
        .collect();
    if !unconverted.is_empty() {
        warn!(
            "race '{}': non-numeric columns left unconverted: {}",
            raw.race,
            unconverted.join(", ")
        );
    }

    Ok(CleanTable {
        race: raw.race,
        columns,
        rows,
    })
}

/// One telemetry sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub distance_m: f64,
    pub speed_mps: f64,
    pub stroke_rate: f64,
    pub elapsed_s: f64,
    pub split_s: f64,
    pub total_strokes: u32,
    pub distance_per_stroke_m: f64,
    pub heart_rate: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Ordered samples of a single race.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceFrame {
    race: String,
    records: Vec<RaceRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceSummary {
    pub race: String,
    pub samples: usize,
    pub distance_m: f64,
    pub elapsed_s: f64,
    pub mean_speed_mps: f64,
    pub mean_stroke_rate: f64,
    pub mean_heart_rate: Option<f64>,
    pub average_split_s: Option<f64>,
    pub total_strokes: u32,
}

impl RaceFrame {
    /// Build a frame, checking that distance, elapsed time and stroke count
    /// never decrease.
    pub fn from_records(race: impl Into<String>, records: Vec<RaceRecord>) -> Result<Self, RaceError> {
        for (row, pair) in records.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let column = if next.distance_m < prev.distance_m {
                Some(columns::DISTANCE)
            } else if next.elapsed_s < prev.elapsed_s {
                Some(columns::ELAPSED_SECONDS)
            } else if next.total_strokes < prev.total_strokes {
                Some(columns::TOTAL_STROKES)
            } else {
                None
            };
            if let Some(column) = column {
                return Err(RaceError::NonMonotonic {
                    column: column.to_string(),
                    row: row + 1,
                });
            }
        }
        Ok(Self {
            race: race.into(),
            records,
        })
    }

    pub fn from_table(table: &CleanTable) -> Result<Self, RaceError> {
        let distance = table.numeric(columns::DISTANCE)?;
        let speed = table.numeric(columns::SPEED)?;
        let rate = table.numeric(columns::STROKE_RATE)?;
        let elapsed = table.numeric(columns::ELAPSED_SECONDS)?;
        let split = table.numeric(columns::SPLIT_SECONDS)?;
        let strokes = table.numeric(columns::TOTAL_STROKES)?;
        let dps = table.numeric(columns::DISTANCE_PER_STROKE)?;
        let heart_rate = table.optional_numeric(columns::HEART_RATE);
        let lat = table.optional_numeric(columns::LAT);
        let lon = table.optional_numeric(columns::LON);

        let required = |values: &[Option<f64>], name: &str, row: usize| -> Result<f64, RaceError> {
            values
                .get(row)
                .copied()
                .flatten()
                .ok_or_else(|| RaceError::MissingValue {
                    column: name.to_string(),
                    row,
                })
        };
        let optional = |values: Option<&[Option<f64>]>, row: usize| -> Option<f64> {
            values.and_then(|v| v.get(row).copied().flatten())
        };

        let mut records = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let total_strokes = required(strokes, columns::TOTAL_STROKES, row)?;
            if total_strokes < 0.0 {
                return Err(RaceError::InvalidParameter(format!(
                    "row {row}: negative stroke count {total_strokes}"
                )));
            }
            records.push(RaceRecord {
                distance_m: required(distance, columns::DISTANCE, row)?,
                speed_mps: required(speed, columns::SPEED, row)?,
                stroke_rate: required(rate, columns::STROKE_RATE, row)?,
                elapsed_s: required(elapsed, columns::ELAPSED_SECONDS, row)?,
                split_s: required(split, columns::SPLIT_SECONDS, row)?,
                total_strokes: total_strokes.round() as u32,
                distance_per_stroke_m: required(dps, columns::DISTANCE_PER_STROKE, row)?,
                heart_rate: optional(heart_rate, row),
                lat: optional(lat, row),
                lon: optional(lon, row),
            });
        }
        Self::from_records(table.race.clone(), records)
    }

    pub fn race(&self) -> &str {
        &self.race
    }

    pub fn records(&self) -> &[RaceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Independent copy without the starting strokes
    /// (`total_strokes <= threshold`). Threshold 0 keeps everything.
    pub fn filter_strokes(&self, threshold: u32) -> RaceFrame {
        if threshold == 0 {
            return self.clone();
        }
        RaceFrame {
            race: self.race.clone(),
            records: self
                .records
                .iter()
                .filter(|r| r.total_strokes > threshold)
                .cloned()
                .collect(),
        }
    }

    pub fn max_distance(&self) -> Option<f64> {
        self.records.iter().map(|r| r.distance_m).reduce(f64::max)
    }

    pub fn has_coordinates(&self) -> bool {
        self.records.iter().any(|r| r.lat.is_some() && r.lon.is_some())
    }

    /// Totals and means of the frame; the average split is per `reference_m`.
    pub fn summary(&self, reference_m: f64) -> Result<RaceSummary, RaceError> {
        let last = self
            .records
            .last()
            .ok_or_else(|| RaceError::EmptyFrame(self.race.clone()))?;
        let n = self.records.len() as f64;
        let mean = |f: fn(&RaceRecord) -> f64| self.records.iter().map(f).sum::<f64>() / n;
        let heart: Vec<f64> = self.records.iter().filter_map(|r| r.heart_rate).collect();
        Ok(RaceSummary {
            race: self.race.clone(),
            samples: self.records.len(),
            distance_m: last.distance_m,
            elapsed_s: last.elapsed_s,
            mean_speed_mps: mean(|r| r.speed_mps),
            mean_stroke_rate: mean(|r| r.stroke_rate),
            mean_heart_rate: (!heart.is_empty())
                .then(|| heart.iter().sum::<f64>() / heart.len() as f64),
            average_split_s: (last.distance_m > 0.0)
                .then(|| last.elapsed_s * reference_m / last.distance_m),
            total_strokes: last.total_strokes,
        })
    }
}

/// `M:SS.s`, or `H:MM:SS.s` past the hour.
pub fn format_clock(seconds: f64) -> String {
    let s = if seconds.is_finite() && seconds >= 0.0 { seconds } else { 0.0 };
    let tenths = (s * 10.0).round() as u64;
    let (whole, frac) = (tenths / 10, tenths % 10);
    let (h, m, sec) = (whole / 3600, (whole % 3600) / 60, whole % 60);
    if h > 0 {
        format!("{h}:{m:02}:{sec:02}.{frac}")
    } else {
        format!("{m}:{sec:02}.{frac}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn record(distance_m: f64, speed_mps: f64, total_strokes: u32) -> RaceRecord {
        RaceRecord {
            distance_m,
            speed_mps,
            stroke_rate: 30.0,
            elapsed_s: distance_m / 4.0,
            split_s: 125.0,
            total_strokes,
            distance_per_stroke_m: 8.0,
            heart_rate: None,
            lat: None,
            lon: None,
        }
    }

    fn raw(headers: &[&str], rows: Vec<Vec<Cell>>) -> RawTable {
        RawTable {
            race: "Heat 1".into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    fn t(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    #[test]
    fn normalizes_speedcoach_headers() {
        assert_eq!(normalize_header("Distance (GPS)"), "distance_gps");
        assert_eq!(normalize_header("Speed (GPS)"), "speed_gps");
        assert_eq!(normalize_header("Stroke Rate"), "stroke_rate");
        assert_eq!(normalize_header("Distance/Stroke (GPS)"), "distance_per_stroke_gps");
        assert_eq!(normalize_header("GPS Lat."), "gps_lat");
        assert_eq!(normalize_header("Split (GPS)"), "split_gps");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in ".{0,40}") {
            let once = normalize_header(&raw);
            prop_assert_eq!(normalize_header(&once), once);
        }
    }

    #[test]
    fn time_of_day_boundaries() {
        let midnight = NaiveTime::from_hms_micro_opt(0, 0, 0, 0).unwrap();
        assert_eq!(time_of_day_seconds(midnight), 0.0);
        let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap();
        assert!((time_of_day_seconds(last) - 86_399.999_999).abs() < 1e-9);
    }

    #[test]
    fn text_times_are_accepted() {
        let secs = derive_time_seconds("split_gps", 0, &t("1:52.5")).unwrap();
        assert!((secs - 112.5).abs() < 1e-9);
        let secs = derive_time_seconds("elapsed_time", 0, &t("00:07:01.2")).unwrap();
        assert!((secs - 421.2).abs() < 1e-9);
    }

    #[test]
    fn null_time_is_malformed() {
        let err = derive_time_seconds("elapsed_time", 4, &Cell::Empty).unwrap_err();
        assert_eq!(
            err,
            RaceError::MalformedTime {
                column: "elapsed_time".into(),
                row: 4,
                found: "an empty cell".into(),
            }
        );
        assert!(derive_time_seconds("elapsed_time", 0, &Cell::Number(3.0)).is_err());
    }

    #[test]
    fn coercion_fails_softly() {
        let cells = vec![Cell::Number(1.0), t("2.5"), Cell::Empty];
        assert_eq!(
            coerce_numeric("x", &cells).unwrap(),
            vec![Some(1.0), Some(2.5), None]
        );
        assert!(coerce_numeric("x", &[t("abc"), Cell::Number(1.0)]).is_err());
        assert!(coerce_numeric("x", &[Cell::Empty, Cell::Empty]).is_err());
    }

    fn speedcoach_rows() -> Vec<Vec<Cell>> {
        (0..4)
            .map(|i| {
                let i = i as f64;
                vec![
                    Cell::Number(i * 10.0),
                    Cell::Number(4.0 + i * 0.1),
                    Cell::Number(32.0),
                    t(&format!("00:00:{:02}.0", 3 * i as u32)),
                    t("0:02:05.0"),
                    Cell::Number(i + 1.0),
                    Cell::Number(7.5),
                    t("n/a"),
                ]
            })
            .collect()
    }

    const HEADERS: [&str; 8] = [
        "Distance (GPS)",
        "Speed (GPS)",
        "Stroke Rate",
        "Elapsed Time",
        "Split (GPS)",
        "Total Strokes",
        "Distance/Stroke (GPS)",
        "Heart Rate",
    ];

    #[test]
    fn cleans_table_and_derives_seconds() {
        let table = clean_table(raw(&HEADERS, speedcoach_rows())).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.column(columns::ELAPSED_SECONDS),
            Some(&Column::Numeric(vec![Some(0.0), Some(3.0), Some(6.0), Some(9.0)]))
        );
        assert_eq!(
            table.column(columns::SPLIT_SECONDS),
            Some(&Column::Numeric(vec![Some(125.0); 4]))
        );
        assert!(table.non_numeric().contains(&"heart_rate"));

        let frame = RaceFrame::from_table(&table).unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.records()[2].total_strokes, 3);
        assert_eq!(frame.records()[2].heart_rate, None);
        assert_eq!(frame.max_distance(), Some(30.0));
    }

    #[test]
    fn missing_split_column_is_reported() {
        let headers = ["Distance (GPS)", "Elapsed Time"];
        let rows = vec![vec![Cell::Number(0.0), t("0:00:01.0")]];
        let err = clean_table(raw(&headers, rows)).unwrap_err();
        assert_eq!(err, RaceError::MissingColumn("split_gps".into()));
    }

    #[test]
    fn decreasing_distance_is_rejected() {
        let err = RaceFrame::from_records(
            "Heat 1",
            vec![record(10.0, 4.0, 1), record(5.0, 4.0, 2)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RaceError::NonMonotonic {
                column: "distance_gps".into(),
                row: 1
            }
        );
    }

    #[test]
    fn stroke_filter_drops_starting_strokes() {
        let frame = RaceFrame::from_records(
            "Heat 1",
            (1..=8).map(|n| record(n as f64 * 10.0, 4.0, n)).collect(),
        )
        .unwrap();
        let filtered = frame.filter_strokes(5);
        assert_eq!(filtered.len(), 3);
        assert!(filtered.records().iter().all(|r| r.total_strokes > 5));
        assert_eq!(frame.filter_strokes(0), frame);
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn summary_of_frame() {
        let frame = RaceFrame::from_records(
            "Heat 1",
            vec![record(0.0, 4.0, 1), record(500.0, 5.0, 50)],
        )
        .unwrap();
        let summary = frame.summary(500.0).unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.distance_m, 500.0);
        assert!((summary.mean_speed_mps - 4.5).abs() < 1e-12);
        assert_eq!(summary.average_split_s, Some(125.0));
        assert_eq!(summary.mean_heart_rate, None);

        assert_eq!(frame.summary(1000.0).unwrap().average_split_s, Some(250.0));
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(112.54), "1:52.5");
        assert_eq!(format_clock(3725.0), "1:02:05.0");
        assert_eq!(format_clock(-3.0), "0:00.0");
    }
}
