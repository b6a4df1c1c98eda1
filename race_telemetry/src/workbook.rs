//! Workbook loading: one worksheet per race.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RaceError;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// Where the header row and first data row sit in a race worksheet
/// (0-based sheet rows). The offsets are fixed per export format.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetLayout {
    pub header_row: u32,
    pub data_start_row: u32,
}

impl SheetLayout {
    /// Header on the first row, data immediately below.
    pub const STANDARD: SheetLayout = SheetLayout {
        header_row: 0,
        data_start_row: 1,
    };

    /// SpeedCoach-style session export: header on sheet row 29, followed by a
    /// units row and a blank row before the samples.
    pub const SPEEDCOACH: SheetLayout = SheetLayout {
        header_row: 28,
        data_start_row: 31,
    };

    pub fn validate(&self) -> Result<(), RaceError> {
        if self.data_start_row <= self.header_row {
            return Err(RaceError::InvalidParameter(format!(
                "data start row {} must come after header row {}",
                self.data_start_row, self.header_row
            )));
        }
        Ok(())
    }
}

impl Default for SheetLayout {
    fn default() -> Self {
        SheetLayout::STANDARD
    }
}

/// A single worksheet cell, reduced to the kinds the cleaner distinguishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Time(NaiveTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Cell::Empty => "an empty cell".to_string(),
            Cell::Number(v) => format!("number {v}"),
            Cell::Text(s) => format!("text '{s}'"),
            Cell::Bool(b) => format!("boolean {b}"),
            Cell::Time(t) => format!("time {t}"),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty => Cell::Empty,
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Float(v) => Cell::Number(*v),
            Data::Bool(b) => Cell::Bool(*b),
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::DateTime(dt) => {
                let serial = dt.as_f64();
                time_from_day_fraction(serial)
                    .map(Cell::Time)
                    .unwrap_or(Cell::Number(serial))
            }
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(err) => Cell::Text(err.to_string()),
        }
    }
}

/// Time of day carried by the fractional part of an Excel serial date.
pub fn time_from_day_fraction(serial: f64) -> Option<NaiveTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let micros = (serial.fract() * MICROS_PER_DAY).round() as u64 % MICROS_PER_DAY as u64;
    let secs = (micros / 1_000_000) as u32;
    let nanos = ((micros % 1_000_000) * 1_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

/// Raw header row plus data rows of one race worksheet.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTable {
    pub race: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn column(&self, idx: usize) -> Vec<Cell> {
        self.rows
            .iter()
            .map(|row| row.get(idx).cloned().unwrap_or(Cell::Empty))
            .collect()
    }
}

/// An opened workbook. All worksheets are read eagerly so the handle can be
/// kept for the whole session without holding the file open.
#[derive(Clone, Debug)]
pub struct Workbook {
    source: String,
    sheets: Vec<(String, Range<Data>)>,
}

impl Workbook {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RaceError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RaceError::FileNotFound(path.to_path_buf()));
        }
        let sheets = open_workbook_auto(path)
            .map_err(|e| RaceError::InvalidFormat(format!("{}: {}", path.display(), e)))?;
        Self::read_sheets(sheets, path.display().to_string())
    }

    /// Open an in-memory workbook (e.g. an uploaded file). The format is
    /// detected from the content.
    pub fn from_bytes(bytes: Vec<u8>, name: &str) -> Result<Self, RaceError> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| RaceError::InvalidFormat(format!("{name}: {e}")))?;
        Self::read_sheets(sheets, name.to_string())
    }

    fn read_sheets<RS: Read + Seek>(
        mut sheets: Sheets<RS>,
        source: String,
    ) -> Result<Self, RaceError> {
        let names = sheets.sheet_names();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let range = sheets
                .worksheet_range(&name)
                .map_err(|e| RaceError::InvalidFormat(format!("{source} [{name}]: {e}")))?;
            out.push((name, range));
        }
        debug!("opened {} with {} worksheets", source, out.len());
        Ok(Self {
            source,
            sheets: out,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn race_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Raw cell grid of one race using the given header/data offsets.
    /// Rows with no content at all are skipped.
    pub fn load_raw_table(&self, race: &str, layout: SheetLayout) -> Result<RawTable, RaceError> {
        layout.validate()?;
        let range = self
            .sheets
            .iter()
            .find(|(name, _)| name == race)
            .map(|(_, range)| range)
            .ok_or_else(|| RaceError::UnknownRace(race.to_string()))?;

        let Some((last_row, last_col)) = range.end() else {
            return Ok(RawTable {
                race: race.to_string(),
                headers: Vec::new(),
                rows: Vec::new(),
            });
        };
        let width = last_col as usize + 1;
        let cell_at = |row: u32, col: usize| -> Cell {
            range
                .get_value((row, col as u32))
                .map(Cell::from)
                .unwrap_or(Cell::Empty)
        };

        let headers = (0..width)
            .map(|col| match cell_at(layout.header_row, col) {
                Cell::Text(s) => s,
                Cell::Number(v) => format!("{v}"),
                Cell::Empty => format!("column_{col}"),
                other => other.describe(),
            })
            .collect();

        let mut rows = Vec::new();
        if layout.data_start_row <= last_row {
            for row in layout.data_start_row..=last_row {
                let cells: Vec<Cell> = (0..width).map(|col| cell_at(row, col)).collect();
                if cells.iter().all(Cell::is_empty) {
                    continue;
                }
                rows.push(cells);
            }
        }

        Ok(RawTable {
            race: race.to_string(),
            headers,
            rows,
        })
    }
}

/// Worksheet names of the workbook at `path`, one per race.
pub fn list_races(path: impl AsRef<Path>) -> Result<Vec<String>, RaceError> {
    Ok(Workbook::open(path)?.race_names())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_fraction_to_time() {
        // 00:01:52.5 as a fraction of a day
        let serial = 112.5 / 86_400.0;
        let t = time_from_day_fraction(serial).unwrap();
        assert_eq!(t, NaiveTime::from_hms_milli_opt(0, 1, 52, 500).unwrap());
    }

    #[test]
    fn date_part_is_ignored() {
        let serial = 45_000.0 + 0.5;
        let t = time_from_day_fraction(serial).unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn negative_serial_is_not_a_time() {
        assert!(time_from_day_fraction(-1.0).is_none());
        assert!(time_from_day_fraction(f64::NAN).is_none());
    }

    #[test]
    fn blank_strings_become_empty_cells() {
        assert_eq!(Cell::from(&Data::String("  ".into())), Cell::Empty);
        assert_eq!(Cell::from(&Data::Int(7)), Cell::Number(7.0));
    }

    #[test]
    fn layout_requires_data_after_header() {
        let bad = SheetLayout {
            header_row: 3,
            data_start_row: 3,
        };
        assert!(bad.validate().is_err());
        assert!(SheetLayout::SPEEDCOACH.validate().is_ok());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Workbook::open("/definitely/not/here.xlsx").unwrap_err();
        assert!(matches!(err, RaceError::FileNotFound(_)));
    }

    #[test]
    fn garbage_bytes_are_invalid_format() {
        let err = Workbook::from_bytes(b"not a workbook".to_vec(), "upload.xlsx").unwrap_err();
        assert!(matches!(err, RaceError::InvalidFormat(_)));
    }
}
