use std::path::{Path, PathBuf};

use race_telemetry::{
    build_dashboard, list_races, load_race, ChartKind, DashboardConfig, DashboardRequest,
    Overlays, RaceError, SheetLayout, Workbook,
};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook as XlsxWorkbook, Worksheet, XlsxError};
use tempfile::TempDir;

const HEADERS: [&str; 10] = [
    "Distance (GPS)",
    "Speed (GPS)",
    "Stroke Rate",
    "Elapsed Time",
    "Split (GPS)",
    "Total Strokes",
    "Distance/Stroke (GPS)",
    "Heart Rate",
    "GPS Lat.",
    "GPS Lon.",
];

fn clock(total: f64) -> String {
    let minutes = (total / 60.0).floor();
    format!("00:{:02}:{:04.1}", minutes as u32, total - minutes * 60.0)
}

/// 40 strokes over ~400 m, header on `header_row`, samples from `data_row`.
fn write_race(ws: &mut Worksheet, header_row: u32, data_row: u32) -> Result<(), XlsxError> {
    for (col, name) in HEADERS.iter().enumerate() {
        ws.write_string(header_row, col as u16, *name)?;
    }
    for i in 0..40u32 {
        let row = data_row + i;
        let stroke = i + 1;
        let speed = if stroke == 20 { 5.0 } else { 4.0 + (stroke % 4) as f64 * 0.1 };
        let elapsed = stroke as f64 * 2.5;
        ws.write_number(row, 0, stroke as f64 * 10.0)?;
        ws.write_number(row, 1, speed)?;
        ws.write_number(row, 2, 34.0 - (stroke % 3) as f64)?;
        ws.write_string(row, 3, clock(elapsed))?;
        ws.write_string(row, 4, clock(500.0 / speed))?;
        ws.write_number(row, 5, stroke as f64)?;
        ws.write_number(row, 6, 10.0)?;
        ws.write_number(row, 7, 150.0 + stroke as f64)?;
        ws.write_number(row, 8, 51.0 + stroke as f64 * 1e-4)?;
        ws.write_number(row, 9, -0.2)?;
    }
    Ok(())
}

fn write_workbook(dir: &Path) -> PathBuf {
    let path = dir.join("regatta.xlsx");
    let mut wb = XlsxWorkbook::new();
    {
        let ws = wb.add_worksheet();
        ws.set_name("Heat 1").unwrap();
        write_race(ws, 0, 1).unwrap();
    }
    {
        let ws = wb.add_worksheet();
        ws.set_name("Final").unwrap();
        ws.write_string(0, 0, "Session export").unwrap();
        write_race(ws, 28, 31).unwrap();
        ws.write_string(29, 0, "(m)").unwrap();
    }
    wb.save(&path).unwrap();
    path
}

#[test]
fn lists_races_in_sheet_order() {
    let dir = TempDir::new().unwrap();
    let path = write_workbook(dir.path());
    assert_eq!(list_races(&path).unwrap(), vec!["Heat 1", "Final"]);
}

#[test]
fn unknown_race_and_bad_files() {
    let dir = TempDir::new().unwrap();
    let path = write_workbook(dir.path());
    let wb = Workbook::open(&path).unwrap();
    assert_eq!(
        wb.load_raw_table("Repechage", SheetLayout::STANDARD).unwrap_err(),
        RaceError::UnknownRace("Repechage".into())
    );

    let missing = dir.path().join("missing.xlsx");
    assert_eq!(
        Workbook::open(&missing).unwrap_err(),
        RaceError::FileNotFound(missing.clone())
    );

    let text = dir.path().join("notes.txt");
    std::fs::write(&text, "distance,speed\n").unwrap();
    assert!(matches!(Workbook::open(&text), Err(RaceError::InvalidFormat(_))));
}

#[test]
fn full_pipeline_on_standard_layout() {
    let dir = TempDir::new().unwrap();
    let path = write_workbook(dir.path());
    let wb = Workbook::open(&path).unwrap();
    let cfg = DashboardConfig::default();

    let frame = load_race(&wb, "Heat 1", &cfg).unwrap();
    assert_eq!(frame.len(), 40);
    assert_eq!(frame.records()[0].heart_rate, Some(151.0));
    assert!((frame.records()[3].elapsed_s - 10.0).abs() < 1e-9);

    let request = DashboardRequest {
        race: "Heat 1".into(),
        show_start: false,
        overlays: Overlays {
            split_lines: true,
            breakdown: true,
        },
    };
    let dash = build_dashboard(&wb, &request, &cfg).unwrap();
    assert_eq!(dash.charts.len(), 4);
    assert_eq!(dash.charts[0].kind, ChartKind::SpeedStrokeRate);
    assert_eq!(dash.charts[0].data[0]["x"].as_array().unwrap().len(), 35);

    let geometry = dash.geometry.unwrap();
    assert!(!geometry.pace_lines.is_empty());
    let breakdown = geometry.breakdown.unwrap();
    assert_eq!(breakdown.quarters, [0.0, 100.0, 200.0, 300.0, 400.0]);
    assert_eq!(breakdown.high_strokes, (60.0, 90.0));
    assert_eq!(breakdown.extremes.fastest, vec![200.0]);

    let map = dash.course_map.unwrap();
    assert_eq!(map.data[0]["lat"].as_array().unwrap().len(), 40);
}

#[test]
fn speedcoach_layout_skips_units_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_workbook(dir.path());
    let wb = Workbook::open(&path).unwrap();
    let cfg = DashboardConfig {
        layout: SheetLayout::SPEEDCOACH,
        ..DashboardConfig::default()
    };
    let frame = load_race(&wb, "Final", &cfg).unwrap();
    assert_eq!(frame.len(), 40);
    assert_eq!(frame.records()[0].distance_m, 10.0);

    // The same sheet read with the wrong layout has no usable time columns.
    let err = load_race(&wb, "Final", &DashboardConfig::default()).unwrap_err();
    assert!(matches!(err, RaceError::MissingColumn(_)));
}

#[test]
fn excel_time_cells_are_time_of_day() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("times.xlsx");
    let mut wb = XlsxWorkbook::new();
    let time_format = Format::new().set_num_format("hh:mm:ss.0");
    {
        let ws = wb.add_worksheet();
        ws.set_name("Heat 1").unwrap();
        write_race(ws, 0, 1).unwrap();
        for stroke in 1..=40u32 {
            let elapsed = stroke as f64 * 2.5;
            let minutes = (elapsed / 60.0).floor();
            let cell = ExcelDateTime::from_hms(0, minutes as u8, elapsed - minutes * 60.0).unwrap();
            ws.write_datetime_with_format(stroke, 3, &cell, &time_format)
                .unwrap();
        }
    }
    wb.save(&path).unwrap();

    let wb = Workbook::open(&path).unwrap();
    let frame = load_race(&wb, "Heat 1", &DashboardConfig::default()).unwrap();
    assert!((frame.records()[1].elapsed_s - 5.0).abs() < 1e-3);
    assert!((frame.records()[39].elapsed_s - 100.0).abs() < 1e-3);
}
