use std::fs::{self, File};
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use race_telemetry::charts::x_axis_range;
use race_telemetry::frame::{columns, format_clock};
use race_telemetry::{
    clean_table, load_race, render_dashboard, Column, Dashboard, DashboardConfig,
    DashboardRequest, DerivedGeometry, IntervalBounds, Overlays, RaceFrame, SheetLayout,
    Workbook, XRange,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Parser, Debug)]
#[command(author, version, about = "Rowing race telemetry dashboards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the races (worksheets) of a workbook
    Races(RacesArgs),
    /// Show how one race worksheet is read and cleaned
    Inspect(InspectArgs),
    /// Build the dashboard for one or more races
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct RacesArgs {
    /// Workbook (.xlsx/.xls/.ods) to read
    #[arg(value_hint = ValueHint::FilePath)]
    workbook: PathBuf,

    /// Print the names as a JSON array
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Workbook (.xlsx/.xls/.ods) to read
    #[arg(value_hint = ValueHint::FilePath)]
    workbook: PathBuf,

    /// Dashboard configuration JSON; unspecified fields keep their defaults
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Worksheet layout (overrides the configuration file)
    #[arg(long, value_enum)]
    layout: Option<LayoutOpt>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Race (worksheet name) to inspect
    #[arg(long)]
    race: String,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Race (worksheet name) to render; may be repeated
    #[arg(long = "race", conflicts_with = "all_races")]
    races: Vec<String>,

    /// Render every race in the workbook
    #[arg(long, action = ArgAction::SetTrue)]
    all_races: bool,

    /// Output directory
    #[arg(short, long, default_value = "dashboards", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// Keep the starting strokes in every chart
    #[arg(long, action = ArgAction::SetTrue)]
    show_start: bool,

    /// Starting-stroke threshold (samples at or below it are dropped)
    #[arg(long)]
    threshold: Option<u32>,

    /// Width of the high-stroke interval after the start, in strokes
    #[arg(long)]
    window: Option<u32>,

    /// Include the upper stroke count in the high-stroke interval
    #[arg(long, action = ArgAction::SetTrue)]
    inclusive: bool,

    /// Race breakdown overlay (start band, quarters, fastest/slowest)
    #[arg(long, action = ArgAction::SetTrue)]
    breakdown: bool,

    /// Dashed split lines every 5 s of pace
    #[arg(long, action = ArgAction::SetTrue)]
    split_lines: bool,

    /// Fix the distance axis to 0..X metres
    #[arg(long)]
    x_max: Option<f64>,

    /// Also write an SVG figure
    #[arg(long, action = ArgAction::SetTrue)]
    svg: bool,

    /// Disable PNG/SVG generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Write the cleaned samples as CSV
    #[arg(long, action = ArgAction::SetTrue)]
    csv: bool,

    /// Profile load/render/write stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LayoutOpt {
    Standard,
    Speedcoach,
}

impl From<LayoutOpt> for SheetLayout {
    fn from(value: LayoutOpt) -> Self {
        match value {
            LayoutOpt::Standard => SheetLayout::STANDARD,
            LayoutOpt::Speedcoach => SheetLayout::SPEEDCOACH,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Races(_) => false,
        Command::Inspect(args) => args.source.verbose,
        Command::Render(args) => args.source.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Races(args) => handle_races(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Render(args) => handle_render(args),
    }
}

fn load_config(source: &SourceArgs) -> Result<DashboardConfig> {
    let mut config = match source.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => DashboardConfig::default(),
    };
    if let Some(layout) = source.layout {
        config.layout = layout.into();
    }
    Ok(config)
}

fn apply_render_overrides(config: &mut DashboardConfig, args: &RenderArgs) {
    if let Some(threshold) = args.threshold {
        config.stroke_threshold = threshold;
    }
    if let Some(window) = args.window {
        config.high_stroke_window = window;
    }
    if args.inclusive {
        config.interval_bounds = IntervalBounds::Inclusive;
    }
    if let Some(max) = args.x_max {
        config.x_range = XRange::Fixed { min: 0.0, max };
    }
}

fn open_workbook(path: &Path) -> Result<Workbook> {
    Workbook::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn handle_races(args: RacesArgs) -> Result<()> {
    let names = open_workbook(&args.workbook)?.race_names();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &names)?;
        writeln!(out)?;
    } else {
        for name in &names {
            writeln!(out, "{}", name)?;
        }
    }
    info!("{} races in {}", names.len(), args.workbook.display());
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let config = load_config(&args.source)?;
    config
        .validate()
        .context("invalid dashboard configuration")?;
    let workbook = open_workbook(&args.source.workbook)?;
    let raw = workbook
        .load_raw_table(&args.race, config.layout)
        .with_context(|| format!("failed to read race '{}'", args.race))?;
    let raw_rows = raw.rows.len();
    let table = clean_table(raw).with_context(|| format!("failed to clean race '{}'", args.race))?;

    let mut report = String::new();
    report.push_str(&format!("RACE: {}\n", args.race));
    report.push_str(&format!("  workbook: {}\n", workbook.source()));
    report.push_str(&format!("  rows: {}\n", raw_rows));
    report.push_str("  columns:\n");
    for name in table.column_names() {
        let line = match table.column(name) {
            Some(Column::Numeric(values)) => {
                let present: Vec<f64> = values.iter().flatten().copied().collect();
                let min = present.iter().copied().reduce(f64::min);
                let max = present.iter().copied().reduce(f64::max);
                format!(
                    "    - {}: numeric, count={}, min={}, max={}\n",
                    name,
                    present.len(),
                    min.map_or("n/a".into(), |v| format!("{:.3}", v)),
                    max.map_or("n/a".into(), |v| format!("{:.3}", v))
                )
            }
            Some(Column::Raw(cells)) => format!(
                "    - {}: raw, count={}\n",
                name,
                cells.iter().filter(|c| !c.is_empty()).count()
            ),
            None => continue,
        };
        report.push_str(&line);
    }

    let non_numeric = table.non_numeric();
    if !non_numeric.is_empty() {
        report.push_str(&format!("  non_numeric: {}\n", non_numeric.join(", ")));
    }

    let summary =
        RaceFrame::from_table(&table).and_then(|frame| frame.summary(config.pace.reference_m));
    match summary {
        Ok(summary) => {
            report.push_str("  summary:\n");
            report.push_str(&format!("    samples: {}\n", summary.samples));
            report.push_str(&format!("    distance_m: {:.1}\n", summary.distance_m));
            report.push_str(&format!("    elapsed: {}\n", format_clock(summary.elapsed_s)));
            report.push_str(&format!("    mean_speed_mps: {:.3}\n", summary.mean_speed_mps));
            report.push_str(&format!("    mean_stroke_rate: {:.1}\n", summary.mean_stroke_rate));
            if let Some(split) = summary.average_split_s {
                report.push_str(&format!("    average_split: {}\n", format_clock(split)));
            }
            if let Some(hr) = summary.mean_heart_rate {
                report.push_str(&format!("    mean_heart_rate: {:.0}\n", hr));
            }
            report.push_str(&format!("    total_strokes: {}\n", summary.total_strokes));
        }
        Err(err) => report.push_str(&format!("  frame_error: {}\n", err)),
    }

    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, &report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Inspection report written: {}", path.display());
        }
        None => io::stdout().lock().write_all(report.as_bytes())?,
    }
    Ok(())
}

fn handle_render(args: RenderArgs) -> Result<()> {
    let mut config = load_config(&args.source)?;
    apply_render_overrides(&mut config, &args);
    config
        .validate()
        .context("invalid dashboard configuration")?;

    let workbook = open_workbook(&args.source.workbook)?;
    let races = if args.all_races {
        workbook.race_names()
    } else if args.races.is_empty() {
        bail!("no race selected: pass --race NAME or --all-races");
    } else {
        args.races.clone()
    };
    if races.is_empty() {
        return Err(anyhow!("{} contains no races", workbook.source()));
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let overlays = Overlays {
        split_lines: args.split_lines,
        breakdown: args.breakdown,
    };
    let results: Vec<(String, Result<()>)> = races
        .par_iter()
        .map(|race| {
            let request = DashboardRequest {
                race: race.clone(),
                show_start: args.show_start,
                overlays,
            };
            (race.clone(), render_race(&workbook, &request, &config, &args))
        })
        .collect();

    let mut failed = 0usize;
    for (race, result) in &results {
        if let Err(err) = result {
            failed += 1;
            warn!("Race '{}' failed: {:#}", race, err);
        }
    }
    if failed > 0 {
        bail!("{} of {} races failed", failed, races.len());
    }
    info!("Rendered {} races into {}", races.len(), args.out_dir.display());
    Ok(())
}

fn render_race(
    workbook: &Workbook,
    request: &DashboardRequest,
    config: &DashboardConfig,
    args: &RenderArgs,
) -> Result<()> {
    let t_load = Instant::now();
    let frame = load_race(workbook, &request.race, config)
        .with_context(|| format!("failed to load race '{}'", request.race))?;
    if args.profile {
        info!(
            "[{}] Load stage: {:.1} ms ({} samples)",
            request.race,
            t_load.elapsed().as_secs_f64() * 1000.0,
            frame.len()
        );
    }

    let t_build = Instant::now();
    let dashboard = render_dashboard(&frame, request, config)
        .with_context(|| format!("failed to build dashboard for '{}'", request.race))?;
    if args.profile {
        info!(
            "[{}] Build stage: {:.1} ms ({} charts)",
            request.race,
            t_build.elapsed().as_secs_f64() * 1000.0,
            dashboard.charts.len() + usize::from(dashboard.course_map.is_some())
        );
    }

    let stem = race_file_stem(&request.race);
    let json_path = args.out_dir.join(format!("{stem}.json"));
    write_dashboard_json(&dashboard, &json_path)?;
    debug!("Wrote {}", json_path.display());

    let html_path = args.out_dir.join(format!("{stem}.html"));
    fs::write(&html_path, dashboard_html(&dashboard)?)
        .with_context(|| format!("failed to write {}", html_path.display()))?;
    info!("Wrote dashboard: {}", html_path.display());

    if args.csv {
        let csv_path = args.out_dir.join(format!("{stem}.csv"));
        let file = File::create(&csv_path)
            .with_context(|| format!("failed to create {}", csv_path.display()))?;
        write_frame_csv(&frame, &mut csv::Writer::from_writer(file))?;
        info!("Wrote samples CSV: {}", csv_path.display());
    }

    if !args.no_plot {
        let t_plot = Instant::now();
        let plot = RacePlot::new(&frame, request, &dashboard, config);
        let mut targets = vec![(args.out_dir.join(format!("{stem}.png")), PlotKind::Png)];
        if args.svg {
            targets.push((args.out_dir.join(format!("{stem}.svg")), PlotKind::Svg));
        }
        for (path, kind) in targets {
            if let Err(err) = render_chart_guard(&plot, &path, kind) {
                warn!("Skipping plot render ({}): {}", path.display(), err);
            } else {
                info!("Wrote plot: {}", path.display());
            }
        }
        if args.profile {
            info!(
                "[{}] Plot stage: {:.1} ms",
                request.race,
                t_plot.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    let s = &dashboard.summary;
    info!(
        "{}: {:.0} m in {}, {:.2} m/s, {:.1} spm, {} strokes",
        s.race,
        s.distance_m,
        format_clock(s.elapsed_s),
        s.mean_speed_mps,
        s.mean_stroke_rate,
        s.total_strokes
    );
    Ok(())
}

/// File-system friendly name for a race worksheet.
fn race_file_stem(race: &str) -> String {
    let stem: String = race
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "race".to_string()
    } else {
        stem
    }
}

fn write_dashboard_json(dashboard: &Dashboard, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(io::BufWriter::new(file), dashboard)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Self-contained page drawing every figure with Plotly.
fn dashboard_html(dashboard: &Dashboard) -> Result<String> {
    let mut figures: Vec<&race_telemetry::ChartSpec> = dashboard.charts.iter().collect();
    if let Some(map) = dashboard.course_map.as_ref() {
        figures.push(map);
    }
    // keep `</script>` inside string literals from closing the block
    let payload = serde_json::to_string(&figures)?.replace("</", "<\\/");

    let s = &dashboard.summary;
    let mut summary = format!(
        "{} samples, {:.0} m in {}, mean {:.2} m/s at {:.1} spm, {} strokes",
        s.samples,
        s.distance_m,
        format_clock(s.elapsed_s),
        s.mean_speed_mps,
        s.mean_stroke_rate,
        s.total_strokes
    );
    if let Some(split) = s.average_split_s {
        summary.push_str(&format!(", average split {}", format_clock(split)));
    }

    let title = escape_html(&dashboard.race);
    let divs: String = (0..figures.len())
        .map(|idx| format!("<div id=\"chart-{idx}\" class=\"chart\"></div>\n"))
        .collect();
    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <script src=\"{PLOTLY_CDN}\"></script>\n\
         <style>body{{font-family:sans-serif;margin:2em}}.chart{{width:100%;height:520px}}</style>\n\
         </head>\n<body>\n<h1>{title}</h1>\n<p>{summary}</p>\n{divs}\
         <script>\nconst figures = {payload};\n\
         figures.forEach((f, i) => Plotly.newPlot(\"chart-\" + i, f.data, f.layout, {{responsive: true}}));\n\
         </script>\n</body>\n</html>\n",
        summary = escape_html(&summary),
    ))
}

fn opt_cell(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_default()
}

fn write_frame_csv<W: Write>(frame: &RaceFrame, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        columns::DISTANCE,
        columns::SPEED,
        columns::STROKE_RATE,
        columns::ELAPSED_SECONDS,
        columns::SPLIT_SECONDS,
        columns::TOTAL_STROKES,
        columns::DISTANCE_PER_STROKE,
        columns::HEART_RATE,
        columns::LAT,
        columns::LON,
    ])?;
    for r in frame.records() {
        writer.write_record([
            format!("{:.2}", r.distance_m),
            format!("{:.3}", r.speed_mps),
            format!("{:.1}", r.stroke_rate),
            format!("{:.3}", r.elapsed_s),
            format!("{:.3}", r.split_s),
            r.total_strokes.to_string(),
            format!("{:.3}", r.distance_per_stroke_m),
            opt_cell(r.heart_rate, 0),
            opt_cell(r.lat, 6),
            opt_cell(r.lon, 6),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum PlotKind {
    Png,
    Svg,
}

const SPEED_COLOR: RGBColor = RGBColor(99, 110, 250);
const RATE_COLOR: RGBColor = RGBColor(239, 85, 59);
const FASTEST_COLOR: RGBColor = RGBColor(0, 204, 150);
const SLOWEST_COLOR: RGBColor = RGBColor(171, 99, 250);
const MAROON: RGBColor = RGBColor(128, 0, 0);

/// Static rendition of the speed/stroke-rate chart.
#[derive(Clone, Debug)]
struct RacePlot {
    title: String,
    speed_label: String,
    rate_label: String,
    distance_label: String,
    distance: Vec<f64>,
    speed: Vec<f64>,
    rate: Vec<f64>,
    x_range: [f64; 2],
    overlays: Overlays,
    geometry: Option<DerivedGeometry>,
}

impl RacePlot {
    fn new(
        frame: &RaceFrame,
        request: &DashboardRequest,
        dashboard: &Dashboard,
        config: &DashboardConfig,
    ) -> Self {
        let plotted = frame.filter_strokes(request.stroke_threshold(config));
        let records = plotted.records();
        Self {
            title: dashboard
                .charts
                .first()
                .map(|c| c.title.clone())
                .unwrap_or_else(|| dashboard.race.clone()),
            speed_label: config.labels.get(columns::SPEED).to_string(),
            rate_label: config.labels.get(columns::STROKE_RATE).to_string(),
            distance_label: config.labels.get(columns::DISTANCE).to_string(),
            distance: records.iter().map(|r| r.distance_m).collect(),
            speed: records.iter().map(|r| r.speed_mps).collect(),
            rate: records.iter().map(|r| r.stroke_rate).collect(),
            x_range: x_axis_range(&plotted, &config.x_range),
            overlays: request.overlays,
            geometry: dashboard.geometry.clone(),
        }
    }

    fn speed_bounds(&self) -> (f64, f64) {
        let mut lo = self.speed.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = self.speed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if let (true, Some(geometry)) = (self.overlays.split_lines, self.geometry.as_ref()) {
            for line in &geometry.pace_lines {
                lo = lo.min(line.speed);
                hi = hi.max(line.speed);
            }
        }
        if !lo.is_finite() || !hi.is_finite() {
            return (0.0, 1.0);
        }
        let pad = ((hi - lo) * 0.05).max(0.1);
        ((lo - pad).max(0.0), hi + pad)
    }

    fn rate_bounds(&self) -> (f64, f64) {
        let hi = self.rate.iter().copied().fold(0.0, f64::max);
        (0.0, if hi > 0.0 { hi * 1.1 } else { 1.0 })
    }
}

fn render_chart_guard(plot: &RacePlot, path: &Path, kind: PlotKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        let drawn = match kind {
            PlotKind::Png => {
                let root = BitMapBackend::new(path, (1280, 720)).into_drawing_area();
                draw_race_chart(root, plot)
            }
            PlotKind::Svg => {
                let root = SVGBackend::new(path, (1280, 720)).into_drawing_area();
                draw_race_chart(root, plot)
            }
        };
        drawn.map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn draw_race_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, plot: &RacePlot) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = root;
    area.fill(&WHITE)?;

    let [x0, x1] = plot.x_range;
    let x1 = if x1 > x0 { x1 } else { x0 + 1.0 };
    let (s0, s1) = plot.speed_bounds();
    let (r0, r1) = plot.rate_bounds();

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    let mut chart = ChartBuilder::on(&area)
        .caption(
            &plot.title,
            FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal),
        )
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Right, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(x0..x1, s0..s1)?
        .set_secondary_coord(x0..x1, r0..r1);

    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .x_desc(plot.distance_label.as_str())
        .y_desc(plot.speed_label.as_str())
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.1}", v))
        .label_style(axis_font.clone().color(&BLACK.mix(0.85)))
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc(plot.rate_label.as_str())
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.clone().color(&BLACK.mix(0.85)))
        .draw()?;

    if let Some(geometry) = plot.geometry.as_ref() {
        if let (true, Some(breakdown)) = (plot.overlays.breakdown, geometry.breakdown.as_ref()) {
            let (start, end) = breakdown.high_strokes;
            let q = breakdown.quarters;
            let bands = [
                (start, end, BLUE),
                (q[1], q[2], GREEN),
                (q[2], q[3], YELLOW),
                (q[3], q[4], MAROON),
            ];
            chart.draw_series(bands.iter().map(|&(a, b, color)| {
                Rectangle::new([(a, s0), (b, s1)], color.mix(0.2).filled())
            }))?;
        }
        if plot.overlays.split_lines {
            let label_font = FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal);
            for line in &geometry.pace_lines {
                chart.draw_series(LineSeries::new(
                    vec![(x0, line.speed), (x1, line.speed)],
                    &BLACK.mix(0.35),
                ))?;
                chart.draw_series(std::iter::once(Text::new(
                    line.label.clone(),
                    (x0, line.speed),
                    label_font.clone(),
                )))?;
            }
        }
    }

    chart
        .draw_series(LineSeries::new(
            plot.distance.iter().copied().zip(plot.speed.iter().copied()),
            &SPEED_COLOR,
        ))?
        .label("Speed")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], SPEED_COLOR));
    chart
        .draw_secondary_series(LineSeries::new(
            plot.distance.iter().copied().zip(plot.rate.iter().copied()),
            &RATE_COLOR,
        ))?
        .label("Stroke Rate")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], RATE_COLOR));

    let breakdown = plot.geometry.as_ref().and_then(|g| g.breakdown.as_ref());
    if let (true, Some(breakdown)) = (plot.overlays.breakdown, breakdown) {
        let ex = &breakdown.extremes;
        chart
            .draw_series(
                ex.fastest
                    .iter()
                    .map(|&x| Circle::new((x, ex.max_speed), 6, FASTEST_COLOR.filled())),
            )?
            .label("Fastest")
            .legend(|(x, y)| Circle::new((x + 15, y), 5, FASTEST_COLOR.filled()));
        chart
            .draw_series(
                ex.slowest
                    .iter()
                    .map(|&x| Circle::new((x, ex.min_speed), 6, SLOWEST_COLOR.filled())),
            )?
            .label("Slowest")
            .legend(|(x, y)| Circle::new((x + 15, y), 5, SLOWEST_COLOR.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(axis_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    area.present()?;
    Ok(())
}
