//! Chart builders. Each returns a Plotly figure (`data` + `layout`) ready to
//! be handed to `Plotly.react` or embedded in a page.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::frame::{columns, format_clock, RaceFrame, RaceRecord};
use crate::geometry::DerivedGeometry;
use crate::labels::Labels;
use crate::{DashboardConfig, RaceError, XRange};

/// Plotly's default qualitative palette, in trace order.
pub const TRACE_COLORS: [&str; 6] = [
    "#636efa", "#EF553B", "#00cc96", "#ab63fa", "#FFA15A", "#19d3f3",
];

const BREAKDOWN_FILLS: [&str; 3] = ["green", "yellow", "maroon"];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    SpeedStrokeRate,
    SpeedByStrokeRate,
    StrokeRateBySpeed,
    SpeedByStrokeRateBox,
    CourseMap,
}

impl ChartKind {
    pub fn slug(&self) -> &'static str {
        match self {
            ChartKind::SpeedStrokeRate => "speed_stroke_rate",
            ChartKind::SpeedByStrokeRate => "speed_by_stroke_rate",
            ChartKind::StrokeRateBySpeed => "stroke_rate_by_speed",
            ChartKind::SpeedByStrokeRateBox => "speed_by_stroke_rate_box",
            ChartKind::CourseMap => "course_map",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::SpeedStrokeRate => "Speed and stroke rate",
            ChartKind::SpeedByStrokeRate => "Speed, coloured by stroke rate",
            ChartKind::StrokeRateBySpeed => "Stroke rate, coloured by speed",
            ChartKind::SpeedByStrokeRateBox => "Speed by stroke rate",
            ChartKind::CourseMap => "Course",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub data: Vec<JsonValue>,
    pub layout: JsonValue,
}

/// Optional overlays on the speed/stroke-rate chart.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Overlays {
    /// Dashed horizontal lines at whole 5 s splits.
    pub split_lines: bool,
    /// High-stroke band, quarter shading and fastest/slowest markers.
    pub breakdown: bool,
}

impl Overlays {
    pub fn any(&self) -> bool {
        self.split_lines || self.breakdown
    }
}

pub fn x_axis_range(frame: &RaceFrame, range: &XRange) -> [f64; 2] {
    match *range {
        XRange::Observed { pad } => [0.0, frame.max_distance().unwrap_or(0.0) * pad],
        XRange::Fixed { min, max } => [min, max],
    }
}

/// Colour each trace's line with its marker colour so a series keeps the
/// same colour once merged onto a shared figure.
pub fn mirror_marker_colors(traces: &mut [JsonValue]) {
    for trace in traces.iter_mut() {
        let Some(color) = trace.pointer("/marker/color").cloned() else {
            continue;
        };
        if !color.is_string() {
            continue;
        }
        if let Some(obj) = trace.as_object_mut() {
            let line = obj.entry("line").or_insert_with(|| json!({}));
            if let Some(line) = line.as_object_mut() {
                line.insert("color".to_string(), color);
            }
            obj.insert("showlegend".to_string(), JsonValue::Bool(true));
        }
    }
}

#[derive(Clone, Copy)]
enum HoverField {
    Split,
    Elapsed,
    StrokeRate,
    DistancePerStroke,
    TotalStrokes,
}

impl HoverField {
    fn column(self) -> &'static str {
        match self {
            HoverField::Split => columns::SPLIT,
            HoverField::Elapsed => columns::ELAPSED_TIME,
            HoverField::StrokeRate => columns::STROKE_RATE,
            HoverField::DistancePerStroke => columns::DISTANCE_PER_STROKE,
            HoverField::TotalStrokes => columns::TOTAL_STROKES,
        }
    }

    fn format(self) -> &'static str {
        match self {
            HoverField::DistancePerStroke => ":.2f",
            _ => "",
        }
    }

    fn value(self, r: &RaceRecord) -> JsonValue {
        match self {
            HoverField::Split => json!(format_clock(r.split_s)),
            HoverField::Elapsed => json!(format_clock(r.elapsed_s)),
            HoverField::StrokeRate => json!(r.stroke_rate),
            HoverField::DistancePerStroke => json!(r.distance_per_stroke_m),
            HoverField::TotalStrokes => json!(r.total_strokes),
        }
    }
}

const FULL_HOVER: [HoverField; 5] = [
    HoverField::Split,
    HoverField::Elapsed,
    HoverField::StrokeRate,
    HoverField::DistancePerStroke,
    HoverField::TotalStrokes,
];

const RATE_HOVER: [HoverField; 4] = [
    HoverField::Elapsed,
    HoverField::StrokeRate,
    HoverField::DistancePerStroke,
    HoverField::TotalStrokes,
];

/// `customdata` rows plus the matching `hovertemplate`.
fn hover(
    frame: &RaceFrame,
    labels: &Labels,
    x_field: &str,
    y_field: &str,
    fields: &[HoverField],
) -> (JsonValue, String) {
    let custom: Vec<JsonValue> = frame
        .records()
        .iter()
        .map(|r| JsonValue::Array(fields.iter().map(|f| f.value(r)).collect()))
        .collect();
    let mut template = format!(
        "{}=%{{x}}<br>{}=%{{y}}",
        labels.get(x_field),
        labels.get(y_field)
    );
    for (idx, field) in fields.iter().enumerate() {
        template.push_str(&format!(
            "<br>{}=%{{customdata[{}]{}}}",
            labels.get(field.column()),
            idx,
            field.format()
        ));
    }
    template.push_str("<extra></extra>");
    (JsonValue::Array(custom), template)
}

fn distances(frame: &RaceFrame) -> Vec<f64> {
    frame.records().iter().map(|r| r.distance_m).collect()
}

fn speeds(frame: &RaceFrame) -> Vec<f64> {
    frame.records().iter().map(|r| r.speed_mps).collect()
}

fn stroke_rates(frame: &RaceFrame) -> Vec<f64> {
    frame.records().iter().map(|r| r.stroke_rate).collect()
}

fn title(frame: &RaceFrame, kind: ChartKind) -> String {
    format!("{}: {}", frame.race(), kind.title())
}

/// Dual-axis line chart: speed on the left axis, stroke rate on the right,
/// both against distance.
pub fn speed_stroke_rate_chart(
    frame: &RaceFrame,
    stroke_threshold: u32,
    overlays: Overlays,
    geometry: Option<&DerivedGeometry>,
    config: &DashboardConfig,
) -> Result<ChartSpec, RaceError> {
    let frame = frame.filter_strokes(stroke_threshold);
    let labels = &config.labels;
    let x = distances(&frame);

    let (speed_custom, speed_hover) =
        hover(&frame, labels, columns::DISTANCE, columns::SPEED, &FULL_HOVER);
    let (rate_custom, rate_hover) =
        hover(&frame, labels, columns::DISTANCE, columns::STROKE_RATE, &RATE_HOVER);

    let mut data = vec![
        json!({
            "type": "scatter",
            "mode": "lines",
            "name": "Speed",
            "x": x,
            "y": speeds(&frame),
            "yaxis": "y",
            "marker": { "color": TRACE_COLORS[0] },
            "customdata": speed_custom,
            "hovertemplate": speed_hover,
        }),
        json!({
            "type": "scatter",
            "mode": "lines",
            "name": "Stroke Rate",
            "x": x,
            "y": stroke_rates(&frame),
            "yaxis": "y2",
            "marker": { "color": TRACE_COLORS[1] },
            "customdata": rate_custom,
            "hovertemplate": rate_hover,
        }),
    ];

    let mut shapes: Vec<JsonValue> = Vec::new();
    let mut annotations: Vec<JsonValue> = Vec::new();

    if overlays.any() {
        let geometry = geometry.ok_or_else(|| {
            RaceError::InvalidParameter("overlays requested without derived geometry".into())
        })?;

        if overlays.split_lines {
            for (idx, line) in geometry.pace_lines.iter().enumerate() {
                shapes.push(json!({
                    "type": "line",
                    "xref": "paper", "x0": 0, "x1": 1,
                    "yref": "y", "y0": line.speed, "y1": line.speed,
                    "line": { "dash": "dash", "width": 1 },
                }));
                // first line labelled below it, the rest above
                annotations.push(json!({
                    "xref": "paper", "x": 0,
                    "yref": "y", "y": line.speed,
                    "text": line.label,
                    "showarrow": false,
                    "xanchor": "left",
                    "yanchor": if idx == 0 { "top" } else { "bottom" },
                }));
            }
        }

        if overlays.breakdown {
            let breakdown = geometry.breakdown.as_ref().ok_or_else(|| {
                RaceError::InvalidParameter("breakdown requested without its geometry".into())
            })?;
            let (start, end) = breakdown.high_strokes;
            shapes.push(vrect(start, end, "blue"));
            for (q, fill) in BREAKDOWN_FILLS.iter().enumerate() {
                shapes.push(vrect(breakdown.quarters[q + 1], breakdown.quarters[q + 2], fill));
            }

            let ex = &breakdown.extremes;
            data.push(json!({
                "type": "scatter",
                "mode": "markers+text",
                "name": "Fastest",
                "x": ex.fastest,
                "y": vec![ex.max_speed; ex.fastest.len()],
                "text": "Fastest",
                "textposition": "top center",
                "marker": { "color": TRACE_COLORS[2] },
            }));
            data.push(json!({
                "type": "scatter",
                "mode": "markers+text",
                "name": "Slowest",
                "x": ex.slowest,
                "y": vec![ex.min_speed; ex.slowest.len()],
                "text": "Slowest",
                "textposition": "bottom center",
                "marker": { "color": TRACE_COLORS[3] },
            }));
        }
    }

    mirror_marker_colors(&mut data);

    let kind = ChartKind::SpeedStrokeRate;
    Ok(ChartSpec {
        kind,
        title: title(&frame, kind),
        data,
        layout: json!({
            "title": { "text": title(&frame, kind) },
            "xaxis": {
                "title": { "text": labels.get(columns::DISTANCE) },
                "range": x_axis_range(&frame, &config.x_range),
            },
            "yaxis": { "title": { "text": labels.get(columns::SPEED) } },
            "yaxis2": {
                "title": { "text": labels.get(columns::STROKE_RATE) },
                "overlaying": "y",
                "side": "right",
            },
            "shapes": shapes,
            "annotations": annotations,
            "legend": { "orientation": "h" },
        }),
    })
}

fn vrect(x0: f64, x1: f64, fill: &str) -> JsonValue {
    json!({
        "type": "rect",
        "xref": "x", "x0": x0, "x1": x1,
        "yref": "paper", "y0": 0, "y1": 1,
        "fillcolor": fill,
        "opacity": 0.1,
        "layer": "below",
        "line": { "width": 0 },
    })
}

fn colored_scatter(
    frame: &RaceFrame,
    kind: ChartKind,
    y_field: &str,
    color_field: &str,
    config: &DashboardConfig,
) -> ChartSpec {
    let labels = &config.labels;
    let value = |field: &str, r: &RaceRecord| {
        if field == columns::SPEED {
            r.speed_mps
        } else {
            r.stroke_rate
        }
    };
    let y: Vec<f64> = frame.records().iter().map(|r| value(y_field, r)).collect();
    let color: Vec<f64> = frame.records().iter().map(|r| value(color_field, r)).collect();
    let (custom, template) = hover(frame, labels, columns::DISTANCE, y_field, &FULL_HOVER);

    ChartSpec {
        kind,
        title: title(frame, kind),
        data: vec![json!({
            "type": "scatter",
            "mode": "markers",
            "x": distances(frame),
            "y": y,
            "marker": {
                "color": color,
                "colorscale": config.color_scale,
                "showscale": true,
                "colorbar": { "title": { "text": labels.get(color_field) } },
            },
            "customdata": custom,
            "hovertemplate": template,
        })],
        layout: json!({
            "title": { "text": title(frame, kind) },
            "xaxis": {
                "title": { "text": labels.get(columns::DISTANCE) },
                "range": x_axis_range(frame, &config.x_range),
            },
            "yaxis": { "title": { "text": labels.get(y_field) } },
        }),
    }
}

/// Speed against distance, marker colour mapped to stroke rate.
pub fn speed_by_stroke_rate_chart(
    frame: &RaceFrame,
    stroke_threshold: u32,
    config: &DashboardConfig,
) -> ChartSpec {
    let frame = frame.filter_strokes(stroke_threshold);
    colored_scatter(
        &frame,
        ChartKind::SpeedByStrokeRate,
        columns::SPEED,
        columns::STROKE_RATE,
        config,
    )
}

/// Stroke rate against distance, marker colour mapped to speed.
pub fn stroke_rate_by_speed_chart(
    frame: &RaceFrame,
    stroke_threshold: u32,
    config: &DashboardConfig,
) -> ChartSpec {
    let frame = frame.filter_strokes(stroke_threshold);
    colored_scatter(
        &frame,
        ChartKind::StrokeRateBySpeed,
        columns::STROKE_RATE,
        columns::SPEED,
        config,
    )
}

/// Box plot of speed per whole stroke rate.
pub fn speed_box_chart(frame: &RaceFrame, stroke_threshold: u32, config: &DashboardConfig) -> ChartSpec {
    let frame = frame.filter_strokes(stroke_threshold);
    let labels = &config.labels;
    let rates: Vec<i64> = frame
        .records()
        .iter()
        .map(|r| r.stroke_rate.round() as i64)
        .collect();
    let kind = ChartKind::SpeedByStrokeRateBox;
    ChartSpec {
        kind,
        title: title(&frame, kind),
        data: vec![json!({
            "type": "box",
            "x": rates,
            "y": speeds(&frame),
            "marker": { "color": TRACE_COLORS[0] },
        })],
        layout: json!({
            "title": { "text": title(&frame, kind) },
            "xaxis": { "title": { "text": labels.get(columns::STROKE_RATE) } },
            "yaxis": { "title": { "text": labels.get(columns::SPEED) } },
        }),
    }
}

/// Course map from the GPS columns. The whole race is drawn, starting strokes
/// included; samples without coordinates are skipped.
pub fn course_map(frame: &RaceFrame, config: &DashboardConfig) -> Result<ChartSpec, RaceError> {
    let (lat, lon): (Vec<f64>, Vec<f64>) = frame
        .records()
        .iter()
        .filter_map(|r| Some((r.lat?, r.lon?)))
        .unzip();
    if lat.is_empty() {
        return Err(RaceError::NoCoordinates);
    }
    let n = lat.len() as f64;
    let center = json!({
        "lat": lat.iter().sum::<f64>() / n,
        "lon": lon.iter().sum::<f64>() / n,
    });
    let kind = ChartKind::CourseMap;
    Ok(ChartSpec {
        kind,
        title: title(frame, kind),
        data: vec![json!({
            "type": "scattermapbox",
            "mode": "markers",
            "lat": lat,
            "lon": lon,
            "marker": { "size": config.map.marker_size, "color": TRACE_COLORS[0] },
            "hoverinfo": "skip",
        })],
        layout: json!({
            "title": { "text": title(frame, kind) },
            "mapbox": {
                "style": config.map.style,
                "zoom": config.map.zoom,
                "center": center,
            },
            "margin": { "l": 0, "r": 0, "t": 40, "b": 0 },
            "showlegend": false,
        }),
    })
}
