use leptos::*;
use race_telemetry::frame::format_clock;
use race_telemetry::{
    build_dashboard, ChartKind, ChartSpec, Dashboard, DashboardConfig, DashboardRequest,
    Overlays, Workbook,
};
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlInputElement;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Charts in display order; the course map comes last.
const CHART_SLOTS: [ChartKind; 5] = [
    ChartKind::SpeedStrokeRate,
    ChartKind::SpeedByStrokeRate,
    ChartKind::StrokeRateBySpeed,
    ChartKind::SpeedByStrokeRateBox,
    ChartKind::CourseMap,
];

fn chart_div_id(kind: ChartKind) -> String {
    format!("chart-{}", kind.slug())
}

fn summary_line(dashboard: &Dashboard) -> String {
    let s = &dashboard.summary;
    let mut line = format!(
        "{}: {:.0} m in {}, {:.2} m/s, {:.1} spm, {} strokes",
        s.race,
        s.distance_m,
        format_clock(s.elapsed_s),
        s.mean_speed_mps,
        s.mean_stroke_rate,
        s.total_strokes
    );
    if let Some(split) = s.average_split_s {
        line.push_str(&format!(", average split {}", format_clock(split)));
    }
    if let Some(hr) = s.mean_heart_rate {
        line.push_str(&format!(", mean HR {:.0}", hr));
    }
    if dashboard.course_map.is_none() {
        line.push_str(" (no GPS track)");
    }
    line
}

async fn read_first_file(input: &HtmlInputElement) -> Option<(String, Vec<u8>)> {
    let file = input.files()?.item(0)?;
    let buf = JsFuture::from(file.array_buffer()).await.ok()?;
    let u8arr = js_sys::Uint8Array::new(&buf);
    let mut bytes = vec![0u8; u8arr.length() as usize];
    u8arr.copy_to(&mut bytes[..]);
    Some((file.name(), bytes))
}

fn plotly_method(name: &str) -> Result<js_sys::Function, String> {
    let plotly = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("Plotly"))
        .unwrap_or(JsValue::UNDEFINED);
    if plotly.is_undefined() {
        return Err("Plotly is not loaded".to_string());
    }
    js_sys::Reflect::get(&plotly, &JsValue::from_str(name))
        .and_then(|v| v.dyn_into::<js_sys::Function>())
        .map_err(|_| format!("Plotly.{name} is unavailable"))
}

fn chart_div(div_id: &str) -> Result<JsValue, String> {
    web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(div_id))
        .map(JsValue::from)
        .ok_or_else(|| format!("missing element #{div_id}"))
}

fn draw_figure(div_id: &str, spec: &ChartSpec) -> Result<(), String> {
    let div = chart_div(div_id)?;
    let react = plotly_method("react")?;
    // Plotly expects plain objects, not ES maps
    let serializer = Serializer::json_compatible();
    let data = spec.data.serialize(&serializer).map_err(|e| e.to_string())?;
    let layout = spec.layout.serialize(&serializer).map_err(|e| e.to_string())?;
    react
        .call3(&JsValue::NULL, &div, &data, &layout)
        .map(|_| ())
        .map_err(|_| format!("Plotly.react failed for #{div_id}"))
}

fn clear_figure(div_id: &str) {
    if let (Ok(div), Ok(purge)) = (chart_div(div_id), plotly_method("purge")) {
        let _ = purge.call1(&JsValue::NULL, &div);
    }
}

fn draw_dashboard(dashboard: &Dashboard) -> Result<(), String> {
    for spec in &dashboard.charts {
        draw_figure(&chart_div_id(spec.kind), spec)?;
    }
    let map_id = chart_div_id(ChartKind::CourseMap);
    match dashboard.course_map.as_ref() {
        Some(spec) => draw_figure(&map_id, spec)?,
        None => clear_figure(&map_id),
    }
    Ok(())
}

fn clear_dashboard() {
    for kind in CHART_SLOTS {
        clear_figure(&chart_div_id(kind));
    }
}

#[component]
pub fn App() -> impl IntoView {
    let config = DashboardConfig::default();
    let (workbook, set_workbook) = create_signal(Option::<Workbook>::None);
    let (races, set_races) = create_signal(Vec::<String>::new());
    let (selected, set_selected) = create_signal(String::new());
    let (show_start, set_show_start) = create_signal(false);
    let (breakdown, set_breakdown) = create_signal(false);
    let (split_lines, set_split_lines) = create_signal(false);
    let (status, set_status) = create_signal(String::from("No workbook selected."));

    // File input handler
    let on_file = move |ev: leptos::ev::Event| {
        let Some(target) = ev.target() else { return };
        let Ok(input) = target.dyn_into::<HtmlInputElement>() else {
            return;
        };
        set_status.set("Reading workbook…".to_string());
        spawn_local(async move {
            let Some((name, bytes)) = read_first_file(&input).await else {
                set_status.set("Could not read the selected file.".to_string());
                return;
            };
            match Workbook::from_bytes(bytes, &name) {
                Ok(wb) => {
                    let names = wb.race_names();
                    set_status.set(format!("{}: {} races", name, names.len()));
                    set_selected.set(names.first().cloned().unwrap_or_default());
                    set_races.set(names);
                    set_workbook.set(Some(wb));
                }
                Err(err) => {
                    set_workbook.set(None);
                    set_races.set(Vec::new());
                    set_selected.set(String::new());
                    clear_dashboard();
                    set_status.set(format!("{name}: {err}"));
                }
            }
        });
    };

    // Every interaction rebuilds the dashboard from scratch
    create_effect(move |_| {
        let race = selected.get();
        let request = DashboardRequest {
            race: race.clone(),
            show_start: show_start.get(),
            overlays: Overlays {
                split_lines: split_lines.get(),
                breakdown: breakdown.get(),
            },
        };
        workbook.with(|wb| {
            let Some(wb) = wb.as_ref() else { return };
            if race.is_empty() {
                return;
            }
            let drawn = build_dashboard(wb, &request, &config)
                .map_err(|err| err.to_string())
                .and_then(|dashboard| draw_dashboard(&dashboard).map(|_| dashboard));
            match drawn {
                Ok(dashboard) => set_status.set(summary_line(&dashboard)),
                Err(err) => {
                    clear_dashboard();
                    set_status.set(format!("Race '{race}': {err}"));
                }
            }
        });
    });

    let race_options = move || {
        races
            .get()
            .into_iter()
            .map(|race| view! { <option value={race.clone()}>{race}</option> })
            .collect_view()
    };

    let chart_divs = CHART_SLOTS
        .into_iter()
        .map(|kind| view! { <div id={chart_div_id(kind)} class="plot"></div> })
        .collect_view();

    view! {
        <main class="tufte">
            <header>
                <h1>"Race Telemetry"</h1>
                <p class="subtitle">"Upload a race workbook (one worksheet per race) to chart speed and stroke rate."</p>
                <p class="note">{"Web version "}{APP_VERSION}</p>
            </header>
            <section class="controls">
                <label class="dropzone">
                    <span>"Choose a workbook (.xlsx, .xls, .ods)"</span>
                    <input id="file_input" type="file" accept=".xlsx,.xls,.xlsm,.ods" on:change=on_file />
                </label>
                <div class="control-row">
                    <label class="note">"Race:"</label>
                    <select
                        on:change=move |ev| set_selected.set(event_target_value(&ev))
                        prop:value=move || selected.get()
                    >
                        {race_options}
                    </select>
                </div>
                <div class="control-row">
                    <label><input type="checkbox" prop:checked=move || breakdown.get() on:change=move |ev| {
                        set_breakdown.set(event_target_checked(&ev));
                    }/>" Breakdown"</label>
                    <label><input type="checkbox" prop:checked=move || split_lines.get() on:change=move |ev| {
                        set_split_lines.set(event_target_checked(&ev));
                    }/>" Split lines"</label>
                    <label><input type="checkbox" prop:checked=move || show_start.get() on:change=move |ev| {
                        set_show_start.set(event_target_checked(&ev));
                    }/>" Show starting strokes"</label>
                </div>
            </section>
            <section class="files">
                <p class="note">{move || status.get()}</p>
            </section>
            <section class="plots">
                {chart_divs}
            </section>
            <section class="files">
                <p class="note">"Nothing leaves your device. All processing happens locally in your browser."</p>
            </section>
        </main>
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    leptos::mount_to_body(|| view! { <App/> });
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_telemetry::RaceSummary;

    fn dashboard(split: Option<f64>) -> Dashboard {
        Dashboard {
            race: "Final".into(),
            summary: RaceSummary {
                race: "Final".into(),
                samples: 200,
                distance_m: 1000.0,
                elapsed_s: 215.3,
                mean_speed_mps: 4.64,
                mean_stroke_rate: 36.2,
                mean_heart_rate: None,
                average_split_s: split,
                total_strokes: 130,
            },
            geometry: None,
            charts: Vec::new(),
            course_map: None,
        }
    }

    #[test]
    fn chart_ids_follow_slugs() {
        assert_eq!(chart_div_id(ChartKind::CourseMap), "chart-course_map");
        assert_eq!(
            chart_div_id(ChartKind::SpeedStrokeRate),
            "chart-speed_stroke_rate"
        );
    }

    #[test]
    fn summary_mentions_split_and_missing_track() {
        let line = summary_line(&dashboard(Some(107.7)));
        assert_eq!(
            line,
            "Final: 1000 m in 3:35.3, 4.64 m/s, 36.2 spm, 130 strokes, average split 1:47.7 (no GPS track)"
        );
        assert!(!summary_line(&dashboard(None)).contains("average split"));
    }
}
