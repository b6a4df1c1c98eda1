use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frame::columns;

/// Display names for canonical fields, shared by every chart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Default for Labels {
    fn default() -> Self {
        let entries = [
            (columns::SPEED, "Speed (m/s)"),
            (columns::DISTANCE, "Distance (m)"),
            (columns::STROKE_RATE, "Stroke Rate"),
            (columns::ELAPSED_TIME, "Time"),
            (columns::SPLIT, "Split"),
            (columns::DISTANCE_PER_STROKE, "Meters per Stroke"),
            (columns::TOTAL_STROKES, "Stroke Count"),
            (columns::HEART_RATE, "Heart Rate"),
            (columns::LAT, "Latitude"),
            (columns::LON, "Longitude"),
        ];
        Labels(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl Labels {
    /// Display name of `field`, or the field name itself when unlabelled.
    pub fn get<'a>(&'a self, field: &'a str) -> &'a str {
        self.0.get(field).map(String::as_str).unwrap_or(field)
    }

    pub fn with(mut self, field: &str, label: &str) -> Self {
        self.0.insert(field.to_string(), label.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_field_name() {
        let labels = Labels::default();
        assert_eq!(labels.get("speed_gps"), "Speed (m/s)");
        assert_eq!(labels.get("watts"), "watts");
    }

    #[test]
    fn json_labels_replace_the_dictionary() {
        let labels: Labels = serde_json::from_str(r#"{ "speed_gps": "Boat speed" }"#).unwrap();
        assert_eq!(labels.get("speed_gps"), "Boat speed");
        assert_eq!(labels.get("stroke_rate"), "stroke_rate");
        assert_eq!(Labels::default().with("speed_gps", "Boat speed").get("speed_gps"), "Boat speed");
    }
}
