use std::fmt::Display;

use askama::Template;
use chrono::{TimeZone, Utc};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::MARKER_CLASS_NAME;
use crate::geojson::{Feature, GeoFeatureCollection};
use crate::location::Location;

const UPDATED_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

#[derive(Template)]
#[template(
    source = r#"<span class="icon-marker">
  <span class="icon-marker-tooltip">
    <h2>{{ country }}</h2>
    <ul>
      <li><strong>Confirmed:</strong> {{ cases }}</li>
      <li><strong>Deaths:</strong> {{ deaths }}</li>
      <li><strong>Recovered:</strong> {{ recovered }}</li>
      {%- if let Some(updated) = updated %}
      <li><strong>Last Update:</strong> {{ updated|safe }}</li>
      {%- endif %}
    </ul>
  </span>
  {{ label|safe }}
</span>"#,
    ext = "html"
)]
struct MarkerTemplate<'a> {
    country: &'a str,
    cases: u64,
    deaths: u64,
    recovered: u64,
    updated: Option<String>,
    label: &'a str,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Marker {
    pub lat_lng: Location,
    pub class_name: String,
    pub html: String,
    pub label: String,
    pub rise_on_hover: bool,
}

/// Markers attached to the map in a single batch.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct MarkerLayer {
    pub markers: Vec<Marker>,
}

impl MarkerLayer {
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Short case count shown on the marker itself.
///
/// Above 1000 the last three digits are cut off rather than divided out, so
/// `12345` reads `12k+` and `1000` stays `1000`.
pub fn cases_label(cases: u64) -> String {
    let cases_string = cases.to_string();
    if cases > 1000 {
        format!("{}k+", &cases_string[..cases_string.len() - 3])
    } else {
        cases_string
    }
}

/// `updated` (epoch millis) as a `M/D/YYYY, h:mm:ss AM` string in `tz`.
/// Zero and unrepresentable timestamps give `None`.
pub fn format_updated<Tz>(updated: i64, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if updated == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(updated)
        .single()
        .map(|time| time.with_timezone(tz).format(UPDATED_FORMAT).to_string())
}

fn count(feature: &Feature, key: &str) -> u64 {
    feature.property(key).and_then(Value::as_u64).unwrap_or_default()
}

pub fn build_marker<Tz>(feature: &Feature, tz: &Tz) -> Result<Marker, askama::Error>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let country = feature
        .property("country")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let cases = count(feature, "cases");
    let updated = feature
        .property("updated")
        .and_then(Value::as_i64)
        .and_then(|updated| format_updated(updated, tz));
    let label = cases_label(cases);

    let html = MarkerTemplate {
        country,
        cases,
        deaths: count(feature, "deaths"),
        recovered: count(feature, "recovered"),
        updated,
        label: &label,
    }
    .render()?;

    let [lng, lat] = feature.coordinates();
    Ok(Marker {
        lat_lng: Location { lat, lng },
        class_name: MARKER_CLASS_NAME.to_string(),
        html,
        label,
        rise_on_hover: true,
    })
}

pub fn build_layer<Tz>(
    collection: &GeoFeatureCollection,
    tz: &Tz,
) -> Result<MarkerLayer, askama::Error>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let markers = collection
        .features
        .iter()
        .map(|feature| build_marker(feature, tz))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MarkerLayer { markers })
}
