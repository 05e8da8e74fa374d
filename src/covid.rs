use serde::{Deserialize as _, Deserializer};
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One country as returned by the upstream `/v3/covid-19/countries` endpoint.
///
/// Only the fields the map reads are typed; everything else is kept in
/// `extra` so it survives into the feature properties untouched.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CountryRecord {
    #[serde(default)]
    pub country: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub cases: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub deaths: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub recovered: u64,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
    #[serde(rename = "countryInfo", default)]
    pub country_info: CountryInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CountryInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CountryRecord {
    /// `(lng, lat)` when both coordinates are present and finite.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.country_info.long, self.country_info.lat) {
            (Some(lng), Some(lat)) if lng.is_finite() && lat.is_finite() => Some((lng, lat)),
            _ => None,
        }
    }
}

// `allowNull=true` on the upstream API turns unknown counts into `null`.
fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}
