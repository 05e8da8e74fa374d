use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::covid::CountryRecord;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub properties: Map<String, Value>,
    pub geometry: Geometry,
}

impl Feature {
    /// `[lng, lat]`, GeoJSON order.
    pub fn coordinates(&self) -> [f64; 2] {
        match self.geometry {
            Geometry::Point { coordinates } => coordinates,
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct GeoFeatureCollection {
    pub features: Vec<Feature>,
}

impl GeoFeatureCollection {
    /// One point per record with usable coordinates; the rest are dropped.
    pub fn from_records(records: &[CountryRecord]) -> Self {
        let features: Vec<Feature> = records
            .iter()
            .filter_map(|record| {
                let Some((lng, lat)) = record.coordinates() else {
                    debug!(country = %record.country, "skipping record without coordinates");
                    return None;
                };
                Some(Feature {
                    properties: properties_of(record),
                    geometry: Geometry::Point {
                        coordinates: [lng, lat],
                    },
                })
            })
            .collect();

        GeoFeatureCollection { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn properties_of(record: &CountryRecord) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(properties)) => properties,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covid::CountryInfo;

    fn record(country: &str, lat: Option<f64>, long: Option<f64>) -> CountryRecord {
        CountryRecord {
            country: country.to_string(),
            cases: 10,
            country_info: CountryInfo {
                lat,
                long,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn one_feature_per_located_record() {
        let records = vec![
            record("Peru", Some(-10.0), Some(-76.0)),
            record("Atlantis", None, Some(1.0)),
            record("Japan", Some(36.0), Some(138.0)),
            record("Diamond Princess", None, None),
        ];
        let collection = GeoFeatureCollection::from_records(&records);

        let located = records.iter().filter(|r| r.coordinates().is_some()).count();
        assert_eq!(collection.len(), located);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn coordinates_are_lng_lat() {
        let collection =
            GeoFeatureCollection::from_records(&[record("Japan", Some(36.0), Some(138.0))]);

        assert_eq!(collection.features[0].coordinates(), [138.0, 36.0]);
        assert_eq!(collection.features[0].property("country"), Some(&Value::from("Japan")));
        assert_eq!(collection.features[0].property("cases"), Some(&Value::from(10)));
    }

    #[test]
    fn serializes_as_geojson() {
        let collection =
            GeoFeatureCollection::from_records(&[record("Peru", Some(-10.0), Some(-76.0))]);
        let value = serde_json::to_value(&collection).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
        assert_eq!(value["features"][0]["geometry"]["coordinates"][0], -76.0);
        assert_eq!(value["features"][0]["properties"]["countryInfo"]["lat"], -10.0);
    }

    #[test]
    fn empty_input() {
        assert!(GeoFeatureCollection::from_records(&[]).is_empty());
    }
}
