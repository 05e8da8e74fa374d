use crate::location::Location;

pub const COUNTRIES_URL: &str = "https://corona.lmao.ninja/v3/covid-19/countries";
pub const GEOLOCATION_URL: &str = "http://ip-api.com/json";

/// Washington, D.C. Used when the viewer can't be located.
pub const DEFAULT_LOCATION: Location = Location {
    lat: 38.9072,
    lng: -77.0369,
};

pub const CENTER: Location = DEFAULT_LOCATION;
pub const DEFAULT_ZOOM: f64 = 2.0;
pub const DEFAULT_BASE_MAP: &str = "OpenStreetMap";

/// Zoom the viewport flies to once data is available.
pub const ZOOM: f64 = 2.5;

pub const MARKER_CLASS_NAME: &str = "icon";
