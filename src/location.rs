//! Where the viewer is, or where we pretend they are.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hyper::Uri;
use serde_derive::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::DEFAULT_LOCATION;
use crate::error::{FetchError, GeolocationError, UrlError};
use crate::fetcher::{absolute_uri, get_json, HttpsClient};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeolocationError> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if valid {
            Ok(Location { lat, lng })
        } else {
            Err(GeolocationError::InvalidCoordinates { lat, lng })
        }
    }
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_location(&self) -> Result<Location, GeolocationError>;
}

/// Always succeeds or always fails, with whatever the caller already knows.
pub struct FixedGeolocator(pub Result<Location, String>);

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_location(&self) -> Result<Location, GeolocationError> {
        self.0.clone().map_err(GeolocationError::Rejected)
    }
}

#[derive(Deserialize, Debug)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Approximate location from an ip-api.com style lookup.
///
/// Without an address the service locates whoever made the request, which
/// is this server rather than the viewer; [`IpGeolocator::for_ip`] scopes
/// the lookup to a particular client.
#[derive(Clone)]
pub struct IpGeolocator {
    client: HttpsClient,
    base_url: String,
    ip: Option<IpAddr>,
    timeout: Duration,
}

impl IpGeolocator {
    pub fn new(client: HttpsClient, base_url: &str, timeout: Duration) -> Result<Self, UrlError> {
        absolute_uri(base_url)?;
        Ok(IpGeolocator {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ip: None,
            timeout,
        })
    }

    pub fn for_ip(&self, ip: IpAddr) -> Self {
        IpGeolocator {
            ip: Some(ip),
            ..self.clone()
        }
    }

    pub(crate) fn lookup_uri(&self) -> Result<Uri, FetchError> {
        let fields = urlencoding::encode("status,message,lat,lon");
        let url = match self.ip {
            Some(ip) => format!(
                "{}/{}?fields={fields}",
                self.base_url,
                urlencoding::encode(&ip.to_string())
            ),
            None => format!("{}?fields={fields}", self.base_url),
        };
        Uri::try_from(url).map_err(|e| FetchError::Request(e.into()))
    }
}

#[async_trait]
impl Geolocator for IpGeolocator {
    async fn current_location(&self) -> Result<Location, GeolocationError> {
        let response: IpApiResponse =
            get_json(&self.client, self.lookup_uri()?, self.timeout).await?;

        if response.status != "success" {
            return Err(GeolocationError::Rejected(
                response.message.unwrap_or(response.status),
            ));
        }

        match (response.lat, response.lon) {
            (Some(lat), Some(lng)) => Location::new(lat, lng),
            _ => Err(GeolocationError::Rejected("response without coordinates".to_string())),
        }
    }
}

/// Best known location of the viewer. Never fails: every lookup error
/// collapses into [`DEFAULT_LOCATION`].
pub async fn resolve_location(geolocator: &dyn Geolocator) -> Location {
    match geolocator.current_location().await {
        Ok(location) => {
            info!(lat = location.lat, lng = location.lng, "resolved viewer location");
            location
        }
        Err(e) => {
            warn!(error = %e, "geolocation unavailable; using fallback");
            DEFAULT_LOCATION
        }
    }
}
