use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_derive::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::covid::CountryRecord;
use crate::effect::{AbortReason, EffectState, MapEffect};
use crate::error::{ConfigError, FetchError};
use crate::fetcher::{https_client, CountrySource, HttpCountrySource};
use crate::geojson::GeoFeatureCollection;
use crate::location::{FixedGeolocator, Geolocator, IpGeolocator, Location};
use crate::map::{MapSnapshot, SessionMap};

#[derive(Clone)]
pub struct AppState {
    countries: Arc<dyn CountrySource>,
    geolocator: IpGeolocator,
    fly_duration: Duration,
}

impl AppState {
    pub fn new(
        countries: Arc<dyn CountrySource>,
        geolocator: IpGeolocator,
        fly_duration: Duration,
    ) -> Self {
        AppState {
            countries,
            geolocator,
            fly_duration,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client = https_client();
        let countries = HttpCountrySource::new(
            client.clone(),
            &config.countries_url,
            config.sort.as_deref(),
            config.fetch_timeout(),
        )
        .map_err(|source| ConfigError::InvalidUrl {
            name: "countries",
            value: config.countries_url.clone(),
            source,
        })?;
        let geolocator =
            IpGeolocator::new(client, &config.geolocation_url, config.fetch_timeout()).map_err(
                |source| ConfigError::InvalidUrl {
                    name: "geolocation",
                    value: config.geolocation_url.clone(),
                    source,
                },
            )?;

        Ok(AppState::new(Arc::new(countries), geolocator, config.fly_duration()))
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

struct UpstreamError(FetchError);

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "upstream request failed");
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (StatusCode::BAD_GATEWAY, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct MapQuery {
    lat: Option<String>,
    lng: Option<String>,
}

/// Position the browser reported. Blank or garbled values are a failed
/// lookup, not a bad request.
fn reported_location(lat: &str, lng: &str) -> Result<Location, String> {
    let parse = |name: &str, value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("unparsable {name} {value:?}"))
    };
    Location::new(parse("lat", lat)?, parse("lng", lng)?).map_err(|e| e.to_string())
}

#[derive(Serialize, Deserialize)]
pub struct MapResponse {
    pub effect: EffectState,
    pub map: MapSnapshot,
}

async fn index() -> &'static str {
    "covidmap: GET /map for the live case map"
}

async fn countries_endpoint(
    State(state): State<AppState>,
) -> Result<Json<Vec<CountryRecord>>, UpstreamError> {
    state.countries.fetch_countries().await.map(Json).map_err(UpstreamError)
}

async fn features_endpoint(
    State(state): State<AppState>,
) -> Result<Json<GeoFeatureCollection>, UpstreamError> {
    let countries = state.countries.fetch_countries().await.map_err(UpstreamError)?;
    Ok(Json(GeoFeatureCollection::from_records(&countries)))
}

/// Runs the map effect for one page view and returns where the map ended up.
///
/// The effect runs in its own task; if the viewer goes away the token is
/// cancelled and the task stops at the next stage instead of touching a map
/// nobody is looking at.
async fn map_endpoint(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<MapQuery>,
) -> Result<Json<MapResponse>, StatusCode> {
    let geolocator: Box<dyn Geolocator> = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => Box::new(FixedGeolocator(reported_location(&lat, &lng))),
        _ => match connect_info {
            Some(ConnectInfo(addr)) => Box::new(state.geolocator.for_ip(addr.ip())),
            None => Box::new(state.geolocator.clone()),
        },
    };

    let map = Arc::new(SessionMap::new(state.fly_duration));
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let task_map = map.clone();
    let countries = state.countries.clone();
    let effect_state = tokio::spawn(async move {
        let effect = MapEffect::new();
        effect
            .fire(task_map.as_ref(), countries.as_ref(), geolocator.as_ref(), &cancel)
            .await;
        let final_state = effect.state();
        if final_state == EffectState::Aborted(AbortReason::Cancelled) {
            task_map.close();
        }
        final_state
    })
    .await
    .map_err(|e| {
        error!(error = %e, "map effect task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!(effect = ?effect_state, "map ready");
    Ok(Json(MapResponse {
        effect: effect_state,
        map: map.snapshot(),
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/countries", get(countries_endpoint))
        .route("/features", get(features_endpoint))
        .route("/map", get(map_endpoint))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), hyper::Error> {
    info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
