use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use flate2::write::GzEncoder;
use flate2::Compression;
use hyper::Body;
use serde_json::{json, Value};
use tower::ServiceExt;

use covidmap::effect::{AbortReason, EffectState};
use covidmap::error::{FetchError, GeolocationError};
use covidmap::fetcher::{https_client, CountrySource, HttpCountrySource};
use covidmap::location::{Geolocator, IpGeolocator, Location};
use covidmap::server::{router, AppState, MapResponse};

const TIMEOUT: Duration = Duration::from_millis(500);

fn countries() -> Value {
    json!([
        {
            "updated": 1700000000000i64,
            "country": "USA",
            "countryInfo": {"_id": 840, "iso2": "US", "lat": 38, "long": -97},
            "cases": 111820082,
            "deaths": 1219487,
            "recovered": 109814428,
            "population": 334805269
        },
        {
            "updated": 1700000000000i64,
            "country": "Tuvalu",
            "countryInfo": {"_id": 798, "iso2": "TV", "lat": -8, "long": 178},
            "cases": 20,
            "deaths": 0,
            "recovered": 0
        },
        {
            "country": "Diamond Princess",
            "countryInfo": {"_id": null, "lat": null, "long": null},
            "cases": 712,
            "deaths": 13,
            "recovered": 699
        }
    ])
}

async fn gzipped_countries() -> impl IntoResponse {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(countries().to_string().as_bytes())
        .unwrap();
    (
        [(CONTENT_ENCODING, "gzip"), (CONTENT_TYPE, "application/json")],
        encoder.finish().unwrap(),
    )
}

async fn ip_lookup(Path(ip): Path<String>) -> Json<Value> {
    if ip == "203.0.113.7" {
        Json(json!({"status": "success", "lat": 51.5074, "lon": -0.1278}))
    } else {
        Json(json!({"status": "fail", "message": "invalid query"}))
    }
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/countries", get(|| async { Json(countries()) }))
        .route("/gzip", get(gzipped_countries))
        .route("/empty", get(|| async { Json(json!([])) }))
        .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/garbage", get(|| async { "<html>not json</html>" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([]))
            }),
        )
        .route(
            "/json",
            get(|| async { Json(json!({"status": "fail", "message": "reserved range"})) }),
        )
        .route("/json/:ip", get(ip_lookup));

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    addr
}

fn source(addr: SocketAddr, path: &str) -> HttpCountrySource {
    HttpCountrySource::new(https_client(), &format!("http://{addr}{path}"), None, TIMEOUT).unwrap()
}

fn app_state(addr: SocketAddr, path: &str) -> AppState {
    let geolocator =
        IpGeolocator::new(https_client(), &format!("http://{addr}/json"), TIMEOUT).unwrap();
    AppState::new(Arc::new(source(addr, path)), geolocator, Duration::ZERO)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_map(app: Router, uri: &str) -> MapResponse {
    let (status, body) = get_json(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn fetches_countries() {
    let addr = spawn_upstream().await;
    let countries = source(addr, "/countries").fetch_countries().await.unwrap();

    assert_eq!(countries.len(), 3);
    assert_eq!(countries[0].country, "USA");
    assert_eq!(countries[0].cases, 111820082);
    assert_eq!(countries[2].coordinates(), None);
}

#[tokio::test]
async fn decodes_gzip_body() {
    let addr = spawn_upstream().await;
    let countries = source(addr, "/gzip").fetch_countries().await.unwrap();

    assert_eq!(countries.len(), 3);
    assert_eq!(countries[1].country, "Tuvalu");
}

#[tokio::test]
async fn reports_upstream_failures() {
    let addr = spawn_upstream().await;

    let broken = source(addr, "/broken").fetch_countries().await;
    assert!(matches!(
        broken,
        Err(FetchError::Status(status)) if status == StatusCode::INTERNAL_SERVER_ERROR
    ));

    let garbage = source(addr, "/garbage").fetch_countries().await;
    assert!(matches!(garbage, Err(FetchError::Decode(_))));

    let slow = source(addr, "/slow").fetch_countries().await;
    assert!(matches!(slow, Err(FetchError::Timeout(_))));
}

#[tokio::test]
async fn locates_client_ip() {
    let addr = spawn_upstream().await;
    let geolocator =
        IpGeolocator::new(https_client(), &format!("http://{addr}/json"), TIMEOUT).unwrap();

    let london = geolocator
        .for_ip("203.0.113.7".parse().unwrap())
        .current_location()
        .await
        .unwrap();
    assert_eq!(london, Location { lat: 51.5074, lng: -0.1278 });

    let rejected = geolocator.current_location().await;
    assert!(matches!(
        rejected,
        Err(GeolocationError::Rejected(message)) if message == "reserved range"
    ));
}

#[tokio::test]
async fn serves_countries_and_features() {
    let addr = spawn_upstream().await;

    let (status, countries) = get_json(router(app_state(addr, "/countries")), "/countries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(countries.as_array().unwrap().len(), 3);
    assert_eq!(countries[0]["population"], 334805269);

    let (status, features) = get_json(router(app_state(addr, "/countries")), "/features").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(features["type"], "FeatureCollection");
    assert_eq!(features["features"].as_array().unwrap().len(), 2);
    assert_eq!(features["features"][1]["geometry"]["coordinates"], json!([178.0, -8.0]));
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let addr = spawn_upstream().await;
    let (status, body) = get_json(router(app_state(addr, "/broken")), "/features").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn map_renders_at_reported_location() {
    let addr = spawn_upstream().await;
    let response = get_map(router(app_state(addr, "/countries")), "/map?lat=48.85&lng=2.35").await;

    assert_eq!(response.effect, EffectState::Rendered);
    assert_eq!(response.map.viewport.center, Location { lat: 48.85, lng: 2.35 });
    assert_eq!(response.map.viewport.zoom, 2.5);
    assert_eq!(response.map.layers.len(), 1);

    let labels: Vec<_> = response.map.layers[0]
        .markers
        .iter()
        .map(|marker| marker.label.as_str())
        .collect();
    assert_eq!(labels, ["111820k+", "20"]);
    assert!(response.map.layers[0].markers[0].html.contains("<h2>USA</h2>"));
}

#[tokio::test]
async fn map_falls_back_to_default_location() {
    let addr = spawn_upstream().await;
    let response = get_map(router(app_state(addr, "/countries")), "/map").await;

    assert_eq!(response.effect, EffectState::Rendered);
    assert_eq!(response.map.viewport.center, Location { lat: 38.9072, lng: -77.0369 });
}

#[tokio::test]
async fn map_keeps_base_map_without_data() {
    let addr = spawn_upstream().await;

    for (path, reason) in [("/empty", AbortReason::NoData), ("/broken", AbortReason::FetchFailed)] {
        let response = get_map(router(app_state(addr, path)), "/map?lat=1&lng=1").await;

        assert_eq!(response.effect, EffectState::Aborted(reason));
        assert_eq!(response.map.viewport.center, Location { lat: 38.9072, lng: -77.0369 });
        assert_eq!(response.map.viewport.zoom, 2.0);
        assert!(response.map.layers.is_empty());
    }
}

#[tokio::test]
async fn map_treats_unusable_position_as_unknown() {
    let addr = spawn_upstream().await;

    for uri in ["/map?lat=&lng=", "/map?lat=abc&lng=1", "/map?lat=91&lng=0"] {
        let response = get_map(router(app_state(addr, "/countries")), uri).await;

        assert_eq!(response.effect, EffectState::Rendered);
        assert_eq!(response.map.viewport.center, Location { lat: 38.9072, lng: -77.0369 });
        assert_eq!(response.map.viewport.zoom, 2.5);
    }
}
