//! Live per-country case counts on a map.
//!
//! A [`effect::MapEffect`] fires once when a map is ready: it fetches the
//! country snapshot, works out where the viewer is, flies the viewport there
//! and attaches one marker per country. [`server`] hosts it over HTTP.

pub mod config;
pub mod constants;
pub mod covid;
pub mod effect;
pub mod error;
pub mod fetcher;
pub mod geojson;
pub mod location;
pub mod map;
pub mod marker;
pub mod server;
