//! The one-shot sequence run when a map becomes ready:
//! fetch, locate, fly, then drop the markers in.

use std::fmt::Display;

use chrono::{Local, TimeZone};
use once_cell::sync::OnceCell;
use serde_derive::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::ZOOM;
use crate::fetcher::CountrySource;
use crate::geojson::GeoFeatureCollection;
use crate::location::{resolve_location, Geolocator};
use crate::map::{MapHandle, ViewTarget};
use crate::marker::build_layer;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum EffectState {
    Idle,
    Fetching,
    Locating,
    Animating,
    Rendered,
    Aborted(AbortReason),
}

impl EffectState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EffectState::Rendered | EffectState::Aborted(_))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    FetchFailed,
    NoData,
    RenderFailed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fire {
    Completed(EffectState),
    AlreadyFired,
}

pub struct MapEffect<Tz: TimeZone = Local> {
    fired: OnceCell<()>,
    state: watch::Sender<EffectState>,
    tz: Tz,
}

impl MapEffect<Local> {
    pub fn new() -> Self {
        MapEffect::with_time_zone(Local)
    }
}

impl Default for MapEffect<Local> {
    fn default() -> Self {
        MapEffect::new()
    }
}

impl<Tz> MapEffect<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// `tz` is the zone "Last Update" times are shown in.
    pub fn with_time_zone(tz: Tz) -> Self {
        let (state, _) = watch::channel(EffectState::Idle);
        MapEffect {
            fired: OnceCell::new(),
            state,
            tz,
        }
    }

    pub fn state(&self) -> EffectState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EffectState> {
        self.state.subscribe()
    }

    /// Runs the sequence against `map`. Only the first call does anything;
    /// every later call returns [`Fire::AlreadyFired`].
    ///
    /// Failures never escape: a failed or empty fetch leaves the map as it
    /// was and ends in [`EffectState::Aborted`].
    pub async fn fire(
        &self,
        map: &dyn MapHandle,
        source: &dyn CountrySource,
        geolocator: &dyn Geolocator,
        cancel: &CancellationToken,
    ) -> Fire {
        if self.fired.set(()).is_err() {
            debug!("map effect already fired");
            return Fire::AlreadyFired;
        }
        Fire::Completed(self.run(map, source, geolocator, cancel).await)
    }

    async fn run(
        &self,
        map: &dyn MapHandle,
        source: &dyn CountrySource,
        geolocator: &dyn Geolocator,
        cancel: &CancellationToken,
    ) -> EffectState {
        if cancel.is_cancelled() {
            return self.abort(AbortReason::Cancelled);
        }
        self.transition(EffectState::Fetching);
        let countries = match source.fetch_countries().await {
            Ok(countries) => countries,
            Err(e) => {
                warn!(error = %e, "failed to fetch countries");
                return self.abort(AbortReason::FetchFailed);
            }
        };
        info!(count = countries.len(), "fetched countries");
        if countries.is_empty() {
            return self.abort(AbortReason::NoData);
        }

        if cancel.is_cancelled() {
            return self.abort(AbortReason::Cancelled);
        }
        self.transition(EffectState::Locating);
        let location = resolve_location(geolocator).await;

        if cancel.is_cancelled() {
            return self.abort(AbortReason::Cancelled);
        }
        self.transition(EffectState::Animating);
        map.fly_to(ViewTarget {
            center: location,
            zoom: ZOOM,
        })
        .await;

        if cancel.is_cancelled() {
            return self.abort(AbortReason::Cancelled);
        }
        let collection = GeoFeatureCollection::from_records(&countries);
        let layer = match build_layer(&collection, &self.tz) {
            Ok(layer) => layer,
            Err(e) => {
                warn!(error = %e, "failed to render markers");
                return self.abort(AbortReason::RenderFailed);
            }
        };
        info!(
            markers = layer.len(),
            skipped = countries.len() - collection.len(),
            "adding markers"
        );
        map.add_layer(layer);

        self.transition(EffectState::Rendered);
        EffectState::Rendered
    }

    fn transition(&self, next: EffectState) {
        debug!(from = ?self.state(), to = ?next, "map effect transition");
        self.state.send_replace(next);
    }

    fn abort(&self, reason: AbortReason) -> EffectState {
        let aborted = EffectState::Aborted(reason);
        self.transition(aborted);
        aborted
    }
}
