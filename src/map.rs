use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{CENTER, DEFAULT_BASE_MAP, DEFAULT_ZOOM};
use crate::location::Location;
use crate::marker::MarkerLayer;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ViewTarget {
    pub center: Location,
    pub zoom: f64,
}

/// What the map effect needs from whoever hosts the map.
#[async_trait]
pub trait MapHandle: Send + Sync {
    /// Animates the viewport; resolves once the animation has finished.
    async fn fly_to(&self, target: ViewTarget);

    fn add_layer(&self, layer: MarkerLayer);
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MapSnapshot {
    pub base_map: String,
    pub viewport: ViewTarget,
    pub layers: Vec<MarkerLayer>,
}

struct MapState {
    snapshot: MapSnapshot,
    closed: bool,
}

/// Server-side map for a single page view.
pub struct SessionMap {
    state: Mutex<MapState>,
    fly_duration: Duration,
}

impl SessionMap {
    pub fn new(fly_duration: Duration) -> Self {
        SessionMap {
            state: Mutex::new(MapState {
                snapshot: MapSnapshot {
                    base_map: DEFAULT_BASE_MAP.to_string(),
                    viewport: ViewTarget {
                        center: CENTER,
                        zoom: DEFAULT_ZOOM,
                    },
                    layers: vec![],
                },
                closed: false,
            }),
            fly_duration,
        }
    }

    fn state(&self) -> MutexGuard<'_, MapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.state().snapshot.clone()
    }

    /// Tears the map down. Later calls through [`MapHandle`] are dropped.
    pub fn close(&self) {
        self.state().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl MapHandle for SessionMap {
    async fn fly_to(&self, target: ViewTarget) {
        if self.is_closed() {
            warn!("fly_to on a closed map");
            return;
        }
        tokio::time::sleep(self.fly_duration).await;

        let mut state = self.state();
        if state.closed {
            warn!("map closed while flying");
            return;
        }
        debug!(
            lat = target.center.lat,
            lng = target.center.lng,
            zoom = target.zoom,
            "viewport settled"
        );
        state.snapshot.viewport = target;
    }

    fn add_layer(&self, layer: MarkerLayer) {
        let mut state = self.state();
        if state.closed {
            warn!(markers = layer.len(), "add_layer on a closed map");
            return;
        }
        state.snapshot.layers.push(layer);
    }
}
