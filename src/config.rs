use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::constants::{COUNTRIES_URL, GEOLOCATION_URL};

/// Serves the live case map.
#[derive(Parser, Debug, Clone)]
#[command(name = "covidmap", version, about)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "COVIDMAP_BIND", default_value = "0.0.0.0:4000")]
    pub bind: SocketAddr,

    /// Endpoint returning the per-country snapshot.
    #[arg(long, env = "COVIDMAP_COUNTRIES_URL", default_value = COUNTRIES_URL)]
    pub countries_url: String,

    /// Upstream sort key, e.g. `cases`.
    #[arg(long, env = "COVIDMAP_SORT")]
    pub sort: Option<String>,

    /// ip-api.com compatible lookup endpoint.
    #[arg(long, env = "COVIDMAP_GEOLOCATION_URL", default_value = GEOLOCATION_URL)]
    pub geolocation_url: String,

    #[arg(long, env = "COVIDMAP_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// How long a viewport fly-to takes.
    #[arg(long, env = "COVIDMAP_FLY_DURATION_MS", default_value_t = 250)]
    pub fly_duration_ms: u64,
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn fly_duration(&self) -> Duration {
        Duration::from_millis(self.fly_duration_ms)
    }
}
