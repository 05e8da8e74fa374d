use hyper::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("upstream returned {0}")]
    Status(StatusCode),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to decompress body: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GeolocationError {
    #[error("lookup request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("lookup rejected: {0}")]
    Rejected(String),
    #[error("coordinates out of range: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },
}

#[derive(Debug, Error)]
pub enum UrlError {
    #[error(transparent)]
    Parse(#[from] hyper::http::uri::InvalidUri),
    #[error("scheme and host are required")]
    NotAbsolute,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name} url {value:?}: {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        source: UrlError,
    },
}
