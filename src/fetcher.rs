use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING};
use hyper::{body, Body, Client, Method, Request, Uri};
use hyper_tls::HttpsConnector;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::covid::CountryRecord;
use crate::error::{FetchError, UrlError};

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

pub fn https_client() -> HttpsClient {
    Client::builder().build::<_, Body>(HttpsConnector::new())
}

/// Anything that can hand over a snapshot of per-country case data.
#[async_trait]
pub trait CountrySource: Send + Sync {
    async fn fetch_countries(&self) -> Result<Vec<CountryRecord>, FetchError>;
}

/// Fetches the snapshot from a disease.sh compatible endpoint.
#[derive(Clone)]
pub struct HttpCountrySource {
    client: HttpsClient,
    uri: Uri,
    timeout: Duration,
}

impl HttpCountrySource {
    pub fn new(
        client: HttpsClient,
        url: &str,
        sort: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, UrlError> {
        let uri = match sort {
            Some(sort) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                absolute_uri(&format!("{url}{separator}sort={}", urlencoding::encode(sort)))?
            }
            None => absolute_uri(url)?,
        };

        Ok(HttpCountrySource { client, uri, timeout })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }
}

#[async_trait]
impl CountrySource for HttpCountrySource {
    async fn fetch_countries(&self) -> Result<Vec<CountryRecord>, FetchError> {
        let countries: Vec<CountryRecord> =
            get_json(&self.client, self.uri.clone(), self.timeout).await?;
        debug!(count = countries.len(), uri = %self.uri, "fetched countries");
        Ok(countries)
    }
}

/// A fixed snapshot, handy for fixtures and offline runs.
#[derive(Clone, Debug, Default)]
pub struct StaticCountrySource(pub Vec<CountryRecord>);

#[async_trait]
impl CountrySource for StaticCountrySource {
    async fn fetch_countries(&self) -> Result<Vec<CountryRecord>, FetchError> {
        Ok(self.0.clone())
    }
}

/// Parses `url`, refusing anything hyper's client can't send on its own.
pub(crate) fn absolute_uri(url: &str) -> Result<Uri, UrlError> {
    let uri: Uri = url.parse()?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(UrlError::NotAbsolute);
    }
    Ok(uri)
}

/// One GET with a JSON body, gzip-aware, bounded by `timeout` end to end.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &HttpsClient,
    uri: Uri,
    timeout: Duration,
) -> Result<T, FetchError> {
    let request = Request::builder()
        .uri(uri)
        .method(Method::GET)
        .header(ACCEPT, "application/json")
        .header(ACCEPT_ENCODING, "gzip")
        .body(Body::empty())?;

    let exchange = async {
        let resp = client.request(request).await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }

        let gzipped = resp
            .headers()
            .get(CONTENT_ENCODING)
            .map_or(false, |encoding| encoding.as_bytes().eq_ignore_ascii_case(b"gzip"));
        let bytes = body::to_bytes(resp.into_body()).await?;
        Ok::<_, FetchError>((gzipped, bytes))
    };

    let (gzipped, bytes) = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;

    if gzipped {
        let mut gz = GzDecoder::new(&*bytes);
        let mut decoded_bytes: Vec<u8> = vec![];
        gz.read_to_end(&mut decoded_bytes)?;
        Ok(serde_json::from_slice(&decoded_bytes)?)
    } else {
        Ok(serde_json::from_slice(&bytes)?)
    }
}
