//! Reqwest-based implementation of the `HttpTransport` trait.
//!
//! Wraps a `reqwest::Client` bound to the run's cookie store, with gzip,
//! deflate and brotli decoding enabled, and converts its responses into
//! [`FetchResponse`].

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap as HttpHeaderMap, HeaderName as HttpHeaderName, HeaderValue as HttpHeaderValue};
use reqwest::Client;
use reqwest::header::HeaderMap;
use url::Url;

use super::cookies::CookieStore;
use super::fetch::{FetchResponse, HttpTransport, TransportError};

const DEFAULT_USER_AGENT: &str = concat!("web-archiver/", env!("CARGO_PKG_VERSION"));

/// Reqwest-backed transport shared by every fetch of a run.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a client that reads and writes `cookies`.
    ///
    /// No client-level timeout is set; deadlines belong to
    /// [`TimedFetcher`](super::fetch::TimedFetcher).
    pub fn new(cookies: Arc<CookieStore>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .cookie_provider(cookies)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<FetchResponse, TransportError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        to_fetch_response(response).await
    }
}

async fn to_fetch_response(response: reqwest::Response) -> Result<FetchResponse, TransportError> {
    let status = response.status().as_u16();
    let headers = convert_back_headers(response.headers())?;
    let url = response.url().clone();
    let body = response
        .bytes()
        .await
        .map_err(|err| TransportError::Transport(err.to_string()))?;

    Ok(FetchResponse {
        status,
        headers,
        body,
        url,
    })
}

fn convert_back_headers(map: &HeaderMap) -> Result<HttpHeaderMap, TransportError> {
    let mut headers = HttpHeaderMap::new();
    for (name, value) in map.iter() {
        let http_name = HttpHeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        let http_value = HttpHeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        headers.append(http_name, http_value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cookies::CookieRecord;

    #[test]
    fn builds_with_shared_cookie_store() {
        let cookies = Arc::new(CookieStore::from_records([CookieRecord::new("example.com", "a", "b")]));
        let transport = ReqwestTransport::new(cookies.clone()).unwrap();
        assert!(Arc::strong_count(&cookies) > 1);
        drop(transport);
        assert_eq!(Arc::strong_count(&cookies), 1);
    }

    #[test]
    fn header_conversion_keeps_repeated_values() {
        let mut map = HeaderMap::new();
        map.append("set-cookie", "a=1".parse().unwrap());
        map.append("set-cookie", "b=2".parse().unwrap());

        let converted = convert_back_headers(&map).unwrap();
        assert_eq!(converted.get_all("set-cookie").iter().count(), 2);
    }
}
