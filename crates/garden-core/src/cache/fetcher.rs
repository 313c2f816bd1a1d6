use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use super::request::Response;
use crate::error::CacheError;

/// Network access for the cache controller.
///
/// Futures are not required to be `Send`: the controller runs on a single
/// cooperative thread, like the worker context it models.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &Url) -> Result<Response, CacheError>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, CacheError> {
        Self::with_timeout(Duration::from_secs(15))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Response, CacheError> {
        let network_error = |e: reqwest::Error| CacheError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status().as_u16();
        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(network_error)?.to_vec();

        tracing::debug!(url = %url, status, bytes = body.len(), "fetched from network");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
