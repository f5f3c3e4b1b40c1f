//! Network fetch seam.
//!
//! The worker talks to the live origin through the `Fetcher` trait so
//! tests can script responses and failures. The production
//! implementation is `HttpFetcher`, backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::WorkerError;
use crate::policy::FetchRequest;
use crate::store::StoredResponse;

/// HTTP request timeout in seconds.
/// 30s allows for slow origin responses while still failing fast enough
/// to reach the offline fallback path.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A live response from the network.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// Whether this response is eligible for caching (status 200 only).
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

impl From<FetchedResponse> for StoredResponse {
    fn from(fetched: FetchedResponse) -> Self {
        StoredResponse::new(fetched.status, fetched.headers, fetched.body)
    }
}

/// Fetches live resources for the worker.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, WorkerError>;
}

/// Network fetcher backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, WorkerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| WorkerError::Network(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, WorkerError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| WorkerError::Config(format!("Invalid HTTP method: {}", request.method)))?;

        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await
            .map_err(|e| WorkerError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| WorkerError::Network(e.to_string()))?
            .to_vec();

        Ok(FetchedResponse { status, headers, body })
    }
}
