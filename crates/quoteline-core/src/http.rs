//! Blocking HTTP GET over async reqwest.
//!
//! Requests run on a small shared tokio runtime but present a sync interface
//! so rayon workers can call them directly.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::FetchError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default whole-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Final status and body of one GET (after redirects).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One GET request, shared read-only by every worker of a batch.
///
/// Implementations return `Err` only for transport faults; any HTTP status
/// (including 4xx/5xx) comes back as `Ok`.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, FetchError>;
}

/// Production transport. Build one per batch; dropping it closes the pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_max_idle_per_host(8)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        SHARED_RUNTIME.handle().block_on(async {
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request.send().await.map_err(FetchError::from_reqwest)?;
            let status = response.status().as_u16();
            // Only a 200 body is ever inspected
            if status != 200 {
                return Ok(HttpResponse::new(status, String::new()));
            }
            let body = response.text().await.map_err(FetchError::from_reqwest)?;
            Ok(HttpResponse::new(status, body))
        })
    }
}
