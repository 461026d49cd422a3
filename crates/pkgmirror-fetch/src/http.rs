use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body:   Bytes,
    /// The URL that produced the body, after any redirects the client followed.
    pub url:    String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations own redirect following, timeouts and content negotiation.
/// Non-2xx statuses are returned as responses, not errors; `Err` is reserved
/// for transport failures (DNS, connection reset, timeout).
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn send(&self, url: &str) -> impl Future<Output = Result<HttpResponse, Self::Error>> + Send;
}

/// Settings for the production client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub timeout:    Duration,
    pub proxy:      Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("pkgmirror/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout:    Duration::from_secs(60),
            proxy:      None,
        }
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use crate::error::{FetchError, Result};

    /// Production HTTP client backed by `reqwest`, with gzip negotiation enabled.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new(settings: ClientSettings) -> Result<Self> {
            let mut builder = reqwest::Client::builder()
                .gzip(true)
                .user_agent(settings.user_agent)
                .timeout(settings.timeout);

            if let Some(url) = settings.proxy {
                let proxy = reqwest::Proxy::all(&url).map_err(|source| FetchError::Proxy { url, source })?;
                builder = builder.proxy(proxy);
            }

            let client = builder.build().map_err(FetchError::ClientBuild)?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn send(&self, url: &str) -> std::result::Result<HttpResponse, Self::Error> {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let url = response.url().to_string();
            let body = response.bytes().await?;

            Ok(HttpResponse { status, body, url })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
