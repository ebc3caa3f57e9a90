//! `reqwest`-backed [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use super::{Request, Response, Transport};
use crate::error::Error;

const JSON: &str = "application/json";

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Timeout for establishing a connection. Requests themselves carry their
    /// own (optional) timeout, since the change feed must be allowed to idle.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("couch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Sends JSON requests below a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

/// Builder for [`HttpTransport`].
pub struct HttpTransportBuilder {
    base_url: Url,
    config: HttpClientConfig,
}

impl HttpTransportBuilder {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            config: HttpClientConfig::default(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpTransport, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .user_agent(self.config.user_agent)
            .build()?;

        Ok(HttpTransport {
            client,
            base_url: self.base_url,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url(&self.base_url)?;
        trace!("{:?} {}", request.method(), url);

        let mut builder = self
            .client
            .request(request.method().into(), url)
            .header(ACCEPT, JSON)
            .header(CONTENT_TYPE, JSON);
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        let bytes = response.bytes().await?;

        Response::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            Some(final_url),
            parse_body(&bytes),
        )
    }
}

/// Bodies that are empty or not JSON surface as `null` rather than an error;
/// callers decide whether a `null` payload is acceptable.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|e| {
        debug!("Response body is not JSON: {e}");
        Value::Null
    })
}
