// HTTP capability consumed by the session loops.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, redirect};
use tracing::trace;
use url::Url;

use crate::config::HttpConfig;
use crate::error::SessionError;
use crate::metrics::RequestMetrics;

/// A GET request issued by a session.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    /// Label the request is reported under
    pub name: &'static str,
    pub headers: HeaderMap,
    pub follow_redirects: bool,
    /// Read the body to the end but keep none of it
    pub discard_body: bool,
}

impl HttpRequest {
    pub fn get(url: Url, name: &'static str) -> Self {
        Self {
            url,
            name,
            headers: HeaderMap::new(),
            follow_redirects: true,
            discard_body: false,
        }
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn discarding_body(mut self) -> Self {
        self.discard_body = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Empty when the request asked for the body to be discarded
    pub body: Bytes,
    /// Number of body bytes received
    pub body_len: u64,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues the request and returns the raw status, including 3xx when
    /// redirects are not followed. Non-success statuses are not errors here.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, SessionError>;
}

/// Builds a reqwest client from the shared HTTP configuration.
pub fn create_client(config: &HttpConfig, follow_redirects: bool) -> Result<Client, SessionError> {
    // Already installed when a second client is built; either way a provider is present.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let policy = if follow_redirects {
        redirect::Policy::default()
    } else {
        redirect::Policy::none()
    };

    let client = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .user_agent(config.user_agent.as_str())
        .default_headers(config.headers.clone())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .redirect(policy)
        .build()?;
    Ok(client)
}

/// [`HttpClient`] backed by reqwest, recording every request in [`RequestMetrics`].
pub struct ReqwestHttpClient {
    client: Client,
    no_redirect_client: Client,
    metrics: Option<Arc<RequestMetrics>>,
}

impl ReqwestHttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, SessionError> {
        Ok(Self {
            client: create_client(config, true)?,
            no_redirect_client: create_client(config, false)?,
            metrics: None,
        })
    }

    pub fn with_metrics(config: &HttpConfig, metrics: Arc<RequestMetrics>) -> Result<Self, SessionError> {
        let mut client = Self::new(config)?;
        client.metrics = Some(metrics);
        Ok(client)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let mut response = client.get(request.url).headers(request.headers).send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        let (body, body_len) = if request.discard_body {
            let mut received = 0u64;
            while let Some(chunk) = response.chunk().await? {
                received += chunk.len() as u64;
            }
            (Bytes::new(), received)
        } else {
            let body = response.bytes().await?;
            let len = body.len() as u64;
            (body, len)
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
            body_len,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        let name = request.name;
        let url = request.url.clone();
        let start = Instant::now();
        let result = self.send(request).await;
        let latency = start.elapsed();

        match result {
            Ok(response) => {
                trace!(%url, label = name, status = %response.status, ?latency, "Request completed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_response(name, response.status.as_u16(), response.body_len, latency);
                }
                Ok(response)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(name, latency);
                }
                Err(e.into())
            }
        }
    }
}
