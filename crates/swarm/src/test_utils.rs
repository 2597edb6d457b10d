use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
use url::Url;

use crate::error::SessionError;
use crate::http::{HttpClient, HttpRequest, HttpResponse};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer() // Write to test output
        .try_init();
}

#[derive(Debug, Clone)]
struct Scripted {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    /// Time the origin takes before answering
    delay: Option<Duration>,
}

/// A request as seen by [`FakeHttpClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: Url,
    pub name: &'static str,
    pub headers: HeaderMap,
    pub follow_redirects: bool,
}

/// In-memory [`HttpClient`] answering from scripted responses keyed by exact URL.
///
/// Unknown URLs answer 404. Every request is recorded.
#[derive(Debug, Default)]
pub struct FakeHttpClient {
    routes: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.script(url, status, body, None);
    }

    /// Like [`respond`](Self::respond), but every answer takes `delay` to arrive.
    pub fn respond_after(&self, url: &str, status: u16, body: &str, delay: Duration) {
        self.script(url, status, body, Some(delay));
    }

    fn script(&self, url: &str, status: u16, body: &str, delay: Option<Duration>) {
        self.routes.lock().insert(
            url.to_string(),
            Scripted {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body: Bytes::copy_from_slice(body.as_bytes()),
                delay,
            },
        );
    }

    pub fn redirect(&self, url: &str, location: &str) {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_str(location).unwrap());
        self.routes.lock().insert(
            url.to_string(),
            Scripted {
                status: StatusCode::FOUND,
                headers,
                body: Bytes::new(),
                delay: None,
            },
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_named(&self, name: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        self.requests.lock().push(RecordedRequest {
            url: request.url.clone(),
            name: request.name,
            headers: request.headers.clone(),
            follow_redirects: request.follow_redirects,
        });

        let scripted = self.routes.lock().get(request.url.as_str()).cloned();
        let scripted = scripted.unwrap_or(Scripted {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            delay: None,
        });
        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }

        let body_len = scripted.body.len() as u64;
        let body = if request.discard_body {
            Bytes::new()
        } else {
            scripted.body
        };
        Ok(HttpResponse {
            status: scripted.status,
            headers: scripted.headers,
            body,
            body_len,
        })
    }
}
