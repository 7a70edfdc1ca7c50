//! HTTP transport abstraction.
//!
//! Every request the SDK makes goes through a [`Transport`]. The default
//! [`ReqwestTransport`] is backed by `reqwest`; tests and embedders can plug
//! in their own implementation with [`HubcapBuilder::transport`].
//!
//! A transport must report an elapsed request timeout as
//! [`TransportError::Timeout`] rather than a generic failure: long-poll
//! retrieval relies on that distinction.
//!
//! [`HubcapBuilder::transport`]: crate::HubcapBuilder::transport

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::error::{HubcapError, Result};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Per-request timeout overriding the transport default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Authorize the request with a resource capability.
    pub fn capability(self, token: &str) -> Self {
        self.header("Authorization", format!("Capability {}", token))
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Look up a request header by name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a query parameter by name.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A minimal HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,

    /// The response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a response with a JSON body.
    pub fn json<T: Serialize>(status: u16, body: &T) -> Result<Self> {
        Ok(Self::new(status, serde_json::to_vec(body)?))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-success status into an error, otherwise decode the body.
    pub(crate) fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        if !self.is_success() {
            return Err(HubcapError::from_status(self.status, self.text()));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-success status into an error, discarding the body.
    pub(crate) fn into_empty(self) -> Result<()> {
        if !self.is_success() {
            return Err(HubcapError::from_status(self.status, self.text()));
        }
        Ok(())
    }
}

/// Failure reported by a [`Transport`].
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request timeout elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// Any other network or protocol failure.
    #[error("request failed: {0}")]
    Failed(String),
}

impl From<TransportError> for HubcapError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => HubcapError::Timeout,
            TransportError::Failed(msg) => HubcapError::Transport(msg),
        }
    }
}

/// A minimal async HTTP client.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request and return the response, whatever its status.
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// A [`reqwest`]-backed implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `timeout` by default.
    pub fn new(timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HubcapError::transport(e.to_string()))?;
        Ok(Self { inner })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Failed(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = self.inner.request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();

        let body = resp.bytes().await.map_err(map_reqwest_error)?.to_vec();

        Ok(HttpResponse { status, body })
    }
}
