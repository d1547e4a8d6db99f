//! Request transport seam.
//!
//! The executor and the refetcher talk to the server only through the
//! [`Transport`] trait. [`HttpTransport`] sends real requests; the
//! [`ScriptedTransport`] replays canned responses for tests and lets a test
//! hold a response back until it decides to resolve it.

#[cfg(feature = "http")]
pub mod http;
pub mod scripted;

use std::fmt;

use async_trait::async_trait;

use crate::error::TransportError;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use scripted::{Responder, ScriptedTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing request. `path` is relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        TransportRequest {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn new(method: Method, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        TransportRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// Sends a request and returns the decoded JSON response body.
///
/// A non-success status must surface as [`TransportError::Status`]. An
/// empty success body decodes to `Value::Null`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<serde_json::Value, TransportError>;
}
