//! HTTP transport over `ureq`.
//!
//! `ureq` is synchronous, so every request runs inside
//! `tokio::task::spawn_blocking`.

use std::time::Duration;

use async_trait::async_trait;

use super::{Method, Transport, TransportRequest};
use crate::error::TransportError;

/// Environment variable consulted when no token is configured.
pub const TOKEN_ENV: &str = "HEARTH_API_TOKEN";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends JSON requests to `{base_url}{path}` with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `base_url`.
    ///
    /// The token comes from `auth_token` if given, then from the
    /// `HEARTH_API_TOKEN` environment variable.
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let auth_token = auth_token.or_else(|| std::env::var(TOKEN_ENV).ok());
        HttpTransport {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<serde_json::Value, TransportError> {
        if self.base_url.is_empty() {
            return Err(TransportError::Config {
                message: "base_url is empty".to_string(),
            });
        }

        let url = self.url_for(&request.path);
        let auth_token = self.auth_token.clone();
        let timeout = self.timeout;

        tracing::debug!(method = %request.method, url = %url, "sending request");

        tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build();
            let agent: ureq::Agent = config.into();
            let method = request.method;
            let path = request.path.clone();
            let query = request.query;
            let token = auth_token.as_deref();

            let result = match (method, request.body) {
                (Method::Get, _) => decorate(agent.get(&url), &query, token).call(),
                (Method::Delete, _) => decorate(agent.delete(&url), &query, token).call(),
                (Method::Post, Some(body)) => {
                    decorate(agent.post(&url), &query, token).send_json(&body)
                }
                (Method::Post, None) => decorate(agent.post(&url), &query, token).send_empty(),
                (Method::Patch, Some(body)) => {
                    decorate(agent.patch(&url), &query, token).send_json(&body)
                }
                (Method::Patch, None) => decorate(agent.patch(&url), &query, token).send_empty(),
            };

            let response = result.map_err(|e| match e {
                ureq::Error::StatusCode(status) => TransportError::Status {
                    method: method.as_str(),
                    path,
                    status,
                },
                other => TransportError::Network {
                    message: other.to_string(),
                },
            })?;

            let text = response
                .into_body()
                .read_to_string()
                .map_err(|e| TransportError::Network {
                    message: format!("failed to read response body: {}", e),
                })?;

            if text.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| TransportError::Decode {
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| TransportError::Network {
            message: format!("task join error: {}", e),
        })?
    }
}

fn decorate<B>(
    mut request: ureq::RequestBuilder<B>,
    query: &[(String, String)],
    token: Option<&str>,
) -> ureq::RequestBuilder<B> {
    for (name, value) in query {
        request = request.query(name, value);
    }
    request = request.header("Accept", "application/json");
    if let Some(token) = token {
        request = request.header("Authorization", &format!("Bearer {}", token));
    }
    request
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fake_api() -> Router {
        Router::new()
            .route(
                "/accommodations",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    Json(json!({
                        "items": [{"id": "a1", "name": "Cabin A"}],
                        "total": 1,
                        "page": q.get("page").cloned().unwrap_or_default(),
                    }))
                })
                .post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let mut created = body;
                    created["id"] = json!("srv-1");
                    created["auth"] = json!(auth);
                    (StatusCode::CREATED, Json(created))
                }),
            )
            .route(
                "/accommodations/{id}",
                axum::routing::delete(|Path(_id): Path<String>| async { StatusCode::NO_CONTENT }),
            )
            .route(
                "/broken",
                post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "nope") }),
            )
            .route("/garbage", get(|| async { "not json" }))
    }

    #[tokio::test]
    async fn get_passes_query_params() {
        let base = serve(fake_api()).await;
        let transport = HttpTransport::new(base, Some("t".into()));
        let body = transport
            .send(
                TransportRequest::get("/accommodations")
                    .with_query(vec![("page".into(), "2".into())]),
            )
            .await
            .unwrap();
        assert_eq!(body["page"], json!("2"));
        assert_eq!(body["total"], json!(1));
    }

    #[tokio::test]
    async fn post_sends_body_and_bearer_token() {
        let base = serve(fake_api()).await;
        let transport = HttpTransport::new(base, Some("secret".into()));
        let body = transport
            .send(TransportRequest::new(
                Method::Post,
                "/accommodations",
                Some(json!({"name": "Cabin A"})),
            ))
            .await
            .unwrap();
        assert_eq!(body["id"], json!("srv-1"));
        assert_eq!(body["name"], json!("Cabin A"));
        assert_eq!(body["auth"], json!("Bearer secret"));
    }

    #[tokio::test]
    async fn empty_body_decodes_to_null() {
        let base = serve(fake_api()).await;
        let transport = HttpTransport::new(base, None);
        let body = transport
            .send(TransportRequest::new(Method::Delete, "/accommodations/a1", None))
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn error_status_maps_to_status_error() {
        let base = serve(fake_api()).await;
        let transport = HttpTransport::new(base, None);
        let err = transport
            .send(TransportRequest::new(Method::Post, "/broken", Some(json!({}))))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                method: "POST",
                path: "/broken".into(),
                status: 422,
            }
        );
    }

    #[tokio::test]
    async fn non_json_body_is_decode_error() {
        let base = serve(fake_api()).await;
        let transport = HttpTransport::new(base, None);
        let err = transport
            .send(TransportRequest::get("/garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1", None)
            .with_timeout(Duration::from_secs(2));
        let err = transport
            .send(TransportRequest::get("/accommodations"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
    }

    #[test]
    fn url_joining() {
        let t = HttpTransport::new("http://localhost:8080/api/", None);
        assert_eq!(t.base_url(), "http://localhost:8080/api");
        assert_eq!(t.url_for("/items"), "http://localhost:8080/api/items");
        assert_eq!(t.url_for("items"), "http://localhost:8080/api/items");
    }
}
