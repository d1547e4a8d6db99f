//! In-memory transport that replays scripted responses.
//!
//! Responses are taken from a FIFO queue first, then from persistent
//! routes keyed by method and path. A queued response can be deferred:
//! the request then blocks until the test resolves or rejects it through
//! the returned [`Responder`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

use super::{Method, Transport, TransportRequest};
use crate::error::TransportError;

type Reply = Result<serde_json::Value, TransportError>;

enum Scripted {
    Ready(Reply),
    Deferred(oneshot::Receiver<Reply>),
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    routes: HashMap<(Method, String), Reply>,
    log: Vec<TransportRequest>,
}

/// Scripted [`Transport`] for tests and offline demos.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    arrived: Notify,
}

/// Completes one deferred response.
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<Reply>,
}

impl Responder {
    pub fn resolve(self, body: serde_json::Value) {
        let _ = self.tx.send(Ok(body));
    }

    pub fn reject(self, error: TransportError) {
        let _ = self.tx.send(Err(error));
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `method path` request with `body` unless a queued
    /// response takes precedence.
    pub fn route(&self, method: Method, path: impl Into<String>, body: serde_json::Value) {
        self.lock().routes.insert((method, path.into()), Ok(body));
    }

    /// Fail every `method path` request with `error`.
    pub fn route_error(&self, method: Method, path: impl Into<String>, error: TransportError) {
        self.lock().routes.insert((method, path.into()), Err(error));
    }

    /// Queue a successful response for the next request.
    pub fn respond(&self, body: serde_json::Value) {
        self.lock().queue.push_back(Scripted::Ready(Ok(body)));
    }

    /// Queue a failure for the next request.
    pub fn fail(&self, error: TransportError) {
        self.lock().queue.push_back(Scripted::Ready(Err(error)));
    }

    /// Queue a response the caller completes later.
    pub fn defer(&self) -> Responder {
        let (tx, rx) = oneshot::channel();
        self.lock().queue.push_back(Scripted::Deferred(rx));
        Responder { tx }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.lock().log.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().log.len()
    }

    /// Wait until at least `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.request_count() >= count {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<serde_json::Value, TransportError> {
        let scripted = {
            let mut script = self.lock();
            let route = (request.method, request.path.clone());
            script.log.push(request.clone());
            match script.queue.pop_front() {
                Some(s) => Some(s),
                None => script.routes.get(&route).cloned().map(Scripted::Ready),
            }
        };
        self.arrived.notify_waiters();

        match scripted {
            Some(Scripted::Ready(reply)) => reply,
            Some(Scripted::Deferred(rx)) => rx.await.unwrap_or_else(|_| {
                Err(TransportError::Network {
                    message: "deferred response dropped".to_string(),
                })
            }),
            None => Err(TransportError::Network {
                message: format!(
                    "no scripted response for {} {}",
                    request.method, request.path
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn queue_takes_precedence_over_routes() {
        let t = ScriptedTransport::new();
        t.route(Method::Get, "/a", json!({"from": "route"}));
        t.respond(json!({"from": "queue"}));

        let first = t.send(TransportRequest::get("/a")).await.unwrap();
        let second = t.send(TransportRequest::get("/a")).await.unwrap();
        assert_eq!(first["from"], "queue");
        assert_eq!(second["from"], "route");
        assert_eq!(t.request_count(), 2);
    }

    #[tokio::test]
    async fn unscripted_request_fails() {
        let t = ScriptedTransport::new();
        let err = t.send(TransportRequest::get("/nothing")).await.unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
    }

    #[tokio::test]
    async fn deferred_response_waits_for_resolve() {
        let t = Arc::new(ScriptedTransport::new());
        let responder = t.defer();

        let task = {
            let t = t.clone();
            tokio::spawn(async move { t.send(TransportRequest::get("/slow")).await })
        };
        t.wait_for_requests(1).await;
        assert!(!task.is_finished());

        responder.resolve(json!({"ok": true}));
        let body = task.await.unwrap().unwrap();
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn dropped_responder_is_network_error() {
        let t = ScriptedTransport::new();
        drop(t.defer());
        let err = t.send(TransportRequest::get("/x")).await.unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
    }
}
