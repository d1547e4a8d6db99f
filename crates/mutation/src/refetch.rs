//! Fetching query results into the cache, and the background refetcher
//! that reacts to invalidation.

use std::sync::Arc;

use hearth_cache::{FetchStatus, QueryStore};
use hearth_core::{Entity, KeyScope, ListPage, QueryKey};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{EntityConfig, EntityRegistry};
use crate::error::MutationError;
use crate::transport::{Transport, TransportRequest};

/// Fetch the list page for `key` and store it as fresh data.
///
/// The key's params become the query string. While the request runs the
/// entry (if cached) is marked `Fetching`; a failure marks it `Failed` and
/// leaves the data in place.
pub async fn fetch_list(
    store: &dyn QueryStore,
    transport: &dyn Transport,
    config: &EntityConfig,
    key: &QueryKey,
) -> Result<ListPage, MutationError> {
    let path = config.list_target()?;
    let request = TransportRequest::get(path).with_query(key.query_pairs());
    let value = fetch_into(store, transport, config, key, request).await?;
    ListPage::from_json(&value).map_err(|e| MutationError::ResponseValidation {
        message: e.to_string(),
    })
}

/// Fetch one entity for a detail `key` and store it as fresh data.
pub async fn fetch_detail(
    store: &dyn QueryStore,
    transport: &dyn Transport,
    config: &EntityConfig,
    key: &QueryKey,
) -> Result<Entity, MutationError> {
    let id = key.detail_id().ok_or_else(|| MutationError::Unsupported {
        entity: config.entity.clone(),
        operation: "detail fetch of a list key",
    })?;
    let path = config.detail_target(id)?;
    let value = fetch_into(store, transport, config, key, TransportRequest::get(path)).await?;
    Entity::from_json(&value).map_err(|e| MutationError::ResponseValidation {
        message: e.to_string(),
    })
}

/// Refetch `key` through whichever fetch its scope calls for.
pub async fn refetch(
    store: &dyn QueryStore,
    transport: &dyn Transport,
    config: &EntityConfig,
    key: &QueryKey,
) -> Result<(), MutationError> {
    match key.scope {
        KeyScope::List => fetch_list(store, transport, config, key).await.map(|_| ()),
        KeyScope::Detail(_) => fetch_detail(store, transport, config, key)
            .await
            .map(|_| ()),
    }
}

async fn fetch_into(
    store: &dyn QueryStore,
    transport: &dyn Transport,
    config: &EntityConfig,
    key: &QueryKey,
    request: TransportRequest,
) -> Result<serde_json::Value, MutationError> {
    store.set_fetch_status(key, FetchStatus::Fetching)?;
    debug!(key = %key, path = %request.path, "fetching");

    let result = match transport.send(request).await {
        Ok(body) => config.unwrap_response(body),
        Err(e) => Err(e.into()),
    };
    let stored = result.and_then(|value| {
        store.set_json(key.clone(), &value)?;
        Ok(value)
    });

    if let Err(err) = &stored {
        warn!(key = %key, error = %err, "fetch failed");
        store.set_fetch_status(key, FetchStatus::Failed(err.to_string()))?;
    }
    stored
}

// ──────────────────────────────────────────────
// BackgroundRefetcher
// ──────────────────────────────────────────────

/// Refetches stale entries whenever the store broadcasts an invalidation.
///
/// Only keys still stale when the event is handled are refetched, and only
/// for entities present in the registry. The task ends when the store is
/// disposed or [`abort`](Self::abort) is called.
#[derive(Debug)]
pub struct BackgroundRefetcher {
    task: JoinHandle<()>,
}

impl BackgroundRefetcher {
    /// Subscribe to `store` and start the refetch loop on the current
    /// Tokio runtime.
    pub fn spawn(
        store: Arc<dyn QueryStore>,
        transport: Arc<dyn Transport>,
        registry: Arc<EntityRegistry>,
    ) -> Result<Self, MutationError> {
        let mut events = store.subscribe()?;

        let task = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "refetcher lagged behind invalidations");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                for key in &event.keys {
                    let Some(config) = registry.get(&key.entity) else {
                        continue;
                    };
                    let still_stale = match store.get(key) {
                        Ok(entry) => entry.map(|e| e.stale).unwrap_or(false),
                        Err(_) => return,
                    };
                    if !still_stale {
                        continue;
                    }
                    if let Err(e) = refetch(store.as_ref(), transport.as_ref(), config, key).await {
                        debug!(key = %key, error = %e, "background refetch failed");
                    }
                }
            }
            debug!("refetcher stopped");
        });

        Ok(BackgroundRefetcher { task })
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
