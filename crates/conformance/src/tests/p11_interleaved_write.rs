//! P11: A write that lands while another mutation is taking its snapshot
//! is never undone by that mutation's rollback.
//!
//! Mutation A settles (its provisional entity is reconciled with the
//! server's) at the moment B captures and patches the list. B then fails.
//! The list must hold A's server entity and no provisional entity at all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hearth_cache::{
    CacheEntry, CacheError, CacheSnapshot, FetchStatus, InvalidationEvent, Payload, QueryStore,
    UpdateOutcome,
};
use hearth_core::{Entity, QueryFilter, QueryKey};
use hearth_mutation::{
    MutationCallbacks, MutationExecutor, MutationKind, OptimisticPatch, TransportError,
};
use serde_json::json;
use tokio::sync::broadcast;

use crate::fixtures::{Rig, ENTITY};
use crate::traits::TestableStore;

type Hook = Box<dyn FnOnce(&dyn QueryStore) -> Result<(), CacheError> + Send>;

/// Delegates to `inner`, running `hook` once on the first snapshot request:
/// right after a plain `snapshot`, or right before a `patch_with_snapshot`.
struct Interleaving {
    inner: Arc<dyn QueryStore>,
    hook: Mutex<Option<Hook>>,
    fired: Mutex<Option<Result<(), CacheError>>>,
}

impl Interleaving {
    fn new(inner: Arc<dyn QueryStore>, hook: Hook) -> Self {
        Interleaving {
            inner,
            hook: Mutex::new(Some(hook)),
            fired: Mutex::new(None),
        }
    }

    fn fire(&self) {
        let hook = self.hook.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(hook) = hook {
            let result = hook(self.inner.as_ref());
            *self.fired.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        }
    }

    fn fired(&self) -> Option<Result<(), CacheError>> {
        self.fired.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl QueryStore for Interleaving {
    fn get(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        self.inner.get(key)
    }

    fn keys_matching(&self, filter: &QueryFilter) -> Result<Vec<QueryKey>, CacheError> {
        self.inner.keys_matching(filter)
    }

    fn set_data(&self, key: QueryKey, payload: Payload) -> Result<u64, CacheError> {
        self.inner.set_data(key, payload)
    }

    fn update(
        &self,
        key: &QueryKey,
        patch: &mut dyn FnMut(&mut Payload) -> bool,
    ) -> Result<UpdateOutcome, CacheError> {
        self.inner.update(key, patch)
    }

    fn remove(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        self.inner.remove(key)
    }

    fn set_fetch_status(&self, key: &QueryKey, status: FetchStatus) -> Result<(), CacheError> {
        self.inner.set_fetch_status(key, status)
    }

    fn snapshot(&self, keys: &[QueryKey]) -> Result<CacheSnapshot, CacheError> {
        let snapshot = self.inner.snapshot(keys)?;
        self.fire();
        Ok(snapshot)
    }

    fn patch_with_snapshot(
        &self,
        keys: &[QueryKey],
        patch: &mut dyn FnMut(&QueryKey, &mut Payload) -> bool,
    ) -> Result<(CacheSnapshot, HashMap<QueryKey, u64>), CacheError> {
        self.fire();
        self.inner.patch_with_snapshot(keys, patch)
    }

    fn restore(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        self.inner.restore(snapshot)
    }

    fn restore_unchanged(
        &self,
        snapshot: &CacheSnapshot,
        expected: &HashMap<QueryKey, u64>,
    ) -> Result<Vec<QueryKey>, CacheError> {
        self.inner.restore_unchanged(snapshot, expected)
    }

    fn invalidate(&self, filter: &QueryFilter) -> Result<Vec<QueryKey>, CacheError> {
        self.inner.invalidate(filter)
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<InvalidationEvent>, CacheError> {
        self.inner.subscribe()
    }

    fn dispose(&self) {
        self.inner.dispose()
    }

    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

pub async fn test_p11_interleaved_write<T: TestableStore>(subject: &T) -> Result<(), String> {
    let rig = Rig::new(subject)?;

    let payload = json!({"name": "Cabin A"})
        .as_object()
        .cloned()
        .ok_or_else(|| "P11: payload is not an object".to_string())?;
    let first = OptimisticPatch::new(ENTITY, MutationKind::Create, payload);
    let first_ctx = first
        .apply(rig.store.as_ref())
        .map_err(|e| format!("P11: applying A failed: {}", e))?;
    let server = Entity::from_json(&json!({"id": "srv-1", "name": "Cabin A"}))
        .map_err(|e| format!("P11: server entity: {}", e))?;

    let store = Arc::new(Interleaving::new(
        rig.store.clone(),
        Box::new(move |inner: &dyn QueryStore| first.reconcile(inner, &first_ctx, Some(&server))),
    ));
    let executor = MutationExecutor::new(store.clone(), rig.transport.clone());

    let second = executor
        .prepare(&rig.config, MutationKind::Create, json!({"name": "Cabin B"}))
        .map_err(|e| format!("P11: prepare B failed: {}", e))?;
    let second = executor.begin(second, MutationCallbacks::new());

    match store.fired() {
        Some(Ok(())) => {}
        Some(Err(e)) => return Err(format!("P11: reconciling A failed: {}", e)),
        None => return Err("P11: A never settled while B was starting".to_string()),
    }

    rig.transport.fail(TransportError::Status {
        method: "POST",
        path: "/accommodations".into(),
        status: 500,
    });
    let failed = executor.finish(second).await;
    if failed.is_success() {
        return Err("P11: B should have failed".to_string());
    }

    let end = rig.page()?;
    if end.has_provisional() {
        return Err(format!(
            "P11: a provisional entity survived both settlements: {}",
            end.to_json()
        ));
    }
    let ids: Vec<&str> = end.items.iter().map(|e| e.id.as_str()).collect();
    if ids != ["srv-1", "a1", "a2", "a3"] || end.total != 4 {
        return Err(format!(
            "P11: expected A's server entity ahead of the seed, got {}",
            end.to_json()
        ));
    }
    Ok(())
}
