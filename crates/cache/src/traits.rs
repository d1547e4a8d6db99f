use std::collections::HashMap;

use hearth_core::{Entity, ListPage, QueryFilter, QueryKey};
use tokio::sync::broadcast;

use crate::error::CacheError;
use crate::record::{
    CacheEntry, CacheSnapshot, FetchStatus, InvalidationEvent, Payload, UpdateOutcome,
};

/// The query cache service consumed by the mutation layer.
///
/// A `QueryStore` is an explicit, injected object: it is created by its
/// implementation's constructor and ends with [`dispose`](Self::dispose).
/// After disposal every method that touches entries returns
/// `Err(CacheError::Disposed)`.
///
/// ## Write revisions
///
/// Every write to an entry (fresh data, in-place update, restore) stamps it
/// with a store-wide, strictly increasing `revision`. Callers use revisions
/// to detect whether anyone else wrote to an entry since they last did.
///
/// ## Snapshot semantics
///
/// 1. `patch_with_snapshot(keys, f)` copies the listed entries (or their
///    absence) and patches them under a single write lock, so no other
///    write can land between the copy and the patch.
/// 2. On failure, `restore(snapshot)` overwrites each key verbatim: payload,
///    staleness and fetch status go back to the captured values, and keys
///    that were absent are removed. Restoring the same snapshot again is a
///    no-op on observable content.
///
/// Concurrent patchers on the same key see each other's writes;
/// `restore_unchanged` lets a caller roll back only the entries nobody else
/// touched since its own patch.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one store can be shared
/// (behind an `Arc`) by every in-flight mutation and background task.
pub trait QueryStore: Send + Sync + 'static {
    // ── Reads ─────────────────────────────────────────────────────────────────

    fn get(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError>;

    /// All keys matched by `filter`, in key order.
    fn keys_matching(&self, filter: &QueryFilter) -> Result<Vec<QueryKey>, CacheError>;

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Store fresh data for `key`: clears the stale flag and sets the fetch
    /// status to `Idle`. Returns the new revision.
    ///
    /// Returns `Err(CacheError::KindMismatch)` if the payload kind does not
    /// fit the key's scope.
    fn set_data(&self, key: QueryKey, payload: Payload) -> Result<u64, CacheError>;

    /// Apply `patch` to the payload of `key` in place, under the store's
    /// write lock. The closure returns whether it changed anything; the
    /// revision is bumped only if it did. Staleness and fetch status are
    /// left alone.
    fn update(
        &self,
        key: &QueryKey,
        patch: &mut dyn FnMut(&mut Payload) -> bool,
    ) -> Result<UpdateOutcome, CacheError>;

    fn remove(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError>;

    fn set_fetch_status(&self, key: &QueryKey, status: FetchStatus) -> Result<(), CacheError>;

    // ── Snapshot / rollback ───────────────────────────────────────────────────

    fn snapshot(&self, keys: &[QueryKey]) -> Result<CacheSnapshot, CacheError>;

    /// Snapshot `keys`, then run `patch` on each entry present, all under
    /// one write lock. Returns the snapshot and the revision written per key
    /// the closure changed.
    ///
    /// Every patched payload is checked against its key's scope before any
    /// is stored; on `Err(CacheError::KindMismatch)` nothing was written.
    fn patch_with_snapshot(
        &self,
        keys: &[QueryKey],
        patch: &mut dyn FnMut(&QueryKey, &mut Payload) -> bool,
    ) -> Result<(CacheSnapshot, HashMap<QueryKey, u64>), CacheError>;

    /// Overwrite every key in `snapshot` with its captured state.
    fn restore(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError>;

    /// Restore only the keys whose current revision equals the one given in
    /// `expected` (keys missing from `expected` are skipped). The check and
    /// the write happen under one lock. Returns the keys that were skipped.
    fn restore_unchanged(
        &self,
        snapshot: &CacheSnapshot,
        expected: &HashMap<QueryKey, u64>,
    ) -> Result<Vec<QueryKey>, CacheError>;

    // ── Invalidation ──────────────────────────────────────────────────────────

    /// Mark every entry matched by `filter` stale and broadcast exactly one
    /// [`InvalidationEvent`]. Returns the keys marked.
    fn invalidate(&self, filter: &QueryFilter) -> Result<Vec<QueryKey>, CacheError>;

    fn subscribe(&self) -> Result<broadcast::Receiver<InvalidationEvent>, CacheError>;

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Drop every entry and close the invalidation channel. Idempotent.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    // ── Typed conveniences ────────────────────────────────────────────────────

    /// Parse `value` at the cache boundary and store it as fresh data.
    fn set_json(&self, key: QueryKey, value: &serde_json::Value) -> Result<u64, CacheError> {
        let payload = Payload::from_json(&key.scope, value).map_err(|source| CacheError::Shape {
            key: key.clone(),
            source,
        })?;
        self.set_data(key, payload)
    }

    fn list_page(&self, key: &QueryKey) -> Result<Option<ListPage>, CacheError> {
        Ok(self
            .get(key)?
            .and_then(|e| e.payload.as_list().cloned()))
    }

    fn detail(&self, key: &QueryKey) -> Result<Option<Entity>, CacheError> {
        Ok(self
            .get(key)?
            .and_then(|e| e.payload.as_detail().cloned()))
    }
}
