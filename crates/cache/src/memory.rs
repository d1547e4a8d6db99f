//! In-memory [`QueryStore`]: the process-wide query cache service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hearth_core::{QueryFilter, QueryKey};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::record::{
    CacheEntry, CacheSnapshot, FetchStatus, InvalidationEvent, Payload, UpdateOutcome,
};
use crate::traits::QueryStore;

struct Inner {
    entries: HashMap<QueryKey, CacheEntry>,
    last_revision: u64,
    invalidations: u64,
    disposed: bool,
}

impl Inner {
    fn next_revision(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }

    fn check_open(&self) -> Result<(), CacheError> {
        if self.disposed {
            Err(CacheError::Disposed)
        } else {
            Ok(())
        }
    }

    fn restore_key(&mut self, key: &QueryKey, captured: &Option<CacheEntry>) {
        match captured {
            Some(entry) => {
                let revision = self.next_revision();
                self.entries.insert(
                    key.clone(),
                    CacheEntry {
                        revision,
                        ..entry.clone()
                    },
                );
            }
            None => {
                self.entries.remove(key);
            }
        }
    }
}

/// The default query cache: a `HashMap` behind an `RwLock`, plus a
/// broadcast channel for invalidation events.
///
/// Construct with [`QueryCache::init`]; share the returned `Arc`.
pub struct QueryCache {
    config: CacheConfig,
    inner: RwLock<Inner>,
    events: Mutex<Option<broadcast::Sender<InvalidationEvent>>>,
}

impl QueryCache {
    pub fn init(config: CacheConfig) -> Arc<Self> {
        let (tx, _) = broadcast::channel(config.event_capacity.max(1));
        debug!(stale_time_secs = config.stale_time().as_secs(), "query cache initialized");
        Arc::new(QueryCache {
            config,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                last_revision: 0,
                invalidations: 0,
                disposed: false,
            }),
            events: Mutex::new(Some(tx)),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total `invalidate` calls since init.
    pub fn invalidation_count(&self) -> u64 {
        self.read().invalidations
    }

    /// Keys whose data is stale right now (invalidated or past `stale_time`).
    pub fn stale_keys(&self) -> Vec<QueryKey> {
        let now = OffsetDateTime::now_utc();
        let stale_time = self.config.stale_time();
        let inner = self.read();
        let mut keys: Vec<QueryKey> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_stale(now, stale_time))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    // Recover data even if the lock was poisoned by a panic in another thread
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl QueryStore for QueryCache {
    fn get(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        let inner = self.read();
        inner.check_open()?;
        Ok(inner.entries.get(key).cloned())
    }

    fn keys_matching(&self, filter: &QueryFilter) -> Result<Vec<QueryKey>, CacheError> {
        let inner = self.read();
        inner.check_open()?;
        let mut keys: Vec<QueryKey> = inner
            .entries
            .keys()
            .filter(|k| filter.matches(k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn set_data(&self, key: QueryKey, payload: Payload) -> Result<u64, CacheError> {
        if !payload.fits(&key.scope) {
            return Err(CacheError::KindMismatch {
                expected: Payload::kind_for(&key.scope),
                key,
            });
        }
        let mut inner = self.write();
        inner.check_open()?;
        let revision = inner.next_revision();
        trace!(key = %key, revision, "cache set");
        inner.entries.insert(
            key,
            CacheEntry {
                payload,
                stale: false,
                fetch_status: FetchStatus::Idle,
                revision,
                updated_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(revision)
    }

    fn update(
        &self,
        key: &QueryKey,
        patch: &mut dyn FnMut(&mut Payload) -> bool,
    ) -> Result<UpdateOutcome, CacheError> {
        let mut inner = self.write();
        inner.check_open()?;
        let Some(mut payload) = inner.entries.get(key).map(|e| e.payload.clone()) else {
            return Ok(UpdateOutcome::Missing);
        };
        if !patch(&mut payload) {
            return Ok(UpdateOutcome::Unchanged);
        }
        if !payload.fits(&key.scope) {
            return Err(CacheError::KindMismatch {
                key: key.clone(),
                expected: Payload::kind_for(&key.scope),
            });
        }
        let revision = inner.next_revision();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.payload = payload;
            entry.revision = revision;
            entry.updated_at = OffsetDateTime::now_utc();
        }
        trace!(key = %key, revision, "cache update");
        Ok(UpdateOutcome::Updated(revision))
    }

    fn remove(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        let mut inner = self.write();
        inner.check_open()?;
        Ok(inner.entries.remove(key))
    }

    fn set_fetch_status(&self, key: &QueryKey, status: FetchStatus) -> Result<(), CacheError> {
        let mut inner = self.write();
        inner.check_open()?;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.fetch_status = status;
        }
        Ok(())
    }

    fn snapshot(&self, keys: &[QueryKey]) -> Result<CacheSnapshot, CacheError> {
        let inner = self.read();
        inner.check_open()?;
        Ok(CacheSnapshot::new(
            keys.iter()
                .map(|k| (k.clone(), inner.entries.get(k).cloned()))
                .collect(),
        ))
    }

    fn patch_with_snapshot(
        &self,
        keys: &[QueryKey],
        patch: &mut dyn FnMut(&QueryKey, &mut Payload) -> bool,
    ) -> Result<(CacheSnapshot, HashMap<QueryKey, u64>), CacheError> {
        let mut inner = self.write();
        inner.check_open()?;
        let snapshot = CacheSnapshot::new(
            keys.iter()
                .map(|k| (k.clone(), inner.entries.get(k).cloned()))
                .collect(),
        );

        let mut staged = Vec::new();
        for (key, captured) in snapshot.entries() {
            let Some(entry) = captured else { continue };
            let mut payload = entry.payload.clone();
            if !patch(key, &mut payload) {
                continue;
            }
            if !payload.fits(&key.scope) {
                return Err(CacheError::KindMismatch {
                    key: key.clone(),
                    expected: Payload::kind_for(&key.scope),
                });
            }
            staged.push((key.clone(), payload));
        }

        let now = OffsetDateTime::now_utc();
        let mut patched = HashMap::with_capacity(staged.len());
        for (key, payload) in staged {
            let revision = inner.next_revision();
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.payload = payload;
                entry.revision = revision;
                entry.updated_at = now;
            }
            patched.insert(key, revision);
        }
        trace!(keys = snapshot.len(), patched = patched.len(), "cache snapshot patched");
        Ok((snapshot, patched))
    }

    fn restore(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let mut inner = self.write();
        inner.check_open()?;
        for (key, captured) in snapshot.entries() {
            inner.restore_key(key, captured);
        }
        debug!(keys = snapshot.len(), "cache snapshot restored");
        Ok(())
    }

    fn restore_unchanged(
        &self,
        snapshot: &CacheSnapshot,
        expected: &HashMap<QueryKey, u64>,
    ) -> Result<Vec<QueryKey>, CacheError> {
        let mut inner = self.write();
        inner.check_open()?;
        let mut skipped = Vec::new();
        for (key, captured) in snapshot.entries() {
            let current = inner.entries.get(key).map(|e| e.revision);
            match (expected.get(key), current) {
                (Some(want), Some(have)) if *want == have => inner.restore_key(key, captured),
                _ => skipped.push(key.clone()),
            }
        }
        debug!(
            restored = snapshot.len() - skipped.len(),
            skipped = skipped.len(),
            "cache snapshot conditionally restored"
        );
        Ok(skipped)
    }

    fn invalidate(&self, filter: &QueryFilter) -> Result<Vec<QueryKey>, CacheError> {
        let (sequence, keys) = {
            let mut inner = self.write();
            inner.check_open()?;
            let mut keys = Vec::new();
            for (key, entry) in inner.entries.iter_mut() {
                if filter.matches(key) {
                    entry.stale = true;
                    keys.push(key.clone());
                }
            }
            keys.sort();
            inner.invalidations += 1;
            (inner.invalidations, keys)
        };

        debug!(filter = %filter, marked = keys.len(), sequence, "cache invalidated");

        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = events.as_ref() {
            // No subscribers is not an error.
            let _ = tx.send(InvalidationEvent {
                sequence,
                filter: filter.clone(),
                keys: keys.clone(),
            });
        }
        Ok(keys)
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<InvalidationEvent>, CacheError> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(CacheError::Disposed)
    }

    fn dispose(&self) {
        {
            let mut inner = self.write();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.entries.clear();
        }
        // Dropping the sender closes every receiver.
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        debug!("query cache disposed");
    }

    fn is_disposed(&self) -> bool {
        self.read().disposed
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{Entity, ListPage};
    use serde_json::json;

    fn list_key() -> QueryKey {
        QueryKey::list("accommodations").with_param("page", 1)
    }

    fn seeded() -> Arc<QueryCache> {
        let cache = QueryCache::init(CacheConfig::default());
        cache
            .set_json(
                list_key(),
                &json!({"items": [{"id": "a1", "name": "Riverside"}], "total": 1}),
            )
            .unwrap();
        cache
    }

    fn push_provisional(payload: &mut Payload) -> bool {
        match payload {
            Payload::List(page) => {
                page.prepend(Entity::provisional(json!({"name": "x"}).as_object().unwrap()));
                true
            }
            Payload::Detail(_) => false,
        }
    }

    fn push_keyed(_: &QueryKey, payload: &mut Payload) -> bool {
        push_provisional(payload)
    }

    #[test]
    fn set_json_validates_shape_once() {
        let cache = QueryCache::init(CacheConfig::default());
        let err = cache
            .set_json(list_key(), &json!({"items": "nope", "total": 0}))
            .unwrap_err();
        assert!(matches!(err, CacheError::Shape { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn set_data_rejects_wrong_kind() {
        let cache = QueryCache::init(CacheConfig::default());
        let entity = Entity::from_json(&json!({"id": "a1"})).unwrap();
        let err = cache
            .set_data(list_key(), Payload::Detail(entity))
            .unwrap_err();
        assert!(matches!(err, CacheError::KindMismatch { expected: "list", .. }));
    }

    #[test]
    fn revisions_strictly_increase() {
        let cache = seeded();
        let r1 = cache.get(&list_key()).unwrap().unwrap().revision;
        let r2 = match cache.update(&list_key(), &mut push_provisional).unwrap() {
            UpdateOutcome::Updated(r) => r,
            other => panic!("expected update, got {:?}", other),
        };
        assert!(r2 > r1);
    }

    #[test]
    fn unchanged_update_keeps_revision() {
        let cache = seeded();
        let before = cache.get(&list_key()).unwrap().unwrap();
        let outcome = cache.update(&list_key(), &mut |_: &mut Payload| false).unwrap();
        assert_eq!(outcome, UpdateOutcome::Unchanged);
        assert_eq!(cache.get(&list_key()).unwrap().unwrap(), before);
    }

    #[test]
    fn update_missing_key() {
        let cache = QueryCache::init(CacheConfig::default());
        assert_eq!(
            cache.update(&list_key(), &mut push_provisional).unwrap(),
            UpdateOutcome::Missing
        );
    }

    #[test]
    fn restore_overwrites_verbatim_and_is_idempotent() {
        let cache = seeded();
        let snap = cache.snapshot(&[list_key()]).unwrap();
        cache.update(&list_key(), &mut push_provisional).unwrap();
        assert_eq!(cache.list_page(&list_key()).unwrap().unwrap().total, 2);

        cache.restore(&snap).unwrap();
        let once = cache.get(&list_key()).unwrap().unwrap();
        cache.restore(&snap).unwrap();
        let twice = cache.get(&list_key()).unwrap().unwrap();

        let captured = snap.get(&list_key()).unwrap();
        assert!(once.same_content(captured));
        assert!(twice.same_content(&once));
        assert!(!twice.payload.as_list().unwrap().has_provisional());
    }

    #[test]
    fn restore_removes_keys_absent_at_capture() {
        let cache = QueryCache::init(CacheConfig::default());
        let key = QueryKey::detail("accommodations", "a9");
        let snap = cache.snapshot(&[key.clone()]).unwrap();
        cache.set_json(key.clone(), &json!({"id": "a9"})).unwrap();
        cache.restore(&snap).unwrap();
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[test]
    fn restore_unchanged_skips_entries_written_since() {
        let cache = seeded();
        let snap = cache.snapshot(&[list_key()]).unwrap();
        let mine = match cache.update(&list_key(), &mut push_provisional).unwrap() {
            UpdateOutcome::Updated(r) => r,
            _ => unreachable!(),
        };
        // Someone else writes after us.
        cache.update(&list_key(), &mut push_provisional).unwrap();

        let expected = HashMap::from([(list_key(), mine)]);
        let skipped = cache.restore_unchanged(&snap, &expected).unwrap();
        assert_eq!(skipped, vec![list_key()]);
        assert_eq!(cache.list_page(&list_key()).unwrap().unwrap().total, 3);
    }

    #[test]
    fn restore_unchanged_restores_untouched_entries() {
        let cache = seeded();
        let snap = cache.snapshot(&[list_key()]).unwrap();
        let mine = match cache.update(&list_key(), &mut push_provisional).unwrap() {
            UpdateOutcome::Updated(r) => r,
            _ => unreachable!(),
        };
        let expected = HashMap::from([(list_key(), mine)]);
        assert!(cache.restore_unchanged(&snap, &expected).unwrap().is_empty());
        assert_eq!(cache.list_page(&list_key()).unwrap().unwrap().total, 1);
    }

    #[test]
    fn patch_with_snapshot_captures_state_before_patch() {
        let cache = seeded();
        let missing = QueryKey::detail("accommodations", "a9");
        let (snap, patched) = cache
            .patch_with_snapshot(&[list_key(), missing.clone()], &mut push_keyed)
            .unwrap();

        assert_eq!(snap.get(&list_key()).unwrap().payload.as_list().unwrap().total, 1);
        assert!(snap.get(&missing).is_none());
        assert_eq!(snap.len(), 2);

        let entry = cache.get(&list_key()).unwrap().unwrap();
        assert_eq!(patched, HashMap::from([(list_key(), entry.revision)]));
        assert_eq!(entry.payload.as_list().unwrap().total, 2);
    }

    #[test]
    fn patch_with_snapshot_writes_nothing_on_kind_mismatch() {
        let cache = seeded();
        let detail = QueryKey::detail("accommodations", "a1");
        cache.set_json(detail.clone(), &json!({"id": "a1"})).unwrap();
        let before = cache.get(&list_key()).unwrap().unwrap();

        let mut swap_kinds = |_: &QueryKey, payload: &mut Payload| {
            if payload.as_list().is_some() {
                return push_provisional(payload);
            }
            *payload = Payload::List(ListPage::new(vec![], 0));
            true
        };
        let err = cache
            .patch_with_snapshot(&[list_key(), detail], &mut swap_kinds)
            .unwrap_err();
        assert!(matches!(err, CacheError::KindMismatch { expected: "detail", .. }));
        assert_eq!(cache.get(&list_key()).unwrap().unwrap(), before);
    }

    #[test]
    fn concurrent_patchers_never_share_a_snapshot() {
        let cache = seeded();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let (snap, patched) = cache
                        .patch_with_snapshot(&[list_key()], &mut push_keyed)
                        .unwrap();
                    let captured = snap.get(&list_key()).unwrap();
                    (captured.payload.as_list().unwrap().total, captured.revision, patched)
                })
            })
            .collect();

        let mut totals = Vec::new();
        for worker in workers {
            let (total, captured_rev, patched) = worker.join().unwrap();
            // The write each patcher saw last is exactly the one before its own.
            assert_eq!(patched[&list_key()], captured_rev + 1);
            totals.push(total);
        }
        totals.sort();
        assert_eq!(totals, (1..=8).collect::<Vec<u64>>());
        assert_eq!(cache.list_page(&list_key()).unwrap().unwrap().total, 9);
    }

    #[test]
    fn keys_matching_is_sorted_and_filtered() {
        let cache = seeded();
        cache
            .set_json(
                QueryKey::list("accommodations").with_param("page", 0),
                &json!({"items": [], "total": 0}),
            )
            .unwrap();
        cache
            .set_json(QueryKey::list("events"), &json!({"items": [], "total": 0}))
            .unwrap();
        let keys = cache
            .keys_matching(&QueryFilter::lists("accommodations"))
            .unwrap();
        assert_eq!(
            keys,
            vec![
                QueryKey::list("accommodations").with_param("page", 0),
                list_key()
            ]
        );
    }

    #[tokio::test]
    async fn invalidate_marks_stale_and_broadcasts_once() {
        let cache = seeded();
        let mut rx = cache.subscribe().unwrap();

        let marked = cache
            .invalidate(&QueryFilter::entity("accommodations"))
            .unwrap();
        assert_eq!(marked, vec![list_key()]);
        assert!(cache.get(&list_key()).unwrap().unwrap().stale);
        assert_eq!(cache.stale_keys(), vec![list_key()]);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.keys, vec![list_key()]);
        assert!(rx.try_recv().is_err());
        assert_eq!(cache.invalidation_count(), 1);
    }

    #[test]
    fn fresh_data_clears_stale_flag() {
        let cache = seeded();
        cache
            .invalidate(&QueryFilter::lists("accommodations"))
            .unwrap();
        cache
            .set_data(list_key(), Payload::List(ListPage::new(vec![], 0)))
            .unwrap();
        assert!(!cache.get(&list_key()).unwrap().unwrap().stale);
    }

    #[test]
    fn fetch_status_is_recorded() {
        let cache = seeded();
        cache
            .set_fetch_status(&list_key(), FetchStatus::Failed("timeout".into()))
            .unwrap();
        assert_eq!(
            cache.get(&list_key()).unwrap().unwrap().fetch_status,
            FetchStatus::Failed("timeout".into())
        );
    }

    #[tokio::test]
    async fn dispose_closes_everything() {
        let cache = seeded();
        let mut rx = cache.subscribe().unwrap();
        cache.dispose();
        cache.dispose();

        assert!(cache.is_disposed());
        assert_eq!(cache.get(&list_key()), Err(CacheError::Disposed));
        assert_eq!(
            cache.invalidate(&QueryFilter::entity("accommodations")),
            Err(CacheError::Disposed)
        );
        assert!(matches!(cache.subscribe(), Err(CacheError::Disposed)));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
