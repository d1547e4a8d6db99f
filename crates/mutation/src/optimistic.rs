//! Optimistic patch, reconcile and rollback.
//!
//! An [`OptimisticPatch`] knows which cache entries a mutation touches and
//! how to patch them before the request resolves. Its three steps map onto
//! the mutation lifecycle:
//!
//! 1. [`apply`](OptimisticPatch::apply) snapshots every affected entry and
//!    patches it in place under one store lock, recording the revision of
//!    each write.
//! 2. [`reconcile`](OptimisticPatch::reconcile) swaps the optimistic entity
//!    for the server's in the same slots.
//! 3. [`rollback`](OptimisticPatch::rollback) restores the snapshot.
//!
//! Snapshots are taken from the current cache state, so a mutation that
//! starts while another is pending captures the other's provisional
//! entity. Rollback therefore restores an entry verbatim only if nobody has
//! written to it since this mutation's patch. Entries written since get a
//! targeted revert that removes only this mutation's own change.

use std::collections::HashMap;

use hearth_cache::{CacheError, CacheSnapshot, Payload, QueryStore, UpdateOutcome};
use hearth_core::{Entity, EntityId, ListPage, ProvisionalId, QueryFilter, QueryKey};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// What a mutation does to its entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update { id: String },
    Delete { id: String },
}

impl MutationKind {
    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update { .. } => "update",
            MutationKind::Delete { .. } => "delete",
        }
    }

    /// The id of the existing entity targeted by update and delete.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            MutationKind::Create => None,
            MutationKind::Update { id } | MutationKind::Delete { id } => Some(id),
        }
    }
}

/// Rollback material carried by a pending mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingContext {
    /// Every affected entry as it was before the patch.
    pub snapshot: CacheSnapshot,
    /// Temporary id of the provisional entity, for creates.
    pub provisional_id: Option<ProvisionalId>,
    /// Revision written by the patch, per key it actually changed.
    pub patched: HashMap<QueryKey, u64>,
}

impl PendingContext {
    pub fn patched_keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.patched.keys()
    }
}

/// The optimistic side of one mutation.
#[derive(Debug, Clone)]
pub struct OptimisticPatch {
    entity: String,
    kind: MutationKind,
    payload: Map<String, Value>,
}

impl OptimisticPatch {
    pub fn new(entity: impl Into<String>, kind: MutationKind, payload: Map<String, Value>) -> Self {
        OptimisticPatch {
            entity: entity.into(),
            kind,
            payload,
        }
    }

    pub fn kind(&self) -> &MutationKind {
        &self.kind
    }

    /// Cached entries this mutation patches: every list of the entity, plus
    /// the target's detail entries for update.
    pub fn affected_keys(&self, store: &dyn QueryStore) -> Result<Vec<QueryKey>, CacheError> {
        let mut keys = store.keys_matching(&QueryFilter::lists(&self.entity))?;
        if let MutationKind::Update { id } = &self.kind {
            keys.extend(store.keys_matching(&QueryFilter::detail(&self.entity, id))?);
        }
        Ok(keys)
    }

    /// Snapshot the affected entries and patch them in one store write, so
    /// the snapshot always holds exactly the state the patch replaced.
    pub fn apply(&self, store: &dyn QueryStore) -> Result<PendingContext, CacheError> {
        let keys = self.affected_keys(store)?;

        let provisional = match self.kind {
            MutationKind::Create => Some(Entity::provisional(&self.payload)),
            _ => None,
        };
        let provisional_id = provisional.as_ref().and_then(|e| match &e.id {
            EntityId::Provisional(pid) => Some(pid.clone()),
            EntityId::Confirmed(_) => None,
        });

        let (snapshot, patched) =
            store.patch_with_snapshot(&keys, &mut |_: &QueryKey, payload: &mut Payload| {
                self.patch(payload, provisional.as_ref())
            })?;

        debug!(
            entity = %self.entity,
            kind = self.kind.name(),
            affected = keys.len(),
            patched = patched.len(),
            "optimistic patch applied"
        );

        Ok(PendingContext {
            snapshot,
            provisional_id,
            patched,
        })
    }

    /// Replace the optimistic entity with the server's in every entry the
    /// patch touched. `server` is `None` when the response carried no entity.
    pub fn reconcile(
        &self,
        store: &dyn QueryStore,
        context: &PendingContext,
        server: Option<&Entity>,
    ) -> Result<(), CacheError> {
        let Some(server) = server else {
            return Ok(());
        };
        let target = match (&self.kind, &context.provisional_id) {
            (MutationKind::Create, Some(pid)) => EntityId::Provisional(pid.clone()),
            (MutationKind::Update { id }, _) => EntityId::Confirmed(id.clone()),
            _ => return Ok(()),
        };

        for key in context.patched_keys() {
            store.update(key, &mut |payload: &mut Payload| match payload {
                Payload::List(page) => page.replace(&target, server.clone()),
                Payload::Detail(entity) if entity.id == target => {
                    *entity = server.clone();
                    true
                }
                Payload::Detail(_) => false,
            })?;
        }
        debug!(entity = %self.entity, id = %server.id, "optimistic entity reconciled");
        Ok(())
    }

    /// Undo the patch. Entries untouched since the patch are restored from
    /// the snapshot verbatim; the rest are reverted surgically. Returns the
    /// keys reverted surgically. Running it again changes nothing.
    pub fn rollback(
        &self,
        store: &dyn QueryStore,
        context: &PendingContext,
    ) -> Result<Vec<QueryKey>, CacheError> {
        let skipped = store.restore_unchanged(&context.snapshot, &context.patched)?;

        let mut reverted = Vec::new();
        for key in skipped.iter().filter(|k| context.patched.contains_key(*k)) {
            let original = context.snapshot.get(key).map(|e| &e.payload);
            let outcome = store.update(key, &mut |payload: &mut Payload| {
                self.revert(payload, original, context)
            })?;
            if matches!(outcome, UpdateOutcome::Updated(_)) {
                reverted.push(key.clone());
            }
        }

        if !reverted.is_empty() {
            warn!(
                entity = %self.entity,
                kind = self.kind.name(),
                keys = reverted.len(),
                "entries changed during mutation; reverted own patch only"
            );
        }
        Ok(reverted)
    }

    fn patch(&self, payload: &mut Payload, provisional: Option<&Entity>) -> bool {
        match (&self.kind, payload) {
            (MutationKind::Create, Payload::List(page)) => match provisional {
                Some(entity) => {
                    page.prepend(entity.clone());
                    true
                }
                None => false,
            },
            (MutationKind::Update { id }, Payload::List(page)) => {
                let id = EntityId::Confirmed(id.clone());
                match page.position_of(&id) {
                    Some(pos) => {
                        page.items[pos] = page.items[pos].merged(&self.payload);
                        true
                    }
                    None => false,
                }
            }
            (MutationKind::Update { id }, Payload::Detail(entity)) if entity.id.as_str() == id => {
                *entity = entity.merged(&self.payload);
                true
            }
            (MutationKind::Delete { id }, Payload::List(page)) => {
                page.remove(&EntityId::Confirmed(id.clone())).is_some()
            }
            _ => false,
        }
    }

    fn revert(
        &self,
        payload: &mut Payload,
        original: Option<&Payload>,
        context: &PendingContext,
    ) -> bool {
        match (&self.kind, payload) {
            (MutationKind::Create, Payload::List(page)) => match &context.provisional_id {
                Some(pid) => page.remove(&EntityId::Provisional(pid.clone())).is_some(),
                None => false,
            },
            (MutationKind::Update { id }, Payload::List(page)) => {
                let id = EntityId::Confirmed(id.clone());
                let Some(before) = original.and_then(Payload::as_list).and_then(|p| p.find(&id))
                else {
                    return false;
                };
                let ours = before.merged(&self.payload);
                if ours != *before && page.find(&id) == Some(&ours) {
                    page.replace(&id, before.clone())
                } else {
                    false
                }
            }
            (MutationKind::Update { .. }, Payload::Detail(entity)) => {
                let Some(before) = original.and_then(Payload::as_detail) else {
                    return false;
                };
                let ours = before.merged(&self.payload);
                if ours != *before && *entity == ours {
                    *entity = before.clone();
                    true
                } else {
                    false
                }
            }
            (MutationKind::Delete { id }, Payload::List(page)) => {
                let id = EntityId::Confirmed(id.clone());
                match original.and_then(Payload::as_list) {
                    Some(before) => reinsert(page, before, &id),
                    None => false,
                }
            }
            _ => false,
        }
    }
}

fn reinsert(page: &mut ListPage, before: &ListPage, id: &EntityId) -> bool {
    if page.position_of(id).is_some() {
        return false;
    }
    match (before.position_of(id), before.find(id)) {
        (Some(pos), Some(entity)) => {
            page.insert_at(pos, entity.clone());
            true
        }
        _ => false,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
