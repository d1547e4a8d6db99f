use std::time::Duration;

use hearth_core::{Entity, KeyScope, ListPage, QueryFilter, QueryKey, ShapeError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Typed content of a cache entry.
///
/// List keys hold a [`ListPage`]; detail keys hold a single [`Entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    List(ListPage),
    Detail(Entity),
}

impl Payload {
    /// Parse a JSON document into the payload kind demanded by `scope`.
    pub fn from_json(scope: &KeyScope, value: &serde_json::Value) -> Result<Self, ShapeError> {
        match scope {
            KeyScope::List => ListPage::from_json(value).map(Payload::List),
            KeyScope::Detail(_) => Entity::from_json(value).map(Payload::Detail),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Payload::List(page) => page.to_json(),
            Payload::Detail(entity) => entity.to_json(),
        }
    }

    pub fn as_list(&self) -> Option<&ListPage> {
        match self {
            Payload::List(page) => Some(page),
            Payload::Detail(_) => None,
        }
    }

    pub fn as_detail(&self) -> Option<&Entity> {
        match self {
            Payload::Detail(entity) => Some(entity),
            Payload::List(_) => None,
        }
    }

    pub(crate) fn fits(&self, scope: &KeyScope) -> bool {
        matches!(
            (self, scope),
            (Payload::List(_), KeyScope::List) | (Payload::Detail(_), KeyScope::Detail(_))
        )
    }

    pub(crate) fn kind_for(scope: &KeyScope) -> &'static str {
        match scope {
            KeyScope::List => "list",
            KeyScope::Detail(_) => "detail",
        }
    }
}

/// Fetch state of a cache entry, independent of whether it holds data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum FetchStatus {
    Idle,
    Fetching,
    Failed(String),
}

/// A cached query result and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Payload,
    /// Set by invalidation; cleared when fresh data is written.
    pub stale: bool,
    pub fetch_status: FetchStatus,
    /// Store-wide write counter value of the last write to this entry.
    pub revision: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CacheEntry {
    /// Stale if invalidated, or if the data is older than `stale_time`.
    pub fn is_stale(&self, now: OffsetDateTime, stale_time: Duration) -> bool {
        let limit = time::Duration::try_from(stale_time).unwrap_or(time::Duration::MAX);
        self.stale || now - self.updated_at >= limit
    }

    /// Compare everything a reader can observe except write bookkeeping
    /// (`revision`, `updated_at`).
    pub fn same_content(&self, other: &CacheEntry) -> bool {
        self.payload == other.payload
            && self.stale == other.stale
            && self.fetch_status == other.fetch_status
    }
}

/// Result of an in-place [`update`](crate::QueryStore::update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No entry exists for the key.
    Missing,
    /// The closure reported no change; the revision was not bumped.
    Unchanged,
    /// The entry was rewritten at this revision.
    Updated(u64),
}

/// Immutable copy of a set of cache entries, taken before an optimistic
/// patch and used only to roll it back.
///
/// Keys absent at capture time are recorded as `None`; restoring removes
/// whatever was written there since.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    entries: Vec<(QueryKey, Option<CacheEntry>)>,
}

impl CacheSnapshot {
    pub fn new(entries: Vec<(QueryKey, Option<CacheEntry>)>) -> Self {
        CacheSnapshot { entries }
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn get(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, e)| e.as_ref())
    }

    pub fn entries(&self) -> &[(QueryKey, Option<CacheEntry>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Broadcast once per [`invalidate`](crate::QueryStore::invalidate) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    /// Monotonic per store, starting at 1.
    pub sequence: u64,
    pub filter: QueryFilter,
    /// The keys marked stale by this call (possibly none).
    pub keys: Vec<QueryKey>,
}
