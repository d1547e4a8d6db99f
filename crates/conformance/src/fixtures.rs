//! Fixtures for the optimistic mutation conformance suite.
//!
//! Every property starts from the same cache: one accommodations list page
//! with three cabins (`total: 3`), the detail entry of the second cabin,
//! and an unrelated events list that no accommodations mutation may touch.

use std::sync::Arc;

use hearth_cache::{CacheEntry, QueryStore};
use hearth_core::{ListPage, QueryKey, Schema};
use hearth_mutation::{EntityConfig, MutationExecutor, ScriptedTransport};
use serde_json::{json, Value};

use crate::traits::TestableStore;

pub const ENTITY: &str = "accommodations";

pub fn list_key() -> QueryKey {
    QueryKey::list(ENTITY)
        .with_param("page", 1)
        .with_param("pageSize", 10)
}

pub fn detail_key() -> QueryKey {
    QueryKey::detail(ENTITY, "a2")
}

pub fn unrelated_key() -> QueryKey {
    QueryKey::list("events").with_param("page", 1)
}

pub fn cabin_list() -> Value {
    json!({
        "items": [
            {"id": "a1", "name": "Cabin X", "capacity": 2},
            {"id": "a2", "name": "Cabin Y", "capacity": 4},
            {"id": "a3", "name": "Cabin Z", "capacity": 6}
        ],
        "total": 3,
        "page": 1,
        "pageSize": 10
    })
}

pub fn cabin_detail() -> Value {
    json!({"id": "a2", "name": "Cabin Y", "capacity": 4})
}

pub fn event_list() -> Value {
    json!({"items": [{"id": "e1", "title": "Harvest fair"}], "total": 1})
}

/// Create payloads need a non-empty name and an optional positive capacity.
pub fn create_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "string", "minLength": 1},
            "capacity": {"type": "integer", "minimum": 1}
        }
    })
}

/// Server entities carry a string id and a name.
pub fn entity_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "name"],
        "properties": {
            "id": {"type": "string"},
            "name": {"type": "string"}
        }
    })
}

pub fn cabin_config() -> Result<EntityConfig, String> {
    let request = Schema::compile(create_schema()).map_err(|e| e.to_string())?;
    let response = Schema::compile(entity_schema()).map_err(|e| e.to_string())?;
    Ok(EntityConfig::rest(ENTITY, "/accommodations")
        .with_request_schema(request)
        .with_response_schema(response)
        .with_detail_path("/accommodations/{id}"))
}

/// A seeded store with an executor and scripted transport around it.
pub struct Rig {
    pub store: Arc<dyn QueryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub executor: MutationExecutor,
    pub config: EntityConfig,
}

impl Rig {
    pub fn new<T: TestableStore>(subject: &T) -> Result<Self, String> {
        let store = subject.query_store();
        seed(store.as_ref())?;
        let transport = Arc::new(ScriptedTransport::new());
        let executor = MutationExecutor::new(store.clone(), transport.clone());
        Ok(Rig {
            store,
            transport,
            executor,
            config: cabin_config()?,
        })
    }

    pub fn entry(&self, key: &QueryKey) -> Result<CacheEntry, String> {
        self.store
            .get(key)
            .map_err(|e| format!("get {} failed: {}", key, e))?
            .ok_or_else(|| format!("entry {} missing", key))
    }

    pub fn page(&self) -> Result<ListPage, String> {
        self.entry(&list_key())?
            .payload
            .as_list()
            .cloned()
            .ok_or_else(|| "list entry does not hold a list page".to_string())
    }
}

pub fn seed(store: &dyn QueryStore) -> Result<(), String> {
    let writes = [
        (list_key(), cabin_list()),
        (detail_key(), cabin_detail()),
        (unrelated_key(), event_list()),
    ];
    for (key, value) in writes {
        store
            .set_json(key.clone(), &value)
            .map_err(|e| format!("seeding {} failed: {}", key, e))?;
    }
    Ok(())
}
