//! Entities as they live in the query cache.
//!
//! An [`Entity`] is either confirmed by the server (it carries the
//! server-assigned id) or provisional: synthesized on the client while a
//! create is in flight, identified by a [`ProvisionalId`] and flagged with
//! [`PROVISIONAL_MARKER`] in its JSON form.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::ShapeError;

/// JSON field carrying the entity identifier.
pub const ID_FIELD: &str = "id";

/// JSON field set to `true` on provisional entities.
pub const PROVISIONAL_MARKER: &str = "_optimistic";

/// Prefix shared by every provisional identifier.
pub const PROVISIONAL_PREFIX: &str = "temp-";

static PROVISIONAL_SEQ: AtomicU64 = AtomicU64::new(0);

// ──────────────────────────────────────────────
// ProvisionalId
// ──────────────────────────────────────────────

/// Temporary identifier for a not-yet-persisted entity.
///
/// Rendered as `temp-<unix-millis>-<suffix>`. The suffix combines a
/// process-wide sequence number with random bits, so ids minted in the same
/// millisecond still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProvisionalId(String);

impl ProvisionalId {
    pub fn generate() -> Self {
        let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let seq = PROVISIONAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let noise: u32 = rand::random();
        ProvisionalId(format!(
            "{}{}-{}{}",
            PROVISIONAL_PREFIX,
            millis,
            base36(seq),
            base36(u64::from(noise))
        ))
    }

    /// Accept an existing provisional id string. Returns `None` unless it
    /// carries the provisional prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.starts_with(PROVISIONAL_PREFIX) && raw.len() > PROVISIONAL_PREFIX.len() {
            Some(ProvisionalId(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

// ──────────────────────────────────────────────
// EntityId
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Confirmed(String),
    Provisional(ProvisionalId),
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        match self {
            EntityId::Confirmed(id) => id,
            EntityId::Provisional(id) => id.as_str(),
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, EntityId::Provisional(_))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ProvisionalId> for EntityId {
    fn from(id: ProvisionalId) -> Self {
        EntityId::Provisional(id)
    }
}

// ──────────────────────────────────────────────
// Entity
// ──────────────────────────────────────────────

/// A cached record: its identifier plus every other JSON field.
///
/// `fields` never contains [`ID_FIELD`] or [`PROVISIONAL_MARKER`]; both are
/// reconstructed from `id` when serializing. A server id sent as a JSON
/// integer is written back as the same integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Entity {
    pub id: EntityId,
    pub fields: Map<String, Value>,
    numeric_id: Option<Number>,
}

impl Entity {
    pub fn confirmed(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Entity {
            id: EntityId::Confirmed(id.into()),
            fields: strip_reserved(fields),
            numeric_id: None,
        }
    }

    /// Synthesize a provisional stand-in for a create payload, with a freshly
    /// generated temporary id.
    pub fn provisional(payload: &Map<String, Value>) -> Self {
        Self::provisional_with_id(ProvisionalId::generate(), payload)
    }

    pub fn provisional_with_id(id: ProvisionalId, payload: &Map<String, Value>) -> Self {
        Entity {
            id: EntityId::Provisional(id),
            fields: strip_reserved(payload.clone()),
            numeric_id: None,
        }
    }

    /// Parse a JSON object into an entity.
    ///
    /// The `id` field must be a non-empty string or an integer. Integer ids
    /// are matched by their decimal string form and serialized back as
    /// integers. An object flagged with [`PROVISIONAL_MARKER`] must carry a
    /// provisional id.
    pub fn from_json(value: &Value) -> Result<Self, ShapeError> {
        let obj = value
            .as_object()
            .ok_or(ShapeError::NotAnObject { what: "entity" })?;

        let (raw_id, numeric_id) = match obj.get(ID_FIELD) {
            None | Some(Value::Null) => return Err(ShapeError::MissingField { field: ID_FIELD }),
            Some(Value::String(s)) if !s.is_empty() => (s.clone(), None),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => (n.to_string(), Some(n.clone())),
            Some(other) => {
                return Err(ShapeError::InvalidField {
                    field: ID_FIELD,
                    message: format!("expected non-empty string or integer, got {}", other),
                })
            }
        };

        let flagged = obj
            .get(PROVISIONAL_MARKER)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let id = if flagged {
            let pid = ProvisionalId::parse(&raw_id).ok_or_else(|| ShapeError::InvalidField {
                field: ID_FIELD,
                message: format!(
                    "entity marked provisional but id '{}' lacks the '{}' prefix",
                    raw_id, PROVISIONAL_PREFIX
                ),
            })?;
            EntityId::Provisional(pid)
        } else {
            EntityId::Confirmed(raw_id)
        };

        Ok(Entity {
            numeric_id: numeric_id.filter(|_| !id.is_provisional()),
            id,
            fields: strip_reserved(obj.clone()),
        })
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::with_capacity(self.fields.len() + 2);
        let id = match &self.numeric_id {
            Some(n) => Value::Number(n.clone()),
            None => Value::String(self.id.as_str().into()),
        };
        obj.insert(ID_FIELD.to_string(), id);
        if self.id.is_provisional() {
            obj.insert(PROVISIONAL_MARKER.to_string(), Value::Bool(true));
        }
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Copy of this entity with `patch` fields laid over its own. The id is
    /// never changed by a patch.
    pub fn merged(&self, patch: &Map<String, Value>) -> Entity {
        let mut fields = self.fields.clone();
        for (k, v) in strip_reserved(patch.clone()) {
            fields.insert(k, v);
        }
        Entity {
            id: self.id.clone(),
            fields,
            numeric_id: self.numeric_id.clone(),
        }
    }
}

impl TryFrom<Value> for Entity {
    type Error = ShapeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Entity::from_json(&value)
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        entity.to_json()
    }
}

fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    fields.remove(ID_FIELD);
    fields.remove(PROVISIONAL_MARKER);
    fields
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn provisional_ids_are_unique_and_prefixed() {
        let a = ProvisionalId::generate();
        let b = ProvisionalId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("temp-"));
        assert!(ProvisionalId::parse(a.as_str()).is_some());
    }

    #[test]
    fn parse_rejects_non_provisional_strings() {
        assert!(ProvisionalId::parse("srv-1").is_none());
        assert!(ProvisionalId::parse("temp-").is_none());
    }

    #[test]
    fn base36_renders_digits() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }

    #[test]
    fn provisional_entity_serializes_marker() {
        let e = Entity::provisional(&obj(json!({"name": "Cabin A"})));
        let v = e.to_json();
        assert_eq!(v["_optimistic"], json!(true));
        assert_eq!(v["name"], json!("Cabin A"));
        assert!(v["id"].as_str().unwrap().starts_with("temp-"));

        let back = Entity::from_json(&v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn payload_cannot_smuggle_id_into_provisional() {
        let e = Entity::provisional(&obj(json!({"id": "srv-99", "name": "x"})));
        assert!(e.is_provisional());
        assert!(e.get("id").is_none());
    }

    #[test]
    fn server_entity_parses_as_confirmed() {
        let e = Entity::from_json(&json!({"id": "srv-1", "name": "Cabin A"})).unwrap();
        assert_eq!(e.id, EntityId::Confirmed("srv-1".into()));
        assert!(!e.is_provisional());
        assert_eq!(e.to_json(), json!({"id": "srv-1", "name": "Cabin A"}));
    }

    #[test]
    fn integer_ids_are_accepted() {
        let e = Entity::from_json(&json!({"id": 42})).unwrap();
        assert_eq!(e.id.as_str(), "42");
        assert_eq!(e.id, EntityId::Confirmed("42".into()));
    }

    #[test]
    fn integer_ids_keep_their_json_type() {
        let raw = json!({"id": 42, "name": "Cabin"});
        let e = Entity::from_json(&raw).unwrap();
        assert_eq!(e.to_json(), raw);

        let merged = e.merged(&obj(json!({"name": "Lodge"})));
        assert_eq!(merged.to_json(), json!({"id": 42, "name": "Lodge"}));

        let big = json!({"id": u64::MAX});
        assert_eq!(Entity::from_json(&big).unwrap().to_json(), big);
        assert_eq!(
            serde_json::to_value(serde_json::from_value::<Entity>(raw.clone()).unwrap()).unwrap(),
            raw
        );
    }

    #[test]
    fn missing_or_bad_id_is_a_shape_error() {
        assert_eq!(
            Entity::from_json(&json!({"name": "x"})),
            Err(ShapeError::MissingField { field: "id" })
        );
        assert!(matches!(
            Entity::from_json(&json!({"id": ""})),
            Err(ShapeError::InvalidField { field: "id", .. })
        ));
        assert!(matches!(
            Entity::from_json(&json!({"id": 1.5})),
            Err(ShapeError::InvalidField { field: "id", .. })
        ));
        assert_eq!(
            Entity::from_json(&json!([1])),
            Err(ShapeError::NotAnObject { what: "entity" })
        );
    }

    #[test]
    fn marker_without_provisional_id_is_rejected() {
        let res = Entity::from_json(&json!({"id": "srv-1", "_optimistic": true}));
        assert!(matches!(res, Err(ShapeError::InvalidField { .. })));
    }

    #[test]
    fn merged_overlays_fields_and_keeps_id() {
        let e = Entity::from_json(&json!({"id": "a1", "name": "Old", "beds": 2})).unwrap();
        let m = e.merged(&obj(json!({"id": "other", "name": "New"})));
        assert_eq!(m.to_json(), json!({"id": "a1", "name": "New", "beds": 2}));
    }

    #[test]
    fn serde_round_trip_via_value() {
        let e: Entity = serde_json::from_value(json!({"id": "a1", "x": 1})).unwrap();
        assert_eq!(serde_json::to_value(&e).unwrap(), json!({"id": "a1", "x": 1}));
    }
}
