//! Typed list payloads.
//!
//! A [`ListPage`] is the declared shape of every cached list query:
//! `{ "items": [...], "total": n }`, plus any pagination fields the server
//! sends alongside (kept verbatim in `extra`). Parsing happens once, when a
//! response enters the cache; the optimistic patch helpers below assume the
//! shape holds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{Entity, EntityId};
use crate::error::ShapeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ListPage {
    pub items: Vec<Entity>,
    pub total: u64,
    /// Fields other than `items` and `total` (e.g. `page`, `pageSize`).
    pub extra: Map<String, Value>,
}

impl ListPage {
    pub fn new(items: Vec<Entity>, total: u64) -> Self {
        ListPage {
            items,
            total,
            extra: Map::new(),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, ShapeError> {
        let obj = value
            .as_object()
            .ok_or(ShapeError::NotAnObject { what: "list page" })?;

        let raw_items = obj
            .get("items")
            .ok_or(ShapeError::MissingField { field: "items" })?
            .as_array()
            .ok_or_else(|| ShapeError::InvalidField {
                field: "items",
                message: "expected an array".to_string(),
            })?;

        let items = raw_items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                Entity::from_json(item).map_err(|e| ShapeError::InvalidItem {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total = obj
            .get("total")
            .ok_or(ShapeError::MissingField { field: "total" })?
            .as_u64()
            .ok_or_else(|| ShapeError::InvalidField {
                field: "total",
                message: "expected a non-negative integer".to_string(),
            })?;

        let extra = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "items" && k.as_str() != "total")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(ListPage {
            items,
            total,
            extra,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut obj = self.extra.clone();
        obj.insert(
            "items".to_string(),
            Value::Array(self.items.iter().map(Entity::to_json).collect()),
        );
        obj.insert("total".to_string(), Value::from(self.total));
        Value::Object(obj)
    }

    pub fn position_of(&self, id: &EntityId) -> Option<usize> {
        self.items.iter().position(|e| &e.id == id)
    }

    pub fn find(&self, id: &EntityId) -> Option<&Entity> {
        self.items.iter().find(|e| &e.id == id)
    }

    /// Insert at the head of the page and count it in `total`.
    pub fn prepend(&mut self, entity: Entity) {
        self.items.insert(0, entity);
        self.total += 1;
    }

    /// Insert at `index` (clamped to the page length) and count it in `total`.
    pub fn insert_at(&mut self, index: usize, entity: Entity) {
        let index = index.min(self.items.len());
        self.items.insert(index, entity);
        self.total += 1;
    }

    /// Swap the entity with id `id` for `with`, in place. `total` is
    /// unchanged. Returns `false` if no item has that id.
    pub fn replace(&mut self, id: &EntityId, with: Entity) -> bool {
        match self.position_of(id) {
            Some(pos) => {
                self.items[pos] = with;
                true
            }
            None => false,
        }
    }

    /// Remove the entity with id `id`, uncounting it from `total`. Returns
    /// the removed entity and its former position.
    pub fn remove(&mut self, id: &EntityId) -> Option<(usize, Entity)> {
        let pos = self.position_of(id)?;
        let removed = self.items.remove(pos);
        self.total = self.total.saturating_sub(1);
        Some((pos, removed))
    }

    pub fn has_provisional(&self) -> bool {
        self.items.iter().any(Entity::is_provisional)
    }
}

impl TryFrom<Value> for ListPage {
    type Error = ShapeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ListPage::from_json(&value)
    }
}

impl From<ListPage> for Value {
    fn from(page: ListPage) -> Self {
        page.to_json()
    }
}
