//! Structured query keys and the partial-match filters used to find them.
//!
//! A [`QueryKey`] names one cached query result: an entity-type tag, a scope
//! (a list query or a single-entity detail), and an ordered parameter set.
//! Equality, hashing and ordering are structural, so two keys built from the
//! same parts in any insertion order address the same cache slot.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// KeyParam
// ──────────────────────────────────────────────

/// A single query-key parameter value.
///
/// Restricted to values with total equality so keys can be hashed and
/// ordered. Floating-point filters are not representable on purpose: a
/// caller that needs one must encode it as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyParam {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl KeyParam {
    /// Convert a JSON scalar into a parameter. Returns `None` for floats,
    /// arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(KeyParam::Null),
            serde_json::Value::Bool(b) => Some(KeyParam::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(KeyParam::Int),
            serde_json::Value::String(s) => Some(KeyParam::Str(s.clone())),
            _ => None,
        }
    }

    /// Parse a command-line style value: `null`, `true`/`false`, an integer,
    /// or anything else as a string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "null" => KeyParam::Null,
            "true" => KeyParam::Bool(true),
            "false" => KeyParam::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(KeyParam::Int)
                .unwrap_or_else(|_| KeyParam::Str(raw.to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            KeyParam::Null => serde_json::Value::Null,
            KeyParam::Bool(b) => serde_json::Value::Bool(*b),
            KeyParam::Int(i) => serde_json::Value::from(*i),
            KeyParam::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for KeyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyParam::Null => write!(f, "null"),
            KeyParam::Bool(b) => write!(f, "{}", b),
            KeyParam::Int(i) => write!(f, "{}", i),
            KeyParam::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for KeyParam {
    fn from(s: &str) -> Self {
        KeyParam::Str(s.to_string())
    }
}

impl From<String> for KeyParam {
    fn from(s: String) -> Self {
        KeyParam::Str(s)
    }
}

impl From<i64> for KeyParam {
    fn from(i: i64) -> Self {
        KeyParam::Int(i)
    }
}

impl From<bool> for KeyParam {
    fn from(b: bool) -> Self {
        KeyParam::Bool(b)
    }
}

// ──────────────────────────────────────────────
// QueryKey
// ──────────────────────────────────────────────

/// Whether a key addresses a list query or one entity's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    List,
    Detail(String),
}

/// Structural identifier of a cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    pub entity: String,
    pub scope: KeyScope,
    #[serde(default)]
    pub params: BTreeMap<String, KeyParam>,
}

impl QueryKey {
    /// Key for a list query of `entity` with no parameters.
    pub fn list(entity: impl Into<String>) -> Self {
        QueryKey {
            entity: entity.into(),
            scope: KeyScope::List,
            params: BTreeMap::new(),
        }
    }

    /// Key for the detail view of one entity.
    pub fn detail(entity: impl Into<String>, id: impl Into<String>) -> Self {
        QueryKey {
            entity: entity.into(),
            scope: KeyScope::Detail(id.into()),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insertion. A repeated name overwrites.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<KeyParam>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn is_list(&self) -> bool {
        self.scope == KeyScope::List
    }

    /// The entity id of a detail key.
    pub fn detail_id(&self) -> Option<&str> {
        match &self.scope {
            KeyScope::Detail(id) => Some(id),
            KeyScope::List => None,
        }
    }

    /// Parameters as `(name, rendered value)` pairs, ready for a URL query
    /// string.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            KeyScope::List => write!(f, "{}/list", self.entity)?,
            KeyScope::Detail(id) => write!(f, "{}/detail/{}", self.entity, id)?,
        }
        let mut sep = '?';
        for (name, value) in &self.params {
            write!(f, "{}{}={}", sep, name, value)?;
            sep = '&';
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// QueryFilter
// ──────────────────────────────────────────────

/// Partial match over query keys, used for invalidation and for finding the
/// entries a mutation affects.
///
/// A key matches when its entity tag is equal, its scope is equal to the
/// filter's scope (if the filter names one), and every filter parameter is
/// present on the key with an equal value. Extra key parameters are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFilter {
    pub entity: String,
    pub scope: Option<KeyScope>,
    #[serde(default)]
    pub params: BTreeMap<String, KeyParam>,
}

impl QueryFilter {
    /// Every key of `entity`, lists and details alike.
    pub fn entity(entity: impl Into<String>) -> Self {
        QueryFilter {
            entity: entity.into(),
            scope: None,
            params: BTreeMap::new(),
        }
    }

    /// Every list key of `entity`.
    pub fn lists(entity: impl Into<String>) -> Self {
        QueryFilter {
            entity: entity.into(),
            scope: Some(KeyScope::List),
            params: BTreeMap::new(),
        }
    }

    /// Exactly one detail key.
    pub fn detail(entity: impl Into<String>, id: impl Into<String>) -> Self {
        QueryFilter {
            entity: entity.into(),
            scope: Some(KeyScope::Detail(id.into())),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<KeyParam>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        if key.entity != self.entity {
            return false;
        }
        if let Some(scope) = &self.scope {
            if &key.scope != scope {
                return false;
            }
        }
        self.params
            .iter()
            .all(|(name, value)| key.params.get(name) == Some(value))
    }
}

impl From<&QueryKey> for QueryFilter {
    /// The filter matching exactly the given key's entity, scope and params
    /// (and any key carrying additional params).
    fn from(key: &QueryKey) -> Self {
        QueryFilter {
            entity: key.entity.clone(),
            scope: Some(key.scope.clone()),
            params: key.params.clone(),
        }
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            None => write!(f, "{}/*", self.entity)?,
            Some(KeyScope::List) => write!(f, "{}/list", self.entity)?,
            Some(KeyScope::Detail(id)) => write!(f, "{}/detail/{}", self.entity, id)?,
        }
        let mut sep = '?';
        for (name, value) in &self.params {
            write!(f, "{}{}={}", sep, name, value)?;
            sep = '&';
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
