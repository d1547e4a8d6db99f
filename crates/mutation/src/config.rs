//! Per-entity configuration: endpoints, schemas and the detail route.

use std::collections::BTreeMap;

use hearth_core::Schema;

use crate::error::MutationError;
use crate::transport::Method;

/// Placeholder substituted with the entity id in endpoint and route
/// templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// How one entity type is read and written.
///
/// Every endpoint is optional; invoking an operation whose endpoint is
/// missing fails with [`MutationError::Unsupported`] before anything is
/// patched or sent.
#[derive(Debug, Clone, Default)]
pub struct EntityConfig {
    /// Entity-type tag; also the `entity` component of its query keys.
    pub entity: String,
    pub list_endpoint: Option<String>,
    /// `GET` endpoint for one entity, with an `{id}` placeholder.
    pub detail_endpoint: Option<String>,
    pub create_endpoint: Option<String>,
    /// `PATCH` endpoint with an `{id}` placeholder.
    pub update_endpoint: Option<String>,
    /// `DELETE` endpoint with an `{id}` placeholder.
    pub delete_endpoint: Option<String>,
    /// Validates create payloads before send.
    pub request_schema: Option<Schema>,
    /// Validates update payloads before send.
    pub update_schema: Option<Schema>,
    /// Validates the entity returned by create and update.
    pub response_schema: Option<Schema>,
    /// Field the server wraps responses in (e.g. `data` for
    /// `{"success": true, "data": {...}}`). `None` means unwrapped.
    pub response_envelope: Option<String>,
    /// Client route of an entity's detail view, with an `{id}` placeholder.
    pub detail_path: Option<String>,
}

impl EntityConfig {
    pub fn new(entity: impl Into<String>) -> Self {
        EntityConfig {
            entity: entity.into(),
            ..Default::default()
        }
    }

    /// Conventional REST layout under `base`: `GET base`, `GET base/{id}`,
    /// `POST base`, `PATCH base/{id}`, `DELETE base/{id}`.
    pub fn rest(entity: impl Into<String>, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let item = format!("{}/{}", base, ID_PLACEHOLDER);
        EntityConfig {
            entity: entity.into(),
            list_endpoint: Some(base.to_string()),
            detail_endpoint: Some(item.clone()),
            create_endpoint: Some(base.to_string()),
            update_endpoint: Some(item.clone()),
            delete_endpoint: Some(item),
            ..Default::default()
        }
    }

    pub fn with_create_endpoint(mut self, path: impl Into<String>) -> Self {
        self.create_endpoint = Some(path.into());
        self
    }

    pub fn with_request_schema(mut self, schema: Schema) -> Self {
        self.request_schema = Some(schema);
        self
    }

    pub fn with_update_schema(mut self, schema: Schema) -> Self {
        self.update_schema = Some(schema);
        self
    }

    pub fn with_response_schema(mut self, schema: Schema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_response_envelope(mut self, field: impl Into<String>) -> Self {
        self.response_envelope = Some(field.into());
        self
    }

    pub fn with_detail_path(mut self, template: impl Into<String>) -> Self {
        self.detail_path = Some(template.into());
        self
    }

    pub fn without_create(mut self) -> Self {
        self.create_endpoint = None;
        self
    }

    /// Client route of the detail view for `id`, if one is configured.
    pub fn detail_route(&self, id: &str) -> Option<String> {
        self.detail_path.as_deref().map(|t| fill_id(t, id))
    }

    pub(crate) fn create_target(&self) -> Result<(Method, String), MutationError> {
        self.create_endpoint
            .clone()
            .map(|p| (Method::Post, p))
            .ok_or_else(|| self.unsupported("create"))
    }

    pub(crate) fn update_target(&self, id: &str) -> Result<(Method, String), MutationError> {
        self.update_endpoint
            .as_deref()
            .map(|t| (Method::Patch, fill_id(t, id)))
            .ok_or_else(|| self.unsupported("update"))
    }

    pub(crate) fn delete_target(&self, id: &str) -> Result<(Method, String), MutationError> {
        self.delete_endpoint
            .as_deref()
            .map(|t| (Method::Delete, fill_id(t, id)))
            .ok_or_else(|| self.unsupported("delete"))
    }

    pub(crate) fn list_target(&self) -> Result<String, MutationError> {
        self.list_endpoint
            .clone()
            .ok_or_else(|| self.unsupported("list"))
    }

    pub(crate) fn detail_target(&self, id: &str) -> Result<String, MutationError> {
        self.detail_endpoint
            .as_deref()
            .map(|t| fill_id(t, id))
            .ok_or_else(|| self.unsupported("detail fetch"))
    }

    /// Strip the configured response envelope, if any.
    pub(crate) fn unwrap_response(
        &self,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, MutationError> {
        match &self.response_envelope {
            None => Ok(body),
            Some(field) => match body {
                serde_json::Value::Object(mut obj) => {
                    obj.remove(field)
                        .ok_or_else(|| MutationError::ResponseValidation {
                            message: format!("response envelope missing field '{}'", field),
                        })
                }
                _ => Err(MutationError::ResponseValidation {
                    message: format!("expected response envelope object with '{}'", field),
                }),
            },
        }
    }

    fn unsupported(&self, operation: &'static str) -> MutationError {
        MutationError::Unsupported {
            entity: self.entity.clone(),
            operation,
        }
    }
}

/// Substitute `id` as a single percent-encoded path segment.
fn fill_id(template: &str, id: &str) -> String {
    template.replace(ID_PLACEHOLDER, &urlencoding::encode(id))
}

// ──────────────────────────────────────────────
// EntityRegistry
// ──────────────────────────────────────────────

/// Entity configurations keyed by entity tag.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, EntityConfig>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configuration, replacing any previous one for the tag.
    pub fn register(&mut self, config: EntityConfig) {
        self.entities.insert(config.entity.clone(), config);
    }

    pub fn get(&self, entity: &str) -> Option<&EntityConfig> {
        self.entities.get(entity)
    }

    pub fn require(&self, entity: &str) -> Result<&EntityConfig, MutationError> {
        self.get(entity).ok_or_else(|| MutationError::UnknownEntity {
            entity: entity.to_string(),
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityConfig> {
        self.entities.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rest_layout_fills_ids() {
        let cfg = EntityConfig::rest("accommodations", "/api/v1/accommodations/");
        assert_eq!(
            cfg.create_target().unwrap(),
            (Method::Post, "/api/v1/accommodations".to_string())
        );
        assert_eq!(
            cfg.update_target("a1").unwrap(),
            (Method::Patch, "/api/v1/accommodations/a1".to_string())
        );
        assert_eq!(
            cfg.delete_target("a1").unwrap().1,
            "/api/v1/accommodations/a1"
        );
        assert_eq!(cfg.detail_target("a1").unwrap(), "/api/v1/accommodations/a1");
    }

    #[test]
    fn missing_create_endpoint_is_unsupported() {
        let cfg = EntityConfig::rest("reviews", "/reviews").without_create();
        assert!(matches!(
            cfg.create_target(),
            Err(MutationError::Unsupported {
                operation: "create",
                ..
            })
        ));
    }

    #[test]
    fn detail_route_template() {
        let cfg = EntityConfig::new("accommodations").with_detail_path("/accommodations/{id}");
        assert_eq!(
            cfg.detail_route("srv-1").as_deref(),
            Some("/accommodations/srv-1")
        );
        assert_eq!(EntityConfig::new("x").detail_route("1"), None);
    }

    #[test]
    fn ids_are_encoded_as_one_path_segment() {
        let cfg = EntityConfig::rest("accommodations", "/accommodations")
            .with_detail_path("/accommodations/{id}");
        assert_eq!(
            cfg.update_target("a/b?c d#e").unwrap().1,
            "/accommodations/a%2Fb%3Fc%20d%23e"
        );
        assert_eq!(
            cfg.delete_target("50%").unwrap().1,
            "/accommodations/50%25"
        );
        assert_eq!(
            cfg.detail_route("a/b").as_deref(),
            Some("/accommodations/a%2Fb")
        );
        assert_eq!(cfg.detail_target("srv-1.v2_x~").unwrap(), "/accommodations/srv-1.v2_x~");
    }

    #[test]
    fn envelope_unwrapping() {
        let cfg = EntityConfig::new("accommodations").with_response_envelope("data");
        assert_eq!(
            cfg.unwrap_response(json!({"success": true, "data": {"id": "a1"}}))
                .unwrap(),
            json!({"id": "a1"})
        );
        assert!(cfg.unwrap_response(json!({"success": true})).is_err());
        assert!(cfg.unwrap_response(json!([1, 2])).is_err());

        let plain = EntityConfig::new("accommodations");
        assert_eq!(
            plain.unwrap_response(json!({"id": "a1"})).unwrap(),
            json!({"id": "a1"})
        );
    }

    #[test]
    fn registry_lookup() {
        let mut registry = EntityRegistry::new();
        registry.register(EntityConfig::rest("accommodations", "/accommodations"));
        assert!(registry.get("accommodations").is_some());
        assert!(matches!(
            registry.require("events"),
            Err(MutationError::UnknownEntity { .. })
        ));
    }
}
