//! `hearth.toml` loading.
//!
//! The file names the API base URL, cache settings and one table per
//! entity. Schema paths are resolved against the directory holding the
//! config file, so a project can keep `schemas/` next to it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_cache::CacheConfig;
use hearth_core::Schema;
use hearth_mutation::transport::http::TOKEN_ENV;
use hearth_mutation::{EntityConfig, EntityRegistry};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HearthConfig {
    pub api: ApiSection,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ApiSection {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// One `[entities.<tag>]` table. Every field is optional; a missing
/// endpoint makes the matching operation unsupported.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EntityEntry {
    pub list_endpoint: Option<String>,
    pub detail_endpoint: Option<String>,
    pub create_endpoint: Option<String>,
    pub update_endpoint: Option<String>,
    pub delete_endpoint: Option<String>,
    pub request_schema: Option<PathBuf>,
    pub update_schema: Option<PathBuf>,
    pub response_schema: Option<PathBuf>,
    pub response_envelope: Option<String>,
    pub detail_path: Option<String>,
}

/// A parsed config with its schemas compiled.
#[derive(Debug)]
pub(crate) struct Loaded {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    pub cache: CacheConfig,
    pub registry: EntityRegistry,
}

pub(crate) fn load(path: &Path) -> Result<Loaded, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    from_str(&text, base_dir).map_err(|e| format!("{}: {}", path.display(), e))
}

pub(crate) fn from_str(text: &str, base_dir: &Path) -> Result<Loaded, String> {
    let config: HearthConfig = toml::from_str(text).map_err(|e| format!("invalid config: {}", e))?;

    let mut registry = EntityRegistry::new();
    for (tag, entry) in config.entities {
        registry.register(entity_config(tag, entry, base_dir)?);
    }

    let token = std::env::var(TOKEN_ENV)
        .ok()
        .filter(|t| !t.is_empty())
        .or(config.api.token);

    Ok(Loaded {
        base_url: config.api.base_url,
        token,
        timeout: config.api.timeout_secs.map(Duration::from_secs),
        cache: config.cache,
        registry,
    })
}

fn entity_config(tag: String, entry: EntityEntry, base_dir: &Path) -> Result<EntityConfig, String> {
    let schema = |path: Option<PathBuf>| -> Result<Option<Schema>, String> {
        match path {
            None => Ok(None),
            Some(p) => {
                let resolved = if p.is_absolute() { p } else { base_dir.join(p) };
                Schema::from_file(&resolved)
                    .map(Some)
                    .map_err(|e| format!("entity '{}': {}", tag, e))
            }
        }
    };

    Ok(EntityConfig {
        request_schema: schema(entry.request_schema)?,
        update_schema: schema(entry.update_schema)?,
        response_schema: schema(entry.response_schema)?,
        entity: tag.clone(),
        list_endpoint: entry.list_endpoint,
        detail_endpoint: entry.detail_endpoint,
        create_endpoint: entry.create_endpoint,
        update_endpoint: entry.update_endpoint,
        delete_endpoint: entry.delete_endpoint,
        response_envelope: entry.response_envelope,
        detail_path: entry.detail_path,
    })
}
