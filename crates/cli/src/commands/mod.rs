pub(crate) mod fetch;
pub(crate) mod mutate;
pub(crate) mod validate;

use std::path::Path;
use std::process;
use std::sync::Arc;

use hearth_cache::{QueryCache, QueryStore};
use hearth_core::{KeyParam, ListPage, QueryKey};
use hearth_mutation::{EntityConfig, HttpTransport, Transport};
use serde_json::Value;

use crate::config::{self, Loaded};
use crate::{report_error, OutputFormat};

/// Everything a networked subcommand needs: the loaded config, a fresh
/// cache and an HTTP transport to the configured API.
pub(crate) struct Session {
    pub loaded: Loaded,
    pub store: Arc<QueryCache>,
    pub transport: Arc<dyn Transport>,
}

impl Session {
    pub fn open(config_path: &Path) -> Result<Self, String> {
        let loaded = config::load(config_path)?;
        let mut http = HttpTransport::new(loaded.base_url.clone(), loaded.token.clone());
        if let Some(timeout) = loaded.timeout {
            http = http.with_timeout(timeout);
        }
        let store = QueryCache::init(loaded.cache.clone());
        tracing::debug!(
            base_url = %loaded.base_url,
            entities = loaded.registry.entities().count(),
            "session opened"
        );
        Ok(Session {
            loaded,
            store,
            transport: Arc::new(http),
        })
    }

    pub fn entity(&self, tag: &str) -> Result<&EntityConfig, String> {
        self.loaded.registry.require(tag).map_err(|e| e.to_string())
    }

    pub fn page(&self, key: &QueryKey) -> Result<ListPage, String> {
        self.store
            .list_page(key)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("{} is not cached", key))
    }
}

pub(crate) fn list_key(entity: &str, params: &[(String, String)]) -> QueryKey {
    params
        .iter()
        .fold(QueryKey::list(entity), |key, (name, value)| {
            key.with_param(name.as_str(), KeyParam::parse(value))
        })
}

/// Text rendering of a list page: a header line, then one line per item.
/// Provisional items are marked with `~`.
pub(crate) fn render_page(label: &str, page: &ListPage) -> String {
    let mut out = format!("{} ({} items, total {})\n", label, page.items.len(), page.total);
    for item in &page.items {
        let marker = if item.is_provisional() { "~" } else { " " };
        let fields = Value::Object(item.fields.clone());
        out.push_str(&format!("{} {}  {}\n", marker, item.id, fields));
    }
    out
}

/// Report `msg` and exit with status 1.
pub(crate) fn fail(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

pub(crate) fn read_payload(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading payload '{}': {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("error parsing JSON in '{}': {}", path.display(), e))
}

pub(crate) fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("serialization error: {}", e))
    );
}
