//! `create`, `update` and `delete`.
//!
//! Each run seeds the cache with the list page, applies the mutation
//! optimistically and prints the page twice: while the request is pending
//! and once the mutation has settled.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hearth_mutation::{
    fetch_list, MutationCallbacks, MutationExecutor, MutationKind, Navigator, Settlement,
};
use serde_json::{json, Value};

use super::{fail, list_key, print_json, read_payload, render_page, Session};
use crate::OutputFormat;

pub(crate) struct MutateArgs {
    entity: String,
    kind: MutationKind,
    payload: Option<PathBuf>,
    params: Vec<(String, String)>,
}

impl MutateArgs {
    pub fn create(entity: String, payload: PathBuf, params: Vec<(String, String)>) -> Self {
        MutateArgs {
            entity,
            kind: MutationKind::Create,
            payload: Some(payload),
            params,
        }
    }

    pub fn update(
        entity: String,
        id: String,
        payload: PathBuf,
        params: Vec<(String, String)>,
    ) -> Self {
        MutateArgs {
            entity,
            kind: MutationKind::Update { id },
            payload: Some(payload),
            params,
        }
    }

    pub fn delete(entity: String, id: String, params: Vec<(String, String)>) -> Self {
        MutateArgs {
            entity,
            kind: MutationKind::Delete { id },
            payload: None,
            params,
        }
    }
}

/// Keeps the route a settled create asks to open; the CLI prints it after
/// the settled page instead of opening anything.
#[derive(Debug, Default)]
struct PendingRoute(Mutex<Option<String>>);

impl PendingRoute {
    fn take(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl Navigator for PendingRoute {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "navigation requested");
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(route.to_string());
    }
}

pub(crate) async fn cmd_mutate(
    config_path: &Path,
    args: MutateArgs,
    output: OutputFormat,
    quiet: bool,
) {
    let session = Session::open(config_path).unwrap_or_else(|e| fail(&e, output, quiet));
    let config = session
        .entity(&args.entity)
        .unwrap_or_else(|e| fail(&e, output, quiet))
        .clone();
    let payload = match &args.payload {
        Some(path) => read_payload(path).unwrap_or_else(|e| fail(&e, output, quiet)),
        None => Value::Null,
    };

    let key = list_key(&args.entity, &args.params);
    if let Err(e) = fetch_list(session.store.as_ref(), session.transport.as_ref(), &config, &key).await
    {
        fail(&format!("fetch {} failed: {}", key, e), output, quiet);
    }

    let navigator = Arc::new(PendingRoute::default());
    let executor = MutationExecutor::new(session.store.clone(), session.transport.clone())
        .with_navigator(navigator.clone());

    let operation = args.kind.name();
    let prepared = executor
        .prepare(&config, args.kind, payload)
        .unwrap_or_else(|e| fail(&format!("{} rejected: {}", operation, e), output, quiet));
    let flight = executor.begin(prepared, MutationCallbacks::new());

    let pending = session.page(&key).unwrap_or_else(|e| fail(&e, output, quiet));
    if output == OutputFormat::Text && !quiet {
        print!("{}", render_page("pending", &pending));
    }

    let settlement = executor.finish(flight).await;
    let settled = session.page(&key).unwrap_or_else(|e| fail(&e, output, quiet));
    let route = navigator.take();

    if !quiet {
        match output {
            OutputFormat::Text => {
                print!("{}", render_page(&settled_label(operation, &settlement), &settled));
                if let Some(route) = &route {
                    println!("navigate {}", route);
                }
            }
            OutputFormat::Json => print_json(&json!({
                "operation": operation,
                "pending": pending.to_json(),
                "settled": settled.to_json(),
                "entity": settlement.entity().map(|e| e.to_json()),
                "error": settlement.error().map(|e| e.to_string()),
                "route": route,
                "invalidated": settlement
                    .invalidated
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>(),
            })),
        }
    }

    if let Some(err) = settlement.error() {
        fail(&format!("{} failed: {}", operation, err), output, quiet);
    }
}

fn settled_label(operation: &str, settlement: &Settlement) -> String {
    match (settlement.error(), settlement.entity()) {
        (Some(_), _) => format!("rolled back {}", operation),
        (None, Some(entity)) => format!("settled {} {}", operation, entity.id),
        (None, None) => format!("settled {}", operation),
    }
}
