use std::path::Path;

use serde_json::json;

use super::{fail, print_json};
use crate::config;
use crate::OutputFormat;

pub(crate) fn cmd_validate(
    config_path: &Path,
    entity: &str,
    payload_path: &Path,
    output: OutputFormat,
    quiet: bool,
) {
    let loaded = config::load(config_path).unwrap_or_else(|e| fail(&e, output, quiet));
    let entity_config = loaded
        .registry
        .require(entity)
        .unwrap_or_else(|e| fail(&e.to_string(), output, quiet));
    let payload = super::read_payload(payload_path).unwrap_or_else(|e| fail(&e, output, quiet));

    let Some(schema) = entity_config.request_schema.as_ref() else {
        if !quiet {
            match output {
                OutputFormat::Text => println!("valid (no request schema for '{}')", entity),
                OutputFormat::Json => print_json(&json!({"valid": true, "schema": false})),
            }
        }
        return;
    };

    match schema.validate(&payload) {
        Ok(()) => {
            if !quiet {
                match output {
                    OutputFormat::Text => println!("valid"),
                    OutputFormat::Json => print_json(&json!({"valid": true})),
                }
            }
        }
        Err(violations) => {
            match output {
                OutputFormat::Text => {
                    if !quiet {
                        eprintln!("invalid {} payload", entity);
                        for err in &violations.errors {
                            eprintln!("  - {}", err);
                        }
                    }
                }
                OutputFormat::Json => {
                    let doc = json!({"valid": false, "errors": violations.errors});
                    eprintln!(
                        "{}",
                        serde_json::to_string_pretty(&doc).unwrap_or_default()
                    );
                }
            }
            std::process::exit(1);
        }
    }
}
