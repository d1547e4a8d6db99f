//! JSON Schema validation for request payloads and server responses.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{SchemaError, SchemaViolations};

/// A compiled JSON Schema.
///
/// Cheap to clone; the compiled validator is shared.
#[derive(Clone)]
pub struct Schema {
    source: Arc<Value>,
    validator: Arc<jsonschema::Validator>,
}

impl Schema {
    pub fn compile(source: Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::validator_for(&source).map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Schema {
            source: Arc::new(source),
            validator: Arc::new(validator),
        })
    }

    /// Read, parse and compile a schema document from disk.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SchemaError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let source: Value = serde_json::from_str(&raw).map_err(|e| SchemaError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Schema::compile(source)
    }

    /// Validate `instance`, collecting every violation.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaViolations> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| format!("{}", e))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolations { errors })
        }
    }

    pub fn source(&self) -> &Value {
        &self.source
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
