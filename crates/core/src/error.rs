/// A JSON document did not have the shape a cache payload requires.
///
/// Raised once, at the cache boundary, when a server response or a stored
/// document is parsed into [`Entity`](crate::Entity) or
/// [`ListPage`](crate::ListPage). Code past that boundary works on typed
/// values and never re-checks shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// Expected a JSON object.
    #[error("{what} must be a JSON object")]
    NotAnObject { what: &'static str },

    /// A required field is absent.
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    /// A field is present but has the wrong type or value.
    #[error("invalid field '{field}': {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    /// One element of a list page's `items` array is malformed.
    #[error("items[{index}]: {source}")]
    InvalidItem {
        index: usize,
        #[source]
        source: Box<ShapeError>,
    },
}

/// A JSON Schema could not be loaded or compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("error reading schema '{path}': {message}")]
    Read { path: String, message: String },

    #[error("error parsing schema '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("failed to compile schema: {0}")]
    Compile(String),
}

/// A document failed validation against a [`Schema`](crate::Schema).
///
/// Carries every violation reported by the validator, in validator order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} schema violation(s): {}", .errors.len(), .errors.join("; "))]
pub struct SchemaViolations {
    pub errors: Vec<String>,
}
