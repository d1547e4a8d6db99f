//! Error types surfaced at the mutation boundary.

use hearth_cache::CacheError;
use hearth_core::SchemaViolations;

use crate::state::Phase;

// ──────────────────────────────────────────────
// TransportError
// ──────────────────────────────────────────────

/// A request did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("{method} {path} returned HTTP {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },

    /// The request never completed (connection, DNS, timeout, I/O).
    #[error("network error: {message}")]
    Network { message: String },

    /// The response body was not valid JSON.
    #[error("failed to decode response body: {message}")]
    Decode { message: String },

    /// The transport itself is misconfigured.
    #[error("transport config error: {message}")]
    Config { message: String },
}

// ──────────────────────────────────────────────
// MutationError
// ──────────────────────────────────────────────

/// Every way a mutation can fail. Cloneable so it can be kept as the
/// handle's last error and handed to callbacks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MutationError {
    /// The payload failed the request schema; nothing was sent.
    #[error("payload rejected: {0}")]
    Validation(SchemaViolations),

    /// The payload is not a JSON object.
    #[error("payload must be a JSON object")]
    PayloadNotObject,

    /// The server response failed the response schema or entity shape.
    #[error("server response rejected: {message}")]
    ResponseValidation { message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The entity configuration defines no endpoint for this operation.
    #[error("entity '{entity}' does not support {operation}")]
    Unsupported {
        entity: String,
        operation: &'static str,
    },

    #[error("no configuration registered for entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The mutation state machine was driven out of order.
    #[error("illegal mutation state transition {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },
}

impl MutationError {
    /// True for failures detected before any cache write or network call.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            MutationError::Validation(_)
                | MutationError::PayloadNotObject
                | MutationError::Unsupported { .. }
                | MutationError::UnknownEntity { .. }
        )
    }
}
