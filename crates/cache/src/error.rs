use hearth_core::{QueryKey, ShapeError};

/// All errors that can be returned by a [`QueryStore`](crate::QueryStore)
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The store was disposed; no further reads or writes are accepted.
    #[error("query cache has been disposed")]
    Disposed,

    /// A document written through the JSON boundary did not match the
    /// payload shape required by the key's scope.
    #[error("payload for {key} rejected: {source}")]
    Shape {
        key: QueryKey,
        #[source]
        source: ShapeError,
    },

    /// A payload of the wrong kind (list vs detail) was written for a key.
    #[error("payload kind mismatch for {key}: expected {expected}")]
    KindMismatch {
        key: QueryKey,
        expected: &'static str,
    },
}
