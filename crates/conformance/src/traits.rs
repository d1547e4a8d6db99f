use std::sync::Arc;

use hearth_cache::QueryStore;

/// A query store implementation under test.
///
/// The suite drives the store only through [`QueryStore`]; everything it
/// needs beyond that (a transport, an executor) is built by the suite
/// itself.
pub trait TestableStore: Send + Sync {
    /// The store, shared with the executor the suite builds around it.
    fn query_store(&self) -> Arc<dyn QueryStore>;
}

impl<S: QueryStore> TestableStore for Arc<S> {
    fn query_store(&self) -> Arc<dyn QueryStore> {
        self.clone()
    }
}
