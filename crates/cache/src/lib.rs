//! hearth-cache: the query cache service behind the optimistic mutation
//! pipeline.
//!
//! [`QueryStore`] is the seam the mutation layer is written against;
//! [`QueryCache`] is the in-memory implementation with explicit
//! `init`/`dispose` boundaries.

mod config;
mod error;
mod memory;
mod record;
mod traits;

pub use config::{CacheConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_STALE_TIME};
pub use error::CacheError;
pub use memory::QueryCache;
pub use record::{
    CacheEntry, CacheSnapshot, FetchStatus, InvalidationEvent, Payload, UpdateOutcome,
};
pub use traits::QueryStore;
