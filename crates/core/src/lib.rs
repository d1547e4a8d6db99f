//! hearth-core: shared types for the hearth optimistic mutation pipeline.
//!
//! # Public API
//!
//! - [`QueryKey`] / [`QueryFilter`] -- structural cache keys and partial
//!   matching over them
//! - [`Entity`], [`EntityId`], [`ProvisionalId`] -- cached records, confirmed
//!   or client-synthesized
//! - [`ListPage`] -- the typed `{ items, total }` list payload
//! - [`Schema`] -- compiled JSON Schema for payload/response validation
//! - [`ShapeError`], [`SchemaError`], [`SchemaViolations`] -- error types

pub mod entity;
pub mod error;
pub mod key;
pub mod page;
pub mod schema;

pub use entity::{Entity, EntityId, ProvisionalId, ID_FIELD, PROVISIONAL_MARKER};
pub use error::{SchemaError, SchemaViolations, ShapeError};
pub use key::{KeyParam, KeyScope, QueryFilter, QueryKey};
pub use page::ListPage;
pub use schema::Schema;
