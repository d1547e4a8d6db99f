//! Conformance suite for optimistic mutations (P1-P11).
//!
//! Provides a `TestableStore` trait and the `optimistic_conformance_tests!`
//! macro, which checks a query store implementation against every
//! guarantee the mutation executor relies on: provisional visibility,
//! verbatim rollback, idempotent restore, single invalidation per
//! settlement, the Cabin A scenario, racing creates, update/delete,
//! preflight rejection, disposal and survival of writes that
//! interleave with another mutation's snapshot.

pub mod fixtures;
pub mod suite;
pub mod tests;
pub mod traits;

pub use traits::*;
