//! The `optimistic_conformance_tests!` macro.
//!
//! Generates one `#[tokio::test]` per mutation property P1 through P11 for
//! any store that implements `TestableStore`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hearth_cache::{CacheConfig, QueryCache};
//! use hearth_conformance::optimistic_conformance_tests;
//!
//! optimistic_conformance_tests!(QueryCache::init(CacheConfig::default()));
//! ```
//!
//! Each generated test is named `conformance_pNN_<description>`; run the
//! whole suite with `cargo test conformance_`.

/// Generate conformance tests for a query store implementation.
///
/// `$store_expr` is evaluated fresh for every test (twice for P5, once per
/// branch), so tests never share a store.
#[macro_export]
macro_rules! optimistic_conformance_tests {
    ($store_expr:expr) => {
        #[tokio::test]
        async fn conformance_p01_provisional_visibility() {
            let store = $store_expr;
            $crate::tests::p01_provisional_visibility::test_p01_provisional_visibility(&store)
                .await
                .expect("P1: provisional visibility failed");
        }

        #[tokio::test]
        async fn conformance_p02_failure_restores_snapshot() {
            let store = $store_expr;
            $crate::tests::p02_failure_restores_snapshot::test_p02_failure_restores_snapshot(&store)
                .await
                .expect("P2: snapshot restore on failure failed");
        }

        #[tokio::test]
        async fn conformance_p03_rollback_idempotence() {
            let store = $store_expr;
            $crate::tests::p03_rollback_idempotence::test_p03_rollback_idempotence(&store)
                .await
                .expect("P3: rollback idempotence failed");
        }

        #[tokio::test]
        async fn conformance_p04_single_invalidation() {
            let store = $store_expr;
            $crate::tests::p04_single_invalidation::test_p04_single_invalidation(&store)
                .await
                .expect("P4: single invalidation per settlement failed");
        }

        #[tokio::test]
        async fn conformance_p05_cabin_scenario() {
            let success = $store_expr;
            let failure = $store_expr;
            $crate::tests::p05_cabin_scenario::test_p05_cabin_scenario(&success, &failure)
                .await
                .expect("P5: Cabin A scenario failed");
        }

        #[tokio::test]
        async fn conformance_p06_racing_creates() {
            let store = $store_expr;
            $crate::tests::p06_racing_creates::test_p06_racing_creates(&store)
                .await
                .expect("P6: racing creates failed");
        }

        #[tokio::test]
        async fn conformance_p07_racing_failure() {
            let store = $store_expr;
            $crate::tests::p07_racing_failure::test_p07_racing_failure(&store)
                .await
                .expect("P7: racing create failure failed");
        }

        #[tokio::test]
        async fn conformance_p08_update_delete() {
            let store = $store_expr;
            $crate::tests::p08_update_delete::test_p08_update_delete(&store)
                .await
                .expect("P8: update and delete lifecycle failed");
        }

        #[tokio::test]
        async fn conformance_p09_preflight_rejection() {
            let store = $store_expr;
            $crate::tests::p09_preflight_rejection::test_p09_preflight_rejection(&store)
                .await
                .expect("P9: preflight rejection failed");
        }

        #[tokio::test]
        async fn conformance_p10_dispose() {
            let store = $store_expr;
            $crate::tests::p10_dispose::test_p10_dispose(&store)
                .await
                .expect("P10: dispose failed");
        }

        #[tokio::test]
        async fn conformance_p11_interleaved_write() {
            let store = $store_expr;
            $crate::tests::p11_interleaved_write::test_p11_interleaved_write(&store)
                .await
                .expect("P11: interleaved write survival failed");
        }
    };
}
