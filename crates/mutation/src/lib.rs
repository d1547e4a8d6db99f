//! Optimistic mutations over a hearth query cache.
//!
//! A mutation patches the cache before its request resolves, then either
//! reconciles the patch with the server's answer or rolls it back, and in
//! both cases invalidates the entity's queries so a refetch can correct
//! anything the patch got wrong.
//!
//! ```text
//!   CreateHandle ──▶ MutationExecutor ──▶ Transport ──▶ server
//!                        │    │
//!          OptimisticPatch    MutationMachine
//!                        │
//!                   QueryStore ──invalidation──▶ BackgroundRefetcher
//! ```
//!
//! The cache is always injected; nothing in this crate holds global state.

pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod navigation;
pub mod optimistic;
pub mod refetch;
pub mod state;
pub mod transport;

pub use config::{EntityConfig, EntityRegistry, ID_PLACEHOLDER};
pub use error::{MutationError, TransportError};
pub use executor::{InFlight, MutationCallbacks, MutationExecutor, PreparedMutation, Settlement};
pub use handle::CreateHandle;
pub use navigation::{Navigator, NoopNavigator, RecordingNavigator};
pub use optimistic::{MutationKind, OptimisticPatch, PendingContext};
pub use refetch::{fetch_detail, fetch_list, refetch, BackgroundRefetcher};
pub use state::{MutationMachine, MutationState, Outcome, Phase};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{Method, Responder, ScriptedTransport, Transport, TransportRequest};
