//! The mutation executor.
//!
//! A mutation runs in three calls:
//!
//! - [`prepare`](MutationExecutor::prepare) resolves the endpoint and
//!   validates the payload. Nothing is patched or sent if it fails.
//! - [`begin`](MutationExecutor::begin) applies the optimistic patch and
//!   enters `pending`, synchronously, so callers see the provisional state
//!   before the request is even sent.
//! - [`finish`](MutationExecutor::finish) sends the request, reconciles or
//!   rolls back, invalidates the entity's queries once, settles and runs the
//!   callbacks.
//!
//! [`execute`](MutationExecutor::execute) chains all three. There are no
//! retries: one request per mutation.

use std::fmt;
use std::sync::Arc;

use hearth_cache::QueryStore;
use hearth_core::{Entity, ProvisionalId, QueryFilter, QueryKey};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::EntityConfig;
use crate::error::MutationError;
use crate::navigation::{Navigator, NoopNavigator};
use crate::optimistic::{MutationKind, OptimisticPatch, PendingContext};
use crate::state::{MutationMachine, Outcome, Phase};
use crate::transport::{Method, Transport, TransportRequest};

// ──────────────────────────────────────────────
// Callbacks
// ──────────────────────────────────────────────

type MutateHook = Box<dyn FnOnce(&PendingContext) + Send>;
type SuccessHook = Box<dyn FnOnce(Option<&Entity>) + Send>;
type ErrorHook = Box<dyn FnOnce(&MutationError) + Send>;
type SettledHook = Box<dyn FnOnce(&Outcome) + Send>;

/// Caller hooks around one mutation. Each runs at most once.
///
/// - `on_mutate`: after the optimistic patch, before the request is sent.
/// - `on_success` / `on_error`: after reconcile or rollback and invalidation.
/// - `on_settled`: last, whichever branch was taken.
#[derive(Default)]
pub struct MutationCallbacks {
    on_mutate: Option<MutateHook>,
    on_success: Option<SuccessHook>,
    on_error: Option<ErrorHook>,
    on_settled: Option<SettledHook>,
}

impl MutationCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_mutate(mut self, f: impl FnOnce(&PendingContext) + Send + 'static) -> Self {
        self.on_mutate = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(Option<&Entity>) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&MutationError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_settled(mut self, f: impl FnOnce(&Outcome) + Send + 'static) -> Self {
        self.on_settled = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for MutationCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCallbacks")
            .field("on_mutate", &self.on_mutate.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_settled", &self.on_settled.is_some())
            .finish()
    }
}

// ──────────────────────────────────────────────
// Prepared / in-flight mutations
// ──────────────────────────────────────────────

/// A mutation whose endpoint is resolved and whose payload passed
/// validation.
#[derive(Debug, Clone)]
pub struct PreparedMutation {
    config: EntityConfig,
    kind: MutationKind,
    payload: Map<String, Value>,
    method: Method,
    path: String,
}

impl PreparedMutation {
    pub fn kind(&self) -> &MutationKind {
        &self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn request(&self) -> TransportRequest {
        let body = match self.kind {
            MutationKind::Delete { .. } => None,
            _ => Some(Value::Object(self.payload.clone())),
        };
        TransportRequest::new(self.method, self.path.clone(), body)
    }
}

/// A mutation between [`begin`](MutationExecutor::begin) and
/// [`finish`](MutationExecutor::finish).
#[derive(Debug)]
pub struct InFlight {
    prepared: PreparedMutation,
    patch: OptimisticPatch,
    machine: MutationMachine,
    callbacks: MutationCallbacks,
}

impl InFlight {
    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn provisional_id(&self) -> Option<&ProvisionalId> {
        self.machine
            .pending_context()
            .and_then(|ctx| ctx.provisional_id.as_ref())
    }

    pub fn context(&self) -> Option<&PendingContext> {
        self.machine.pending_context()
    }
}

/// Everything known about a mutation once it has settled.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub outcome: Outcome,
    /// Phases entered, in order, from `Idle` to `Settled`.
    pub phases: Vec<Phase>,
    /// Keys marked stale at settlement. Empty if the mutation never
    /// reached `pending`.
    pub invalidated: Vec<QueryKey>,
    pub provisional_id: Option<ProvisionalId>,
}

impl Settlement {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.outcome.as_ref().ok().and_then(Option::as_ref)
    }

    pub fn error(&self) -> Option<&MutationError> {
        self.outcome.as_ref().err()
    }
}

// ──────────────────────────────────────────────
// MutationExecutor
// ──────────────────────────────────────────────

/// Runs mutations against an injected query store and transport.
pub struct MutationExecutor {
    store: Arc<dyn QueryStore>,
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
}

impl MutationExecutor {
    pub fn new(store: Arc<dyn QueryStore>, transport: Arc<dyn Transport>) -> Self {
        MutationExecutor {
            store,
            transport,
            navigator: Arc::new(NoopNavigator),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Resolve the endpoint for `kind` and validate `payload`.
    ///
    /// Create and update payloads must be JSON objects and pass the
    /// entity's request (or update) schema. Delete takes no payload; `null`
    /// is accepted.
    pub fn prepare(
        &self,
        config: &EntityConfig,
        kind: MutationKind,
        payload: Value,
    ) -> Result<PreparedMutation, MutationError> {
        let (method, path) = match &kind {
            MutationKind::Create => config.create_target()?,
            MutationKind::Update { id } => config.update_target(id)?,
            MutationKind::Delete { id } => config.delete_target(id)?,
        };

        let payload = match (&kind, payload) {
            (_, Value::Object(map)) => map,
            (MutationKind::Delete { .. }, Value::Null) => Map::new(),
            _ => return Err(MutationError::PayloadNotObject),
        };

        let schema = match &kind {
            MutationKind::Create => config.request_schema.as_ref(),
            MutationKind::Update { .. } => config.update_schema.as_ref(),
            MutationKind::Delete { .. } => None,
        };
        if let Some(schema) = schema {
            schema
                .validate(&Value::Object(payload.clone()))
                .map_err(MutationError::Validation)?;
        }

        Ok(PreparedMutation {
            config: config.clone(),
            kind,
            payload,
            method,
            path,
        })
    }

    /// Apply the optimistic patch and enter `pending`, then run `on_mutate`.
    ///
    /// If the cache refuses the patch (e.g. it was disposed) the mutation
    /// goes straight to `error`; [`finish`](Self::finish) then settles it
    /// without sending anything.
    pub fn begin(&self, prepared: PreparedMutation, mut callbacks: MutationCallbacks) -> InFlight {
        let patch = OptimisticPatch::new(
            prepared.config.entity.clone(),
            prepared.kind.clone(),
            prepared.payload.clone(),
        );
        let mut machine = MutationMachine::new();

        let started = patch
            .apply(self.store.as_ref())
            .map_err(MutationError::from)
            .and_then(|ctx| machine.start(ctx));

        match started {
            Ok(()) => {
                debug!(
                    entity = %prepared.config.entity,
                    kind = prepared.kind.name(),
                    path = %prepared.path,
                    "mutation pending"
                );
                if let (Some(hook), Some(ctx)) =
                    (callbacks.on_mutate.take(), machine.pending_context())
                {
                    hook(ctx);
                }
            }
            Err(err) => {
                warn!(entity = %prepared.config.entity, error = %err, "optimistic patch failed");
                if let Err(e) = machine.fail(err) {
                    warn!(error = %e, "mutation state error");
                }
            }
        }

        InFlight {
            prepared,
            patch,
            machine,
            callbacks,
        }
    }

    /// Send the request and settle the mutation.
    pub async fn finish(&self, flight: InFlight) -> Settlement {
        let InFlight {
            prepared,
            patch,
            mut machine,
            mut callbacks,
        } = flight;

        let provisional_id = machine
            .pending_context()
            .and_then(|ctx| ctx.provisional_id.clone());
        let mut invalidated = Vec::new();

        if machine.phase() == Phase::Pending {
            let result = match self.transport.send(prepared.request()).await {
                Ok(body) => accept_response(&prepared, body),
                Err(e) => Err(MutationError::from(e)),
            };

            match result {
                Ok(entity) => match machine.succeed(entity.clone()) {
                    Ok(ctx) => {
                        let store = self.store.as_ref();
                        if let Err(e) = patch.reconcile(store, &ctx, entity.as_ref()) {
                            warn!(error = %e, "reconcile failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "mutation state error"),
                },
                Err(err) => {
                    warn!(
                        entity = %prepared.config.entity,
                        kind = prepared.kind.name(),
                        error = %err,
                        "mutation failed, rolling back"
                    );
                    match machine.fail(err) {
                        Ok(Some(ctx)) => {
                            if let Err(e) = patch.rollback(self.store.as_ref(), &ctx) {
                                warn!(error = %e, "rollback failed");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "mutation state error"),
                    }
                }
            }

            invalidated = self
                .store
                .invalidate(&QueryFilter::entity(&prepared.config.entity))
                .unwrap_or_else(|e| {
                    warn!(error = %e, "invalidation failed");
                    Vec::new()
                });
        }

        let outcome = machine.settle().unwrap_or_else(Err);

        match &outcome {
            Ok(entity) => {
                if let Some(hook) = callbacks.on_success.take() {
                    hook(entity.as_ref());
                }
                if let (MutationKind::Create, Some(entity)) = (&prepared.kind, entity) {
                    if let Some(route) = prepared.config.detail_route(entity.id.as_str()) {
                        self.navigator.navigate(&route);
                    }
                }
            }
            Err(err) => {
                if let Some(hook) = callbacks.on_error.take() {
                    hook(err);
                }
            }
        }
        if let Some(hook) = callbacks.on_settled.take() {
            hook(&outcome);
        }

        info!(
            entity = %prepared.config.entity,
            kind = prepared.kind.name(),
            success = outcome.is_ok(),
            invalidated = invalidated.len(),
            "mutation settled"
        );

        Settlement {
            outcome,
            phases: machine.history().to_vec(),
            invalidated,
            provisional_id,
        }
    }

    /// Settle a mutation that failed before its patch: `idle → error →
    /// settled`, with `on_error` and `on_settled` but no invalidation.
    pub fn reject(&self, error: MutationError, mut callbacks: MutationCallbacks) -> Settlement {
        debug!(error = %error, "mutation rejected before send");
        let mut machine = MutationMachine::new();
        if let Err(e) = machine.fail(error) {
            warn!(error = %e, "mutation state error");
        }
        let outcome = machine.settle().unwrap_or_else(Err);
        if let (Err(err), Some(hook)) = (&outcome, callbacks.on_error.take()) {
            hook(err);
        }
        if let Some(hook) = callbacks.on_settled.take() {
            hook(&outcome);
        }
        Settlement {
            outcome,
            phases: machine.history().to_vec(),
            invalidated: Vec::new(),
            provisional_id: None,
        }
    }

    /// Prepare, begin and finish one mutation.
    pub async fn execute(
        &self,
        config: &EntityConfig,
        kind: MutationKind,
        payload: Value,
        callbacks: MutationCallbacks,
    ) -> Settlement {
        match self.prepare(config, kind, payload) {
            Ok(prepared) => {
                let flight = self.begin(prepared, callbacks);
                self.finish(flight).await
            }
            Err(err) => self.reject(err, callbacks),
        }
    }
}

impl fmt::Debug for MutationExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationExecutor").finish_non_exhaustive()
    }
}

/// Turn a response body into the confirmed entity.
fn accept_response(
    prepared: &PreparedMutation,
    body: Value,
) -> Result<Option<Entity>, MutationError> {
    match (&prepared.kind, &body) {
        (MutationKind::Delete { .. }, _) => return Ok(None),
        (MutationKind::Update { .. }, Value::Null) => return Ok(None),
        (MutationKind::Create, Value::Null) => {
            return Err(MutationError::ResponseValidation {
                message: "empty response to create".to_string(),
            })
        }
        _ => {}
    }

    let body = prepared.config.unwrap_response(body)?;
    if let Some(schema) = &prepared.config.response_schema {
        schema
            .validate(&body)
            .map_err(|v| MutationError::ResponseValidation {
                message: v.to_string(),
            })?;
    }
    let entity = Entity::from_json(&body).map_err(|e| MutationError::ResponseValidation {
        message: e.to_string(),
    })?;
    if entity.is_provisional() {
        return Err(MutationError::ResponseValidation {
            message: format!("server returned provisional id '{}'", entity.id),
        });
    }
    Ok(Some(entity))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
