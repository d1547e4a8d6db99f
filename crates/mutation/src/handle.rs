//! UI-facing create handle.
//!
//! A [`CreateHandle`] binds an executor to one entity configuration and
//! tracks the transient state a form needs: whether a create is in flight,
//! the last error, and the last created entity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use hearth_core::Entity;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::EntityConfig;
use crate::error::MutationError;
use crate::executor::{MutationCallbacks, MutationExecutor, Settlement};
use crate::optimistic::MutationKind;
use crate::state::Outcome;

#[derive(Debug, Default)]
struct HandleStatus {
    error: Option<MutationError>,
    data: Option<Entity>,
}

#[derive(Debug, Clone)]
pub struct CreateHandle {
    executor: Arc<MutationExecutor>,
    config: EntityConfig,
    status: Arc<Mutex<HandleStatus>>,
    in_flight: Arc<AtomicUsize>,
}

impl CreateHandle {
    pub fn new(executor: Arc<MutationExecutor>, config: EntityConfig) -> Self {
        CreateHandle {
            executor,
            config,
            status: Arc::new(Mutex::new(HandleStatus::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    /// Start a create and return immediately.
    ///
    /// Validation and the optimistic patch happen before this returns, so
    /// the provisional entity is already in the cache. The request runs on
    /// a spawned task; the returned handle yields its settlement. Failures
    /// caught before the patch are returned here (and also passed to
    /// `on_error`).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(
        &self,
        payload: Value,
        callbacks: MutationCallbacks,
    ) -> Result<JoinHandle<Settlement>, MutationError> {
        let prepared = match self
            .executor
            .prepare(&self.config, MutationKind::Create, payload)
        {
            Ok(prepared) => prepared,
            Err(err) => {
                self.lock().error = Some(err.clone());
                self.executor.reject(err.clone(), callbacks);
                return Err(err);
            }
        };

        self.lock().error = None;
        let guard = InFlightGuard::enter(&self.in_flight);
        let flight = self.executor.begin(prepared, callbacks);

        let executor = self.executor.clone();
        let status = self.status.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            let settlement = executor.finish(flight).await;
            record(&status, &settlement.outcome);
            settlement
        }))
    }

    /// Create and wait for the server entity.
    pub async fn create_async(&self, payload: Value) -> Result<Entity, MutationError> {
        let prepared = match self
            .executor
            .prepare(&self.config, MutationKind::Create, payload)
        {
            Ok(prepared) => prepared,
            Err(err) => {
                self.lock().error = Some(err.clone());
                return Err(err);
            }
        };

        self.lock().error = None;
        let _guard = InFlightGuard::enter(&self.in_flight);
        let flight = self.executor.begin(prepared, MutationCallbacks::new());
        let settlement = self.executor.finish(flight).await;
        record(&self.status, &settlement.outcome);

        match settlement.outcome {
            Ok(Some(entity)) => Ok(entity),
            Ok(None) => Err(MutationError::ResponseValidation {
                message: "empty response to create".to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    /// True while at least one create started by this handle is unsettled.
    pub fn is_creating(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// The error of the most recent failed create, cleared by the next
    /// create or by [`reset`](Self::reset).
    pub fn create_error(&self) -> Option<MutationError> {
        self.lock().error.clone()
    }

    /// The entity returned by the most recent successful create.
    pub fn data(&self) -> Option<Entity> {
        self.lock().data.clone()
    }

    /// Clear the last error and data. In-flight creates are unaffected.
    pub fn reset(&self) {
        let mut status = self.lock();
        status.error = None;
        status.data = None;
    }

    fn lock(&self) -> MutexGuard<'_, HandleStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn record(status: &Mutex<HandleStatus>, outcome: &Outcome) {
    let mut status = status.lock().unwrap_or_else(|e| e.into_inner());
    match outcome {
        Ok(entity) => {
            status.data = entity.clone();
            status.error = None;
        }
        Err(err) => status.error = Some(err.clone()),
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
