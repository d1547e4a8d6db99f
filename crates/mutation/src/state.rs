//! Per-mutation state machine.
//!
//! ```text
//! idle ──start──▶ pending ──succeed──▶ success ──settle──▶ settled
//!   │                └──────fail─────▶ error ───settle──┘
//!   └──────────────fail──────────────▶ error
//! ```
//!
//! The pending state owns the rollback context. Leaving it hands the
//! context back to the caller, so reconcile and rollback can only run once.

use hearth_core::Entity;

use crate::error::MutationError;
use crate::optimistic::PendingContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Pending,
    Success,
    Error,
    Settled,
}

/// Final result of a mutation: the server entity (if the response carried
/// one) or the error.
pub type Outcome = Result<Option<Entity>, MutationError>;

#[derive(Debug, Clone)]
pub enum MutationState {
    Idle,
    /// The optimistic patch is visible in the cache.
    Pending(PendingContext),
    Success(Option<Entity>),
    Error(MutationError),
    Settled(Outcome),
}

impl MutationState {
    pub fn phase(&self) -> Phase {
        match self {
            MutationState::Idle => Phase::Idle,
            MutationState::Pending(_) => Phase::Pending,
            MutationState::Success(_) => Phase::Success,
            MutationState::Error(_) => Phase::Error,
            MutationState::Settled(_) => Phase::Settled,
        }
    }
}

/// Drives one mutation through its phases, recording each one entered.
#[derive(Debug)]
pub struct MutationMachine {
    state: MutationState,
    history: Vec<Phase>,
}

impl Default for MutationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationMachine {
    pub fn new() -> Self {
        MutationMachine {
            state: MutationState::Idle,
            history: vec![Phase::Idle],
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn state(&self) -> &MutationState {
        &self.state
    }

    /// Phases entered so far, starting with `Idle`.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn pending_context(&self) -> Option<&PendingContext> {
        match &self.state {
            MutationState::Pending(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// `idle → pending`.
    pub fn start(&mut self, context: PendingContext) -> Result<(), MutationError> {
        self.expect(Phase::Idle, Phase::Pending)?;
        self.enter(MutationState::Pending(context));
        Ok(())
    }

    /// `pending → success`. Returns the pending context for reconciling.
    pub fn succeed(&mut self, entity: Option<Entity>) -> Result<PendingContext, MutationError> {
        self.expect(Phase::Pending, Phase::Success)?;
        match self.enter(MutationState::Success(entity)) {
            MutationState::Pending(ctx) => Ok(ctx),
            _ => Err(self.illegal(Phase::Success)),
        }
    }

    /// `pending → error` or, for failures caught before the patch,
    /// `idle → error`. Returns the pending context if there was one.
    pub fn fail(&mut self, error: MutationError) -> Result<Option<PendingContext>, MutationError> {
        match self.phase() {
            Phase::Idle | Phase::Pending => {}
            _ => return Err(self.illegal(Phase::Error)),
        }
        match self.enter(MutationState::Error(error)) {
            MutationState::Pending(ctx) => Ok(Some(ctx)),
            _ => Ok(None),
        }
    }

    /// `success | error → settled`.
    pub fn settle(&mut self) -> Result<Outcome, MutationError> {
        let outcome = match &self.state {
            MutationState::Success(entity) => Ok(entity.clone()),
            MutationState::Error(err) => Err(err.clone()),
            _ => return Err(self.illegal(Phase::Settled)),
        };
        self.enter(MutationState::Settled(outcome.clone()));
        Ok(outcome)
    }

    fn enter(&mut self, next: MutationState) -> MutationState {
        self.history.push(next.phase());
        std::mem::replace(&mut self.state, next)
    }

    fn expect(&self, from: Phase, to: Phase) -> Result<(), MutationError> {
        if self.phase() == from {
            Ok(())
        } else {
            Err(self.illegal(to))
        }
    }

    fn illegal(&self, to: Phase) -> MutationError {
        MutationError::IllegalTransition {
            from: self.phase(),
            to,
        }
    }
}
