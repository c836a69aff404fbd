//! Racing and staged-startup combinators: `or` and `before`.

use serde::{Deserialize, Serialize};

use super::error::{FlowError, Result};
use super::event::Event;
use super::process::{Outcome, Process, Scope, Started};

pub struct Or<P> {
    branches: Vec<P>,
}

/// Race `branches` against the same context; the first to complete wins.
///
/// Every branch is constructed. If any complete on construction the lowest
/// index wins. Afterwards each event goes to the branches in order and
/// dispatch stops at the first one that completes, so later branches never
/// observe the deciding event.
///
/// Losing branches are dropped without any notification. Nothing runs their
/// cleanup; a leaf that needs cleanup after losing a race must have it
/// triggered idempotently from somewhere else.
pub fn or<P>(branches: Vec<P>) -> Or<P> {
    Or { branches }
}

impl<C, P: Process<C>> Process<C> for Or<P> {
    type Output = P::Output;
    type State = Vec<P::State>;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, P::Output>> {
        if self.branches.is_empty() {
            return Err(FlowError::EmptyRace);
        }

        let mut states = Vec::with_capacity(self.branches.len());
        let mut winner = None;
        for (index, branch) in self.branches.iter().enumerate() {
            match branch.start(cx)? {
                Started::Suspended(state) => states.push(state),
                Started::Completed(value) => {
                    if winner.is_none() {
                        winner = Some((index, value));
                    }
                }
            }
        }

        Ok(match winner {
            Some((index, value)) => {
                tracing::debug!(branch = index, "Race decided on construction");
                Started::Completed(value)
            }
            None => Started::Suspended(states),
        })
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<P::Output>> {
        if state.len() != self.branches.len() {
            return Err(FlowError::StageOutOfRange {
                stage: state.len(),
                len: self.branches.len(),
            });
        }

        for (index, (branch, branch_state)) in self.branches.iter().zip(state.iter_mut()).enumerate() {
            if let Outcome::Completed(value) = branch.advance(branch_state, cx, event)? {
                tracing::debug!(branch = index, event = %event, "Race decided");
                return Ok(Outcome::Completed(value));
            }
        }
        Ok(Outcome::Suspended)
    }
}

/// Frame of a [`Before`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeforeState<A, B> {
    /// Waiting for the initiating event
    Capturing,
    /// Preparatory process running; `first` is held back for the main one
    Preparing { first: Event, pre: A },
    Running { main: B },
}

pub struct Before<A, B> {
    pre: A,
    main: B,
}

/// Hold the first event, run `pre` on the events after it, then start
/// `main` and replay the held event into it.
///
/// `main` never sees an event that belonged to `pre`, and the initiating
/// event is never lost. `pre`'s result is discarded.
pub fn before<A, B>(pre: A, main: B) -> Before<A, B> {
    Before { pre, main }
}

impl<C, A: Process<C>, B: Process<C>> Process<C> for Before<A, B> {
    type Output = B::Output;
    type State = BeforeState<A::State, B::State>;

    fn start(&self, _cx: &mut Scope<'_, C>) -> Result<Started<Self::State, B::Output>> {
        Ok(Started::Suspended(BeforeState::Capturing))
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<B::Output>> {
        let first = match state {
            BeforeState::Capturing => {
                let first = event.clone();
                match self.pre.start(cx)? {
                    Started::Suspended(pre) => {
                        tracing::debug!(event = %first, "Captured initiating event");
                        *state = BeforeState::Preparing { first, pre };
                        return Ok(Outcome::Suspended);
                    }
                    Started::Completed(_) => first,
                }
            }
            BeforeState::Preparing { first, pre } => match self.pre.advance(pre, cx, event)? {
                Outcome::Suspended => return Ok(Outcome::Suspended),
                Outcome::Completed(_) => first.clone(),
            },
            BeforeState::Running { main } => return self.main.advance(main, cx, event),
        };

        tracing::debug!(event = %first, "Preparation done, replaying initiating event");
        match self.main.start(cx)? {
            Started::Completed(value) => Ok(Outcome::Completed(value)),
            Started::Suspended(mut main) => {
                let outcome = self.main.advance(&mut main, cx, &first)?;
                *state = BeforeState::Running { main };
                Ok(outcome)
            }
        }
    }
}
