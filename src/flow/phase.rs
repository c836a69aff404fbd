//! Phase transition: `forward`.
//!
//! A game usually starts with a setup phase (lobby) whose context looks
//! nothing like the context of the game proper. `forward` runs the two in
//! turn and records which one is active as a tag on the persisted frame, so
//! a restored game never has to work out its phase again.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::error::Result;
use super::event::Event;
use super::process::{Outcome, Process, Scope, Started};

/// Frame of a [`Forward`]. Exactly one phase's context exists at a time.
/// Externally tagged, so player-id map keys inside a phase survive a JSON
/// round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase<Ca, Sa, Cb, Sb> {
    Setup { context: Ca, state: Sa },
    Main { context: Cb, state: Sb },
}

impl<Ca, Sa, Cb, Sb> Phase<Ca, Sa, Cb, Sb> {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "setup",
            Self::Main { .. } => "main",
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self, Self::Main { .. })
    }
}

pub struct Forward<A, B, Ca> {
    setup: A,
    main: B,
    initial: Ca,
}

/// Run `setup` on a fresh copy of `initial`. If it completes with `None`
/// the whole thing completes with `None` and `main` is never built. If it
/// completes with `Some(cb)`, the setup context is dropped and `main` runs
/// on `cb`; its result becomes `Some(result)`.
pub fn forward<A, B, Ca, Cb>(setup: A, main: B, initial: Ca) -> Forward<A, B, Ca>
where
    A: Process<Ca, Output = Option<Cb>>,
    B: Process<Cb>,
{
    Forward {
        setup,
        main,
        initial,
    }
}

impl<A, B, Ca> Forward<A, B, Ca> {
    fn enter_main<X, Cb>(
        &self,
        cx: &mut Scope<'_, X>,
        mut context: Cb,
    ) -> Result<
        Started<
            Phase<Ca, <A as Process<Ca>>::State, Cb, <B as Process<Cb>>::State>,
            Option<<B as Process<Cb>>::Output>,
        >,
    >
    where
        A: Process<Ca, Output = Option<Cb>>,
        B: Process<Cb>,
    {
        let started = self.main.start(&mut cx.focus(&mut context))?;
        Ok(match started {
            Started::Suspended(state) => Started::Suspended(Phase::Main { context, state }),
            Started::Completed(value) => Started::Completed(Some(value)),
        })
    }
}

impl<X, A, B, Ca, Cb> Process<X> for Forward<A, B, Ca>
where
    Ca: Clone + Serialize + DeserializeOwned,
    Cb: Serialize + DeserializeOwned,
    A: Process<Ca, Output = Option<Cb>>,
    B: Process<Cb>,
{
    type Output = Option<B::Output>;
    type State = Phase<Ca, A::State, Cb, B::State>;

    fn start(&self, cx: &mut Scope<'_, X>) -> Result<Started<Self::State, Self::Output>> {
        let mut context = self.initial.clone();
        let started = self.setup.start(&mut cx.focus(&mut context))?;
        match started {
            Started::Suspended(state) => Ok(Started::Suspended(Phase::Setup { context, state })),
            Started::Completed(None) => {
                tracing::debug!("Setup aborted on construction");
                Ok(Started::Completed(None))
            }
            Started::Completed(Some(next)) => self.enter_main(cx, next),
        }
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, X>,
        event: &Event,
    ) -> Result<Outcome<Self::Output>> {
        match state {
            Phase::Setup {
                context,
                state: inner,
            } => {
                let outcome = self.setup.advance(inner, &mut cx.focus(context), event)?;
                match outcome {
                    Outcome::Suspended => Ok(Outcome::Suspended),
                    Outcome::Completed(None) => {
                        tracing::debug!("Setup aborted");
                        Ok(Outcome::Completed(None))
                    }
                    Outcome::Completed(Some(next)) => {
                        tracing::debug!("Setup complete, entering main phase");
                        match self.enter_main(cx, next)? {
                            Started::Suspended(main) => {
                                *state = main;
                                Ok(Outcome::Suspended)
                            }
                            Started::Completed(value) => Ok(Outcome::Completed(value)),
                        }
                    }
                }
            }
            Phase::Main {
                context,
                state: inner,
            } => Ok(match self.main.advance(inner, &mut cx.focus(context), event)? {
                Outcome::Suspended => Outcome::Suspended,
                Outcome::Completed(value) => Outcome::Completed(Some(value)),
            }),
        }
    }
}
