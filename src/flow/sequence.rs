//! Sequencing combinators: `then`, `sequence` and `loop` (spelled `repeat`).

use serde::{Deserialize, Serialize};

use super::error::{FlowError, Result};
use super::event::Event;
use super::process::{Outcome, Process, Scope, Started};
use crate::config::{FlowConfig, DEFAULT_SPIN_LIMIT};

/// Runs `process`, then maps its result through `f`.
pub struct Then<P, F> {
    process: P,
    f: F,
}

/// Run `process`; once it completes with `a`, complete with `f(a)`.
///
/// `f` runs synchronously and consumes no events. An error from `f` ends
/// the whole tree.
pub fn then<C, P, U, F>(process: P, f: F) -> Then<P, F>
where
    P: Process<C>,
    F: Fn(P::Output, &mut Scope<'_, C>) -> Result<U>,
{
    Then { process, f }
}

impl<C, P, U, F> Process<C> for Then<P, F>
where
    P: Process<C>,
    F: Fn(P::Output, &mut Scope<'_, C>) -> Result<U>,
{
    type Output = U;
    type State = P::State;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, U>> {
        Ok(match self.process.start(cx)? {
            Started::Suspended(state) => Started::Suspended(state),
            Started::Completed(value) => Started::Completed((self.f)(value, cx)?),
        })
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<U>> {
        Ok(match self.process.advance(state, cx, event)? {
            Outcome::Suspended => Outcome::Suspended,
            Outcome::Completed(value) => Outcome::Completed((self.f)(value, cx)?),
        })
    }
}

/// Infallible form of [`Then`].
pub struct Map<P, F> {
    process: P,
    f: F,
}

pub fn map<C, P, U, F>(process: P, f: F) -> Map<P, F>
where
    P: Process<C>,
    F: Fn(P::Output) -> U,
{
    Map { process, f }
}

impl<C, P, U, F> Process<C> for Map<P, F>
where
    P: Process<C>,
    F: Fn(P::Output) -> U,
{
    type Output = U;
    type State = P::State;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, U>> {
        Ok(match self.process.start(cx)? {
            Started::Suspended(state) => Started::Suspended(state),
            Started::Completed(value) => Started::Completed((self.f)(value)),
        })
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<U>> {
        Ok(match self.process.advance(state, cx, event)? {
            Outcome::Suspended => Outcome::Suspended,
            Outcome::Completed(value) => Outcome::Completed((self.f)(value)),
        })
    }
}

/// Frame of a [`Sequence`]: which stage is running and that stage's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staged<S> {
    pub stage: usize,
    pub inner: S,
}

pub struct Sequence<P> {
    stages: Vec<P>,
}

/// Run every stage in order and complete with the last stage's result.
///
/// Results of earlier stages are dropped. Mix differently-typed stages with
/// [`ProcessExt::boxed`](super::process::ProcessExt::boxed).
pub fn sequence<P>(stages: Vec<P>) -> Sequence<P> {
    Sequence { stages }
}

impl<P> Sequence<P> {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Start stages from `from` on until one suspends or the last completes.
    fn enter<C>(
        &self,
        from: usize,
        cx: &mut Scope<'_, C>,
    ) -> Result<Started<Staged<<P as Process<C>>::State>, <P as Process<C>>::Output>>
    where
        P: Process<C>,
    {
        let last = self.stages.len().checked_sub(1).ok_or(FlowError::EmptySequence)?;
        for stage in from..=last {
            match self.stages[stage].start(cx)? {
                Started::Suspended(inner) => {
                    tracing::debug!(stage, "Sequence entered stage");
                    return Ok(Started::Suspended(Staged { stage, inner }));
                }
                Started::Completed(value) if stage == last => return Ok(Started::Completed(value)),
                Started::Completed(_) => {}
            }
        }
        Err(FlowError::StageOutOfRange {
            stage: from,
            len: self.stages.len(),
        })
    }
}

impl<C, P: Process<C>> Process<C> for Sequence<P> {
    type Output = P::Output;
    type State = Staged<P::State>;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, P::Output>> {
        self.enter(0, cx)
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<P::Output>> {
        let len = self.stages.len();
        let stage = self
            .stages
            .get(state.stage)
            .ok_or(FlowError::StageOutOfRange {
                stage: state.stage,
                len,
            })?;

        match stage.advance(&mut state.inner, cx, event)? {
            Outcome::Suspended => Ok(Outcome::Suspended),
            Outcome::Completed(value) if state.stage + 1 == len => Ok(Outcome::Completed(value)),
            Outcome::Completed(_) => match self.enter(state.stage + 1, cx)? {
                Started::Suspended(next) => {
                    *state = next;
                    Ok(Outcome::Suspended)
                }
                Started::Completed(value) => Ok(Outcome::Completed(value)),
            },
        }
    }
}

/// Repeats its body while the body completes with `true`.
pub struct Loop<P> {
    body: P,
    spin_limit: usize,
}

/// `loop(P)`: restart `body` on the same context every time it completes
/// `true`; complete once it completes `false`.
///
/// A body that completes `true` without consuming an event is restarted in
/// the same call. More than the spin limit of such restarts in a row is an
/// error, since nothing would ever stop it.
pub fn repeat<P>(body: P) -> Loop<P> {
    Loop {
        body,
        spin_limit: DEFAULT_SPIN_LIMIT,
    }
}

impl<P> Loop<P> {
    pub fn with_spin_limit(mut self, spin_limit: usize) -> Self {
        self.spin_limit = spin_limit;
        self
    }

    /// Take the spin limit from `config`.
    pub fn with_config(self, config: &FlowConfig) -> Self {
        self.with_spin_limit(config.spin_limit)
    }

    fn restart<C>(&self, cx: &mut Scope<'_, C>) -> Result<Started<<P as Process<C>>::State, ()>>
    where
        P: Process<C, Output = bool>,
    {
        let mut spins = 0;
        loop {
            match self.body.start(cx)? {
                Started::Suspended(state) => return Ok(Started::Suspended(state)),
                Started::Completed(false) => return Ok(Started::Completed(())),
                Started::Completed(true) => {
                    spins += 1;
                    if spins > self.spin_limit {
                        return Err(FlowError::Spin(spins));
                    }
                    tracing::debug!(spins, "Loop body completed on construction");
                }
            }
        }
    }
}

impl<C, P: Process<C, Output = bool>> Process<C> for Loop<P> {
    type Output = ();
    type State = P::State;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, ()>> {
        self.restart(cx)
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<()>> {
        match self.body.advance(state, cx, event)? {
            Outcome::Suspended => Ok(Outcome::Suspended),
            Outcome::Completed(false) => Ok(Outcome::Completed(())),
            Outcome::Completed(true) => {
                tracing::debug!("Loop restarting body");
                match self.restart(cx)? {
                    Started::Suspended(next) => {
                        *state = next;
                        Ok(Outcome::Suspended)
                    }
                    Started::Completed(()) => Ok(Outcome::Completed(())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::process::testing::*;
    use crate::flow::process::{leaf, ProcessExt, Recorder};
    use crate::flow::roster::Roster;

    /// Drive `p` over `events`, returning the result and how many events
    /// were consumed before completion.
    fn drive<P: Process<u32>>(p: &P, ctx: &mut u32, events: &[Event]) -> (Option<P::Output>, usize) {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut cx = Scope::new(&mut host, &roster, ctx);
        let mut state = match p.start(&mut cx).unwrap() {
            Started::Completed(value) => return (Some(value), 0),
            Started::Suspended(state) => state,
        };
        for (i, event) in events.iter().enumerate() {
            if let Outcome::Completed(value) = p.advance(&mut state, &mut cx, event).unwrap() {
                return (Some(value), i + 1);
            }
        }
        (None, events.len())
    }

    #[test]
    fn test_then_maps_result() {
        let p = then(counter(1, 20), |n: i32, cx: &mut Scope<'_, u32>| {
            Ok(n + *cx.context as i32)
        });
        let mut ctx = 0;
        assert_eq!(drive(&p, &mut ctx, &[Event::Update]), (Some(21), 1));
    }

    #[test]
    fn test_then_propagates_failure() {
        let p = then(counter(0, ()), |_, _: &mut Scope<'_, u32>| -> Result<()> {
            Err(FlowError::failed("scoring blew up"))
        });
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);
        let err = p.start(&mut cx).err().unwrap();
        assert_eq!(err.to_string(), "scoring blew up");
    }

    #[test]
    fn test_sequence_runs_in_order() {
        let p = sequence(vec![
            counter(1, "a").boxed(),
            counter(0, "b").boxed(),
            counter(2, "c").boxed(),
        ]);
        let mut ctx = 0;
        let events = vec![Event::Update; 5];
        assert_eq!(drive(&p, &mut ctx, &events), (Some("c"), 3));
        assert_eq!(ctx, 3);
    }

    #[test]
    fn test_sequence_concatenated_streams() {
        // Stage one finishes after 2 events, stage two after 3
        let p = sequence(vec![counter(2, 1), counter(3, 2)]);
        let mut ctx = 0;
        let (result, used) = drive(&p, &mut ctx, &vec![Event::Update; 5]);
        assert_eq!(result, Some(2));
        assert_eq!(used, 5);
        assert_eq!(ctx, 5);
    }

    #[test]
    fn test_sequence_resumes_without_rerunning_stages() {
        let starts = std::cell::Cell::new(0);
        let stage = |after: u32| {
            let starts = &starts;
            leaf(0u32, move |seen: &mut u32, _: &mut Scope<'_, u32>, event| {
                match event {
                    None => starts.set(starts.get() + 1),
                    Some(_) => *seen += 1,
                }
                Ok(if *seen >= after {
                    Outcome::Completed(())
                } else {
                    Outcome::Suspended
                })
            })
        };
        let p = sequence(vec![stage(1), stage(2)]);

        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);
        let Started::Suspended(mut state) = p.start(&mut cx).unwrap() else {
            panic!("expected suspension");
        };
        p.advance(&mut state, &mut cx, &Event::Update).unwrap();
        p.advance(&mut state, &mut cx, &Event::Update).unwrap();
        assert_eq!(state.stage, 1);
        assert_eq!(starts.get(), 2);

        // Persist, rebuild, continue
        let json = serde_json::to_string(&state).unwrap();
        let mut restored: Staged<u32> = serde_json::from_str(&json).unwrap();
        let outcome = p.advance(&mut restored, &mut cx, &Event::Update).unwrap();

        assert_eq!(outcome, Outcome::Completed(()));
        assert_eq!(starts.get(), 2);
    }

    #[test]
    fn test_empty_sequence_is_error() {
        let p: Sequence<crate::flow::process::BoxProcess<u32, ()>> = sequence(Vec::new());
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);
        assert!(matches!(p.start(&mut cx), Err(FlowError::EmptySequence)));
    }

    #[test]
    fn test_loop_runs_three_instances() {
        // Each instance counts itself, then answers "again?" on its first event
        let body = leaf((), |_: &mut (), cx: &mut Scope<'_, u32>, event| {
            Ok(match event {
                None => {
                    *cx.context += 1;
                    Outcome::Suspended
                }
                Some(_) => Outcome::Completed(*cx.context < 3),
            })
        });
        let p = repeat(body);
        let mut ctx = 0;
        let (result, used) = drive(&p, &mut ctx, &vec![Event::Update; 10]);
        assert_eq!(result, Some(()));
        assert_eq!(used, 3);
        assert_eq!(ctx, 3);
    }

    #[test]
    fn test_loop_restarts_zero_event_bodies_in_place() {
        // Two instantly-true bodies, then one that waits and says stop
        let body = leaf((), |_: &mut (), cx: &mut Scope<'_, u32>, event| {
            Ok(match event {
                None if *cx.context < 2 => {
                    *cx.context += 1;
                    Outcome::Completed(true)
                }
                None => Outcome::Suspended,
                Some(_) => Outcome::Completed(false),
            })
        });
        let mut ctx = 0;
        assert_eq!(drive(&repeat(body), &mut ctx, &[Event::Update]), (Some(()), 1));
        assert_eq!(ctx, 2);
    }

    #[test]
    fn test_loop_spin_guard() {
        let p = repeat(counter(0, true)).with_spin_limit(5);
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);
        assert!(matches!(p.start(&mut cx), Err(FlowError::Spin(6))));
    }

    #[test]
    fn test_loop_spin_limit_from_config() {
        let config = FlowConfig::from_lookup(|key| (key == "RUNECAST_SPIN_LIMIT").then(|| "2".to_string()));
        let p = repeat(counter(0, true)).with_config(&config);
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);
        assert!(matches!(p.start(&mut cx), Err(FlowError::Spin(3))));
    }
}
