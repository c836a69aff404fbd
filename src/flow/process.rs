//! The process abstraction.
//!
//! A process is a suspendable computation over a shared context. It is built
//! from two halves:
//!
//! - the process value itself (`impl Process<C>`), which only describes the
//!   flow and holds no runtime data, so it can be rebuilt at any time;
//! - its frame (`Process::State`), plain serde data recording where the flow
//!   is suspended.
//!
//! Rebuilding the process value and handing it a deserialized frame resumes
//! exactly where the previous instance stopped.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::error::Result;
use super::event::{Event, PlayerId};
use super::roster::Roster;
use super::sequence::{Map, Then};

/// Result of feeding one event to a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Waiting for more events
    Suspended,
    Completed(T),
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Suspended => None,
        }
    }
}

/// Result of constructing a process: either a frame to suspend on, or an
/// immediate value (the process needed zero events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Started<S, T> {
    Suspended(S),
    Completed(T),
}

impl<S, T> Started<S, T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Who a rendered view is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", content = "player", rename_all = "snake_case")]
pub enum Audience {
    /// Private view of a single player
    Player(PlayerId),
    /// Shared view for the channel and spectators
    Public,
}

/// Observable effects a process asks the collaborator to perform.
///
/// Effects never re-enter the process tree. When the outside world reacts
/// (a player joins, a resource finishes loading), it does so with a new event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    Render {
        audience: Audience,
        view: serde_json::Value,
    },
    /// Show an error to a single user
    Reject { player: PlayerId, reason: String },
    /// Ask for a player to be added to the roster
    Join { player: PlayerId },
    /// Ask for a player to be removed from the roster
    Leave { player: PlayerId },
    /// Start loading an external resource; completion arrives as
    /// `Event::ExternalResourceLoaded`
    Load { id: String },
}

/// Collaborator boundary.
pub trait Host {
    fn send(&mut self, effect: Effect);
}

/// In-memory host that records every effect.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    effects: Vec<Effect>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Take all recorded effects, leaving the recorder empty.
    pub fn drain(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Views rendered for a single player, in order.
    pub fn views_for(&self, player: PlayerId) -> Vec<&serde_json::Value> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Render {
                    audience: Audience::Player(p),
                    view,
                } if *p == player => Some(view),
                _ => None,
            })
            .collect()
    }

    /// Players that received a private render.
    pub fn rendered_players(&self) -> Vec<PlayerId> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Render {
                    audience: Audience::Player(p),
                    ..
                } => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn rejections(&self) -> Vec<(PlayerId, &str)> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Reject { player, reason } => Some((*player, reason.as_str())),
                _ => None,
            })
            .collect()
    }
}

impl Host for Recorder {
    fn send(&mut self, effect: Effect) {
        self.effects.push(effect);
    }
}

/// Everything a process may touch while handling one event.
pub struct Scope<'a, C> {
    host: &'a mut dyn Host,
    roster: &'a Roster,
    /// Shared context of this level of the tree
    pub context: &'a mut C,
    player: Option<PlayerId>,
}

impl<'a, C> Scope<'a, C> {
    pub fn new(host: &'a mut dyn Host, roster: &'a Roster, context: &'a mut C) -> Self {
        Self {
            host,
            roster,
            context,
            player: None,
        }
    }

    pub fn roster(&self) -> &Roster {
        self.roster
    }

    /// Player owning this scope, when running inside a per-player fan-out.
    pub fn player(&self) -> Option<PlayerId> {
        self.player
    }

    pub fn emit(&mut self, effect: Effect) {
        self.host.send(effect);
    }

    pub fn render(&mut self, audience: Audience, view: serde_json::Value) {
        self.emit(Effect::Render { audience, view });
    }

    /// Tell one user their input was not accepted.
    pub fn reject(&mut self, player: PlayerId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(player = %player, reason = %reason, "Rejected input");
        self.emit(Effect::Reject { player, reason });
    }

    /// Scope over a different context, same host, roster and player.
    pub fn focus<'b, D>(&'b mut self, context: &'b mut D) -> Scope<'b, D> {
        Scope {
            host: &mut *self.host,
            roster: self.roster,
            context,
            player: self.player,
        }
    }

    /// Scope for one player's instance inside a fan-out.
    pub fn seat<'b, D>(&'b mut self, player: PlayerId, context: &'b mut D) -> Scope<'b, D> {
        let mut scope = self.focus(context);
        scope.player = Some(player);
        scope
    }
}

/// A suspendable unit of game flow over context `C`.
pub trait Process<C> {
    type Output;

    /// Serializable bookkeeping recorded while suspended.
    type State: Serialize + DeserializeOwned;

    /// Construct the process. May complete without any event.
    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, Self::Output>>;

    /// Feed one event to a suspended process.
    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<Self::Output>>;
}

impl<C, P: Process<C> + ?Sized> Process<C> for Box<P> {
    type Output = P::Output;
    type State = P::State;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, Self::Output>> {
        (**self).start(cx)
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<Self::Output>> {
        (**self).advance(state, cx, event)
    }
}

/// Process with its frame erased to JSON, so differently-typed processes can
/// share one `sequence` or `or`.
pub type BoxProcess<C, T> = Box<dyn Process<C, Output = T, State = serde_json::Value>>;

pub struct Erased<P>(P);

impl<C, P: Process<C>> Process<C> for Erased<P> {
    type Output = P::Output;
    type State = serde_json::Value;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, Self::Output>> {
        Ok(match self.0.start(cx)? {
            Started::Suspended(state) => Started::Suspended(serde_json::to_value(state)?),
            Started::Completed(value) => Started::Completed(value),
        })
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<Self::Output>> {
        let mut inner: P::State = serde_json::from_value(state.take())?;
        let outcome = self.0.advance(&mut inner, cx, event)?;
        *state = serde_json::to_value(&inner)?;
        Ok(outcome)
    }
}

/// Leaf process driven by a closure.
///
/// The closure is called with `None` on construction and with the event
/// afterwards. Each construction starts from a clone of `init`.
pub struct Leaf<C, S, T, F> {
    init: S,
    step: F,
    _marker: PhantomData<fn(&mut C) -> T>,
}

pub fn leaf<C, S, T, F>(init: S, step: F) -> Leaf<C, S, T, F>
where
    S: Clone + Serialize + DeserializeOwned,
    F: Fn(&mut S, &mut Scope<'_, C>, Option<&Event>) -> Result<Outcome<T>>,
{
    Leaf {
        init,
        step,
        _marker: PhantomData,
    }
}

impl<C, S, T, F> Process<C> for Leaf<C, S, T, F>
where
    S: Clone + Serialize + DeserializeOwned,
    F: Fn(&mut S, &mut Scope<'_, C>, Option<&Event>) -> Result<Outcome<T>>,
{
    type Output = T;
    type State = S;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<S, T>> {
        let mut state = self.init.clone();
        Ok(match (self.step)(&mut state, cx, None)? {
            Outcome::Suspended => Started::Suspended(state),
            Outcome::Completed(value) => Started::Completed(value),
        })
    }

    fn advance(&self, state: &mut S, cx: &mut Scope<'_, C>, event: &Event) -> Result<Outcome<T>> {
        (self.step)(state, cx, Some(event))
    }
}

/// Builder methods shared by every process.
pub trait ProcessExt<C>: Process<C> + Sized {
    /// See [`then`](super::sequence::then).
    fn then<U, F>(self, f: F) -> Then<Self, F>
    where
        F: Fn(Self::Output, &mut Scope<'_, C>) -> Result<U>,
    {
        super::sequence::then(self, f)
    }

    /// Infallible [`then`](super::sequence::then).
    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        F: Fn(Self::Output) -> U,
    {
        super::sequence::map(self, f)
    }

    fn boxed(self) -> BoxProcess<C, Self::Output>
    where
        Self: 'static,
    {
        Box::new(Erased(self))
    }
}

impl<C, P: Process<C>> ProcessExt<C> for P {}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_leaf_zero_event_completion() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0u32;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);

        let started = counter(0, "done").start(&mut cx).unwrap();
        assert_eq!(started, Started::Completed("done"));
    }

    #[test]
    fn test_leaf_counts_events() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0u32;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);

        let p = counter(2, 9);
        let Started::Suspended(mut state) = p.start(&mut cx).unwrap() else {
            panic!("expected suspension");
        };
        assert_eq!(p.advance(&mut state, &mut cx, &Event::Update).unwrap(), Outcome::Suspended);
        assert_eq!(
            p.advance(&mut state, &mut cx, &Event::Update).unwrap(),
            Outcome::Completed(9)
        );
        assert_eq!(ctx, 2);
    }

    #[test]
    fn test_boxed_frame_is_json() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0u32;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);

        let p = counter(2, ()).boxed();
        let Started::Suspended(mut state) = p.start(&mut cx).unwrap() else {
            panic!("expected suspension");
        };
        assert_eq!(state, serde_json::json!(0));

        p.advance(&mut state, &mut cx, &Event::Update).unwrap();
        assert_eq!(state, serde_json::json!(1));
    }

    #[test]
    fn test_seat_scope_carries_player() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = 0u32;
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);
        assert_eq!(cx.player(), None);

        let mut inner = String::new();
        let mut seat = cx.seat(PlayerId(4), &mut inner);
        assert_eq!(seat.player(), Some(PlayerId(4)));
        seat.reject(PlayerId(4), "nope");

        assert_eq!(host.rejections(), vec![(PlayerId(4), "nope")]);
    }
}
