//! Per-player fan-out: `first` and `all`.
//!
//! Both are built on [`Registry`], which keeps one independent sub-process
//! per player, keyed by identity, and routes each event to the instances it
//! concerns:
//!
//! ```text
//!   Start / Update / ExternalResourceLoaded ──▶ every registered instance
//!   Interaction ──▶ acting user's instance      (created on demand)
//!   Dm          ──▶ author's instance           (created on demand)
//!   Add         ──▶ new instance, driven with a synthetic Update
//!   Remove      ──▶ instance dropped, no cleanup callback
//! ```
//!
//! A completed instance leaves the registry and is rebuilt the next time
//! its player does something, so a player can change or take back an answer.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::error::Result;
use super::event::{Event, PlayerId};
use super::process::{Outcome, Process, Scope, Started};

/// Result of a per-player process joined by [`all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "answer", content = "value", rename_all = "snake_case")]
pub enum Answer<T> {
    Given(T),
    /// Withdraw a previous answer
    Retracted,
}

/// One player's running sub-process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance<Pc, S> {
    pub player: PlayerId,
    pub context: Pc,
    pub state: S,
}

/// Per-player instances, in construction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry<Pc, S> {
    instances: Vec<Instance<Pc, S>>,
}

impl<Pc, S> Default for Registry<Pc, S> {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
        }
    }
}

impl<Pc, S> Registry<Pc, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.position(player).is_some()
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.instances.iter().map(|i| i.player).collect()
    }

    pub fn get(&self, player: PlayerId) -> Option<&Instance<Pc, S>> {
        self.instances.iter().find(|i| i.player == player)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drop a player's instance. Returns false if there was none.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        match self.position(player) {
            Some(index) => {
                self.instances.remove(index);
                true
            }
            None => false,
        }
    }

    fn position(&self, player: PlayerId) -> Option<usize> {
        self.instances.iter().position(|i| i.player == player)
    }

    /// Build and start `player`'s instance. Returns its result if it
    /// completed on construction, in which case nothing is registered.
    pub fn open<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        player: PlayerId,
        view: &dyn Fn(&C, PlayerId) -> Pc,
    ) -> Result<Option<P::Output>>
    where
        P: Process<Pc, State = S>,
    {
        let mut context = view(&*cx.context, player);
        let started = process.start(&mut cx.seat(player, &mut context))?;
        Ok(match started {
            Started::Suspended(state) => {
                self.instances.push(Instance {
                    player,
                    context,
                    state,
                });
                None
            }
            Started::Completed(value) => Some(value),
        })
    }

    /// Open an instance for each of `players`, collecting immediate results.
    pub fn open_all<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        players: &[PlayerId],
        view: &dyn Fn(&C, PlayerId) -> Pc,
    ) -> Result<Vec<(PlayerId, P::Output)>>
    where
        P: Process<Pc, State = S>,
    {
        let mut yields = Vec::new();
        for &player in players {
            if let Some(value) = self.open(process, cx, player, view)? {
                yields.push((player, value));
            }
        }
        Ok(yields)
    }

    /// Feed `event` to `player`'s instance if it has one. A completed
    /// instance is removed.
    fn feed<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        player: PlayerId,
        event: &Event,
    ) -> Result<Option<P::Output>>
    where
        P: Process<Pc, State = S>,
    {
        let Some(index) = self.position(player) else {
            return Ok(None);
        };
        let instance = &mut self.instances[index];
        let outcome = process.advance(
            &mut instance.state,
            &mut cx.seat(player, &mut instance.context),
            event,
        )?;
        Ok(match outcome {
            Outcome::Suspended => None,
            Outcome::Completed(value) => {
                self.instances.remove(index);
                Some(value)
            }
        })
    }

    /// Get-or-create `player`'s instance, then deliver `event` to it.
    /// Players not on the roster are ignored.
    fn touch<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        player: PlayerId,
        event: &Event,
        view: &dyn Fn(&C, PlayerId) -> Pc,
    ) -> Result<Option<P::Output>>
    where
        P: Process<Pc, State = S>,
    {
        if !cx.roster().contains(player) {
            tracing::debug!(player = %player, event = %event, "Ignoring event from player not on roster");
            return Ok(None);
        }
        if !self.contains(player) {
            if let Some(value) = self.open(process, cx, player, view)? {
                return Ok(Some(value));
            }
        }
        self.feed(process, cx, player, event)
    }

    /// Route one event and return every `(player, result)` it produced, in
    /// dispatch order.
    pub fn route<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        event: &Event,
        view: &dyn Fn(&C, PlayerId) -> Pc,
    ) -> Result<Vec<(PlayerId, P::Output)>>
    where
        P: Process<Pc, State = S>,
    {
        let mut yields = Vec::new();
        let mut push = |player: PlayerId, value: Option<P::Output>| {
            if let Some(value) = value {
                yields.push((player, value));
            }
        };

        match event {
            Event::Start { .. } | Event::Update | Event::ExternalResourceLoaded { .. } => {
                for player in self.players() {
                    push(player, self.feed(process, cx, player, event)?);
                }
            }
            Event::Interaction { action } => {
                push(action.user, self.touch(process, cx, action.user, event, view)?);
            }
            Event::Dm { message } => {
                push(message.author, self.touch(process, cx, message.author, event, view)?);
            }
            Event::Add { player, .. } => {
                push(*player, self.touch(process, cx, *player, &Event::Update, view)?);
            }
            Event::Remove { player, .. } => {
                if self.remove(*player) {
                    tracing::debug!(player = %player, "Dropped instance of departed player");
                }
            }
        }
        Ok(yields)
    }

    /// Send `Update` to each of `players`, opening instances that are missing.
    pub fn refresh<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        players: &[PlayerId],
        view: &dyn Fn(&C, PlayerId) -> Pc,
    ) -> Result<Vec<(PlayerId, P::Output)>>
    where
        P: Process<Pc, State = S>,
    {
        let mut yields = Vec::new();
        for &player in players {
            let value = if self.contains(player) {
                self.feed(process, cx, player, &Event::Update)?
            } else {
                self.open(process, cx, player, view)?
            };
            if let Some(value) = value {
                yields.push((player, value));
            }
        }
        Ok(yields)
    }
}

pub struct First<P, M> {
    process: P,
    view: M,
}

/// Run `process` once per player, on the per-player context `view(context,
/// player)`, and complete with the first `(player, result)` produced.
pub fn first<C, Pc, P, M>(process: P, view: M) -> First<P, M>
where
    P: Process<Pc>,
    M: Fn(&C, PlayerId) -> Pc,
{
    First { process, view }
}

impl<C, Pc, P, M> Process<C> for First<P, M>
where
    Pc: Serialize + DeserializeOwned,
    P: Process<Pc>,
    M: Fn(&C, PlayerId) -> Pc,
{
    type Output = (PlayerId, P::Output);
    type State = Registry<Pc, P::State>;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, Self::Output>> {
        let mut registry = Registry::new();
        let players = cx.roster().ids().to_vec();
        let yields = registry.open_all(&self.process, cx, &players, &self.view)?;
        Ok(match yields.into_iter().next() {
            Some(winner) => Started::Completed(winner),
            None => Started::Suspended(registry),
        })
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<Self::Output>> {
        let yields = state.route(&self.process, cx, event, &self.view)?;
        Ok(match yields.into_iter().next() {
            Some(winner) => {
                tracing::debug!(player = %winner.0, "First player finished");
                Outcome::Completed(winner)
            }
            None => Outcome::Suspended,
        })
    }
}

/// What [`all`] tells the view function about a player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seat<'a, T> {
    pub player: PlayerId,
    /// This player's answer so far, if any
    pub current: Option<&'a T>,
}

/// Frame of a barrier join: running instances and collected answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join<Pc, S, T> {
    pub instances: Registry<Pc, S>,
    pub results: BTreeMap<PlayerId, T>,
}

impl<Pc, S, T> Default for Join<Pc, S, T> {
    fn default() -> Self {
        Self {
            instances: Registry::new(),
            results: BTreeMap::new(),
        }
    }
}

impl<Pc, S, T> Join<Pc, S, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every roster player has an answer, and nobody else does.
    pub fn is_complete(&self, roster: &super::roster::Roster) -> bool {
        self.results.len() == roster.len() && roster.iter().all(|p| self.results.contains_key(&p))
    }

    /// Open an instance for every roster player. Returns the answers if the
    /// join is already complete.
    pub fn open<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        view: &dyn Fn(&C, PlayerId, Option<&T>) -> Pc,
    ) -> Result<Option<BTreeMap<PlayerId, T>>>
    where
        P: Process<Pc, State = S, Output = Answer<T>>,
    {
        let players = cx.roster().ids().to_vec();
        let results = &self.results;
        let seat_view = |c: &C, p: PlayerId| view(c, p, results.get(&p));
        let yields = self.instances.open_all(process, cx, &players, &seat_view)?;
        self.settle(process, cx, view, yields)
    }

    pub fn advance<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        event: &Event,
        view: &dyn Fn(&C, PlayerId, Option<&T>) -> Pc,
    ) -> Result<Option<BTreeMap<PlayerId, T>>>
    where
        P: Process<Pc, State = S, Output = Answer<T>>,
    {
        if let Event::Remove { player, .. } = event {
            if self.results.remove(player).is_some() {
                tracing::debug!(player = %player, "Dropped answer of departed player");
            }
        }
        let results = &self.results;
        let seat_view = |c: &C, p: PlayerId| view(c, p, results.get(&p));
        let yields = self.instances.route(process, cx, event, &seat_view)?;
        self.settle(process, cx, view, yields)
    }

    /// Fold new answers in, refresh the players still thinking, and repeat
    /// until nothing new comes back.
    fn settle<C, P>(
        &mut self,
        process: &P,
        cx: &mut Scope<'_, C>,
        view: &dyn Fn(&C, PlayerId, Option<&T>) -> Pc,
        mut yields: Vec<(PlayerId, Answer<T>)>,
    ) -> Result<Option<BTreeMap<PlayerId, T>>>
    where
        P: Process<Pc, State = S, Output = Answer<T>>,
    {
        let mut answered = BTreeSet::new();
        let mut reopened = BTreeSet::new();
        while !yields.is_empty() {
            let mut retracted = Vec::new();
            for (player, answer) in yields.drain(..) {
                answered.insert(player);
                match answer {
                    Answer::Given(value) => {
                        tracing::debug!(player = %player, "Answer recorded");
                        self.results.insert(player, value);
                    }
                    Answer::Retracted => {
                        tracing::debug!(player = %player, "Answer retracted");
                        self.results.remove(&player);
                        retracted.push(player);
                    }
                }
            }
            if self.is_complete(cx.roster()) {
                break;
            }

            let mut waiting: Vec<PlayerId> = cx
                .roster()
                .iter()
                .filter(|p| !self.results.contains_key(p) && !answered.contains(p))
                .collect();
            // A player who took their answer back gets a fresh instance
            // right away, once per pass
            waiting.extend(
                retracted
                    .into_iter()
                    .filter(|p| !self.results.contains_key(p) && !self.instances.contains(*p))
                    .filter(|p| reopened.insert(*p)),
            );
            let results = &self.results;
            let seat_view = |c: &C, p: PlayerId| view(c, p, results.get(&p));
            yields = self.instances.refresh(process, cx, &waiting, &seat_view)?;
        }

        if self.is_complete(cx.roster()) {
            tracing::debug!(players = self.results.len(), "Everyone answered");
            self.instances = Registry::new();
            Ok(Some(std::mem::take(&mut self.results)))
        } else {
            Ok(None)
        }
    }
}

pub struct All<P, M, Pc, T> {
    process: P,
    view: M,
    _marker: PhantomData<fn() -> (Pc, T)>,
}

/// Collect one answer per player; complete with the full mapping once every
/// player on the roster has one.
///
/// `view` derives each player's context and is told the player's current
/// answer, so a rebuilt instance can show it. `Answer::Retracted` removes an
/// answer; a player leaving the roster takes their answer with them.
pub fn all<C, Pc, T, P, M>(process: P, view: M) -> All<P, M, Pc, T>
where
    P: Process<Pc, Output = Answer<T>>,
    M: Fn(&C, Seat<'_, T>) -> Pc,
{
    All {
        process,
        view,
        _marker: PhantomData,
    }
}

impl<C, Pc, T, P, M> Process<C> for All<P, M, Pc, T>
where
    Pc: Serialize + DeserializeOwned,
    T: Serialize + DeserializeOwned,
    P: Process<Pc, Output = Answer<T>>,
    M: Fn(&C, Seat<'_, T>) -> Pc,
{
    type Output = BTreeMap<PlayerId, T>;
    type State = Join<Pc, P::State, T>;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, Self::Output>> {
        let view = |c: &C, player: PlayerId, current: Option<&T>| (self.view)(c, Seat { player, current });
        let mut join = Join::new();
        Ok(match join.open(&self.process, cx, &view)? {
            Some(results) => Started::Completed(results),
            None => Started::Suspended(join),
        })
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<Self::Output>> {
        let view = |c: &C, player: PlayerId, current: Option<&T>| (self.view)(c, Seat { player, current });
        Ok(match state.advance(&self.process, cx, event, &view)? {
            Some(results) => Outcome::Completed(results),
            None => Outcome::Suspended,
        })
    }
}
