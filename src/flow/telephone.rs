//! Round-based rotation: `telephone`.
//!
//! Every round is an [`all`](super::fanout::all) over the roster. Between
//! rounds the seating rotates by one (the last seat moves to the front), so
//! each player continues the chain that sat next to them in the previous
//! round. Once all rounds are played every entry is handed back to the
//! player who wrote it.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::error::Result;
use super::event::{Event, PlayerId};
use super::fanout::{Answer, Join};
use super::process::{Outcome, Process, Scope, Started};

/// What `telephone` tells the view function about a player's turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turn<'a, T> {
    pub player: PlayerId,
    /// Zero-based round number
    pub round: usize,
    /// Last entry of the chain this player continues, none in round zero
    pub previous: Option<&'a T>,
    /// This player's answer in the current round so far
    pub current: Option<&'a T>,
}

/// One entry of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Written<T> {
    pub round: usize,
    pub author: PlayerId,
    pub value: T,
}

/// Frame of a [`Telephone`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rotation<Pc, S, T> {
    /// Starting order, newcomers at the end, leavers removed
    pub players: Vec<PlayerId>,
    /// Current seating; `order[i]` continues chain `slots[i]`
    pub order: Vec<PlayerId>,
    pub slots: Vec<Vec<Written<T>>>,
    /// Chains whose holder left; kept so their entries still count
    #[serde(default = "Vec::new")]
    pub retired: Vec<Vec<Written<T>>>,
    /// Rounds finished so far
    pub round: usize,
    pub join: Join<Pc, S, T>,
}

impl<Pc, S, T> Rotation<Pc, S, T> {
    fn previous(&self, player: PlayerId) -> Option<&T> {
        let index = self.order.iter().position(|p| *p == player)?;
        self.slots.get(index)?.last().map(|w| &w.value)
    }

    fn record(&mut self, mut results: BTreeMap<PlayerId, T>) {
        for (player, slot) in self.order.iter().zip(self.slots.iter_mut()) {
            if let Some(value) = results.remove(player) {
                slot.push(Written {
                    round: self.round,
                    author: *player,
                    value,
                });
            }
        }
    }

    /// Keep the seating in step with roster changes. A newcomer starts a
    /// new chain at the end. A leaver drops out of the results, but the
    /// chain they held is retired, not lost, since others wrote in it.
    fn seat(&mut self, event: &Event) {
        match event {
            Event::Add { player, .. } if !self.order.contains(player) => {
                self.players.push(*player);
                self.order.push(*player);
                self.slots.push(Vec::new());
            }
            Event::Remove { player, .. } => {
                self.players.retain(|p| p != player);
                if let Some(index) = self.order.iter().position(|p| p == player) {
                    self.order.remove(index);
                    let slot = self.slots.remove(index);
                    if !slot.is_empty() {
                        self.retired.push(slot);
                    }
                }
            }
            _ => {}
        }
    }

    /// Hand every entry back to its author. Players are listed in starting
    /// order, entries in round order.
    fn unwind(&self) -> Chains<T>
    where
        T: Clone,
    {
        let mut written: BTreeMap<PlayerId, Vec<&Written<T>>> = BTreeMap::new();
        for entry in self.slots.iter().chain(&self.retired).flatten() {
            written.entry(entry.author).or_default().push(entry);
        }

        self.players
            .iter()
            .map(|player| {
                let mut entries = written.remove(player).unwrap_or_default();
                entries.sort_by_key(|w| w.round);
                (*player, entries.into_iter().map(|w| w.value.clone()).collect())
            })
            .collect()
    }
}

pub struct Telephone<P, R, M, Pc, T> {
    process: P,
    rounds: R,
    view: M,
    _marker: PhantomData<fn() -> (Pc, T)>,
}

/// Play `rounds(context, players)` rounds of `process`, one instance per
/// player per round, rotating the seating between rounds.
///
/// Completes with every player's contributions in round order, players in
/// the order they were seated at the start.
pub fn telephone<C, Pc, T, P, R, M>(process: P, rounds: R, view: M) -> Telephone<P, R, M, Pc, T>
where
    P: Process<Pc, Output = Answer<T>>,
    R: Fn(&C, usize) -> usize,
    M: Fn(&C, Turn<'_, T>) -> Pc,
{
    Telephone {
        process,
        rounds,
        view,
        _marker: PhantomData,
    }
}

type Chains<T> = Vec<(PlayerId, Vec<T>)>;

impl<P, R, M, Pc, T> Telephone<P, R, M, Pc, T> {
    /// Start a fresh `all` for the current round.
    fn open_round<C>(
        &self,
        rotation: &mut Rotation<Pc, <P as Process<Pc>>::State, T>,
        cx: &mut Scope<'_, C>,
    ) -> Result<Option<BTreeMap<PlayerId, T>>>
    where
        P: Process<Pc, Output = Answer<T>>,
        M: Fn(&C, Turn<'_, T>) -> Pc,
    {
        tracing::debug!(round = rotation.round, players = rotation.order.len(), "Round started");
        let mut join = Join::new();
        let opened = {
            let seating = &*rotation;
            let view = |c: &C, player: PlayerId, current: Option<&T>| {
                (self.view)(
                    c,
                    Turn {
                        player,
                        round: seating.round,
                        previous: seating.previous(player),
                        current,
                    },
                )
            };
            join.open(&self.process, cx, &view)?
        };
        rotation.join = join;
        Ok(opened)
    }

    /// Record finished rounds and open the next, until a round is still
    /// waiting on players or every round has been played.
    fn play<C>(
        &self,
        rotation: &mut Rotation<Pc, <P as Process<Pc>>::State, T>,
        cx: &mut Scope<'_, C>,
        mut finished: Option<BTreeMap<PlayerId, T>>,
    ) -> Result<Option<Chains<T>>>
    where
        T: Clone,
        P: Process<Pc, Output = Answer<T>>,
        R: Fn(&C, usize) -> usize,
        M: Fn(&C, Turn<'_, T>) -> Pc,
    {
        while let Some(results) = finished.take() {
            rotation.record(results);
            rotation.round += 1;

            let total = (self.rounds)(&*cx.context, rotation.order.len());
            if rotation.round >= total {
                tracing::debug!(rounds = rotation.round, "All rounds played");
                return Ok(Some(rotation.unwind()));
            }
            // Chains stay put while players move one seat along
            if !rotation.order.is_empty() {
                rotation.order.rotate_right(1);
            }
            finished = self.open_round(rotation, cx)?;
        }
        Ok(None)
    }
}

impl<C, Pc, T, P, R, M> Process<C> for Telephone<P, R, M, Pc, T>
where
    Pc: Serialize + DeserializeOwned,
    T: Clone + Serialize + DeserializeOwned,
    P: Process<Pc, Output = Answer<T>>,
    R: Fn(&C, usize) -> usize,
    M: Fn(&C, Turn<'_, T>) -> Pc,
{
    type Output = Chains<T>;
    type State = Rotation<Pc, P::State, T>;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, Self::Output>> {
        let order = cx.roster().ids().to_vec();
        let mut rotation = Rotation {
            players: order.clone(),
            slots: order.iter().map(|_| Vec::new()).collect(),
            order,
            retired: Vec::new(),
            round: 0,
            join: Join::new(),
        };

        if (self.rounds)(&*cx.context, rotation.order.len()) == 0 {
            return Ok(Started::Completed(rotation.unwind()));
        }

        let opened = self.open_round(&mut rotation, cx)?;
        Ok(match self.play(&mut rotation, cx, opened)? {
            Some(chains) => Started::Completed(chains),
            None => Started::Suspended(rotation),
        })
    }

    fn advance(
        &self,
        state: &mut Self::State,
        cx: &mut Scope<'_, C>,
        event: &Event,
    ) -> Result<Outcome<Self::Output>> {
        state.seat(event);

        let finished = {
            let Rotation {
                order,
                slots,
                round,
                join,
                ..
            } = &mut *state;
            let previous = |player: PlayerId| {
                let index = order.iter().position(|p| *p == player)?;
                slots.get(index)?.last().map(|w| &w.value)
            };
            let view = |c: &C, player: PlayerId, current: Option<&T>| {
                (self.view)(
                    c,
                    Turn {
                        player,
                        round: *round,
                        previous: previous(player),
                        current,
                    },
                )
            };
            join.advance(&self.process, cx, event, &view)?
        };

        Ok(match self.play(state, cx, finished)? {
            Some(chains) => Outcome::Completed(chains),
            None => Outcome::Suspended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::process::leaf;
    use crate::flow::process::testing::*;
    use pretty_assertions::assert_eq;

    /// Per-player context: who I am and what I was handed.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sheet {
        player: PlayerId,
        previous: Option<String>,
    }

    /// Writes `"<player><<previous>"` on `write`.
    fn scribe() -> impl Process<Sheet, Output = Answer<String>, State = ()> {
        leaf((), |_: &mut (), cx: &mut Scope<'_, Sheet>, event: Option<&Event>| {
            Ok(match event.and_then(Event::action) {
                Some(action) if action.custom_id == "write" => {
                    let previous = cx.context.previous.as_deref().unwrap_or("-");
                    Outcome::Completed(Answer::Given(format!("{}<{}", cx.context.player, previous)))
                }
                _ => Outcome::Suspended,
            })
        })
    }

    fn game(
        rounds: usize,
    ) -> impl Process<(), Output = Chains<String>, State = Rotation<Sheet, (), String>> {
        telephone(
            scribe(),
            move |_: &(), _players| rounds,
            |_: &(), turn: Turn<'_, String>| Sheet {
                player: turn.player,
                previous: turn.previous.cloned(),
            },
        )
    }

    fn write(player: u64) -> Event {
        press(player, "write")
    }

    #[test]
    fn test_telephone_three_players_two_rounds() {
        let p = game(2);
        let mut bench = Bench::new(&[1, 2, 3], ());
        let mut state = bench.suspend(&p);

        bench.feed(&p, &mut state, write(1));
        bench.feed(&p, &mut state, write(2));
        assert_eq!(bench.feed(&p, &mut state, write(3)), Outcome::Suspended);

        // Seating rotated: the last player now sits first
        assert_eq!(state.order, vec![PlayerId(3), PlayerId(1), PlayerId(2)]);
        assert_eq!(state.round, 1);
        let handed: Vec<_> = state
            .order
            .iter()
            .map(|p| state.previous(*p).cloned())
            .collect();
        assert_eq!(
            handed,
            vec![
                Some("1<-".to_string()),
                Some("2<-".to_string()),
                Some("3<-".to_string())
            ]
        );

        bench.feed(&p, &mut state, write(1));
        bench.feed(&p, &mut state, write(2));
        let outcome = bench.feed(&p, &mut state, write(3));

        assert_eq!(
            outcome,
            Outcome::Completed(vec![
                (PlayerId(1), vec!["1<-".to_string(), "1<2<-".to_string()]),
                (PlayerId(2), vec!["2<-".to_string(), "2<3<-".to_string()]),
                (PlayerId(3), vec!["3<-".to_string(), "3<1<-".to_string()]),
            ])
        );
    }

    #[test]
    fn test_telephone_zero_rounds() {
        let p = game(0);
        let mut bench = Bench::new(&[1, 2], ());
        assert_eq!(
            bench.start(&p),
            Started::Completed(vec![(PlayerId(1), vec![]), (PlayerId(2), vec![])])
        );
    }

    #[test]
    fn test_telephone_departure_mid_round() {
        let p = game(1);
        let mut bench = Bench::new(&[1, 2], ());
        let mut state = bench.suspend(&p);

        bench.feed(&p, &mut state, write(1));
        let outcome = bench.feed(&p, &mut state, Event::remove(PlayerId(2)));
        assert_eq!(
            outcome,
            Outcome::Completed(vec![(PlayerId(1), vec!["1<-".to_string()])])
        );
    }

    #[test]
    fn test_telephone_departure_keeps_others_entries() {
        let p = game(2);
        let mut bench = Bench::new(&[1, 2, 3], ());
        let mut state = bench.suspend(&p);
        bench.feed(&p, &mut state, write(1));
        bench.feed(&p, &mut state, write(2));
        bench.feed(&p, &mut state, write(3));

        // Player 2 now holds the chain player 3 started
        assert_eq!(bench.feed(&p, &mut state, Event::remove(PlayerId(2))), Outcome::Suspended);
        assert_eq!(state.order, vec![PlayerId(3), PlayerId(1)]);
        assert_eq!(state.retired.len(), 1);

        bench.feed(&p, &mut state, write(1));
        let outcome = bench.feed(&p, &mut state, write(3));
        assert_eq!(
            outcome,
            Outcome::Completed(vec![
                (PlayerId(1), vec!["1<-".to_string(), "1<2<-".to_string()]),
                (PlayerId(3), vec!["3<-".to_string(), "3<1<-".to_string()]),
            ])
        );
    }

    #[test]
    fn test_telephone_newcomer_joins_mid_round() {
        let p = game(2);
        let mut bench = Bench::new(&[1, 2], ());
        let mut state = bench.suspend(&p);
        bench.feed(&p, &mut state, write(1));

        assert_eq!(bench.feed(&p, &mut state, Event::add(PlayerId(3))), Outcome::Suspended);
        assert_eq!(state.order, vec![PlayerId(1), PlayerId(2), PlayerId(3)]);
        assert!(state.join.instances.contains(PlayerId(3)));

        bench.feed(&p, &mut state, write(2));
        bench.feed(&p, &mut state, write(3));
        assert_eq!(state.round, 1);

        bench.feed(&p, &mut state, write(1));
        bench.feed(&p, &mut state, write(2));
        let outcome = bench.feed(&p, &mut state, write(3));
        assert_eq!(
            outcome,
            Outcome::Completed(vec![
                (PlayerId(1), vec!["1<-".to_string(), "1<2<-".to_string()]),
                (PlayerId(2), vec!["2<-".to_string(), "2<3<-".to_string()]),
                (PlayerId(3), vec!["3<-".to_string(), "3<1<-".to_string()]),
            ])
        );
    }

    #[test]
    fn test_telephone_resumes_from_json() {
        let p = game(2);
        let mut bench = Bench::new(&[1, 2], ());
        let mut state = bench.suspend(&p);
        bench.feed(&p, &mut state, write(1));
        bench.feed(&p, &mut state, write(2));

        let json = serde_json::to_string(&state).unwrap();
        let mut restored: Rotation<Sheet, (), String> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.round, 1);

        bench.feed(&p, &mut restored, write(2));
        let outcome = bench.feed(&p, &mut restored, write(1));
        let Outcome::Completed(chains) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(chains[0].0, PlayerId(1));
        assert_eq!(chains[0].1.len(), 2);
    }
}
