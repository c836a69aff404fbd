//! Roster of participating players.
//!
//! The roster is ordered (join order) but players are always addressed by
//! identity: removing someone shifts positions, never identities.

use serde::{Deserialize, Serialize};

use super::event::{Event, PlayerId};

/// Ordered, identity-keyed set of players in a game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    players: Vec<PlayerId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from players in seating order. Duplicates are dropped.
    pub fn from_players(players: impl IntoIterator<Item = PlayerId>) -> Self {
        let mut roster = Self::new();
        for player in players {
            roster.add(player);
        }
        roster
    }

    /// Add a player at the end. Returns false if already present.
    pub fn add(&mut self, player: PlayerId) -> bool {
        if self.contains(player) {
            return false;
        }
        self.players.push(player);
        true
    }

    /// Remove a player. Returns false if they were not present.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        match self.position(player) {
            Some(index) => {
                self.players.remove(index);
                true
            }
            None => false,
        }
    }

    /// Apply a roster-changing event. Other events are ignored.
    ///
    /// Returns true if the roster changed.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::Add { player, .. } => self.add(*player),
            Event::Remove { player, .. } => self.remove(*player),
            _ => false,
        }
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }

    pub fn position(&self, player: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| *p == player)
    }

    pub fn ids(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn iter(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn first(&self) -> Option<PlayerId> {
        self.players.first().copied()
    }
}
