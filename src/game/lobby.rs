//! Lobby setup phase.
//!
//! The lobby gathers players before a game. It never edits the roster
//! itself: `join` and `leave` ask the host to do it, and the resulting
//! `Add`/`Remove` events come back through the lobby like any other event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FlowConfig;
use crate::flow::{Audience, Effect, Event, Outcome, PlayerId, Process, Result, Roster, Scope, Started};

/// A player's entry in the lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub player: PlayerId,

    /// When player joined this lobby
    pub joined_at: DateTime<Utc>,
}

impl LobbyMember {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            joined_at: Utc::now(),
        }
    }
}

/// Lobby state, the setup context of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lobby {
    pub name: String,

    /// Members in join order
    members: Vec<LobbyMember>,

    /// Current host
    pub host: Option<PlayerId>,

    pub min_players: usize,
    pub max_players: usize,

    pub created_at: DateTime<Utc>,
}

impl Lobby {
    pub fn new(name: impl Into<String>, config: &FlowConfig) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            host: None,
            min_players: config.min_players,
            max_players: config.max_players,
            created_at: Utc::now(),
        }
    }

    /// Add a member to the lobby.
    pub fn add_member(&mut self, member: LobbyMember) -> std::result::Result<(), LobbyError> {
        if self.is_full() {
            return Err(LobbyError::Full);
        }

        if self.has_member(member.player) {
            return Err(LobbyError::AlreadyMember);
        }

        // First member becomes host
        if self.host.is_none() {
            self.host = Some(member.player);
        }

        self.members.push(member);
        Ok(())
    }

    /// Remove a member from the lobby.
    pub fn remove_member(&mut self, player: PlayerId) -> Option<LobbyMember> {
        let index = self.members.iter().position(|m| m.player == player)?;
        let member = self.members.remove(index);

        // If host left, the longest-standing member takes over
        if self.host == Some(player) {
            self.host = self.members.first().map(|m| m.player);
        }

        Some(member)
    }

    pub fn has_member(&self, player: PlayerId) -> bool {
        self.members.iter().any(|m| m.player == player)
    }

    pub fn is_host(&self, player: PlayerId) -> bool {
        self.host == Some(player)
    }

    /// Host-only actions are open to anyone until a host exists.
    pub fn may_manage(&self, player: PlayerId) -> bool {
        self.host.map_or(true, |host| host == player)
    }

    pub fn members(&self) -> impl Iterator<Item = &LobbyMember> {
        self.members.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn can_start(&self) -> bool {
        self.members.len() >= self.min_players
    }

    /// Convert to JSON for rendering.
    pub fn to_json(&self) -> serde_json::Value {
        let members: Vec<serde_json::Value> = self
            .members
            .iter()
            .map(|m| {
                serde_json::json!({
                    "user_id": m.player,
                    "joined_at": m.joined_at.to_rfc3339()
                })
            })
            .collect();

        serde_json::json!({
            "lobby": self.name,
            "players": members,
            "host_id": self.host,
            "min_players": self.min_players,
            "max_players": self.max_players,
            "can_start": self.can_start()
        })
    }
}

/// Lobby errors. The text is shown to the user who caused them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("Lobby is full")]
    Full,
    #[error("Already a member of this lobby")]
    AlreadyMember,
    #[error("Not a member of this lobby")]
    NotMember,
    #[error("Not the lobby host")]
    NotHost,
}

pub struct LobbyFlow<F> {
    build: F,
}

/// Lobby setup process over a [`Lobby`] context.
///
/// - `join` / `leave`: request a roster change
/// - `_start`: host only; with enough players completes with
///   `Some(build(lobby, roster))`, otherwise with `None`
/// - `close`: host only, completes with `None`
pub fn lobby<Cb, F>(build: F) -> LobbyFlow<F>
where
    F: Fn(&Lobby, &Roster) -> Cb,
{
    LobbyFlow { build }
}

impl<F> LobbyFlow<F> {
    fn render(cx: &mut Scope<'_, Lobby>) {
        let view = cx.context.to_json();
        cx.render(Audience::Public, view);
    }

    /// Mirror a roster change into the member list.
    fn admit(cx: &mut Scope<'_, Lobby>, player: PlayerId) {
        if let Err(error) = cx.context.add_member(LobbyMember::new(player)) {
            tracing::warn!(player = %player, error = %error, "Could not admit player");
            if error == LobbyError::Full {
                cx.emit(Effect::Leave { player });
            }
        }
    }
}

impl<Cb, F> Process<Lobby> for LobbyFlow<F>
where
    F: Fn(&Lobby, &Roster) -> Cb,
{
    type Output = Option<Cb>;
    type State = ();

    fn start(&self, cx: &mut Scope<'_, Lobby>) -> Result<Started<(), Option<Cb>>> {
        let players: Vec<PlayerId> = cx.roster().iter().collect();
        for player in players {
            Self::admit(cx, player);
        }
        Self::render(cx);
        Ok(Started::Suspended(()))
    }

    fn advance(&self, _state: &mut (), cx: &mut Scope<'_, Lobby>, event: &Event) -> Result<Outcome<Option<Cb>>> {
        let action = match event {
            Event::Add { player, .. } => {
                Self::admit(cx, *player);
                Self::render(cx);
                return Ok(Outcome::Suspended);
            }
            Event::Remove { player, .. } => {
                if cx.context.remove_member(*player).is_some() {
                    tracing::debug!(player = %player, host = ?cx.context.host, "Member left lobby");
                }
                Self::render(cx);
                return Ok(Outcome::Suspended);
            }
            Event::Start { .. } | Event::Update => {
                Self::render(cx);
                return Ok(Outcome::Suspended);
            }
            Event::Interaction { action } => action,
            Event::Dm { .. } | Event::ExternalResourceLoaded { .. } => return Ok(Outcome::Suspended),
        };

        let user = action.user;
        let refused = match action.custom_id.as_str() {
            "join" if cx.context.has_member(user) => Some(LobbyError::AlreadyMember),
            "join" if cx.context.is_full() => Some(LobbyError::Full),
            "join" => {
                cx.emit(Effect::Join { player: user });
                None
            }
            "leave" if !cx.context.has_member(user) => Some(LobbyError::NotMember),
            "leave" => {
                cx.emit(Effect::Leave { player: user });
                None
            }
            "_start" | "close" if !cx.context.may_manage(user) => Some(LobbyError::NotHost),
            "_start" if !cx.context.can_start() => {
                tracing::info!(
                    lobby = %cx.context.name,
                    players = cx.context.member_count(),
                    min = cx.context.min_players,
                    "Not enough players, closing lobby"
                );
                return Ok(Outcome::Completed(None));
            }
            "_start" => {
                tracing::info!(lobby = %cx.context.name, players = cx.roster().len(), "Lobby starting game");
                return Ok(Outcome::Completed(Some((self.build)(cx.context, cx.roster()))));
            }
            "close" => {
                tracing::info!(lobby = %cx.context.name, "Lobby closed by host");
                return Ok(Outcome::Completed(None));
            }
            _ => None,
        };

        if let Some(error) = refused {
            cx.reject(user, error.to_string());
        }
        Ok(Outcome::Suspended)
    }
}
