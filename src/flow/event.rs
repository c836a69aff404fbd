//! Events that drive a process tree.
//!
//! Events are the only way a process advances. Nothing in the flow layer
//! polls external state; whatever the outside world wants a game to notice
//! arrives here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable player identity (chat user snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PlayerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Slash command that opened a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub user: PlayerId,
    pub name: String,
    #[serde(default)]
    pub options: Vec<(String, String)>,
    pub at: DateTime<Utc>,
}

impl Command {
    pub fn new(user: PlayerId, name: impl Into<String>) -> Self {
        Self {
            user,
            name: name.into(),
            options: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A button press or menu selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub user: PlayerId,

    /// Component identifier the user acted on (`"join"`, `"choose"`, ...)
    pub custom_id: String,

    /// Selected values for menus; empty for buttons
    #[serde(default)]
    pub values: Vec<String>,

    pub at: DateTime<Utc>,
}

impl Action {
    pub fn new(user: PlayerId, custom_id: impl Into<String>) -> Self {
        Self {
            user,
            custom_id: custom_id.into(),
            values: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    /// First selected value, if any.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// A direct message sent to the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub author: PlayerId,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl DirectMessage {
    pub fn new(author: PlayerId, content: impl Into<String>) -> Self {
        Self {
            author,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Closed set of inputs a process can observe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Start {
        command: Command,
    },
    Interaction {
        action: Action,
    },
    Add {
        player: PlayerId,
        #[serde(default)]
        action: Option<Action>,
    },
    Remove {
        player: PlayerId,
        #[serde(default)]
        action: Option<Action>,
    },
    Dm {
        message: DirectMessage,
    },
    ExternalResourceLoaded {
        id: String,
    },
    /// Synthetic refresh produced by the fan-out combinators
    Update,
}

impl Event {
    pub fn start(command: Command) -> Self {
        Self::Start { command }
    }

    pub fn interaction(action: Action) -> Self {
        Self::Interaction { action }
    }

    pub fn add(player: PlayerId) -> Self {
        Self::Add {
            player,
            action: None,
        }
    }

    pub fn remove(player: PlayerId) -> Self {
        Self::Remove {
            player,
            action: None,
        }
    }

    pub fn dm(message: DirectMessage) -> Self {
        Self::Dm { message }
    }

    pub fn loaded(id: impl Into<String>) -> Self {
        Self::ExternalResourceLoaded { id: id.into() }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Interaction { .. } => "interaction",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Dm { .. } => "dm",
            Self::ExternalResourceLoaded { .. } => "external_resource_loaded",
            Self::Update => "update",
        }
    }

    /// The player this event originates from, when there is exactly one.
    pub fn actor(&self) -> Option<PlayerId> {
        match self {
            Self::Start { command } => Some(command.user),
            Self::Interaction { action } => Some(action.user),
            Self::Add { player, .. } | Self::Remove { player, .. } => Some(*player),
            Self::Dm { message } => Some(message.author),
            Self::ExternalResourceLoaded { .. } | Self::Update => None,
        }
    }

    /// Interaction action if this is one.
    pub fn action(&self) -> Option<&Action> {
        match self {
            Self::Interaction { action } => Some(action),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interaction { action } => {
                write!(f, "interaction({}, {})", action.user, action.custom_id)
            }
            Self::ExternalResourceLoaded { id } => write!(f, "loaded({})", id),
            other => match other.actor() {
                Some(player) => write!(f, "{}({})", other.as_str(), player),
                None => write!(f, "{}", other.as_str()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor() {
        let p = PlayerId(7);
        assert_eq!(Event::interaction(Action::new(p, "join")).actor(), Some(p));
        assert_eq!(Event::dm(DirectMessage::new(p, "hi")).actor(), Some(p));
        assert_eq!(Event::add(p).actor(), Some(p));
        assert_eq!(Event::loaded("deck").actor(), None);
        assert_eq!(Event::Update.actor(), None);
    }

    #[test]
    fn test_display() {
        let event = Event::interaction(Action::new(PlayerId(1), "choose"));
        assert_eq!(format!("{}", event), "interaction(1, choose)");
        assert_eq!(format!("{}", Event::remove(PlayerId(2))), "remove(2)");
        assert_eq!(format!("{}", Event::Update), "update");
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(Event::loaded("cards")).unwrap();
        assert_eq!(json["kind"], "external_resource_loaded");
        assert_eq!(json["id"], "cards");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, Event::loaded("cards"));
    }

    #[test]
    fn test_command_option() {
        let mut command = Command::new(PlayerId(1), "play");
        command.options.push(("rounds".to_string(), "3".to_string()));
        assert_eq!(command.option("rounds"), Some("3"));
        assert_eq!(command.option("deck"), None);
    }
}
