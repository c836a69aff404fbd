//! Game-level building blocks on top of the flow layer.
//!
//! - `prompt` - leaf processes players interact with
//! - `lobby` - setup phase gathering players
//! - `session` - driving and persisting whole games

pub mod lobby;
pub mod prompt;
pub mod session;

pub use lobby::{lobby, Lobby, LobbyError, LobbyFlow, LobbyMember};
pub use prompt::{Again, AwaitResources, Ballot, Choose, Compose, Departure, Draft, PromptError};
pub use session::{Session, SessionManager, SessionStatus, Snapshot};
