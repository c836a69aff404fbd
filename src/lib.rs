//! RuneCast Flow Library
//!
//! This crate provides resumable game flow for RuneCast party games.
//!
//! # Overview
//!
//! - **Process combinators** - Games are trees of small processes
//!   (`sequence`, `or`, `all`, `telephone`, ...) advanced one event at a time.
//!
//! - **Resumable frames** - Every process keeps its bookkeeping in plain
//!   serde data, so a game can be persisted and restored mid-round.
//!
//! - **Lobby and prompts** - Ready-made setup phase and leaf processes.
//!
//! - **Sessions** - Drive a process tree, track its status, index by player.
//!
//! # Design Principles
//!
//! 1. **Events in, effects out** - Processes never call out to the world;
//!    they emit effects to a `Host` and wait for the resulting events.
//!
//! 2. **Identity over position** - Players are addressed by id, never by
//!    roster index.
//!
//! 3. **No networking** - This crate is pure flow, no chat or HTTP.
//!
//! # Example
//!
//! ```rust
//! use runecast_flow::config::FlowConfig;
//! use runecast_flow::flow::{all, forward, Action, Event, PlayerId, Recorder, Roster, Seat};
//! use runecast_flow::game::{lobby, Ballot, Choose, Lobby, Session, SessionStatus};
//!
//! let game = forward(
//!     lobby(|_: &Lobby, roster: &Roster| roster.ids().to_vec()),
//!     all(Choose, |_: &Vec<PlayerId>, seat: Seat<'_, String>| {
//!         Ballot::ja_nein().with_current(seat.current)
//!     }),
//!     Lobby::new("table", &FlowConfig::default()),
//! );
//!
//! let mut host = Recorder::new();
//! let mut session = Session::new("game-1", game, ())
//!     .with_roster(Roster::from_players([PlayerId(1), PlayerId(2)]));
//!
//! session.start(&mut host)?;
//! session.advance(&mut host, &Event::interaction(Action::new(PlayerId(1), "_start")))?;
//! for (player, vote) in [(1, "ja"), (2, "nein")] {
//!     let action = Action::new(PlayerId(player), "choose").with_value(vote);
//!     session.advance(&mut host, &Event::interaction(action))?;
//! }
//!
//! assert_eq!(session.status(), SessionStatus::Finished);
//! # Ok::<(), runecast_flow::flow::FlowError>(())
//! ```

pub mod config;
pub mod flow;
pub mod game;

pub use config::FlowConfig;
pub use flow::{Event, FlowError, PlayerId, Process, ProcessExt, Roster};
