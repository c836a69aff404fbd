//! Resumable process combinators.
//!
//! A game is a tree of processes driven one event at a time:
//!
//! - `event` / `roster` - the inputs and who is playing
//! - `process` - the `Process` trait, `Scope`, effects and closure leaves
//! - `sequence` - `then`, `map`, `sequence`, `repeat`
//! - `race` - `or`, `before`
//! - `phase` - `forward` (setup phase into main phase)
//! - `fanout` - per-player `first` and `all`
//! - `telephone` - rotating rounds of `all`
//!
//! # Architecture
//!
//! ```text
//!              Event
//!                │
//!                ▼
//!   ┌─────────────────────────┐      Effect      ┌──────────┐
//!   │  root process + frame   │ ───────────────▶ │   Host   │
//!   │                         │                  └──────────┘
//!   │  sequence / or / all …  │                        │
//!   │     └─ leaf processes   │ ◀── later events ──────┘
//!   └─────────────────────────┘
//! ```
//!
//! Process values hold no runtime data. Everything that has to survive a
//! restart lives in the shared context, the roster and the frame
//! (`Process::State`), all of which are plain serde data.

pub mod error;
pub mod event;
pub mod fanout;
pub mod phase;
pub mod process;
pub mod race;
pub mod roster;
pub mod sequence;
pub mod telephone;

pub use error::{FlowError, Result};
pub use event::{Action, Command, DirectMessage, Event, PlayerId};
pub use fanout::{all, first, All, Answer, First, Instance, Join, Registry, Seat};
pub use phase::{forward, Forward, Phase};
pub use process::{
    leaf, Audience, BoxProcess, Effect, Host, Leaf, Outcome, Process, ProcessExt, Recorder, Scope,
    Started,
};
pub use race::{before, or, Before, BeforeState, Or};
pub use roster::Roster;
pub use sequence::{map, repeat, sequence, then, Loop, Map, Sequence, Staged, Then};
pub use telephone::{telephone, Rotation, Telephone, Turn, Written};
