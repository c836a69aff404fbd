//! Game sessions.
//!
//! A session owns one process tree together with everything needed to
//! resume it: the shared context, the roster and the root frame. Sessions
//! are driven one event at a time; the manager indexes them by id and by
//! player.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::flow::{Event, FlowError, Host, Outcome, PlayerId, Process, Result, Roster, Scope, Started};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not started
    #[default]
    Idle,
    /// Process tree suspended, waiting for events
    Running,
    /// Process tree completed
    Finished,
    /// Killed, or the process tree failed
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if session is active (can receive events).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if session is terminal (cannot change).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// Persisted form of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub status: SessionStatus,
    pub context: serde_json::Value,
    pub roster: Roster,

    /// Root frame, absent unless running
    #[serde(default)]
    pub state: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// One game: a process tree and its data.
pub struct Session<C, P: Process<C>> {
    /// Unique session ID
    pub id: String,

    process: P,
    context: C,
    roster: Roster,

    /// Root frame while running
    state: Option<P::State>,

    status: SessionStatus,

    /// Result of the process tree once finished
    output: Option<P::Output>,

    /// Events waiting for `pump`
    inbox: VecDeque<Event>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl<C, P: Process<C>> Session<C, P> {
    pub fn new(id: impl Into<String>, process: P, context: C) -> Self {
        Self {
            id: id.into(),
            process,
            context,
            roster: Roster::new(),
            state: None,
            status: SessionStatus::Idle,
            output: None,
            inbox: VecDeque::new(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Seat players before the session starts.
    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn output(&self) -> Option<&P::Output> {
        self.output.as_ref()
    }

    pub fn take_output(&mut self) -> Option<P::Output> {
        self.output.take()
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Construct the process tree. It may finish right away.
    pub fn start(&mut self, host: &mut dyn Host) -> Result<SessionStatus> {
        if self.status != SessionStatus::Idle {
            return Err(FlowError::AlreadyStarted);
        }

        self.status = SessionStatus::Running;
        self.started_at = Some(Utc::now());
        tracing::info!(session = %self.id, players = self.roster.len(), "Session started");

        let mut cx = Scope::new(host, &self.roster, &mut self.context);
        match self.process.start(&mut cx) {
            Ok(Started::Suspended(state)) => self.state = Some(state),
            Ok(Started::Completed(value)) => self.finish(value),
            Err(error) => return Err(self.fail(error)),
        }
        Ok(self.status)
    }

    /// Feed one event. Roster changes are applied before the process
    /// sees the event.
    pub fn advance(&mut self, host: &mut dyn Host, event: &Event) -> Result<SessionStatus> {
        match self.status {
            SessionStatus::Idle => return Err(FlowError::NotStarted),
            SessionStatus::Finished | SessionStatus::Cancelled => return Err(FlowError::Finished),
            SessionStatus::Running => {}
        }
        let Some(state) = self.state.as_mut() else {
            return Err(FlowError::NotStarted);
        };

        if self.roster.apply(event) {
            tracing::debug!(session = %self.id, event = %event, players = self.roster.len(), "Roster changed");
        }

        let mut cx = Scope::new(host, &self.roster, &mut self.context);
        match self.process.advance(state, &mut cx, event) {
            Ok(Outcome::Suspended) => {}
            Ok(Outcome::Completed(value)) => self.finish(value),
            Err(error) => return Err(self.fail(error)),
        }
        Ok(self.status)
    }

    /// Queue an event for a later `pump`.
    pub fn enqueue(&mut self, event: Event) {
        self.inbox.push_back(event);
    }

    /// Feed queued events in order until the inbox is empty or the session
    /// ends. Events left over after the end are dropped. Returns how many
    /// events were fed.
    pub fn pump(&mut self, host: &mut dyn Host) -> Result<usize> {
        let mut fed = 0;
        while let Some(event) = self.inbox.pop_front() {
            if self.status.is_terminal() {
                tracing::debug!(session = %self.id, dropped = self.inbox.len() + 1, "Dropping events after session end");
                self.inbox.clear();
                break;
            }
            self.advance(host, &event)?;
            fed += 1;
        }
        Ok(fed)
    }

    /// Cancel the session. Nothing in the process tree is notified.
    /// Returns false if it had already ended.
    pub fn kill(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Cancelled;
        self.state = None;
        self.inbox.clear();
        self.ended_at = Some(Utc::now());
        tracing::info!(session = %self.id, "Session killed");
        true
    }

    fn finish(&mut self, value: P::Output) {
        self.status = SessionStatus::Finished;
        self.state = None;
        self.output = Some(value);
        self.ended_at = Some(Utc::now());
        tracing::info!(session = %self.id, "Session finished");
    }

    fn fail(&mut self, error: FlowError) -> FlowError {
        self.status = SessionStatus::Cancelled;
        self.state = None;
        self.ended_at = Some(Utc::now());
        tracing::error!(session = %self.id, error = %error, "Session failed");
        error
    }

    /// Capture everything needed to resume this session later.
    pub fn snapshot(&self) -> Result<Snapshot>
    where
        C: Serialize,
    {
        Ok(Snapshot {
            id: self.id.clone(),
            status: self.status,
            context: serde_json::to_value(&self.context)?,
            roster: self.roster.clone(),
            state: self.state.as_ref().map(serde_json::to_value).transpose()?,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        })
    }

    /// Rebuild a session from a snapshot and a freshly constructed process
    /// tree of the same shape.
    pub fn restore(snapshot: Snapshot, process: P) -> Result<Self>
    where
        C: DeserializeOwned,
    {
        let state: Option<P::State> = snapshot.state.map(serde_json::from_value).transpose()?;
        if snapshot.status == SessionStatus::Running && state.is_none() {
            return Err(FlowError::NotStarted);
        }
        tracing::info!(session = %snapshot.id, status = snapshot.status.as_str(), "Session restored");

        Ok(Self {
            id: snapshot.id,
            process,
            context: serde_json::from_value(snapshot.context)?,
            roster: snapshot.roster,
            state,
            status: snapshot.status,
            output: None,
            inbox: VecDeque::new(),
            created_at: snapshot.created_at,
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
        })
    }
}

/// Session manager - tracks all sessions.
pub struct SessionManager<C, P: Process<C>> {
    /// Sessions by ID
    sessions: HashMap<String, Session<C, P>>,

    /// Player ID to session ID mapping
    player_index: HashMap<PlayerId, String>,
}

impl<C, P: Process<C>> Default for SessionManager<C, P> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            player_index: HashMap::new(),
        }
    }
}

impl<C, P: Process<C>> SessionManager<C, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session.
    pub fn add(&mut self, session: Session<C, P>) {
        let id = session.id.clone();
        self.sessions.insert(id.clone(), session);
        self.reindex(&id);
    }

    /// Get a session.
    pub fn get(&self, id: &str) -> Option<&Session<C, P>> {
        self.sessions.get(id)
    }

    /// Get a mutable session.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session<C, P>> {
        self.sessions.get_mut(id)
    }

    /// Get session for a player.
    pub fn get_for_player(&self, player: PlayerId) -> Option<&Session<C, P>> {
        self.player_index
            .get(&player)
            .and_then(|id| self.sessions.get(id))
    }

    /// Feed an event to one session.
    pub fn advance(&mut self, id: &str, host: &mut dyn Host, event: &Event) -> Result<SessionStatus> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| FlowError::UnknownSession(id.to_string()))?;
        let result = session.advance(host, event);
        self.reindex(id);
        result
    }

    /// Route an event to the session of the player it comes from. Returns
    /// the session it went to, if any.
    ///
    /// Only players already seated in a session are indexed, so a `join`
    /// press from a newcomer, an `Add` for them, or a resource event with
    /// no actor goes nowhere. Use [`dispatch_or`](Self::dispatch_or) for
    /// those.
    pub fn dispatch(&mut self, host: &mut dyn Host, event: &Event) -> Result<Option<String>> {
        let Some(id) = self.route(event) else {
            tracing::debug!(event = %event, "No session for event");
            return Ok(None);
        };
        self.advance(&id, host, event)?;
        Ok(Some(id))
    }

    /// Like [`dispatch`](Self::dispatch), but an event whose actor is not
    /// seated anywhere goes to session `fallback`.
    pub fn dispatch_or(&mut self, host: &mut dyn Host, event: &Event, fallback: &str) -> Result<String> {
        let id = self.route(event).unwrap_or_else(|| fallback.to_string());
        self.advance(&id, host, event)?;
        Ok(id)
    }

    fn route(&self, event: &Event) -> Option<String> {
        event
            .actor()
            .and_then(|player| self.player_index.get(&player))
            .cloned()
    }

    /// Point every roster player of a session at it, and forget players
    /// who left it.
    fn reindex(&mut self, id: &str) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        self.player_index
            .retain(|player, indexed| indexed != id || session.roster().contains(*player));
        for player in session.roster().iter() {
            self.player_index.insert(player, id.to_string());
        }
    }

    /// Remove a session.
    pub fn remove(&mut self, id: &str) -> Option<Session<C, P>> {
        let session = self.sessions.remove(id)?;
        self.player_index.retain(|_, indexed| indexed != id);
        Some(session)
    }

    /// Clean up finished and cancelled sessions.
    pub fn cleanup_finished(&mut self) -> Vec<String> {
        let finished: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.status().is_terminal())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &finished {
            self.remove(id);
        }

        finished
    }

    /// Count active sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.values().filter(|s| s.status().is_active()).count()
    }

    /// Total session count.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
