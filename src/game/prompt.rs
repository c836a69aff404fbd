//! Reusable leaf processes.
//!
//! Each leaf renders its own view and validates its own input: bad input is
//! rejected back to the user and the leaf stays suspended.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow::{Answer, Audience, Effect, Event, Outcome, PlayerId, Process, Result, Scope, Started};

/// Reasons a prompt turns input away. The text is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("\"{0}\" is not one of the options")]
    NotAnOption(String),

    #[error("Pick one of the options")]
    NothingChosen,

    #[error("Your message is empty")]
    EmptyMessage,
}

fn audience<C>(cx: &Scope<'_, C>) -> Audience {
    cx.player().map(Audience::Player).unwrap_or(Audience::Public)
}

/// Options for a [`Choose`] prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub title: String,
    pub options: Vec<String>,

    /// Previously chosen option, shown as selected
    #[serde(default)]
    pub current: Option<String>,
}

impl Ballot {
    pub fn new(title: impl Into<String>, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            title: title.into(),
            options: options.into_iter().map(Into::into).collect(),
            current: None,
        }
    }

    /// Yes/no vote.
    pub fn ja_nein() -> Self {
        Self::new("Vote", ["ja", "nein"])
    }

    pub fn with_current(mut self, current: Option<&String>) -> Self {
        self.current = current.cloned();
        self
    }

    pub fn is_option(&self, value: &str) -> bool {
        self.options.iter().any(|o| o == value)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "prompt": "choose",
            "title": self.title,
            "options": self.options,
            "current": self.current
        })
    }
}

/// Pick one option from a [`Ballot`].
///
/// `choose` with a valid value answers it, `retract` takes the answer back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Choose;

impl Process<Ballot> for Choose {
    type Output = Answer<String>;
    type State = ();

    fn start(&self, cx: &mut Scope<'_, Ballot>) -> Result<Started<(), Answer<String>>> {
        let view = cx.context.to_json();
        cx.render(audience(cx), view);
        Ok(Started::Suspended(()))
    }

    fn advance(
        &self,
        _state: &mut (),
        cx: &mut Scope<'_, Ballot>,
        event: &Event,
    ) -> Result<Outcome<Answer<String>>> {
        let action = match event {
            Event::Update => {
                let view = cx.context.to_json();
                cx.render(audience(cx), view);
                return Ok(Outcome::Suspended);
            }
            Event::Interaction { action } => action,
            _ => return Ok(Outcome::Suspended),
        };

        match action.custom_id.as_str() {
            "choose" => {
                let Some(value) = action.value() else {
                    cx.reject(action.user, PromptError::NothingChosen.to_string());
                    return Ok(Outcome::Suspended);
                };
                if !cx.context.is_option(value) {
                    cx.reject(action.user, PromptError::NotAnOption(value.to_string()).to_string());
                    return Ok(Outcome::Suspended);
                }
                Ok(Outcome::Completed(Answer::Given(value.to_string())))
            }
            "retract" => Ok(Outcome::Completed(Answer::Retracted)),
            _ => Ok(Outcome::Suspended),
        }
    }
}

/// Context for a [`Compose`] prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub prompt: String,

    /// What this player was handed to continue, if anything
    #[serde(default)]
    pub previous: Option<String>,
}

impl Draft {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: Option<&String>) -> Self {
        self.previous = previous.cloned();
        self
    }
}

/// Free text answer, written as a direct message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compose;

impl Compose {
    fn render(cx: &mut Scope<'_, Draft>) {
        let view = serde_json::json!({
            "prompt": "compose",
            "text": cx.context.prompt,
            "previous": cx.context.previous
        });
        cx.render(audience(cx), view);
    }
}

impl Process<Draft> for Compose {
    type Output = Answer<String>;
    type State = ();

    fn start(&self, cx: &mut Scope<'_, Draft>) -> Result<Started<(), Answer<String>>> {
        Self::render(cx);
        Ok(Started::Suspended(()))
    }

    fn advance(
        &self,
        _state: &mut (),
        cx: &mut Scope<'_, Draft>,
        event: &Event,
    ) -> Result<Outcome<Answer<String>>> {
        match event {
            Event::Update => {
                Self::render(cx);
                Ok(Outcome::Suspended)
            }
            Event::Dm { message } => {
                let text = message.content.trim();
                if text.is_empty() {
                    cx.reject(message.author, PromptError::EmptyMessage.to_string());
                    return Ok(Outcome::Suspended);
                }
                Ok(Outcome::Completed(Answer::Given(text.to_string())))
            }
            _ => Ok(Outcome::Suspended),
        }
    }
}

/// Request external resources and wait until all of them have loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitResources {
    ids: Vec<String>,
}

impl AwaitResources {
    pub fn new(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl<C> Process<C> for AwaitResources {
    type Output = ();
    /// Ids still loading
    type State = BTreeSet<String>;

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<Self::State, ()>> {
        let mut pending = BTreeSet::new();
        for id in &self.ids {
            // Requested order, each id once
            if pending.insert(id.clone()) {
                cx.emit(Effect::Load { id: id.clone() });
            }
        }
        if pending.is_empty() {
            return Ok(Started::Completed(()));
        }
        Ok(Started::Suspended(pending))
    }

    fn advance(&self, pending: &mut Self::State, _cx: &mut Scope<'_, C>, event: &Event) -> Result<Outcome<()>> {
        if let Event::ExternalResourceLoaded { id } = event {
            if pending.remove(id) {
                tracing::debug!(id = %id, remaining = pending.len(), "Resource loaded");
            }
        }
        Ok(if pending.is_empty() {
            Outcome::Completed(())
        } else {
            Outcome::Suspended
        })
    }
}

/// Completes with the id of the first player to leave.
#[derive(Debug, Clone, Copy, Default)]
pub struct Departure;

impl<C> Process<C> for Departure {
    type Output = PlayerId;
    type State = ();

    fn start(&self, _cx: &mut Scope<'_, C>) -> Result<Started<(), PlayerId>> {
        Ok(Started::Suspended(()))
    }

    fn advance(&self, _state: &mut (), _cx: &mut Scope<'_, C>, event: &Event) -> Result<Outcome<PlayerId>> {
        Ok(match event {
            Event::Remove { player, .. } => Outcome::Completed(*player),
            _ => Outcome::Suspended,
        })
    }
}

/// "Another round?" prompt: `again` answers true, `stop` false.
#[derive(Debug, Clone, Copy, Default)]
pub struct Again;

impl<C> Process<C> for Again {
    type Output = bool;
    type State = ();

    fn start(&self, cx: &mut Scope<'_, C>) -> Result<Started<(), bool>> {
        cx.render(Audience::Public, serde_json::json!({"prompt": "again"}));
        Ok(Started::Suspended(()))
    }

    fn advance(&self, _state: &mut (), cx: &mut Scope<'_, C>, event: &Event) -> Result<Outcome<bool>> {
        let Some(action) = event.action() else {
            return Ok(Outcome::Suspended);
        };
        if !cx.roster().contains(action.user) {
            return Ok(Outcome::Suspended);
        }
        Ok(match action.custom_id.as_str() {
            "again" => Outcome::Completed(true),
            "stop" => Outcome::Completed(false),
            _ => Outcome::Suspended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Action, DirectMessage, Recorder, Roster};
    use pretty_assertions::assert_eq;

    fn choose(user: u64, value: &str) -> Event {
        Event::interaction(Action::new(PlayerId(user), "choose").with_value(value))
    }

    #[test]
    fn test_choose_valid_option() {
        let mut host = Recorder::new();
        let roster = Roster::from_players([PlayerId(1)]);
        let mut ballot = Ballot::ja_nein();
        let mut cx = Scope::new(&mut host, &roster, &mut ballot);
        let mut seat_ballot = cx.context.clone();
        let mut cx = cx.seat(PlayerId(1), &mut seat_ballot);

        assert_eq!(Choose.start(&mut cx).unwrap(), Started::Suspended(()));
        assert_eq!(
            Choose.advance(&mut (), &mut cx, &choose(1, "ja")).unwrap(),
            Outcome::Completed(Answer::Given("ja".to_string()))
        );
        assert_eq!(host.views_for(PlayerId(1))[0]["options"], serde_json::json!(["ja", "nein"]));
    }

    #[test]
    fn test_choose_rejects_unknown_option() {
        let mut host = Recorder::new();
        let roster = Roster::from_players([PlayerId(1)]);
        let mut ballot = Ballot::ja_nein();
        let mut cx = Scope::new(&mut host, &roster, &mut ballot);

        assert_eq!(Choose.advance(&mut (), &mut cx, &choose(1, "vielleicht")).unwrap(), Outcome::Suspended);
        assert_eq!(
            Choose
                .advance(&mut (), &mut cx, &Event::interaction(Action::new(PlayerId(1), "choose")))
                .unwrap(),
            Outcome::Suspended
        );
        assert_eq!(
            host.rejections(),
            vec![
                (PlayerId(1), "\"vielleicht\" is not one of the options"),
                (PlayerId(1), "Pick one of the options"),
            ]
        );
    }

    #[test]
    fn test_choose_retract() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ballot = Ballot::ja_nein().with_current(Some(&"ja".to_string()));
        let mut cx = Scope::new(&mut host, &roster, &mut ballot);

        let retract = Event::interaction(Action::new(PlayerId(1), "retract"));
        assert_eq!(
            Choose.advance(&mut (), &mut cx, &retract).unwrap(),
            Outcome::Completed(Answer::Retracted)
        );
    }

    #[test]
    fn test_compose_rejects_empty_message() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut draft = Draft::new("Describe the picture");
        let mut cx = Scope::new(&mut host, &roster, &mut draft);

        let blank = Event::dm(DirectMessage::new(PlayerId(2), "   "));
        assert_eq!(Compose.advance(&mut (), &mut cx, &blank).unwrap(), Outcome::Suspended);

        let text = Event::dm(DirectMessage::new(PlayerId(2), " a cat "));
        assert_eq!(
            Compose.advance(&mut (), &mut cx, &text).unwrap(),
            Outcome::Completed(Answer::Given("a cat".to_string()))
        );
        assert_eq!(host.rejections(), vec![(PlayerId(2), "Your message is empty")]);
    }

    #[test]
    fn test_await_resources() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = ();
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);

        let p = AwaitResources::new(["deck", "art", "deck"]);
        let Started::Suspended(mut pending) = p.start(&mut cx).unwrap() else {
            panic!("expected suspension");
        };
        assert_eq!(p.advance(&mut pending, &mut cx, &Event::loaded("deck")).unwrap(), Outcome::Suspended);
        assert_eq!(p.advance(&mut pending, &mut cx, &Event::loaded("deck")).unwrap(), Outcome::Suspended);
        assert_eq!(
            p.advance(&mut pending, &mut cx, &Event::loaded("art")).unwrap(),
            Outcome::Completed(())
        );

        let loads: Vec<_> = host
            .effects()
            .iter()
            .filter_map(|e| match e {
                Effect::Load { id } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(loads, vec!["deck", "art"]);
    }

    #[test]
    fn test_await_nothing_completes_immediately() {
        let mut host = Recorder::new();
        let roster = Roster::new();
        let mut ctx = ();
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);

        let p = AwaitResources::new(Vec::<String>::new());
        assert!(p.start(&mut cx).unwrap().is_completed());
    }

    #[test]
    fn test_departure_and_again() {
        let mut host = Recorder::new();
        let roster = Roster::from_players([PlayerId(1)]);
        let mut ctx = ();
        let mut cx = Scope::new(&mut host, &roster, &mut ctx);

        assert_eq!(
            Departure.advance(&mut (), &mut cx, &Event::remove(PlayerId(5))).unwrap(),
            Outcome::Completed(PlayerId(5))
        );

        let outsider = Event::interaction(Action::new(PlayerId(9), "again"));
        assert_eq!(Again.advance(&mut (), &mut cx, &outsider).unwrap(), Outcome::Suspended);
        let stop = Event::interaction(Action::new(PlayerId(1), "stop"));
        assert_eq!(Again.advance(&mut (), &mut cx, &stop).unwrap(), Outcome::Completed(false));
    }
}
