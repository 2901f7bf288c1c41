//! Declarative predicates.

use std::fmt;
use std::ops::RangeInclusive;

use crate::message::Message;
use crate::response::Response;
use crate::state::EngineState;

use super::{DisconnectReason, Event, Predicate};

type PayloadFn = Box<dyn Fn(&Message) -> bool + Send>;
type DisconnectFn = Box<dyn Fn(&DisconnectReason) -> bool + Send>;

/// A predicate built from criteria.
///
/// Each criterion narrows the match; all given criteria must hold. Command
/// names and numeric ranges together form one criterion: the message must
/// match at least one of them. Nick and channel comparisons use the
/// server's casemapping.
///
/// A filter matches only message events unless [`Filter::disconnect`] is
/// used, which makes it match only the terminal disconnect event.
///
/// ```
/// use slirc_client::Filter;
///
/// let greetings = Filter::new()
///     .command("PRIVMSG")
///     .target("#rust")
///     .payload(|msg| msg.trailing().is_some_and(|t| t.starts_with("hello")));
/// # let _ = greetings;
/// ```
#[derive(Default)]
pub struct Filter {
    commands: Vec<String>,
    numerics: Vec<RangeInclusive<u16>>,
    sender: Option<String>,
    params: Vec<(usize, String)>,
    from_self: Option<bool>,
    payload: Option<PayloadFn>,
    disconnect: Option<DisconnectFn>,
}

impl Filter {
    /// A filter matching every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match this command verb (case-insensitive).
    pub fn command(mut self, command: &str) -> Self {
        self.commands.push(command.to_ascii_uppercase());
        self
    }

    /// Match one numeric reply.
    pub fn numeric(self, code: u16) -> Self {
        self.numerics(code..=code)
    }

    /// Match a known numeric reply.
    pub fn response(self, response: Response) -> Self {
        self.numeric(response.code())
    }

    /// Match a class of numerics, e.g. `400..=599` for errors.
    pub fn numerics(mut self, range: RangeInclusive<u16>) -> Self {
        self.numerics.push(range);
        self
    }

    /// Match the nick in the message prefix.
    pub fn sender(mut self, nick: &str) -> Self {
        self.sender = Some(nick.to_owned());
        self
    }

    /// Match the first parameter: the channel or nick a command targets.
    pub fn target(self, name: &str) -> Self {
        self.param(0, name)
    }

    /// Match the parameter at `index`.
    pub fn param(mut self, index: usize, value: &str) -> Self {
        self.params.push((index, value.to_owned()));
        self
    }

    /// Match only messages we did (`true`) or did not (`false`) originate.
    pub fn from_self(mut self, yes: bool) -> Self {
        self.from_self = Some(yes);
        self
    }

    /// Match an arbitrary condition on the message.
    pub fn payload<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + 'static,
    {
        self.payload = Some(Box::new(f));
        self
    }

    /// Match the disconnect event instead of messages.
    pub fn disconnect(mut self) -> Self {
        self.disconnect = Some(Box::new(|_| true));
        self
    }

    /// Match disconnect events whose reason satisfies `f`.
    pub fn disconnect_when<F>(mut self, f: F) -> Self
    where
        F: Fn(&DisconnectReason) -> bool + Send + 'static,
    {
        self.disconnect = Some(Box::new(f));
        self
    }

    fn matches_message(&self, msg: &Message, state: &EngineState) -> bool {
        if !(self.commands.is_empty() && self.numerics.is_empty()) {
            let by_command = self.commands.iter().any(|c| *c == msg.command);
            let by_numeric = msg
                .numeric()
                .is_some_and(|n| self.numerics.iter().any(|r| r.contains(&n)));
            if !(by_command || by_numeric) {
                return false;
            }
        }

        let mapping = state.caps().casemapping();
        if let Some(ref want) = self.sender {
            if !msg.source_nick().is_some_and(|nick| mapping.eq(nick, want)) {
                return false;
            }
        }
        for (index, value) in &self.params {
            if !msg.param(*index).is_some_and(|p| mapping.eq(p, value)) {
                return false;
            }
        }
        if let Some(yes) = self.from_self {
            let mine = msg.source_nick().is_some_and(|nick| state.is_me(nick));
            if mine != yes {
                return false;
            }
        }
        self.payload.as_ref().map_or(true, |f| f(msg))
    }
}

impl Predicate for Filter {
    fn matches(&self, event: &Event, state: &EngineState) -> bool {
        match (event, &self.disconnect) {
            (Event::Message(msg), None) => self.matches_message(msg, state),
            (Event::Disconnected(reason), Some(f)) => f(reason),
            _ => false,
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("commands", &self.commands)
            .field("numerics", &self.numerics)
            .field("sender", &self.sender)
            .field("params", &self.params)
            .field("from_self", &self.from_self)
            .field("payload", &self.payload.is_some())
            .field("disconnect", &self.disconnect.is_some())
            .finish()
    }
}
