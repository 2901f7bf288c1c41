//! Nick negotiation.
//!
//! Tracks the nick we want, the nick we hold and the nick we last asked
//! for. `current` changes only when the server confirms it: through
//! `RPL_WELCOME`, or a NICK message whose source is our current nick.

use tracing::{debug, warn};

use crate::casemap::CaseMapping;
use crate::error::NickError;
use crate::message::Message;

/// How fallback nicks are derived once the configured alternates run out.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FallbackStrategy {
    /// Append the suffix once per further attempt: `nick_`, `nick__`, ...
    Suffix(String),
    /// Append an increasing counter: `nick1`, `nick2`, ...
    Counter,
}

impl Default for FallbackStrategy {
    fn default() -> Self {
        FallbackStrategy::Suffix("_".to_owned())
    }
}

/// Policy applied when the server rejects a requested nick.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NickPolicy {
    /// Nicks tried, in order, before the strategy kicks in.
    pub alternates: Vec<String>,
    /// Derivation for attempts past the alternates.
    pub strategy: FallbackStrategy,
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
}

impl Default for NickPolicy {
    fn default() -> Self {
        NickPolicy {
            alternates: Vec::new(),
            strategy: FallbackStrategy::default(),
            max_attempts: 5,
        }
    }
}

impl NickPolicy {
    /// Fallback for the `attempt`th rejection (1-based) of `desired`.
    ///
    /// Pure: the same inputs always give the same nick. Results are cut to
    /// `nicklen` characters, shortening the base so suffixes survive.
    pub fn fallback(&self, desired: &str, attempt: u32, nicklen: Option<usize>) -> String {
        let index = attempt.saturating_sub(1) as usize;
        if let Some(alt) = self.alternates.get(index) {
            return truncate(alt, nicklen);
        }
        let n = index - self.alternates.len() + 1;
        let tail = match &self.strategy {
            FallbackStrategy::Suffix(suffix) => suffix.repeat(n),
            FallbackStrategy::Counter => n.to_string(),
        };
        let base = match nicklen {
            Some(max) => truncate(desired, Some(max.saturating_sub(tail.chars().count()))),
            None => desired.to_owned(),
        };
        truncate(&format!("{}{}", base, tail), nicklen)
    }
}

fn truncate(s: &str, max: Option<usize>) -> String {
    match max {
        Some(max) => s.chars().take(max).collect(),
        None => s.to_owned(),
    }
}

/// Negotiation phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NickPhase {
    /// Nothing sent yet.
    #[default]
    Unset,
    /// A NICK is outstanding.
    Requested,
    /// `current` is the last confirmed nick and nothing is outstanding.
    Confirmed,
}

/// What a NICK message meant for us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NickChange {
    /// Confirmation of a nick we asked for.
    Confirmed(String),
    /// The server renamed us without being asked.
    Forced {
        /// Nick we held.
        old: String,
        /// Nick the server gave us.
        new: String,
    },
    /// Someone else changed nick.
    Other,
}

/// Nick negotiation state for one connection.
#[derive(Clone, Debug)]
pub struct NickState {
    desired: String,
    current: Option<String>,
    pending: Option<String>,
    phase: NickPhase,
    attempts: u32,
    policy: NickPolicy,
    mapping: CaseMapping,
}

impl NickState {
    /// Fresh state wanting `desired`.
    pub fn new(desired: impl Into<String>, policy: NickPolicy) -> Self {
        NickState {
            desired: desired.into(),
            current: None,
            pending: None,
            phase: NickPhase::Unset,
            attempts: 0,
            policy,
            mapping: CaseMapping::default(),
        }
    }

    /// The nick we want.
    pub fn desired(&self) -> &str {
        &self.desired
    }

    /// The nick the server attributes to us.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The nick sent and awaiting confirmation.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Negotiation phase.
    pub fn phase(&self) -> NickPhase {
        self.phase
    }

    /// Attempts made for the outstanding request.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The fallback policy.
    pub fn policy(&self) -> &NickPolicy {
        &self.policy
    }

    /// Whether `nick` is our current nick.
    ///
    /// Before registration completes this compares against the pending nick.
    pub fn is_me(&self, nick: &str) -> bool {
        match self.current.as_deref().or(self.pending.as_deref()) {
            Some(me) => self.mapping.eq(me, nick),
            None => false,
        }
    }

    /// Whether `nick` is our current or pending nick.
    pub fn matches(&self, nick: &str) -> bool {
        [self.current.as_deref(), self.pending.as_deref()]
            .into_iter()
            .flatten()
            .any(|n| self.mapping.eq(n, nick))
    }

    pub(crate) fn set_casemapping(&mut self, mapping: CaseMapping) {
        self.mapping = mapping;
    }

    /// Ask for `nick`. Returns the NICK message to send.
    pub fn request(&mut self, nick: impl Into<String>) -> Message {
        let nick = nick.into();
        self.desired = nick.clone();
        self.pending = Some(nick.clone());
        self.phase = NickPhase::Requested;
        self.attempts = 1;
        debug!(nick = %nick, "requesting nick");
        Message::nick(nick)
    }

    /// Handle a nick-rejection numeric for `rejected`.
    ///
    /// Returns the next NICK to send, `None` when the rejection is not about
    /// our outstanding request, or [`NickError::Exhausted`] when the policy
    /// bound is reached. On exhaustion after registration the previous
    /// nick stays current.
    pub fn on_rejected(
        &mut self,
        rejected: Option<&str>,
        nicklen: Option<usize>,
    ) -> Result<Option<Message>, NickError> {
        if self.phase != NickPhase::Requested {
            return Ok(None);
        }
        let Some(pending) = self.pending.as_deref() else {
            return Ok(None);
        };
        if let Some(rejected) = rejected {
            if !self.mapping.eq(pending, rejected) {
                return Ok(None);
            }
        }
        if self.attempts >= self.policy.max_attempts {
            let err = NickError::Exhausted {
                desired: self.desired.clone(),
                attempts: self.attempts,
            };
            self.pending = None;
            self.phase = if self.current.is_some() {
                NickPhase::Confirmed
            } else {
                NickPhase::Unset
            };
            return Err(err);
        }
        let next = self.policy.fallback(&self.desired, self.attempts, nicklen);
        warn!(rejected = %pending, next = %next, attempt = self.attempts + 1, "nick rejected, trying fallback");
        self.attempts += 1;
        self.pending = Some(next.clone());
        Ok(Some(Message::nick(next)))
    }

    /// Registration succeeded; the server assigned `nick`.
    pub fn on_welcome(&mut self, nick: Option<&str>) {
        let nick = nick
            .filter(|n| !n.is_empty() && *n != "*")
            .map(str::to_owned)
            .or_else(|| self.pending.take());
        if let Some(nick) = nick {
            debug!(nick = %nick, "nick confirmed by welcome");
            self.current = Some(nick);
        }
        self.pending = None;
        self.phase = NickPhase::Confirmed;
    }

    /// A NICK message changed `old` to `new`.
    pub fn on_nick(&mut self, old: &str, new: &str) -> NickChange {
        let Some(current) = self.current.as_deref() else {
            return NickChange::Other;
        };
        if !self.mapping.eq(current, old) {
            return NickChange::Other;
        }
        let old = current.to_owned();
        self.current = Some(new.to_owned());
        let solicited = self
            .pending
            .as_deref()
            .is_some_and(|p| self.mapping.eq(p, new));
        if solicited {
            self.pending = None;
            self.phase = NickPhase::Confirmed;
            debug!(old = %old, new = %new, "nick change confirmed");
            NickChange::Confirmed(new.to_owned())
        } else {
            warn!(old = %old, new = %new, "nick changed by server");
            NickChange::Forced {
                old,
                new: new.to_owned(),
            }
        }
    }

    /// Forget everything the last connection established.
    pub(crate) fn reset(&mut self) {
        self.current = None;
        self.pending = None;
        self.phase = NickPhase::Unset;
        self.attempts = 0;
    }
}
