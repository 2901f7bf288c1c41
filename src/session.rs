//! Sans-IO protocol engine.
//!
//! A [`Session`] owns the tracked state, the dispatcher and an outbound
//! buffer. Feed it inbound lines in arrival order and drain what it wants
//! sent; it performs no I/O and starts no tasks, so it works the same under
//! the async [`Client`](crate::Client), a blocking loop, or a test.
//!
//! ```
//! use slirc_client::{Config, Session};
//!
//! let mut session = Session::new(Config::new("irc.example.net", 6667, "bot"));
//! session.start();
//! let hello: Vec<String> = session.drain_outbound().iter().map(|m| m.to_string()).collect();
//! assert_eq!(hello, ["NICK bot", "USER bot 0 * :slirc client"]);
//!
//! session.feed_line(":irc.example.net 001 bot :Welcome");
//! assert_eq!(session.state().current_nick(), Some("bot"));
//! ```

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::dispatch::{
    install, BuiltinConfig, Context, DisconnectReason, Dispatcher, Event, Flow, HandlerId,
    Predicate,
};
use crate::error::{EngineError, MessageParseError, ProtocolError};
use crate::isupport::Isupport;
use crate::message::Message;
use crate::state::{EngineState, NickState, Registration, RegistrationConfig};

/// One connection's protocol engine.
#[derive(Debug)]
pub struct Session {
    config: Config,
    state: EngineState,
    dispatcher: Dispatcher,
    outbound: Vec<Message>,
    close: Option<DisconnectReason>,
    ended: bool,
}

impl Session {
    /// Build an engine for `config` with the built-in handlers installed.
    pub fn new(config: Config) -> Self {
        let caps = Isupport::new().with_casemapping_override(config.casemapping);
        let nick = NickState::new(
            config.identity.nickname.clone(),
            config.identity.nick.clone(),
        );
        let registration = Registration::new(RegistrationConfig {
            username: config.identity.username.clone(),
            realname: config.identity.realname.clone(),
            password: config.server.password.clone(),
            request_caps: config.request_caps.clone(),
        });
        let state = EngineState::new(caps, config.strict_modes, nick, registration);

        let mut dispatcher = Dispatcher::new();
        install(
            &mut dispatcher,
            BuiltinConfig {
                channels: config.channels.clone(),
                nickserv_password: config.identity.nickserv_password.clone(),
            },
        );

        Session {
            config,
            state,
            dispatcher,
            outbound: Vec::new(),
            close: None,
            ended: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tracked state, read-only.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Begin registration on a fresh connection.
    ///
    /// State from any previous connection is discarded; handlers stay.
    pub fn start(&mut self) {
        self.state.reset();
        self.close = None;
        self.ended = false;
        let desired = self.config.identity.nickname.clone();
        let nick = self.state.nick.request(desired);
        let hello = self.state.registration.start(nick);
        self.outbound.extend(hello);
        debug!(nick = %self.config.identity.nickname, "registration started");
    }

    /// Decode and dispatch one inbound line.
    ///
    /// A line that cannot be decoded is reported to the error observer and
    /// skipped. Blank lines are ignored.
    pub fn feed_line(&mut self, line: &str) {
        if self.ended {
            return;
        }
        trace!(line = %line, "<<");
        if line.trim().is_empty() {
            return;
        }
        match line.parse::<Message>() {
            Ok(msg) => self.handle(msg),
            Err(err) => {
                let cause = match err {
                    ProtocolError::InvalidMessage { cause, .. } => cause,
                    other => MessageParseError::MalformedLine {
                        position: 0,
                        context: other.to_string(),
                    },
                };
                let err = EngineError::MalformedLine {
                    line: line.to_owned(),
                    cause,
                };
                self.dispatcher.report(&err);
            }
        }
    }

    /// Report an inbound line dropped before decoding, e.g. one over the
    /// length limit.
    pub fn reject_line(&mut self, line: impl Into<String>, cause: MessageParseError) {
        if self.ended {
            return;
        }
        let err = EngineError::MalformedLine {
            line: line.into(),
            cause,
        };
        self.dispatcher.report(&err);
    }

    /// Dispatch one decoded message.
    pub fn handle(&mut self, msg: Message) {
        if self.ended {
            return;
        }
        let event = Event::Message(msg);
        if let Some(reason) = self
            .dispatcher
            .dispatch(&event, &mut self.state, &mut self.outbound)
        {
            self.close.get_or_insert(reason);
        }
    }

    /// The connection ended. Delivers [`Event::Disconnected`] once.
    pub fn disconnected(&mut self, reason: DisconnectReason) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.state.registration.terminate();
        if reason != DisconnectReason::Quit {
            self.dispatcher
                .report(&EngineError::ConnectionLost(reason.clone()));
        }
        debug!(reason = %reason, "session ended");
        let event = Event::Disconnected(reason);
        let mut discard = Vec::new();
        self.dispatcher
            .dispatch(&event, &mut self.state, &mut discard);
        if !discard.is_empty() {
            warn!(count = discard.len(), "messages queued after disconnect dropped");
        }
    }

    /// Whether [`disconnected`](Self::disconnected) has run.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Why the engine wants the connection closed, if it does. Taking the
    /// reason clears it.
    pub fn take_close(&mut self) -> Option<DisconnectReason> {
        self.close.take()
    }

    /// Messages queued for the server, oldest first.
    pub fn drain_outbound(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbound)
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Queue a message for the server.
    pub fn send(&mut self, msg: Message) {
        self.outbound.push(msg);
    }

    /// Register a handler after all earlier ones.
    pub fn on<P, F>(&mut self, predicate: P, handler: F) -> HandlerId
    where
        P: Predicate + 'static,
        F: FnMut(&mut Context<'_>, &Event) -> anyhow::Result<Flow> + Send + 'static,
    {
        self.dispatcher.register(predicate, handler)
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        self.dispatcher.unregister(id)
    }

    /// Replace the error observer, which by default logs at `warn`.
    pub fn on_error<F>(&mut self, observer: F)
    where
        F: FnMut(&EngineError) + Send + 'static,
    {
        self.dispatcher.set_observer(Box::new(observer));
    }

    /// Send JOIN and track the channel as pending. Returns the channel
    /// name as sent.
    pub fn join(&mut self, channel: &str, key: Option<&str>) -> String {
        let name = self.state.caps.normalize_channel(channel);
        self.state.membership.mark_pending(&name);
        self.send(Message::join(name.clone(), key));
        name
    }

    /// Send PART. Returns the channel name as sent.
    pub fn part(&mut self, channel: &str, reason: Option<&str>) -> String {
        let name = self.state.caps.normalize_channel(channel);
        self.send(Message::part(name.clone(), reason));
        name
    }

    /// Ask for a new nick. The current nick changes when the server confirms.
    pub fn change_nick(&mut self, nick: &str) {
        let msg = self.state.nick.request(nick);
        self.send(msg);
    }

    /// Send QUIT.
    pub fn quit(&mut self, reason: Option<&str>) {
        self.state.registration.terminate();
        self.send(Message::quit(reason));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::dispatch::Filter;
    use crate::state::ConnectionState;

    fn sent(session: &mut Session) -> Vec<String> {
        session
            .drain_outbound()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_start_sends_registration() {
        let mut config = Config::new("irc.example.net", 6667, "bot");
        config.server.password = Some("pw".into());
        config.request_caps = vec!["multi-prefix".into()];
        let mut session = Session::new(config);
        session.start();
        assert_eq!(
            sent(&mut session),
            vec!["PASS pw", "CAP LS 302", "NICK bot", "USER bot 0 * :slirc client"]
        );
        assert_eq!(
            session.state().registration().state(),
            ConnectionState::CapabilityNegotiation
        );
    }

    #[test]
    fn test_malformed_line_is_reported_and_skipped() {
        let mut session = Session::new(Config::new("h", 6667, "bot"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::clone(&seen);
        session.on_error(move |err| errors.lock().push(err.to_string()));
        session.start();
        session.feed_line(":only.a.prefix");
        session.feed_line("PING :still-alive");
        assert_eq!(seen.lock().len(), 1);
        assert!(sent(&mut session).contains(&"PONG still-alive".to_owned()));
    }

    #[test]
    fn test_rejected_line_is_reported() {
        let mut session = Session::new(Config::new("h", 6667, "bot"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::clone(&seen);
        session.on_error(move |err| errors.lock().push(err.to_string()));
        session.reject_line(
            ":srv NOTICE bot :aaaa",
            MessageParseError::LineTooLong { actual: 9024, limit: 8191 },
        );
        assert_eq!(seen.lock().as_slice(), [r#"malformed line ":srv NOTICE bot :aaaa""#]);
    }

    #[test]
    fn test_panicking_predicate_does_not_escape_feed_line() {
        let mut session = Session::new(Config::new("h", 6667, "bot"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::clone(&seen);
        session.on_error(move |err| errors.lock().push(err.to_string()));
        session.start();
        let _ = sent(&mut session);
        session.on(Filter::new().payload(|m| m.params[5].is_empty()), |_, _| {
            Ok(Flow::Continue)
        });

        session.feed_line("PING :x");
        assert_eq!(sent(&mut session), vec!["PONG x"]);
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].contains("panicked"));
    }

    #[test]
    fn test_disconnect_delivered_once() {
        let mut session = Session::new(Config::new("h", 6667, "bot"));
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&reasons);
        session.on(Filter::new().disconnect(), move |_, event| {
            if let Event::Disconnected(reason) = event {
                log.lock().push(reason.clone());
            }
            Ok(Flow::Continue)
        });
        session.start();
        session.disconnected(DisconnectReason::RemoteClosed);
        session.disconnected(DisconnectReason::Quit);
        session.feed_line("PING :late");
        assert_eq!(*reasons.lock(), vec![DisconnectReason::RemoteClosed]);
    }

    #[test]
    fn test_join_normalizes_and_marks_pending() {
        let mut session = Session::new(Config::new("h", 6667, "bot"));
        let name = session.join("rust", Some("key"));
        assert_eq!(name, "#rust");
        assert_eq!(sent(&mut session), vec!["JOIN #rust key"]);
        assert!(session.state().channel("#rust").is_some());
        assert!(!session.state().membership().is_joined("#rust"));
    }

    #[test]
    fn test_restart_clears_previous_connection() {
        let mut session = Session::new(Config::new("h", 6667, "bot"));
        session.start();
        for line in [
            ":srv 005 bot PREFIX=(qov)~@+ :are supported",
            ":srv 001 bot :Welcome",
            ":bot!u@h JOIN #a",
        ] {
            session.feed_line(line);
        }
        assert!(session.state().membership().is_joined("#a"));
        session.disconnected(DisconnectReason::PingTimeout);

        session.start();
        assert!(session.state().membership().is_empty());
        assert!(session.state().current_nick().is_none());
        assert!(!session.state().caps().prefix().has_letter('q'));
    }
}
