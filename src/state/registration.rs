//! Sans-IO connection registration.
//!
//! Drives `PASS` / `CAP LS 302` / `NICK` / `USER`, requests the wanted
//! IRCv3 capabilities, closes negotiation with `CAP END`, and reports
//! completion on `RPL_WELCOME`. It performs no I/O: it consumes parsed
//! messages and produces actions.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::message::Message;
use crate::response::Response;

/// Current state of the connection handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started.
    #[default]
    Disconnected,
    /// Sent CAP LS, awaiting the capability list or an ACK/NAK.
    CapabilityNegotiation,
    /// Registration sent, awaiting welcome (001).
    Registering,
    /// Received 001.
    Connected,
    /// QUIT sent or ERROR received.
    Terminated,
}

/// Identity sent during registration.
#[derive(Clone, Debug, Default)]
pub struct RegistrationConfig {
    /// Username (ident).
    pub username: String,
    /// Real name / GECOS.
    pub realname: String,
    /// Server password, if required.
    pub password: Option<String>,
    /// Capabilities to request when offered (e.g. `multi-prefix`).
    pub request_caps: Vec<String>,
}

/// Actions produced by the registration machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationAction {
    /// Send this message to the server.
    Send(Box<Message>),
    /// Registration is complete.
    Complete,
    /// The server sent ERROR.
    ServerError(String),
}

/// Registration and capability state for one connection.
#[derive(Clone, Debug)]
pub struct Registration {
    config: RegistrationConfig,
    state: ConnectionState,
    enabled_caps: HashSet<String>,
    available_caps: HashSet<String>,
    server_name: Option<String>,
}

impl Registration {
    /// Create a machine for `config`.
    #[must_use]
    pub fn new(config: RegistrationConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            enabled_caps: HashSet::new(),
            available_caps: HashSet::new(),
            server_name: None,
        }
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether 001 has been received on this connection.
    pub fn is_registered(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Capabilities the server acknowledged.
    #[must_use]
    pub fn enabled_caps(&self) -> &HashSet<String> {
        &self.enabled_caps
    }

    /// Capabilities the server offered.
    #[must_use]
    pub fn available_caps(&self) -> &HashSet<String> {
        &self.available_caps
    }

    /// Whether a capability is enabled.
    pub fn has_cap(&self, cap: &str) -> bool {
        self.enabled_caps.contains(cap)
    }

    /// Name the server used as the prefix of 001.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Begin registration. `nick` is the NICK to send.
    ///
    /// Returns PASS (if configured), CAP LS (if capabilities are wanted),
    /// NICK and USER, in that order.
    #[must_use]
    pub fn start(&mut self, nick: Message) -> Vec<Message> {
        self.enabled_caps.clear();
        self.available_caps.clear();
        self.server_name = None;

        let mut out = Vec::with_capacity(4);
        if let Some(ref pass) = self.config.password {
            out.push(Message::pass(pass.clone()));
        }
        if self.config.request_caps.is_empty() {
            self.state = ConnectionState::Registering;
        } else {
            self.state = ConnectionState::CapabilityNegotiation;
            out.push(Message::cap(["LS", "302"]));
        }
        out.push(nick);
        out.push(Message::user(
            self.config.username.clone(),
            self.config.realname.clone(),
        ));
        out
    }

    /// Feed a parsed message.
    #[must_use]
    pub fn feed(&mut self, msg: &Message) -> Vec<RegistrationAction> {
        if msg.command == "CAP" {
            return self.handle_cap(msg);
        }
        if msg.command == "ERROR" {
            self.state = ConnectionState::Terminated;
            let reason = msg.param(0).unwrap_or("connection closed").to_owned();
            return vec![RegistrationAction::ServerError(reason)];
        }
        if msg.is_response(Response::RPL_WELCOME) && self.state != ConnectionState::Connected {
            self.state = ConnectionState::Connected;
            self.server_name = msg.prefix.clone();
            debug!(server = ?self.server_name, caps = ?self.enabled_caps, "registered");
            return vec![RegistrationAction::Complete];
        }
        Vec::new()
    }

    /// Mark the connection as closing.
    pub fn terminate(&mut self) {
        self.state = ConnectionState::Terminated;
    }

    /// Forget the previous connection.
    pub(crate) fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.enabled_caps.clear();
        self.available_caps.clear();
        self.server_name = None;
    }

    fn handle_cap(&mut self, msg: &Message) -> Vec<RegistrationAction> {
        let subcmd = msg.param(1).unwrap_or("").to_ascii_uppercase();
        // Multi-line replies carry `*` before the final parameter.
        let more = msg.param(2) == Some("*");
        let caps = msg.trailing().unwrap_or("");
        let names = caps
            .split_whitespace()
            .map(|cap| cap.split('=').next().unwrap_or(cap));

        match subcmd.as_str() {
            "LS" => {
                self.available_caps.extend(names.map(str::to_owned));
                if more || self.state != ConnectionState::CapabilityNegotiation {
                    return Vec::new();
                }
                let wanted: Vec<&str> = self
                    .config
                    .request_caps
                    .iter()
                    .filter(|c| self.available_caps.contains(c.as_str()))
                    .map(String::as_str)
                    .collect();
                if wanted.is_empty() {
                    self.finish_negotiation()
                } else {
                    let req = Message::cap(["REQ".to_owned(), wanted.join(" ")]);
                    vec![RegistrationAction::Send(Box::new(req))]
                }
            }
            "ACK" => {
                for cap in names {
                    match cap.strip_prefix('-') {
                        Some(removed) => {
                            self.enabled_caps.remove(removed);
                        }
                        None => {
                            self.enabled_caps.insert(cap.to_owned());
                        }
                    }
                }
                debug!(caps = %caps, "capabilities acknowledged");
                self.finish_if_negotiating()
            }
            "NAK" => {
                warn!(caps = %caps, "capabilities rejected");
                self.finish_if_negotiating()
            }
            "NEW" => {
                let offered: Vec<String> = names.map(str::to_owned).collect();
                self.available_caps.extend(offered.iter().cloned());
                let wanted: Vec<&str> = offered
                    .iter()
                    .filter(|c| {
                        self.config.request_caps.contains(c) && !self.enabled_caps.contains(*c)
                    })
                    .map(String::as_str)
                    .collect();
                if wanted.is_empty() {
                    Vec::new()
                } else {
                    let req = Message::cap(["REQ".to_owned(), wanted.join(" ")]);
                    vec![RegistrationAction::Send(Box::new(req))]
                }
            }
            "DEL" => {
                for cap in names {
                    self.available_caps.remove(cap);
                    self.enabled_caps.remove(cap);
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn finish_if_negotiating(&mut self) -> Vec<RegistrationAction> {
        if self.state == ConnectionState::CapabilityNegotiation {
            self.finish_negotiation()
        } else {
            Vec::new()
        }
    }

    fn finish_negotiation(&mut self) -> Vec<RegistrationAction> {
        self.state = ConnectionState::Registering;
        vec![RegistrationAction::Send(Box::new(Message::cap(["END"])))]
    }
}
