//! Tracked connection state.
//!
//! [`EngineState`] owns everything the engine derives from the server:
//! the capability table, channel membership, the nick negotiator and the
//! registration machine. Handlers see it read-only through
//! [`Context::state`](crate::dispatch::Context::state); only the built-in
//! handlers mutate it.

mod membership;
mod nick;
mod registration;

pub use self::membership::{Channel, ChannelStatus, Member, Membership};
pub use self::nick::{FallbackStrategy, NickChange, NickPhase, NickPolicy, NickState};
pub use self::registration::{
    ConnectionState, Registration, RegistrationAction, RegistrationConfig,
};

use crate::isupport::Isupport;

/// Aggregate of all per-connection state.
#[derive(Clone, Debug)]
pub struct EngineState {
    pub(crate) caps: Isupport,
    pub(crate) membership: Membership,
    pub(crate) nick: NickState,
    pub(crate) registration: Registration,
}

impl EngineState {
    /// Build the state for one connection.
    pub fn new(caps: Isupport, strict_modes: bool, nick: NickState, registration: Registration) -> Self {
        let mut state = EngineState {
            caps,
            membership: Membership::new(strict_modes),
            nick,
            registration,
        };
        state.sync_casemapping();
        state
    }

    /// The server's ISUPPORT table.
    pub fn caps(&self) -> &Isupport {
        &self.caps
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn nick(&self) -> &NickState {
        &self.nick
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// The nick the server currently attributes to us.
    pub fn current_nick(&self) -> Option<&str> {
        self.nick.current()
    }

    /// Look up a tracked channel.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.membership.channel(name)
    }

    /// Whether `nick` refers to this connection.
    pub fn is_me(&self, nick: &str) -> bool {
        self.nick.is_me(nick)
    }

    /// Whether 001 has been received.
    pub fn is_registered(&self) -> bool {
        self.registration.is_registered()
    }

    /// Propagate the effective casemapping to the name-keyed maps.
    pub(crate) fn sync_casemapping(&mut self) {
        let mapping = self.caps.casemapping();
        self.nick.set_casemapping(mapping);
        self.membership.set_casemapping(mapping);
    }

    /// Forget the previous connection.
    pub(crate) fn reset(&mut self) {
        self.caps.clear();
        self.membership.clear();
        self.nick.reset();
        self.registration.reset();
        self.sync_casemapping();
    }
}
