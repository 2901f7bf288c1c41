//! Connection configuration.
//!
//! Every field has a default, so a config only names what differs. With
//! the `serde` feature the types deserialize from TOML:
//!
//! ```toml
//! channels = ["#rust"]
//! request_caps = ["multi-prefix"]
//!
//! [server]
//! host = "irc.libera.chat"
//! port = 6697
//! tls = true
//!
//! [identity]
//! nickname = "slircbot"
//!
//! [identity.nick]
//! alternates = ["slirc_bot"]
//! strategy = "counter"
//! max_attempts = 8
//! ```

use std::time::Duration;

use crate::casemap::CaseMapping;
use crate::state::NickPolicy;

/// Everything needed to open and register one connection.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Where to connect.
    pub server: ServerConfig,
    /// Who to register as.
    pub identity: IdentityConfig,
    /// Channels joined after registration. Names without a channel prefix
    /// get the server's primary one.
    pub channels: Vec<String>,
    /// IRCv3 capabilities requested when offered.
    pub request_caps: Vec<String>,
    /// Casemapping used instead of the advertised one.
    pub casemapping: Option<CaseMapping>,
    /// Reject MODE strings with undeclared letters instead of skipping them.
    pub strict_modes: bool,
    /// Orchestrator timeouts.
    pub timeouts: Timeouts,
}

/// Server endpoint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Wrap the connection in TLS, verified against the system roots.
    pub tls: bool,
    /// Sent as PASS before registration.
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_owned(),
            port: 6667,
            tls: false,
            password: None,
        }
    }
}

/// Registration identity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IdentityConfig {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    /// Fallbacks when the nick is refused.
    pub nick: NickPolicy,
    /// Sent to NickServ as IDENTIFY after registration.
    pub nickserv_password: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            nickname: "slirc".to_owned(),
            username: "slirc".to_owned(),
            realname: "slirc client".to_owned(),
            nick: NickPolicy::default(),
            nickserv_password: None,
        }
    }
}

/// Timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Timeouts {
    /// TCP connect plus TLS handshake.
    pub connect_secs: u64,
    /// Connect until 001.
    pub registration_secs: u64,
    /// Silence after which a keepalive PING is sent.
    pub ping_idle_secs: u64,
    /// Further silence after the PING before the connection is dropped.
    pub ping_timeout_secs: u64,
    /// Default for `join_and_wait` and `sync`.
    pub wait_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connect_secs: 30,
            registration_secs: 60,
            ping_idle_secs: 60,
            ping_timeout_secs: 30,
            wait_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn registration(&self) -> Duration {
        Duration::from_secs(self.registration_secs)
    }

    pub fn ping_idle(&self) -> Duration {
        Duration::from_secs(self.ping_idle_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

impl Config {
    /// Config for `host:port` registering as `nickname`.
    pub fn new(host: impl Into<String>, port: u16, nickname: impl Into<String>) -> Self {
        let nickname = nickname.into();
        Config {
            server: ServerConfig {
                host: host.into(),
                port,
                ..ServerConfig::default()
            },
            identity: IdentityConfig {
                username: nickname.clone(),
                nickname,
                ..IdentityConfig::default()
            },
            ..Config::default()
        }
    }
}

#[cfg(feature = "serde")]
impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, crate::error::ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, crate::error::ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
