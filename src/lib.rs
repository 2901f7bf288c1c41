//! # slirc-client
//!
//! A client-side IRC protocol engine: it turns raw protocol lines into
//! tracked state (channels, members, modes, the client's own nick) and
//! into events delivered to user handlers.
//!
//! ## Features
//!
//! - Line codec with IRCv3 tags, validated encoding and CRLF framing
//! - ISUPPORT table driving mode parsing, casemapping and channel types
//! - Channel membership tracking from JOIN/PART/KICK/QUIT/NICK/MODE/NAMES
//! - Nick negotiation with configurable fallback
//! - Ordered handler dispatch with per-handler fault isolation
//! - A sans-IO [`Session`] plus an async [`Client`] over tokio
//!
#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Quick Start
//!
//! ### Parsing and building messages
//!
//! ```rust
//! use slirc_client::Message;
//!
//! let raw = "@time=2023-01-01T12:00:00Z :nick!user@host PRIVMSG #channel :Hello!";
//! let message: Message = raw.parse().expect("Valid IRC message");
//! assert_eq!(message.tag_value("time"), Some("2023-01-01T12:00:00Z"));
//! assert_eq!(message.trailing(), Some("Hello!"));
//!
//! let reply = Message::privmsg("#channel", "Hi there");
//! assert_eq!(reply.to_string(), "PRIVMSG #channel :Hi there");
//! ```
//!
//! ### Driving the engine
//!
//! ```rust
//! use slirc_client::{Config, Filter, Flow, Message, Session};
//!
//! let mut session = Session::new(Config::new("irc.example.net", 6667, "bot"));
//! session.on(Filter::new().command("PRIVMSG"), |ctx, event| {
//!     if let Some(from) = event.message().and_then(|m| m.source_nick()) {
//!         ctx.send(Message::notice(from, "hello"));
//!     }
//!     Ok(Flow::Continue)
//! });
//! session.start();
//! session.feed_line(":irc.example.net 001 bot :Welcome");
//! session.feed_line(":alice!a@host PRIVMSG bot :hi");
//! assert!(session
//!     .drain_outbound()
//!     .iter()
//!     .any(|m| m.to_string() == "NOTICE alice hello"));
//! ```

pub mod casemap;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod isupport;
pub mod message;
pub mod mode;
pub mod response;
pub mod session;
pub mod state;

#[cfg(feature = "tokio")]
pub mod client;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::casemap::CaseMapping;
pub use self::config::{Config, IdentityConfig, ServerConfig, Timeouts};
pub use self::dispatch::{
    Context, DisconnectReason, Dispatcher, ErrorObserver, Event, Filter, Flow, Handler, HandlerId,
    Predicate,
};
pub use self::error::{
    EngineError, HandlerError, HandlerFailure, MessageParseError, ModeParseError,
    NickError, ProtocolError,
};
pub use self::isupport::{ChanModes, Isupport, IsupportValue, Limits, PrefixSpec};
pub use self::message::{Message, Tag};
pub use self::mode::{ModeChange, ModeClass, Sign};
pub use self::response::Response;
pub use self::session::Session;
pub use self::state::{
    Channel, ChannelStatus, ConnectionState, EngineState, FallbackStrategy, Member, Membership,
    NickPolicy, NickState,
};

#[cfg(feature = "serde")]
pub use self::error::ConfigError;

#[cfg(feature = "tokio")]
pub use self::client::{Client, Sender, Status};
#[cfg(feature = "tokio")]
pub use self::error::ClientError;
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::line::{Line, LineCodec};
