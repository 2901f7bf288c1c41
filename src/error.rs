//! Error types for the IRC client engine.
//!
//! Codec and parse errors are contained: a malformed inbound line is skipped
//! and reported through the error observer. Nick exhaustion and connection
//! loss are the only conditions that end a session.

use thiserror::Error;

use crate::dispatch::{DisconnectReason, HandlerId};

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Codec-level errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Line exceeded the configured maximum length.
    #[error("message too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Bytes buffered without a line terminator.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Illegal control character in an outbound message.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// Failed to parse or encode an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The raw message string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when decoding or encoding IRC lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Line was empty or whitespace only.
    #[error("empty message")]
    EmptyMessage,

    /// The command token is absent or unparseable.
    #[error("malformed line at position {position}: {context}")]
    MalformedLine {
        /// Byte position where parsing failed.
        position: usize,
        /// What was being parsed.
        context: String,
    },

    /// The line exceeded the inbound length limit and was dropped.
    #[error("line too long: {actual} bytes (limit {limit})")]
    LineTooLong {
        /// Length of the line, terminator included.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A parameter cannot be represented on the wire.
    #[error("invalid parameter {index}: {reason}")]
    InvalidParam {
        /// Zero-based parameter index.
        index: usize,
        /// Why the parameter was rejected.
        reason: &'static str,
    },

    /// The command cannot be represented on the wire.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    /// The prefix cannot be represented on the wire.
    #[error("invalid prefix: {0:?}")]
    InvalidPrefix(String),

    /// A tag key cannot be represented on the wire.
    #[error("invalid tag key: {0:?}")]
    InvalidTagKey(String),
}

/// Errors encountered when parsing mode strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModeParseError {
    /// Letter not declared in PREFIX or CHANMODES (strict mode only).
    #[error("unknown mode letter: {letter}")]
    UnknownModeLetter {
        /// The undeclared letter.
        letter: char,
    },

    /// A letter whose class requires an argument had none left (strict mode only).
    #[error("missing argument for mode {letter}")]
    MissingArgument {
        /// The letter that needed an argument.
        letter: char,
    },
}

/// Nick negotiation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NickError {
    /// Every fallback nick was rejected.
    #[error("no usable nick after {attempts} attempts (wanted {desired})")]
    Exhausted {
        /// The nick originally requested.
        desired: String,
        /// Number of attempts made, including the first.
        attempts: u32,
    },
}

/// How a handler invocation failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandlerFailure {
    /// The callback returned an error.
    #[error("{0:#}")]
    Failed(anyhow::Error),

    /// The callback panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

/// A failure raised by one registered handler, caught at the dispatch boundary.
#[derive(Debug, Error)]
#[error("handler {id} failed: {failure}")]
pub struct HandlerError {
    /// The registration that failed.
    pub id: HandlerId,
    /// What went wrong.
    #[source]
    pub failure: HandlerFailure,
}

/// Faults reported to the session's error observer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// An inbound line could not be decoded and was skipped.
    #[error("malformed line {line:?}")]
    MalformedLine {
        /// The raw line.
        line: String,
        /// Why decoding failed.
        #[source]
        cause: MessageParseError,
    },

    /// A mode string referenced an undeclared letter (strict mode only).
    #[error("bad mode change on {target}")]
    UnknownModeLetter {
        /// Channel or nick the MODE targeted.
        target: String,
        /// The grammar error.
        #[source]
        cause: ModeParseError,
    },

    /// Nick negotiation ran out of fallbacks.
    #[error(transparent)]
    NickExhausted(#[from] NickError),

    /// A handler returned an error or panicked.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The connection ended.
    #[error("connection lost: {0}")]
    ConnectionLost(DisconnectReason),
}

/// Errors returned by the async client.
#[cfg(feature = "tokio")]
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec setup failed.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// The configured host is not a valid TLS server name.
    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// An operation did not complete in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Nick negotiation failed during registration.
    #[error(transparent)]
    NickExhausted(#[from] NickError),

    /// The connection closed before the operation completed.
    #[error("connection lost: {0}")]
    ConnectionLost(DisconnectReason),

    /// The server refused a JOIN.
    #[error("cannot join {channel}: {code} {reason}")]
    JoinFailed {
        /// Channel requested.
        channel: String,
        /// Error numeric.
        code: u16,
        /// Server-provided text.
        reason: String,
    },

    /// The client is not connected.
    #[error("client is not connected")]
    Closed,
}

/// Errors loading configuration.
#[cfg(feature = "serde")]
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`Config`](crate::config::Config).
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
