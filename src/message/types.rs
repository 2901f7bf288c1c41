use std::borrow::Cow;

use crate::error::MessageParseError;
use crate::mode::{format_mode_changes, ModeChange};
use crate::response::Response;

use super::tags::is_valid_tag_key;

/// An owned IRC message.
///
/// The line grammar is `[@tags] [:prefix] <command> [params...] [:trailing]`.
/// The prefix is kept as an opaque string; [`Message::source_nick`] extracts
/// the nick portion when one is present.
///
/// # Example
///
/// ```
/// use slirc_client::Message;
///
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
/// assert_eq!(msg.source_nick(), Some("nick"));
/// assert_eq!(msg.params, vec!["#channel", "Hello!"]);
///
/// let out = Message::privmsg("#channel", "Hello!");
/// assert_eq!(out.to_string(), "PRIVMSG #channel Hello!");
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// IRCv3 message tags in wire order.
    pub tags: Vec<Tag>,
    /// Message source (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// Command verb (uppercased) or three-digit numeric.
    pub command: String,
    /// Parameters in order; the last may contain spaces.
    pub params: Vec<String>,
}

/// A message tag: key and optional unescaped value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag(pub Cow<'static, str>, pub Option<String>);

impl Tag {
    /// Create a tag.
    pub fn new<K, V>(key: K, value: Option<V>) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<String>,
    {
        Tag(key.into(), value.map(Into::into))
    }
}

impl Message {
    /// Create a message from a command and parameters.
    ///
    /// The command is uppercased.
    pub fn new<C, I, P>(command: C, params: I) -> Self
    where
        C: AsRef<str>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Message {
            tags: Vec::new(),
            prefix: None,
            command: command.as_ref().to_ascii_uppercase(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a tag.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: Option<V>) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<String>,
    {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Nick portion of the prefix.
    ///
    /// Returns `None` for server prefixes (a bare name containing a dot).
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        match prefix.find(['!', '@']) {
            Some(end) => Some(&prefix[..end]),
            None if prefix.contains('.') => None,
            None => Some(prefix),
        }
    }

    /// Parameter at `index`.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The last parameter, usually the free-text payload.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Numeric code when the command is three digits.
    pub fn numeric(&self) -> Option<u16> {
        let bytes = self.command.as_bytes();
        if bytes.len() == 3 && bytes.iter().all(u8::is_ascii_digit) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Known numeric reply, if any.
    pub fn response(&self) -> Option<Response> {
        self.numeric().and_then(Response::from_code)
    }

    /// Whether this message is the given numeric reply.
    pub fn is_response(&self, response: Response) -> bool {
        self.numeric() == Some(response.code())
    }

    /// Get the value of an IRCv3 tag by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|Tag(k, _)| k.as_ref() == key)
            .and_then(|Tag(_, v)| v.as_deref())
    }

    /// Whether a tag with this key is present (with or without a value).
    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.iter().any(|Tag(k, _)| k.as_ref() == key)
    }

    /// Check that this message can be written to the wire and decoded back
    /// to the same command, parameters and prefix.
    pub fn validate(&self) -> Result<(), MessageParseError> {
        if self.command.is_empty()
            || !self.command.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(MessageParseError::InvalidCommand(self.command.clone()));
        }
        if let Some(Tag(key, _)) = self.tags.iter().find(|Tag(k, _)| !is_valid_tag_key(k)) {
            return Err(MessageParseError::InvalidTagKey(key.to_string()));
        }
        if let Some(prefix) = &self.prefix {
            if prefix.is_empty() || prefix.contains(' ') {
                return Err(MessageParseError::InvalidPrefix(prefix.clone()));
            }
        }
        let last = self.params.len().saturating_sub(1);
        for (index, param) in self.params.iter().enumerate() {
            if index == last {
                break;
            }
            let reason = if param.is_empty() {
                "empty middle parameter"
            } else if param.contains(' ') {
                "middle parameter contains a space"
            } else if param.starts_with(':') {
                "middle parameter starts with ':'"
            } else {
                continue;
            };
            return Err(MessageParseError::InvalidParam { index, reason });
        }
        Ok(())
    }

    /// Encode to a wire line (without CRLF), validating first.
    pub fn encode(&self) -> Result<String, MessageParseError> {
        self.validate()?;
        Ok(self.to_string())
    }

    /// Create a PRIVMSG message to a target with text.
    #[must_use]
    pub fn privmsg<T, M>(target: T, text: M) -> Self
    where
        T: Into<String>,
        M: Into<String>,
    {
        Message::new("PRIVMSG", [target.into(), text.into()])
    }

    /// Create a NOTICE message to a target with text.
    #[must_use]
    pub fn notice<T, M>(target: T, text: M) -> Self
    where
        T: Into<String>,
        M: Into<String>,
    {
        Message::new("NOTICE", [target.into(), text.into()])
    }

    /// Create a JOIN message, optionally with a key.
    #[must_use]
    pub fn join<C: Into<String>>(channel: C, key: Option<&str>) -> Self {
        let mut params = vec![channel.into()];
        params.extend(key.map(str::to_owned));
        Message::new("JOIN", params)
    }

    /// Create a PART message, optionally with a reason.
    #[must_use]
    pub fn part<C: Into<String>>(channel: C, reason: Option<&str>) -> Self {
        let mut params = vec![channel.into()];
        params.extend(reason.map(str::to_owned));
        Message::new("PART", params)
    }

    /// Create a NICK message.
    #[must_use]
    pub fn nick<N: Into<String>>(nickname: N) -> Self {
        Message::new("NICK", [nickname.into()])
    }

    /// Create a USER registration message.
    #[must_use]
    pub fn user<U, R>(username: U, realname: R) -> Self
    where
        U: Into<String>,
        R: Into<String>,
    {
        Message::new(
            "USER",
            [username.into(), "0".into(), "*".into(), realname.into()],
        )
    }

    /// Create a PASS message.
    #[must_use]
    pub fn pass<P: Into<String>>(password: P) -> Self {
        Message::new("PASS", [password.into()])
    }

    /// Create a PING message.
    #[must_use]
    pub fn ping<T: Into<String>>(token: T) -> Self {
        Message::new("PING", [token.into()])
    }

    /// Create a PONG echoing the parameters of a PING.
    #[must_use]
    pub fn pong<I, P>(params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Message::new("PONG", params)
    }

    /// Create a QUIT message.
    #[must_use]
    pub fn quit(reason: Option<&str>) -> Self {
        Message::new("QUIT", reason.map(str::to_owned))
    }

    /// Create a MODE message applying `changes` to `target`.
    #[must_use]
    pub fn mode<T: Into<String>>(target: T, changes: &[ModeChange]) -> Self {
        let mut params = vec![target.into()];
        params.extend(format_mode_changes(changes));
        Message::new("MODE", params)
    }

    /// Create a CAP subcommand.
    #[must_use]
    pub fn cap<I, P>(params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Message::new("CAP", params)
    }
}
