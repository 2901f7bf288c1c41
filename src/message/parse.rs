//! Message decoding.
//!
//! This module implements `FromStr` for `Message` using the nom-based parser.

use std::borrow::Cow;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};

use super::nom_parser::ParsedMessage;
use super::tags::unescape_tag_value;
use super::types::{Message, Tag};

/// Intern common tag keys to avoid allocations.
#[inline]
fn intern_tag_key(key: &str) -> Cow<'static, str> {
    match key {
        "msgid" => Cow::Borrowed("msgid"),
        "time" => Cow::Borrowed("time"),
        "batch" => Cow::Borrowed("batch"),
        "account" => Cow::Borrowed("account"),
        "label" => Cow::Borrowed("label"),
        "+typing" => Cow::Borrowed("+typing"),
        _ => Cow::Owned(key.to_owned()),
    }
}

/// Parse a raw tags string into tags, preserving order.
///
/// The input should be the tags portion without the leading `@`. Empty
/// values (`key=`) are treated as absent.
fn parse_tags_string(tags_str: &str) -> Vec<Tag> {
    tags_str
        .split(';')
        .filter(|s| !s.is_empty())
        .map(|tag| {
            let mut iter = tag.splitn(2, '=');
            let key = iter.next().unwrap_or("");
            let value = iter
                .next()
                .filter(|v| !v.is_empty())
                .map(unescape_tag_value);
            Tag(intern_tag_key(key), value)
        })
        .collect()
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        if s.trim_end_matches(['\r', '\n']).trim().is_empty() {
            return Err(ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause: MessageParseError::EmptyMessage,
            });
        }

        let parsed = ParsedMessage::parse(s).map_err(|parse_err| ProtocolError::InvalidMessage {
            string: s.to_owned(),
            cause: MessageParseError::MalformedLine {
                position: parse_err.position,
                context: parse_err
                    .context
                    .unwrap_or("parsing IRC line")
                    .to_owned(),
            },
        })?;

        Ok(Message {
            tags: parsed.tags.map(parse_tags_string).unwrap_or_default(),
            prefix: parsed.prefix.map(str::to_owned),
            command: parsed.command.to_ascii_uppercase(),
            params: parsed.params.into_iter().map(str::to_owned).collect(),
        })
    }
}
