//! The ISUPPORT capability table.
//!
//! Servers advertise their dialect in one or more `RPL_ISUPPORT` (005)
//! replies. Each reply is merged into the table key by key; `-KEY` withdraws
//! a previously advertised key. Lookups never fail: PREFIX, CHANMODES,
//! CHANTYPES and CASEMAPPING fall back to conservative defaults so mode
//! parsing keeps working against servers with minimal ISUPPORT.
//!
//! ```
//! use slirc_client::isupport::Isupport;
//! use slirc_client::mode::ModeClass;
//!
//! let mut caps = Isupport::new();
//! caps.ingest_tokens(["PREFIX=(qov)~@+", "CHANMODES=beI,k,l,imnst", "NICKLEN=16"]);
//! assert_eq!(caps.mode_class('q'), Some(ModeClass::Prefix));
//! assert_eq!(caps.mode_class('I'), Some(ModeClass::List));
//! assert_eq!(caps.number("NICKLEN"), Some(16));
//! ```

mod tokens;

use std::collections::HashMap;

use tracing::debug;

use crate::casemap::CaseMapping;
use crate::message::Message;
use crate::mode::ModeClass;
use crate::response::Response;

pub use self::tokens::{ChanModes, Limits, PrefixSpec};
use self::tokens::unescape_value;

/// Channel prefixes assumed when CHANTYPES is not advertised.
pub const DEFAULT_CHANTYPES: &str = "#&";

const NUMERIC_KEYS: &[&str] = &[
    "AWAYLEN",
    "CHANNELLEN",
    "HOSTLEN",
    "KICKLEN",
    "LINELEN",
    "MAXCHANNELS",
    "MAXNICKLEN",
    "MAXTARGETS",
    "MODES",
    "MONITOR",
    "NICKLEN",
    "SILENCE",
    "TOPICLEN",
    "USERLEN",
    "WATCH",
];

const LIMIT_KEYS: &[&str] = &["CHANLIMIT", "IDCHAN", "MAXLIST", "TARGMAX"];

/// A typed ISUPPORT value.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IsupportValue {
    /// Bare `KEY` (or `KEY=`).
    Present,
    /// Any value without a more specific shape.
    Scalar(String),
    /// Integer-valued keys such as NICKLEN.
    Number(u32),
    /// PREFIX.
    Prefix(PrefixSpec),
    /// CHANMODES.
    ChanModes(ChanModes),
    /// CHANLIMIT, MAXLIST, TARGMAX.
    Limits(Limits),
}

#[derive(Clone, Debug)]
struct Entry {
    raw: Option<String>,
    value: IsupportValue,
}

/// Accumulated ISUPPORT state for one connection.
#[derive(Clone, Debug, Default)]
pub struct Isupport {
    entries: HashMap<String, Entry>,
    prefix: PrefixSpec,
    chanmodes: ChanModes,
    casemapping_override: Option<CaseMapping>,
}

impl Isupport {
    /// Empty table with built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a casemapping regardless of what the server advertises.
    #[must_use]
    pub fn with_casemapping_override(mut self, mapping: Option<CaseMapping>) -> Self {
        self.casemapping_override = mapping;
        self
    }

    /// Forget everything the server advertised. The casemapping override is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.prefix = PrefixSpec::default();
        self.chanmodes = ChanModes::default();
    }

    /// Merge the tokens of an `RPL_ISUPPORT` reply.
    ///
    /// Returns `false` (and changes nothing) for any other message.
    pub fn ingest(&mut self, msg: &Message) -> bool {
        if !msg.is_response(Response::RPL_ISUPPORT) || msg.params.len() < 2 {
            return false;
        }
        // First parameter is our nick; the final one is human-readable text.
        let mut tokens = &msg.params[1..];
        if tokens.len() > 1 {
            tokens = &tokens[..tokens.len() - 1];
        } else if tokens.first().is_some_and(|t| t.contains(' ')) {
            return false;
        }
        self.ingest_tokens(tokens.iter().map(String::as_str));
        true
    }

    /// Merge raw `KEY[=VALUE]` / `-KEY` tokens.
    pub fn ingest_tokens<'a, I>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for token in tokens {
            if token.is_empty() {
                continue;
            }
            if let Some(key) = token.strip_prefix('-') {
                self.remove(key);
                continue;
            }
            let (key, raw) = match token.split_once('=') {
                Some((k, v)) => (k, Some(unescape_value(v))),
                None => (token, None),
            };
            self.insert(key, raw);
        }
    }

    fn insert(&mut self, key: &str, raw: Option<String>) {
        let key = key.to_ascii_uppercase();
        let value = match raw.as_deref() {
            None | Some("") => IsupportValue::Present,
            Some(v) => Self::typed_value(&key, v),
        };
        match (&key[..], &value) {
            ("PREFIX", IsupportValue::Prefix(spec)) => self.prefix = spec.clone(),
            ("CHANMODES", IsupportValue::ChanModes(modes)) => self.chanmodes = modes.clone(),
            _ => {}
        }
        debug!(key = %key, value = ?raw, "ISUPPORT");
        self.entries.insert(key, Entry { raw, value });
    }

    fn typed_value(key: &str, v: &str) -> IsupportValue {
        match key {
            "PREFIX" => PrefixSpec::parse(v)
                .map(IsupportValue::Prefix)
                .unwrap_or_else(|| IsupportValue::Scalar(v.to_owned())),
            "CHANMODES" => IsupportValue::ChanModes(ChanModes::parse(v)),
            k if LIMIT_KEYS.contains(&k) => IsupportValue::Limits(Limits::parse(v)),
            k if NUMERIC_KEYS.contains(&k) => v
                .parse()
                .map(IsupportValue::Number)
                .unwrap_or_else(|_| IsupportValue::Scalar(v.to_owned())),
            _ => IsupportValue::Scalar(v.to_owned()),
        }
    }

    fn remove(&mut self, key: &str) {
        let key = key.to_ascii_uppercase();
        if self.entries.remove(&key).is_some() {
            debug!(key = %key, "ISUPPORT withdrawn");
        }
        match &key[..] {
            "PREFIX" => self.prefix = PrefixSpec::default(),
            "CHANMODES" => self.chanmodes = ChanModes::default(),
            _ => {}
        }
    }

    /// Typed value for a key.
    pub fn get(&self, key: &str) -> Option<&IsupportValue> {
        self.entries.get(&key.to_ascii_uppercase()).map(|e| &e.value)
    }

    /// Raw (unescaped) value for a key; `None` if absent or valueless.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_uppercase())
            .and_then(|e| e.raw.as_deref())
    }

    /// Whether the key has been advertised at all.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_uppercase())
    }

    /// Integer value of a numeric key.
    pub fn number(&self, key: &str) -> Option<u32> {
        match self.get(key)? {
            IsupportValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Comma-separated value split into items (empty if absent).
    pub fn list(&self, key: &str) -> Vec<&str> {
        self.raw(key)
            .map(|v| v.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Structured `key:limit` list for CHANLIMIT, MAXLIST, TARGMAX.
    pub fn limits(&self, key: &str) -> Option<&Limits> {
        match self.get(key)? {
            IsupportValue::Limits(l) => Some(l),
            _ => None,
        }
    }

    /// Effective PREFIX (default `(ov)@+`).
    pub fn prefix(&self) -> &PrefixSpec {
        &self.prefix
    }

    /// Effective CHANMODES (default `b,k,l,imnst`).
    pub fn chanmodes(&self) -> &ChanModes {
        &self.chanmodes
    }

    /// Channel prefix characters (default `#&`).
    pub fn chantypes(&self) -> &str {
        self.raw("CHANTYPES").unwrap_or(DEFAULT_CHANTYPES)
    }

    /// Effective casemapping: override, else advertised, else ASCII.
    ///
    /// Unrecognised advertised mappings fall back to ASCII.
    pub fn casemapping(&self) -> CaseMapping {
        self.casemapping_override
            .or_else(|| self.raw("CASEMAPPING").and_then(|v| v.parse().ok()))
            .unwrap_or_default()
    }

    /// NICKLEN, if advertised.
    pub fn nicklen(&self) -> Option<usize> {
        self.number("NICKLEN").map(|n| n as usize)
    }

    /// NETWORK name, if advertised.
    pub fn network(&self) -> Option<&str> {
        self.raw("NETWORK")
    }

    /// Arity class of a channel mode letter. PREFIX letters win over CHANMODES.
    pub fn mode_class(&self, letter: char) -> Option<ModeClass> {
        if self.prefix.has_letter(letter) {
            Some(ModeClass::Prefix)
        } else {
            self.chanmodes.class_of(letter)
        }
    }

    /// Whether `name` starts with an advertised channel prefix.
    pub fn is_channel(&self, name: &str) -> bool {
        name.chars()
            .next()
            .is_some_and(|c| self.chantypes().contains(c))
    }

    /// Prepend the primary channel prefix when `name` has none.
    pub fn normalize_channel(&self, name: &str) -> String {
        if self.is_channel(name) {
            return name.to_owned();
        }
        match self.chantypes().chars().next() {
            Some(c) => format!("{}{}", c, name),
            None => name.to_owned(),
        }
    }

    /// Fold a nick or channel name with the effective casemapping.
    pub fn fold(&self, name: &str) -> String {
        self.casemapping().fold(name)
    }

    /// Advertised keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
