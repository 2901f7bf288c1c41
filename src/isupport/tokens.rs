//! Typed ISUPPORT token values.

use crate::mode::ModeClass;

/// PREFIX: membership letters paired with their display symbols, highest rank first.
///
/// ```
/// use slirc_client::isupport::PrefixSpec;
///
/// let spec = PrefixSpec::parse("(qaohv)~&@%+").unwrap();
/// assert_eq!(spec.symbol_for('o'), Some('@'));
/// assert_eq!(spec.letter_for('+'), Some('v'));
/// assert!(spec.rank('q') < spec.rank('v'));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixSpec {
    pairs: Vec<(char, char)>,
}

impl PrefixSpec {
    /// Parse `(letters)symbols`. An empty value means no membership prefixes.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return Some(PrefixSpec { pairs: Vec::new() });
        }
        let rest = s.strip_prefix('(')?;
        let (letters, symbols) = rest.split_once(')')?;
        if letters.chars().count() != symbols.chars().count() {
            return None;
        }
        Some(PrefixSpec {
            pairs: letters.chars().zip(symbols.chars()).collect(),
        })
    }

    /// `(ov)@+`
    pub fn rfc1459() -> Self {
        PrefixSpec {
            pairs: vec![('o', '@'), ('v', '+')],
        }
    }

    /// (letter, symbol) pairs, highest rank first.
    pub fn pairs(&self) -> &[(char, char)] {
        &self.pairs
    }

    /// Symbol displayed for a membership letter.
    pub fn symbol_for(&self, letter: char) -> Option<char> {
        self.pairs.iter().find(|(l, _)| *l == letter).map(|(_, s)| *s)
    }

    /// Membership letter for a display symbol.
    pub fn letter_for(&self, symbol: char) -> Option<char> {
        self.pairs.iter().find(|(_, s)| *s == symbol).map(|(l, _)| *l)
    }

    /// Whether `letter` is a membership mode.
    pub fn has_letter(&self, letter: char) -> bool {
        self.symbol_for(letter).is_some()
    }

    /// Position of `letter` in rank order (0 is highest).
    pub fn rank(&self, letter: char) -> Option<usize> {
        self.pairs.iter().position(|(l, _)| *l == letter)
    }
}

impl Default for PrefixSpec {
    fn default() -> Self {
        PrefixSpec::rfc1459()
    }
}

/// CHANMODES: channel mode letters grouped by argument arity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanModes {
    /// Type A: list modes, always take an argument.
    pub list: String,
    /// Type B: always take an argument.
    pub parameter: String,
    /// Type C: take an argument only when set.
    pub set_parameter: String,
    /// Type D: never take an argument.
    pub flag: String,
}

impl ChanModes {
    /// Parse `A,B,C,D`. Missing groups are empty; groups past the fourth are ignored.
    pub fn parse(s: &str) -> Self {
        let mut groups = s.split(',').map(str::to_owned);
        ChanModes {
            list: groups.next().unwrap_or_default(),
            parameter: groups.next().unwrap_or_default(),
            set_parameter: groups.next().unwrap_or_default(),
            flag: groups.next().unwrap_or_default(),
        }
    }

    /// Arity class of a channel mode letter.
    pub fn class_of(&self, letter: char) -> Option<ModeClass> {
        if self.list.contains(letter) {
            Some(ModeClass::List)
        } else if self.parameter.contains(letter) {
            Some(ModeClass::Parameter)
        } else if self.set_parameter.contains(letter) {
            Some(ModeClass::SetParameter)
        } else if self.flag.contains(letter) {
            Some(ModeClass::Flag)
        } else {
            None
        }
    }
}

impl Default for ChanModes {
    /// `b,k,l,imnst`
    fn default() -> Self {
        ChanModes::parse("b,k,l,imnst")
    }
}

/// `key:limit` pairs used by CHANLIMIT, MAXLIST and TARGMAX.
///
/// A missing limit (`PRIVMSG:`) means unlimited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    entries: Vec<(String, Option<u32>)>,
}

impl Limits {
    /// Parse a comma-separated list of `key:limit` pairs.
    pub fn parse(s: &str) -> Self {
        let entries = s
            .split(',')
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once(':') {
                Some((key, limit)) => (key.to_owned(), limit.parse().ok()),
                None => (part.to_owned(), None),
            })
            .collect();
        Limits { entries }
    }

    /// Limit for an exact key (TARGMAX commands compare case-insensitively).
    pub fn get(&self, key: &str) -> Option<Option<u32>> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    /// Limit for a key that groups characters, as in `#&:20` or `beI:100`.
    pub fn for_char(&self, c: char) -> Option<Option<u32>> {
        self.entries
            .iter()
            .find(|(k, _)| k.contains(c))
            .map(|(_, v)| *v)
    }

    /// Entries in advertised order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<u32>)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Decode `\xHH` escapes in an ISUPPORT value.
pub(crate) fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find("\\x") {
        out.push_str(&rest[..pos]);
        let hex = rest.get(pos + 2..pos + 4);
        match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(byte) if byte.is_ascii() => {
                out.push(char::from(byte));
                rest = &rest[pos + 4..];
            }
            _ => {
                out.push_str("\\x");
                rest = &rest[pos + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}
