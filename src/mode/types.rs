use std::collections::BTreeSet;
use std::fmt;

use crate::isupport::PrefixSpec;

/// Direction of a mode change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sign {
    /// `+`
    Plus,
    /// `-`
    Minus,
}

impl Sign {
    /// The wire character.
    pub fn as_char(self) -> char {
        match self {
            Sign::Plus => '+',
            Sign::Minus => '-',
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// How a mode letter consumes arguments.
///
/// The first four correspond to the CHANMODES groups A through D.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModeClass {
    /// Type A list mode (e.g. ban). Always takes an argument; none means a list query.
    List,
    /// Type B (e.g. key). Always takes an argument.
    Parameter,
    /// Type C (e.g. limit). Takes an argument only when set.
    SetParameter,
    /// Type D (e.g. moderated). Never takes an argument.
    Flag,
    /// PREFIX membership mode (e.g. op). Always takes a nick.
    Prefix,
}

impl ModeClass {
    /// Whether a change with `sign` consumes an argument.
    pub fn takes_arg(self, sign: Sign) -> bool {
        match self {
            ModeClass::List | ModeClass::Parameter | ModeClass::Prefix => true,
            ModeClass::SetParameter => sign == Sign::Plus,
            ModeClass::Flag => false,
        }
    }
}

/// One `(letter, argument, sign)` triple from a mode string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    /// `+` or `-`.
    pub sign: Sign,
    /// The mode letter.
    pub letter: char,
    /// The consumed argument, if the letter took one.
    pub arg: Option<String>,
}

impl ModeChange {
    /// A `+letter` change.
    pub fn plus(letter: char, arg: Option<&str>) -> Self {
        ModeChange {
            sign: Sign::Plus,
            letter,
            arg: arg.map(str::to_owned),
        }
    }

    /// A `-letter` change.
    pub fn minus(letter: char, arg: Option<&str>) -> Self {
        ModeChange {
            sign: Sign::Minus,
            letter,
            arg: arg.map(str::to_owned),
        }
    }
}

/// Membership letters held by one user in one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeSet(BTreeSet<char>);

impl ModeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a letter; returns whether it was newly added.
    pub fn insert(&mut self, letter: char) -> bool {
        self.0.insert(letter)
    }

    /// Remove a letter; returns whether it was present.
    pub fn remove(&mut self, letter: char) -> bool {
        self.0.remove(&letter)
    }

    /// Whether the letter is held.
    pub fn contains(&self, letter: char) -> bool {
        self.0.contains(&letter)
    }

    /// Whether no letters are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of letters held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Letters in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.0.iter().copied()
    }

    /// Highest-ranked held letter under `prefix`.
    pub fn highest(&self, prefix: &PrefixSpec) -> Option<char> {
        self.iter()
            .filter_map(|l| prefix.rank(l).map(|r| (r, l)))
            .min()
            .map(|(_, l)| l)
    }

    /// Display symbols of held letters, highest rank first (`multi-prefix` form).
    pub fn symbols(&self, prefix: &PrefixSpec) -> String {
        prefix
            .pairs()
            .iter()
            .filter(|(l, _)| self.contains(*l))
            .map(|(_, s)| *s)
            .collect()
    }
}

impl FromIterator<char> for ModeSet {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        ModeSet(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_takes_arg() {
        assert!(ModeClass::List.takes_arg(Sign::Minus));
        assert!(ModeClass::Parameter.takes_arg(Sign::Minus));
        assert!(ModeClass::SetParameter.takes_arg(Sign::Plus));
        assert!(!ModeClass::SetParameter.takes_arg(Sign::Minus));
        assert!(!ModeClass::Flag.takes_arg(Sign::Plus));
        assert!(ModeClass::Prefix.takes_arg(Sign::Minus));
    }

    #[test]
    fn test_modeset_ranking() {
        let prefix = PrefixSpec::parse("(qaohv)~&@%+").unwrap();
        let set: ModeSet = ['v', 'o'].into_iter().collect();
        assert_eq!(set.highest(&prefix), Some('o'));
        assert_eq!(set.symbols(&prefix), "@+");
        assert_eq!(ModeSet::new().highest(&prefix), None);
    }
}
