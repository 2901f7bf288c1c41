//! Channel membership tracking.
//!
//! Folds JOIN/PART/KICK/QUIT/NICK/MODE/TOPIC and the names-list numerics
//! into a per-channel view of who is present and with which prefix modes.
//! Events about channels or members that are not tracked are dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::casemap::CaseMapping;
use crate::error::ModeParseError;
use crate::isupport::Isupport;
use crate::message::Message;
use crate::mode::{parse_mode_params, parse_mode_params_strict, ModeChange, ModeClass, ModeSet, Sign};
use crate::response::Response;

use super::nick::NickState;

/// Where a channel is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    /// JOIN sent, no echo yet.
    Pending,
    /// The server confirmed our JOIN.
    Joined,
}

/// One user in one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    nick: String,
    userhost: Option<String>,
    modes: ModeSet,
}

impl Member {
    fn new(nick: &str, userhost: Option<&str>, modes: ModeSet) -> Self {
        Member {
            nick: nick.to_owned(),
            userhost: userhost.map(str::to_owned),
            modes,
        }
    }

    /// Nick as last seen.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// `user@host`, when a JOIN or a userhost-in-names reply carried it.
    pub fn userhost(&self) -> Option<&str> {
        self.userhost.as_deref()
    }

    /// Prefix mode letters held in this channel.
    pub fn modes(&self) -> &ModeSet {
        &self.modes
    }
}

/// A tracked channel.
#[derive(Clone, Debug)]
pub struct Channel {
    name: String,
    status: ChannelStatus,
    topic: Option<String>,
    members: HashMap<String, Member>,
    names_complete: bool,
    flags: BTreeSet<char>,
    params: BTreeMap<char, String>,
    lists: BTreeMap<char, BTreeSet<String>>,
    mapping: CaseMapping,
}

impl Channel {
    fn new(name: &str, status: ChannelStatus, mapping: CaseMapping) -> Self {
        Channel {
            name: name.to_owned(),
            status,
            topic: None,
            members: HashMap::new(),
            names_complete: false,
            flags: BTreeSet::new(),
            params: BTreeMap::new(),
            lists: BTreeMap::new(),
            mapping,
        }
    }

    /// Channel name as the server spelled it on JOIN.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn is_joined(&self) -> bool {
        self.status == ChannelStatus::Joined
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Whether end-of-names arrived since the last JOIN or resync.
    pub fn names_complete(&self) -> bool {
        self.names_complete
    }

    /// Look up a member by nick.
    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.get(&self.mapping.fold(nick))
    }

    /// Whether `nick` is present.
    pub fn contains(&self, nick: &str) -> bool {
        self.member(nick).is_some()
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Member nicks, sorted.
    pub fn nicks(&self) -> Vec<&str> {
        let mut nicks: Vec<&str> = self.members.values().map(Member::nick).collect();
        nicks.sort_unstable();
        nicks
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the channel-level flag (type D) `letter` is set.
    pub fn has_flag(&self, letter: char) -> bool {
        self.flags.contains(&letter)
    }

    /// Set channel flags, sorted.
    pub fn flags(&self) -> impl Iterator<Item = char> + '_ {
        self.flags.iter().copied()
    }

    /// Value of a parameter mode (type B or C), e.g. the key or limit.
    pub fn mode_param(&self, letter: char) -> Option<&str> {
        self.params.get(&letter).map(String::as_str)
    }

    /// Entries seen for a list mode (type A), e.g. bans.
    pub fn list(&self, letter: char) -> Option<&BTreeSet<String>> {
        self.lists.get(&letter)
    }

    fn apply(&mut self, change: &ModeChange, class: ModeClass) {
        let set = change.sign == Sign::Plus;
        match class {
            ModeClass::Prefix => {
                let Some(nick) = change.arg.as_deref() else {
                    return;
                };
                let key = self.mapping.fold(nick);
                if let Some(member) = self.members.get_mut(&key) {
                    if set {
                        member.modes.insert(change.letter);
                    } else {
                        member.modes.remove(change.letter);
                    }
                }
            }
            ModeClass::List => {
                let Some(mask) = change.arg.as_deref() else {
                    return;
                };
                let entries = self.lists.entry(change.letter).or_default();
                if set {
                    entries.insert(mask.to_owned());
                } else {
                    entries.remove(mask);
                }
            }
            ModeClass::Parameter | ModeClass::SetParameter => {
                match (set, change.arg.as_deref()) {
                    (true, Some(value)) => {
                        self.params.insert(change.letter, value.to_owned());
                    }
                    (true, None) => {}
                    (false, _) => {
                        self.params.remove(&change.letter);
                    }
                }
            }
            ModeClass::Flag => {
                if set {
                    self.flags.insert(change.letter);
                } else {
                    self.flags.remove(&change.letter);
                }
            }
        }
    }

    fn rekey(&mut self, mapping: CaseMapping) {
        self.mapping = mapping;
        self.members = self
            .members
            .drain()
            .map(|(_, m)| (mapping.fold(&m.nick), m))
            .collect();
    }
}

/// All channels the connection occupies or is joining.
#[derive(Clone, Debug, Default)]
pub struct Membership {
    mapping: CaseMapping,
    strict: bool,
    channels: HashMap<String, Channel>,
}

impl Membership {
    /// Create an empty tracker. `strict` rejects MODE strings with letters
    /// the server never advertised.
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Membership {
            mapping: CaseMapping::default(),
            strict,
            channels: HashMap::new(),
        }
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&self.mapping.fold(name))
    }

    /// Whether we are confirmed in `name`.
    pub fn is_joined(&self, name: &str) -> bool {
        self.channel(name).is_some_and(Channel::is_joined)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Names of joined channels, sorted.
    pub fn joined(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .channels
            .values()
            .filter(|c| c.is_joined())
            .map(Channel::name)
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Record a JOIN we sent. An already tracked channel is left alone.
    pub fn mark_pending(&mut self, name: &str) {
        let mapping = self.mapping;
        self.channels
            .entry(mapping.fold(name))
            .or_insert_with(|| Channel::new(name, ChannelStatus::Pending, mapping));
    }

    /// Switch the fold used for keys and re-key every map.
    pub(crate) fn set_casemapping(&mut self, mapping: CaseMapping) {
        if mapping == self.mapping {
            return;
        }
        self.mapping = mapping;
        self.channels = self
            .channels
            .drain()
            .map(|(_, mut c)| {
                c.rekey(mapping);
                (mapping.fold(&c.name), c)
            })
            .collect();
    }

    pub(crate) fn clear(&mut self) {
        self.channels.clear();
    }

    /// Apply one inbound message.
    ///
    /// The only error is an undeclared mode letter in strict mode; the
    /// message is then not applied.
    pub fn handle(
        &mut self,
        msg: &Message,
        me: &NickState,
        caps: &Isupport,
    ) -> Result<(), ModeParseError> {
        match msg.command.as_str() {
            "JOIN" => self.on_join(msg, me),
            "PART" => {
                if let (Some(nick), Some(channels)) = (msg.source_nick(), msg.param(0)) {
                    for channel in channels.split(',') {
                        self.remove(channel, nick, me);
                    }
                }
            }
            "KICK" => {
                if let (Some(channel), Some(victims)) = (msg.param(0), msg.param(1)) {
                    for victim in victims.split(',') {
                        self.remove(channel, victim, me);
                    }
                }
            }
            "QUIT" => {
                if let Some(nick) = msg.source_nick() {
                    let key = self.mapping.fold(nick);
                    for channel in self.channels.values_mut() {
                        channel.members.remove(&key);
                    }
                }
            }
            "NICK" => {
                if let (Some(old), Some(new)) = (msg.source_nick(), msg.param(0)) {
                    self.rename(old, new);
                }
            }
            "MODE" => {
                if let (Some(target), Some(modes)) = (msg.param(0), msg.param(1)) {
                    if caps.is_channel(target) {
                        self.on_mode(target, modes, &msg.params[2..], caps)?;
                    }
                }
            }
            "TOPIC" => {
                if let Some(channel) = self.joined_mut(msg.param(0)) {
                    channel.topic = msg.param(1).filter(|t| !t.is_empty()).map(str::to_owned);
                }
            }
            _ => self.on_numeric(msg, caps)?,
        }
        Ok(())
    }

    fn on_numeric(&mut self, msg: &Message, caps: &Isupport) -> Result<(), ModeParseError> {
        let Some(response) = msg.response() else {
            return Ok(());
        };
        match response {
            Response::RPL_NAMREPLY => self.on_names(msg, caps),
            Response::RPL_ENDOFNAMES => {
                if let Some(channel) = self.joined_mut(msg.param(1)) {
                    channel.names_complete = true;
                    debug!(channel = %channel.name, members = channel.members.len(), "names complete");
                }
            }
            Response::RPL_TOPIC => {
                if let Some(channel) = self.joined_mut(msg.param(1)) {
                    channel.topic = msg.param(2).map(str::to_owned);
                }
            }
            Response::RPL_NOTOPIC => {
                if let Some(channel) = self.joined_mut(msg.param(1)) {
                    channel.topic = None;
                }
            }
            Response::RPL_CHANNELMODEIS => {
                if let (Some(target), Some(modes)) = (msg.param(1), msg.param(2)) {
                    if let Some(channel) = self.joined_mut(Some(target)) {
                        channel.flags.clear();
                        channel.params.clear();
                    }
                    self.on_mode(target, modes, &msg.params[3..], caps)?;
                }
            }
            r if r.is_join_failure() => {
                if let Some(name) = msg.param(1) {
                    let key = self.mapping.fold(name);
                    if self
                        .channels
                        .get(&key)
                        .is_some_and(|c| c.status == ChannelStatus::Pending)
                    {
                        self.channels.remove(&key);
                        debug!(channel = %name, code = r.code(), "join failed");
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_join(&mut self, msg: &Message, me: &NickState) {
        let (Some(nick), Some(channels)) = (msg.source_nick(), msg.param(0)) else {
            return;
        };
        let userhost = msg
            .prefix
            .as_deref()
            .and_then(|p| p.split_once('!'))
            .map(|(_, uh)| uh);
        let mapping = self.mapping;
        for name in channels.split(',').filter(|c| !c.is_empty()) {
            let key = mapping.fold(name);
            if me.is_me(nick) {
                // Also covers joins we never asked for.
                let channel = self
                    .channels
                    .entry(key)
                    .or_insert_with(|| Channel::new(name, ChannelStatus::Pending, mapping));
                channel.name = name.to_owned();
                channel.status = ChannelStatus::Joined;
                channel.members.clear();
                channel.names_complete = false;
                debug!(channel = %name, "joined channel");
            } else if let Some(channel) = self.channels.get_mut(&key).filter(|c| c.is_joined()) {
                channel
                    .members
                    .insert(mapping.fold(nick), Member::new(nick, userhost, ModeSet::new()));
            } else {
                trace!(channel = %name, nick = %nick, "join for untracked channel dropped");
            }
        }
    }

    fn remove(&mut self, channel: &str, nick: &str, me: &NickState) {
        let key = self.mapping.fold(channel);
        if me.is_me(nick) {
            if self.channels.remove(&key).is_some() {
                debug!(channel = %channel, "left channel");
            }
        } else if let Some(chan) = self.channels.get_mut(&key) {
            chan.members.remove(&self.mapping.fold(nick));
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        let old_key = self.mapping.fold(old);
        let new_key = self.mapping.fold(new);
        for channel in self.channels.values_mut() {
            if let Some(mut member) = channel.members.remove(&old_key) {
                member.nick = new.to_owned();
                channel.members.insert(new_key.clone(), member);
            }
        }
    }

    fn on_mode<S: AsRef<str>>(
        &mut self,
        target: &str,
        modes: &str,
        args: &[S],
        caps: &Isupport,
    ) -> Result<(), ModeParseError> {
        if !self.is_joined(target) {
            trace!(channel = %target, "mode for untracked channel dropped");
            return Ok(());
        }
        let changes = if self.strict {
            parse_mode_params_strict(modes, args, caps)?
        } else {
            parse_mode_params(modes, args, caps)
        };
        let Some(channel) = self.joined_mut(Some(target)) else {
            return Ok(());
        };
        for change in &changes {
            // Letters the server never declared change nothing.
            if let Some(class) = caps.mode_class(change.letter) {
                channel.apply(change, class);
            }
        }
        Ok(())
    }

    fn on_names(&mut self, msg: &Message, caps: &Isupport) {
        // `353 me [=*@] #chan :names`; the symbol is optional on old servers.
        let len = msg.params.len();
        if len < 3 {
            return;
        }
        let Some(channel) = self.joined_mut(Some(&msg.params[len - 2])) else {
            return;
        };
        if channel.names_complete {
            channel.members.clear();
            channel.names_complete = false;
        }
        let mapping = channel.mapping;
        let prefix = caps.prefix();
        for entry in msg.params[len - 1].split_whitespace() {
            let mut modes = ModeSet::new();
            let mut rest = entry;
            while let Some(c) = rest.chars().next() {
                match prefix.letter_for(c) {
                    Some(letter) => {
                        modes.insert(letter);
                        rest = &rest[c.len_utf8()..];
                    }
                    None => break,
                }
            }
            let (nick, userhost) = match rest.split_once('!') {
                Some((nick, uh)) => (nick, Some(uh)),
                None => (rest, None),
            };
            if nick.is_empty() {
                continue;
            }
            channel
                .members
                .insert(mapping.fold(nick), Member::new(nick, userhost, modes));
        }
    }

    fn joined_mut(&mut self, name: Option<&str>) -> Option<&mut Channel> {
        let key = self.mapping.fold(name?);
        self.channels.get_mut(&key).filter(|c| c.is_joined())
    }
}
