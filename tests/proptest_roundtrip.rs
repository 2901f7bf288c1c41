//! Property-based tests for IRC message parsing and mode grammar.
//!
//! Uses proptest to generate random IRC components and verify that:
//! 1. Parsing never panics, even on arbitrary input
//! 2. Encoded messages decode back to the same command, params and prefix
//! 3. Mode parsing consumes arguments in step with the advertised grammar

use proptest::prelude::*;
use slirc_client::mode::{format_mode_changes, parse_mode_params};
use slirc_client::{Isupport, Message, ModeChange, Tag};

// =============================================================================
// STRATEGIES - Generators for valid IRC components
// =============================================================================

/// Valid IRC nickname: starts with letter or special char, followed by
/// letters, digits, or special chars.
fn nickname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z\\[\\]\\\\^_`{|}][a-zA-Z0-9\\-\\[\\]\\\\^_`{|}]{0,15}")
        .expect("valid regex")
}

fn username_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z~][a-zA-Z0-9]{0,9}").expect("valid regex")
}

fn hostname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]+(\\.[a-z0-9]+)*").expect("valid regex")
}

fn channel_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[#&][a-zA-Z0-9_\\-]{1,49}").expect("valid regex")
}

/// Middle parameter: non-empty, no spaces, no leading colon.
fn middle_param_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\r\n\0 :][^\r\n\0 ]{0,20}").expect("valid regex")
}

/// Trailing text: anything but line breaks and NUL.
fn message_text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\r\n\0]{0,400}").expect("valid regex")
}

fn tag_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("\\+?([a-z0-9.\\-]+/)?[a-zA-Z][a-zA-Z0-9\\-]{0,30}")
        .expect("valid regex")
}

/// Tag values are arbitrary text; escaping must carry them through. Empty
/// values decode as absent, so they are left out here.
fn tag_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\0]{1,60}").expect("valid regex")
}

fn prefix_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-z]+\\.[a-z]+\\.[a-z]+").expect("valid regex"),
        (nickname_strategy(), username_strategy(), hostname_strategy())
            .prop_map(|(nick, user, host)| format!("{}!{}@{}", nick, user, host)),
    ]
}

fn tag_strategy() -> impl Strategy<Value = Tag> {
    (tag_key_strategy(), prop::option::of(tag_value_strategy()))
        .prop_map(|(key, value)| Tag::new(key, value))
}

fn command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(vec![
            "PRIVMSG", "NOTICE", "JOIN", "PART", "KICK", "MODE", "NICK", "QUIT", "TOPIC",
            "PING", "PONG", "CAP", "BATCH",
        ])
        .prop_map(str::to_owned),
        (1u16..1000).prop_map(|n| format!("{:03}", n)),
    ]
}

prop_compose! {
    fn message_strategy()(
        tags in prop::collection::vec(tag_strategy(), 0..4),
        prefix in prop::option::of(prefix_strategy()),
        command in command_strategy(),
        middle in prop::collection::vec(middle_param_strategy(), 0..6),
        trailing in prop::option::of(message_text_strategy()),
    ) -> Message {
        let mut msg = Message::new(command, middle);
        msg.params.extend(trailing);
        msg.prefix = prefix;
        msg.tags = tags;
        msg
    }
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// decode(encode(m)) preserves command, params and prefix.
    #[test]
    fn message_roundtrip(msg in message_strategy()) {
        let encoded = msg.encode().expect("generated message should encode");
        let parsed: Message = encoded.parse().expect("encoded message should parse");

        prop_assert_eq!(&msg.command, &parsed.command, "command for {}", encoded);
        prop_assert_eq!(&msg.params, &parsed.params, "params for {}", encoded);
        prop_assert_eq!(&msg.prefix, &parsed.prefix, "prefix for {}", encoded);
    }

    /// Tag values survive escaping, whatever they contain.
    #[test]
    fn tag_in_message_roundtrip(
        key in tag_key_strategy(),
        value in prop::option::of(tag_value_strategy())
    ) {
        let msg = Message::ping("test").with_tag(key.clone(), value.clone());

        let serialized = msg.to_string();
        let parsed: Message = serialized.parse().expect("tagged message should parse");

        prop_assert!(parsed.has_tag(&key));
        prop_assert_eq!(value.as_deref(), parsed.tag_value(&key));
    }

    /// PRIVMSG with arbitrary (valid) content should roundtrip exactly.
    #[test]
    fn privmsg_roundtrip(
        prefix in prefix_strategy(),
        target in channel_strategy(),
        text in message_text_strategy()
    ) {
        let msg = Message::privmsg(target, text).with_prefix(prefix);
        let parsed: Message = msg.to_string().parse().expect("PRIVMSG should parse");
        prop_assert_eq!(msg, parsed);
    }

    /// The decoder returns an error or a message, never panics.
    #[test]
    fn parse_never_panics(line in "\\PC{0,600}") {
        let _ = line.parse::<Message>();
    }

    /// The nick is extracted from a full prefix.
    #[test]
    fn source_nick_extraction(
        nick in nickname_strategy(),
        user in username_strategy(),
        host in hostname_strategy()
    ) {
        let msg = Message::ping("test").with_prefix(format!("{}!{}@{}", nick, user, host));
        prop_assert_eq!(msg.source_nick(), Some(nick.as_str()));
    }

    /// Multiple tags keep their order and values.
    #[test]
    fn multiple_tags_roundtrip(tags in prop::collection::vec(tag_strategy(), 1..5)) {
        let mut msg = Message::ping("test");
        msg.tags = tags.clone();

        let parsed: Message = msg.to_string().parse().expect("should parse");
        prop_assert_eq!(tags, parsed.tags);
    }
}

// =============================================================================
// MODE GRAMMAR
// =============================================================================

fn mode_change_strategy() -> impl Strategy<Value = ModeChange> {
    let with_arg = (
        prop::sample::select(vec!['o', 'v', 'b', 'k']),
        any::<bool>(),
        nickname_strategy(),
    )
        .prop_map(|(letter, plus, arg)| {
            if plus {
                ModeChange::plus(letter, Some(&arg))
            } else {
                ModeChange::minus(letter, Some(&arg))
            }
        });
    let limit = prop_oneof![
        (1u32..500).prop_map(|n| ModeChange::plus('l', Some(&n.to_string()))),
        Just(ModeChange::minus('l', None)),
    ];
    let flag = (prop::sample::select(vec!['i', 'm', 'n', 's', 't']), any::<bool>())
        .prop_map(|(letter, plus)| {
            if plus {
                ModeChange::plus(letter, None)
            } else {
                ModeChange::minus(letter, None)
            }
        });
    prop_oneof![with_arg, limit, flag]
}

proptest! {
    /// Formatting a change list and parsing it back yields the same triples:
    /// every letter consumes exactly the arguments its class requires.
    #[test]
    fn mode_arity_roundtrip(changes in prop::collection::vec(mode_change_strategy(), 1..8)) {
        let mut caps = Isupport::new();
        caps.ingest_tokens(["CHANMODES=b,k,l,imnst", "PREFIX=(ov)@+"]);

        let params = format_mode_changes(&changes);
        let args: Vec<&str> = params[1..].iter().map(String::as_str).collect();
        let parsed = parse_mode_params(&params[0], &args, &caps);

        prop_assert_eq!(changes, parsed);
    }
}
