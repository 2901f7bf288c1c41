//! Integration tests for message parsing and serialization
//!
//! These tests verify that messages can be parsed from strings and then
//! serialized back to equivalent strings, ensuring round-trip compatibility.

use slirc_client::{Message, MessageParseError, ModeChange, ProtocolError, Tag};

fn assert_round_trip(original: &str) {
    let message: Message = original
        .parse()
        .unwrap_or_else(|e| panic!("Failed to parse '{}': {}", original, e));
    let serialized = message.encode().expect("parsed message should encode");
    let reparsed: Message = serialized
        .parse()
        .unwrap_or_else(|e| panic!("Failed to reparse '{}': {}", serialized, e));
    assert_eq!(message, reparsed, "Round-trip failed for '{}'", original);
}

#[test]
fn test_message_round_trip_simple() {
    assert_round_trip("PING :irc.example.com");
}

#[test]
fn test_message_round_trip_with_prefix() {
    assert_round_trip(":nick!user@host PRIVMSG #channel :Hello, world!");
}

#[test]
fn test_message_round_trip_with_tags() {
    assert_round_trip(
        "@time=2023-01-01T00:00:00.000Z;msgid=abc123 :nick!user@host PRIVMSG #channel :Tagged message",
    );
}

#[test]
fn test_message_round_trip_numeric_response() {
    assert_round_trip(":server 001 nickname :Welcome to the IRC Network");
    assert_round_trip(":server 353 me = #rust :@alice +bob carol");
}

#[test]
fn test_message_round_trip_escaped_tag_values() {
    let original = "@+draft/reply=a\\:b\\sc\\\\d :nick PRIVMSG #c :hi";
    let message: Message = original.parse().unwrap();
    assert_eq!(message.tag_value("+draft/reply"), Some("a;b c\\d"));
    assert_round_trip(original);
}

#[test]
fn test_message_construction_and_parsing() {
    let message = Message::privmsg("#test", "Integration test message")
        .with_tag("time", Some("2023-01-01T00:00:00Z"))
        .with_tag("msgid", Some("test123"))
        .with_prefix("testbot!test@example.com");

    let serialized = message.to_string();
    let parsed: Message = serialized
        .parse()
        .expect("Failed to parse constructed message");

    assert_eq!(message, parsed);
    assert_eq!(
        parsed.tags,
        vec![
            Tag::new("time", Some("2023-01-01T00:00:00Z")),
            Tag::new("msgid", Some("test123")),
        ]
    );
}

#[test]
fn test_empty_trailing_parameter() {
    let message: Message = "PRIVMSG #channel :".parse().unwrap();
    assert_eq!(message.params, vec!["#channel", ""]);
    assert_eq!(message.to_string(), "PRIVMSG #channel :");
    assert_round_trip("PRIVMSG #channel :");
}

#[test]
fn test_trailing_preserves_leading_colon() {
    let message: Message = "PRIVMSG #channel ::-)".parse().unwrap();
    assert_eq!(message.trailing(), Some(":-)"));
    assert_eq!(message.to_string(), "PRIVMSG #channel ::-)");
}

#[test]
fn test_special_characters_in_message() {
    assert_round_trip(":nick!user@host PRIVMSG #channel :Grüße aus Köln 🎉");
}

#[test]
fn test_mode_command_round_trip() {
    assert_round_trip(":server MODE #channel +o nick");
    let built = Message::mode(
        "#channel",
        &[ModeChange::plus('o', Some("alice")), ModeChange::minus('b', Some("*!*@host"))],
    );
    assert_eq!(built.to_string(), "MODE #channel +o-b alice *!*@host");
}

#[test]
fn test_join_command_variations() {
    for original in [
        "JOIN #channel",
        "JOIN #channel key",
        ":nick!user@host JOIN #channel",
        "JOIN #channel1,#channel2 key1,key2",
        ":nick!user@host JOIN #channel account :Real Name",
    ] {
        assert_round_trip(original);
    }
}

#[test]
fn test_line_endings_are_stripped() {
    for raw in ["PING :x\r\n", "PING :x\n", "PING :x"] {
        let msg: Message = raw.parse().unwrap();
        assert_eq!(msg.params, vec!["x"]);
    }
}

#[test]
fn test_missing_command_is_malformed() {
    for raw in [":server.only", "@tag=1", "@tag=1 :prefix"] {
        let err = raw.parse::<Message>().unwrap_err();
        assert!(
            matches!(
                err,
                ProtocolError::InvalidMessage {
                    cause: MessageParseError::MalformedLine { .. },
                    ..
                }
            ),
            "{raw:?} gave {err:?}"
        );
    }
}

#[test]
fn test_unencodable_messages_are_rejected() {
    let spaced = Message::new("PRIVMSG", ["#a b", "hello"]);
    assert!(matches!(
        spaced.encode(),
        Err(MessageParseError::InvalidParam { index: 0, .. })
    ));

    let empty_middle = Message::new("KICK", ["#a", "", "bye"]);
    assert!(matches!(
        empty_middle.encode(),
        Err(MessageParseError::InvalidParam { index: 1, .. })
    ));

    let bad_command = Message::new("PRIV MSG", ["x"]);
    assert!(matches!(
        bad_command.encode(),
        Err(MessageParseError::InvalidCommand(_))
    ));
}
