//! Fuzz target for IRC message parsing
//!
//! Feeds arbitrary input to the decoder and, when it parses, checks that
//! the validated encoding decodes back to the same command and params.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_client::Message;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    if input.len() > 8191 {
        return;
    }

    let Ok(msg) = input.parse::<Message>() else {
        return;
    };
    if let Ok(encoded) = msg.encode() {
        let reparsed: Message = encoded.parse().expect("encoded message must parse");
        assert_eq!(msg.command, reparsed.command);
        assert_eq!(msg.params, reparsed.params);
        assert_eq!(msg.prefix, reparsed.prefix);
    }

    let _ = slirc_client::IrcCodec::sanitize(input.into_owned());
});
