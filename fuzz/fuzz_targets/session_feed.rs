//! Fuzz target for the engine: arbitrary server lines must never panic
//! the session or leave it unable to answer a PING.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_client::{Config, Session};

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let mut session = Session::new(Config::new("irc.fuzz", 6667, "me"));
    session.start();
    session.feed_line(":irc.fuzz 001 me :Welcome");
    session.feed_line(":me!u@h JOIN #fuzz");
    for line in input.lines() {
        session.feed_line(line);
    }
    session.drain_outbound();

    session.feed_line("PING :alive");
    if !session.is_ended() {
        assert!(session
            .drain_outbound()
            .iter()
            .any(|m| m.command == "PONG"));
    }
});
