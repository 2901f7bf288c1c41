//! Benchmarks for message decoding, encoding, mode parsing and dispatch.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slirc_client::mode::parse_mode_params;
use slirc_client::{Config, Isupport, Message, Session};

/// Simple PING message
const SIMPLE_MESSAGE: &str = "PING :irc.example.com";

/// Message with prefix
const PREFIX_MESSAGE: &str = ":nick!user@host PRIVMSG #channel :Hello, world!";

/// Message with IRCv3 tags
const TAGGED_MESSAGE: &str = "@time=2023-01-01T00:00:00.000Z;msgid=abc123;+example/tag=value :nick!user@host PRIVMSG #channel :Hello with tags!";

/// Names reply with mixed prefixes
const NAMES_REPLY: &str = ":irc.server.net 353 me = #channel :@alice +bob carol @+dave ~erin &frank %gina hank";

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Message Parsing");

    for (name, line) in [
        ("simple_ping", SIMPLE_MESSAGE),
        ("with_prefix", PREFIX_MESSAGE),
        ("with_tags", TAGGED_MESSAGE),
        ("names_reply", NAMES_REPLY),
    ] {
        group.bench_with_input(BenchmarkId::new("decode", name), line, |b, s| {
            b.iter(|| {
                let msg: Message = black_box(s).parse().unwrap();
                black_box(msg)
            })
        });
    }

    group.finish();
}

fn benchmark_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("Message Encoding");

    let tagged: Message = TAGGED_MESSAGE.parse().unwrap();
    group.bench_function("tagged_display", |b| {
        b.iter(|| black_box(&tagged).to_string())
    });
    group.bench_function("tagged_validated", |b| {
        b.iter(|| black_box(&tagged).encode().unwrap())
    });
    group.bench_function("privmsg_construct", |b| {
        b.iter(|| {
            let msg = Message::privmsg(black_box("#channel"), black_box("Hello!"))
                .with_tag("msgid", Some("abc123"))
                .with_prefix("nick!user@host");
            black_box(msg)
        })
    });

    group.finish();
}

fn benchmark_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Mode Grammar");

    let mut caps = Isupport::new();
    caps.ingest_tokens([
        "PREFIX=(qaohv)~&@%+",
        "CHANMODES=beI,k,l,BCMNORScimnpstz",
    ]);
    let args = ["alice", "bob", "*!*@spam", "key", "25", "carol"];
    group.bench_function("mixed_modes", |b| {
        b.iter(|| parse_mode_params(black_box("+ov-b+kl-h+nt"), black_box(&args), &caps))
    });

    group.finish();
}

fn benchmark_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Session Dispatch");

    let mut session = Session::new(Config::new("irc.server.net", 6667, "me"));
    session.start();
    for line in [
        ":irc.server.net 001 me :Welcome",
        ":irc.server.net 005 me PREFIX=(qaohv)~&@%+ CHANMODES=beI,k,l,imnst :are supported",
        ":me!u@h JOIN #channel",
        NAMES_REPLY,
        ":irc.server.net 366 me #channel :End",
    ] {
        session.feed_line(line);
    }
    session.drain_outbound();

    group.bench_function("privmsg", |b| {
        b.iter(|| session.feed_line(black_box(PREFIX_MESSAGE)))
    });
    group.bench_function("mode_then_revert", |b| {
        b.iter(|| {
            session.feed_line(black_box(":alice!u@h MODE #channel +v-o carol bob"));
            session.feed_line(black_box(":alice!u@h MODE #channel -v+o carol bob"));
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parsing,
    benchmark_encoding,
    benchmark_modes,
    benchmark_dispatch,
);

criterion_main!(benches);
