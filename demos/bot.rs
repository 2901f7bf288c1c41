//! Simple IRC bot example
//!
//! Connects, joins a channel, answers `!ping`, `!ops` and `!who`, and quits
//! on `!quit` from a channel operator.
//!
//! ```text
//! RUST_LOG=slirc_client=debug cargo run --example bot -- irc.libera.chat 6667 slirc_demo '#slirc-test'
//! ```

use slirc_client::{Client, Config, Event, Filter, Flow, Message};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "irc.libera.chat".to_owned());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(6667);
    let nick = args.next().unwrap_or_else(|| "slirc_demo".to_owned());
    let channel = args.next().unwrap_or_else(|| "#slirc-test".to_owned());

    let mut config = Config::new(host, port, nick);
    config.request_caps = vec!["multi-prefix".into()];
    let client = Client::connect(config).await?;
    info!("registered");

    let (tx, mut quit_requested) = tokio::sync::mpsc::unbounded_channel();

    client.on(
        Filter::new().command("PRIVMSG").target(&channel),
        move |ctx, event| {
            let Some(msg) = event.message() else {
                return Ok(Flow::Continue);
            };
            let (Some(target), Some(from), Some(text)) =
                (msg.param(0), msg.source_nick(), msg.trailing())
            else {
                return Ok(Flow::Continue);
            };
            let state = ctx.state();
            let Some(chan) = state.channel(target) else {
                return Ok(Flow::Continue);
            };
            let reply = match text {
                "!ping" => Some(format!("{}: pong", from)),
                "!who" => Some(format!("{} members: {}", chan.len(), chan.nicks().join(" "))),
                "!ops" => {
                    let ops: Vec<&str> = chan
                        .members()
                        .filter(|m| m.modes().contains('o'))
                        .map(|m| m.nick())
                        .collect();
                    Some(format!("operators: {}", ops.join(" ")))
                }
                "!quit" if chan.member(from).is_some_and(|m| m.modes().contains('o')) => {
                    let _ = tx.send(from.to_owned());
                    None
                }
                _ => None,
            };
            if let Some(reply) = reply {
                ctx.send(Message::privmsg(target, reply));
            }
            Ok(Flow::Continue)
        },
    );

    client.on(Filter::new().disconnect(), |_, event| {
        if let Event::Disconnected(reason) = event {
            info!(reason = %reason, "disconnected");
        }
        Ok(Flow::Continue)
    });

    client.join_and_wait(&channel, None).await?;
    info!(channel = %channel, "joined");

    tokio::select! {
        Some(by) = quit_requested.recv() => {
            info!(by = %by, "quit requested");
            client.quit(Some("bye")).await;
        }
        reason = client.closed() => {
            info!(reason = %reason, "connection closed");
        }
        _ = tokio::signal::ctrl_c() => {
            client.quit(Some("interrupted")).await;
        }
    }

    Ok(())
}
