//! Async client tests against a scripted in-memory server.

#![cfg(feature = "tokio")]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use slirc_client::{
    Client, ClientError, Config, DisconnectReason, EngineError, Filter, Flow, Line, LineCodec,
    Message, MessageParseError, NickError, Status,
};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_util::codec::Framed;

struct Server<S> {
    lines: Framed<S, LineCodec>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Server<S> {
    fn new(stream: S) -> Self {
        Server {
            lines: Framed::new(stream, LineCodec::new("utf-8").unwrap()),
        }
    }

    async fn recv(&mut self) -> String {
        match self.lines.next().await {
            Some(Ok(Line::Text(line))) => line,
            other => panic!("expected a line, got {:?}", other),
        }
    }

    async fn send(&mut self, line: &str) {
        self.lines.send(format!("{}\r\n", line)).await.unwrap();
    }

    async fn register(&mut self, nick: &str) {
        assert_eq!(self.recv().await, format!("NICK {}", nick));
        assert!(self.recv().await.starts_with("USER "));
        self.send(&format!(":irc.test 001 {} :Welcome", nick)).await;
        self.send(&format!(
            ":irc.test 005 {} PREFIX=(ov)@+ CHANMODES=b,k,l,imnst :are supported",
            nick
        ))
        .await;
    }
}

fn start(config: Config) -> (Client, Server<DuplexStream>) {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let client = Client::spawn(config, client_io).unwrap();
    (client, Server::new(server_io))
}

#[tokio::test]
async fn test_registers_and_answers_ping() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();
    assert_eq!(client.status(), Status::Registered);
    assert_eq!(client.with_state(|s| s.current_nick().map(str::to_owned)), Some("bot".into()));

    server.send("PING :irc.test").await;
    assert_eq!(server.recv().await, "PONG irc.test");
}

#[tokio::test]
async fn test_join_and_wait_tracks_members() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    let joining = {
        let client = client.clone();
        tokio::spawn(async move { client.join_and_wait("rust", None).await })
    };
    assert_eq!(server.recv().await, "JOIN #rust");
    server.send(":bot!u@h JOIN #rust").await;
    server.send(":irc.test 353 bot = #rust :@alice +bob bot").await;
    server.send(":irc.test 366 bot #rust :End of /NAMES list.").await;
    joining.await.unwrap().unwrap();

    let (joined, alice_op) = client.with_state(|s| {
        let channel = s.channel("#rust").unwrap();
        (channel.is_joined(), channel.member("alice").unwrap().modes().contains('o'))
    });
    assert!(joined);
    assert!(alice_op);
}

#[tokio::test]
async fn test_join_failure_is_reported() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    let joining = {
        let client = client.clone();
        tokio::spawn(async move { client.join_and_wait("#secret", None).await })
    };
    assert_eq!(server.recv().await, "JOIN #secret");
    server
        .send(":irc.test 474 bot #secret :Cannot join channel (+b)")
        .await;

    match joining.await.unwrap() {
        Err(ClientError::JoinFailed { channel, code, reason }) => {
            assert_eq!(channel, "#secret");
            assert_eq!(code, 474);
            assert_eq!(reason, "Cannot join channel (+b)");
        }
        other => panic!("expected JoinFailed, got {:?}", other),
    }
    assert!(client.with_state(|s| s.channel("#secret").is_none()));
}

#[tokio::test]
async fn test_handler_replies_through_context() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    client.on(
        Filter::new()
            .command("PRIVMSG")
            .payload(|m| m.trailing() == Some("!ping")),
        |ctx, event| {
            if let Some(from) = event.message().and_then(|m| m.source_nick()) {
                ctx.send(Message::privmsg(from, "pong"));
            }
            Ok(Flow::Continue)
        },
    );
    server.register("bot").await;

    server.send(":alice!a@h PRIVMSG bot :!ping").await;
    assert_eq!(server.recv().await, "PRIVMSG alice pong");
}

#[tokio::test]
async fn test_overlong_line_is_skipped() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.on_error(move |err| {
        if let EngineError::MalformedLine { cause, .. } = err {
            let _ = tx.send(cause.clone());
        }
    });
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    let text = "x".repeat(9000);
    server
        .send(&format!(":irc.test NOTICE bot :{}", text))
        .await;
    server.send("PING :still-here").await;

    assert_eq!(server.recv().await, "PONG still-here");
    assert_eq!(client.status(), Status::Registered);
    assert!(matches!(
        rx.recv().await,
        Some(MessageParseError::LineTooLong { limit: 8191, .. })
    ));
}

#[tokio::test]
async fn test_send_and_wait_is_acknowledged_after_write() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    client.send(Message::privmsg("#rust", "first")).unwrap();
    client
        .send_and_wait(Message::privmsg("#rust", "second"))
        .await
        .unwrap();
    assert_eq!(server.recv().await, "PRIVMSG #rust first");
    assert_eq!(server.recv().await, "PRIVMSG #rust second");

    client
        .sender()
        .send_and_wait(Message::notice("#rust", "third"))
        .await
        .unwrap();
    assert_eq!(server.recv().await, "NOTICE #rust third");

    let bad = Message::new("PRIVMSG", ["two words", "text"]);
    assert!(matches!(
        client.send_and_wait(bad).await,
        Err(ClientError::Codec(_))
    ));
}

#[tokio::test]
async fn test_wait_for_and_sync() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    let waiting = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .wait_for(Filter::new().command("NOTICE"), Duration::from_secs(5))
                .await
        })
    };
    // Spawned tasks are polled in order, so the waiter is in place before
    // the sync PING goes out.
    let syncing = {
        let client = client.clone();
        tokio::spawn(async move { client.sync().await })
    };
    let ping = server.recv().await;
    let token = ping.strip_prefix("PING ").expect("sync PING").to_owned();
    server.send(":irc.test NOTICE bot :hello").await;
    server.send(&format!(":irc.test PONG irc.test :{}", token)).await;

    syncing.await.unwrap().unwrap();
    let notice = waiting.await.unwrap().unwrap();
    assert_eq!(notice.trailing(), Some("hello"));
}

#[tokio::test]
async fn test_quit_closes_cleanly() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    let (reason, ()) = tokio::join!(client.quit(Some("bye")), async move {
        assert_eq!(server.recv().await, "QUIT bye");
        drop(server);
    });
    assert_eq!(reason, DisconnectReason::Quit);
    assert!(client.is_closed());
    assert!(matches!(
        client.send(Message::privmsg("#rust", "late")),
        Err(ClientError::Closed)
    ));
}

#[tokio::test]
async fn test_remote_close_is_delivered_to_handlers() {
    let (client, mut server) = start(Config::new("irc.test", 6667, "bot"));
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    client.on(Filter::new().disconnect(), move |_, event| {
        if let (Some(tx), slirc_client::Event::Disconnected(reason)) = (tx.take(), event) {
            let _ = tx.send(reason.clone());
        }
        Ok(Flow::Unregister)
    });
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    drop(server);
    assert_eq!(client.closed().await, DisconnectReason::RemoteClosed);
    assert_eq!(rx.await.unwrap(), DisconnectReason::RemoteClosed);
}

#[tokio::test]
async fn test_nick_exhaustion_fails_registration() {
    let mut config = Config::new("irc.test", 6667, "bot");
    config.identity.nick.max_attempts = 1;
    let (client, mut server) = start(config);

    assert_eq!(server.recv().await, "NICK bot");
    server.recv().await;
    server
        .send(":irc.test 433 * bot :Nickname is already in use")
        .await;
    assert_eq!(server.recv().await, "QUIT :no usable nick");

    let err = client
        .wait_registered(Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::NickExhausted(NickError::Exhausted { attempts: 1, .. })
    ));
    assert_eq!(client.closed().await, DisconnectReason::NickExhausted);
}

#[tokio::test(start_paused = true)]
async fn test_idle_connection_times_out() {
    let mut config = Config::new("irc.test", 6667, "bot");
    config.timeouts.ping_idle_secs = 60;
    config.timeouts.ping_timeout_secs = 30;
    let (client, mut server) = start(config);
    server.register("bot").await;
    client.wait_registered(Duration::from_secs(5)).await.unwrap();

    assert_eq!(server.recv().await, "PING slirc-keepalive");
    assert_eq!(client.closed().await, DisconnectReason::PingTimeout);
}

#[tokio::test]
async fn test_connect_over_tcp() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = Server::new(socket);
        server.register("bot").await;
        server
    });

    let client = Client::connect(Config::new("127.0.0.1", port, "bot"))
        .await
        .unwrap();
    assert_eq!(client.status(), Status::Registered);
    let _server = server.await.unwrap();
}
