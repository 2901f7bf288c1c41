//! Async client over tokio.
//!
//! [`Client`] runs a [`Session`] on a connection: one task reads lines and
//! dispatches them in arrival order, another owns the write half and
//! serializes everything queued for the server. All handlers for a line
//! finish before the next line is read.
//!
//! Handlers run while the session lock is held. From inside a handler use
//! [`Context::send`]; calling back into the [`Client`] would deadlock. Work
//! that takes time belongs in a spawned task holding a [`Sender`].
//!
//! ```no_run
//! use slirc_client::{Client, Config, Filter, Flow, Message};
//!
//! # async fn run() -> Result<(), slirc_client::ClientError> {
//! let client = Client::connect(Config::new("irc.libera.chat", 6667, "slircbot")).await?;
//! client.on(Filter::new().command("PRIVMSG").payload(|m| m.trailing() == Some("!ping")), |ctx, event| {
//!     if let Some(target) = event.message().and_then(|m| m.param(0)) {
//!         ctx.send(Message::privmsg(target, "pong"));
//!     }
//!     Ok(Flow::Continue)
//! });
//! client.join_and_wait("#slirc", None).await?;
//! client.quit(Some("bye")).await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, trace, warn};

use crate::config::{Config, Timeouts};
use crate::dispatch::{Context, DisconnectReason, Event, Flow, HandlerId, Predicate};
use crate::error::{ClientError, EngineError, MessageParseError, NickError, ProtocolError};
use crate::irc::IrcCodec;
use crate::line::{Line, LineCodec};
use crate::message::Message;
use crate::session::Session;
use crate::state::EngineState;
use crate::transport::{self, Stream};

const KEEPALIVE_TOKEN: &str = "slirc-keepalive";

/// Connection lifecycle as seen by the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Registration in progress.
    Connecting,
    /// 001 received.
    Registered,
    /// The read loop has ended.
    Closed(DisconnectReason),
}

/// A message on its way to the writer task.
struct Outbound {
    msg: Message,
    /// Told once the message is flushed, or why it was not sent.
    sent: Option<oneshot::Sender<Result<(), ProtocolError>>>,
}

impl Outbound {
    fn new(msg: Message) -> Self {
        Outbound { msg, sent: None }
    }
}

struct Shared {
    session: Mutex<Session>,
    outbound: mpsc::UnboundedSender<Outbound>,
    status: watch::Receiver<Status>,
    shutdown: Notify,
    timeouts: Timeouts,
    sync_seq: AtomicU64,
}

impl Shared {
    /// Move whatever the session queued onto the writer channel.
    fn flush(&self, session: &mut Session) {
        for msg in session.drain_outbound() {
            trace!(line = %msg, ">>");
            if self.outbound.send(Outbound::new(msg)).is_err() {
                debug!("writer gone, dropping outbound message");
            }
        }
    }
}

/// Handle to a running connection. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

/// Queues messages from outside the read path, e.g. a spawned task.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::UnboundedSender<Outbound>,
    wait: Duration,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl Sender {
    /// Queue a message. Fails once the connection is closed.
    pub fn send(&self, msg: Message) -> Result<(), ClientError> {
        self.tx
            .send(Outbound::new(msg))
            .map_err(|_| ClientError::Closed)
    }

    /// Queue a message and wait until the writer has flushed it.
    pub async fn send_and_wait(&self, msg: Message) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Outbound { msg, sent: Some(tx) })
            .map_err(|_| ClientError::Closed)?;
        await_sent(rx, self.wait).await
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), ClientError> {
        self.send(Message::privmsg(target, text))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("status", &*self.shared.status.borrow())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connect, register, and return once 001 arrives.
    pub async fn connect(config: Config) -> Result<Client, ClientError> {
        let stream = transport::connect(&config.server, config.timeouts.connect()).await?;
        let registration = config.timeouts.registration();
        let client = match stream {
            Stream::Tcp(tcp) => Client::spawn(config, tcp)?,
            Stream::Tls(tls) => Client::spawn(config, *tls)?,
        };
        client.wait_registered(registration).await?;
        Ok(client)
    }

    /// Start the engine on an established stream without waiting for
    /// registration. Handlers registered right after this call see every
    /// line, including 001.
    pub fn spawn<S>(config: Config, stream: S) -> Result<Client, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = IrcCodec::new("utf-8")?;
        let lines = LineCodec::new("utf-8")?;
        let (read, write) = tokio::io::split(stream);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(Status::Connecting);
        let (failed_tx, failed_rx) = oneshot::channel();

        let timeouts = config.timeouts.clone();
        let mut session = Session::new(config);
        session.start();

        let shared = Arc::new(Shared {
            session: Mutex::new(session),
            outbound,
            status,
            shutdown: Notify::new(),
            timeouts,
            sync_seq: AtomicU64::new(0),
        });
        shared.flush(&mut shared.session.lock());

        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write, codec),
            outbound_rx,
            failed_tx,
        ));
        tokio::spawn(read_loop(
            Arc::clone(&shared),
            FramedRead::new(read, lines),
            failed_rx,
            writer,
            status_tx,
        ));

        Ok(Client { shared })
    }

    /// Wait until 001 arrives or the connection closes.
    pub async fn wait_registered(&self, timeout: Duration) -> Result<(), ClientError> {
        let mut status = self.shared.status.clone();
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                let current = status.borrow_and_update().clone();
                match current {
                    Status::Registered => return Ok(()),
                    Status::Closed(reason) => return Err(reason),
                    Status::Connecting => {}
                }
                if status.changed().await.is_err() {
                    return Err(DisconnectReason::RemoteClosed);
                }
            }
        })
        .await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(DisconnectReason::NickExhausted)) => {
                let session = self.shared.session.lock();
                let nick = session.state().nick();
                Err(ClientError::NickExhausted(NickError::Exhausted {
                    desired: nick.desired().to_owned(),
                    attempts: nick.attempts(),
                }))
            }
            Ok(Err(reason)) => Err(ClientError::ConnectionLost(reason)),
            Err(_) => {
                self.disconnect();
                Err(ClientError::Timeout("registration"))
            }
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.shared.status.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.shared.status.borrow(), Status::Closed(_))
    }

    /// Queue a message for the server.
    pub fn send(&self, msg: Message) -> Result<(), ClientError> {
        self.with_session(|session| {
            session.send(msg);
            Ok(())
        })
    }

    /// Queue a message and wait until the writer has flushed it to the
    /// connection. Messages queued earlier are written first.
    ///
    /// Fails with [`ClientError::Codec`] if the message cannot be encoded.
    pub async fn send_and_wait(&self, msg: Message) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.with_session(|session| {
            self.shared.flush(session);
            self.shared
                .outbound
                .send(Outbound { msg, sent: Some(tx) })
                .map_err(|_| ClientError::Closed)
        })?;
        await_sent(rx, self.shared.timeouts.wait()).await
    }

    /// A handle that queues messages without touching the session.
    pub fn sender(&self) -> Sender {
        Sender {
            tx: self.shared.outbound.clone(),
            wait: self.shared.timeouts.wait(),
        }
    }

    /// Send JOIN without waiting. Returns the channel name as sent.
    pub fn join(&self, channel: &str, key: Option<&str>) -> Result<String, ClientError> {
        self.with_session(|session| Ok(session.join(channel, key)))
    }

    /// Join and wait for the end of the names list.
    ///
    /// Fails with [`ClientError::JoinFailed`] if the server refuses.
    pub async fn join_and_wait(&self, channel: &str, key: Option<&str>) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let name = self.with_session(|session| {
            let name = session.state().caps().normalize_channel(channel);
            let watched = name.clone();
            session.on(
                move |event: &Event, state: &EngineState| match event {
                    Event::Message(msg) => {
                        let reply = msg.numeric() == Some(366)
                            || msg.response().is_some_and(|r| r.is_join_failure());
                        reply
                            && msg
                                .param(1)
                                .is_some_and(|c| state.caps().casemapping().eq(c, &watched))
                    }
                    Event::Disconnected(_) => true,
                },
                move |_: &mut Context<'_>, event: &Event| {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(event.clone());
                    }
                    Ok(Flow::Unregister)
                },
            );
            session.join(&name, key);
            Ok(name)
        })?;

        match self.await_event(rx, "join").await? {
            msg if msg.numeric() == Some(366) => Ok(()),
            msg => Err(ClientError::JoinFailed {
                channel: name,
                code: msg.numeric().unwrap_or_default(),
                reason: msg.trailing().unwrap_or_default().to_owned(),
            }),
        }
    }

    /// Send PART.
    pub fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), ClientError> {
        self.with_session(|session| {
            session.part(channel, reason);
            Ok(())
        })
    }

    /// Request a nick change. The current nick changes when the server
    /// confirms it.
    pub fn change_nick(&self, nick: &str) -> Result<(), ClientError> {
        self.with_session(|session| {
            session.change_nick(nick);
            Ok(())
        })
    }

    /// Wait for the first message matching `predicate`.
    pub async fn wait_for<P>(&self, predicate: P, timeout: Duration) -> Result<Message, ClientError>
    where
        P: Predicate + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        self.with_session(|session| {
            session.on(
                move |event: &Event, state: &EngineState| {
                    event.is_disconnect() || predicate.matches(event, state)
                },
                move |_: &mut Context<'_>, event: &Event| {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(event.clone());
                    }
                    Ok(Flow::Unregister)
                },
            );
            Ok(())
        })?;
        let deadline = tokio::time::timeout(timeout, rx);
        match deadline.await {
            Ok(Ok(Event::Message(msg))) => Ok(msg),
            Ok(Ok(Event::Disconnected(reason))) => Err(ClientError::ConnectionLost(reason)),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout("message")),
        }
    }

    /// Round-trip a PING. Once it returns, every line the server sent
    /// before its PONG has been dispatched.
    pub async fn sync(&self) -> Result<(), ClientError> {
        let seq = self.shared.sync_seq.fetch_add(1, Ordering::Relaxed);
        let token = format!("slirc-sync-{}", seq);
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        self.with_session(|session| {
            let expected = token.clone();
            session.on(
                move |event: &Event, _: &EngineState| match event {
                    Event::Message(msg) => {
                        msg.command == "PONG" && msg.trailing() == Some(expected.as_str())
                    }
                    Event::Disconnected(_) => true,
                },
                move |_: &mut Context<'_>, event: &Event| {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(event.clone());
                    }
                    Ok(Flow::Unregister)
                },
            );
            session.send(Message::ping(token));
            Ok(())
        })?;
        self.await_event(rx, "sync").await.map(|_| ())
    }

    /// Send QUIT and wait for the connection to close.
    ///
    /// Forces the close if the server does not hang up in time.
    pub async fn quit(&self, reason: Option<&str>) -> DisconnectReason {
        let queued = self.with_session(|session| {
            session.quit(reason);
            Ok(())
        });
        if queued.is_ok() {
            let wait = self.shared.timeouts.wait();
            if let Ok(reason) = tokio::time::timeout(wait, self.closed()).await {
                return reason;
            }
            self.disconnect();
        }
        self.closed().await
    }

    /// Drop the connection without QUIT.
    pub fn disconnect(&self) {
        self.shared.shutdown.notify_one();
    }

    /// Wait for the connection to close.
    pub async fn closed(&self) -> DisconnectReason {
        let mut status = self.shared.status.clone();
        loop {
            if let Status::Closed(reason) = &*status.borrow_and_update() {
                return reason.clone();
            }
            if status.changed().await.is_err() {
                return DisconnectReason::RemoteClosed;
            }
        }
    }

    /// Read tracked state.
    pub fn with_state<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        f(self.shared.session.lock().state())
    }

    /// Register a handler after all earlier ones.
    pub fn on<P, F>(&self, predicate: P, handler: F) -> HandlerId
    where
        P: Predicate + 'static,
        F: FnMut(&mut Context<'_>, &Event) -> anyhow::Result<Flow> + Send + 'static,
    {
        self.shared.session.lock().on(predicate, handler)
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        self.shared.session.lock().unregister(id)
    }

    /// Replace the error observer.
    pub fn on_error<F>(&self, observer: F)
    where
        F: FnMut(&EngineError) + Send + 'static,
    {
        self.shared.session.lock().on_error(observer);
    }

    fn with_session<R>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<R, ClientError>,
    ) -> Result<R, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let mut session = self.shared.session.lock();
        if session.is_ended() {
            return Err(ClientError::Closed);
        }
        let out = f(&mut session)?;
        self.shared.flush(&mut session);
        Ok(out)
    }

    async fn await_event(
        &self,
        rx: oneshot::Receiver<Event>,
        what: &'static str,
    ) -> Result<Message, ClientError> {
        match tokio::time::timeout(self.shared.timeouts.wait(), rx).await {
            Ok(Ok(Event::Message(msg))) => Ok(msg),
            Ok(Ok(Event::Disconnected(reason))) => Err(ClientError::ConnectionLost(reason)),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout(what)),
        }
    }
}

async fn await_sent(
    rx: oneshot::Receiver<Result<(), ProtocolError>>,
    wait: Duration,
) -> Result<(), ClientError> {
    match tokio::time::timeout(wait, rx).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(ClientError::Codec(e)),
        Ok(Err(_)) => Err(ClientError::Closed),
        Err(_) => Err(ClientError::Timeout("send")),
    }
}

async fn write_loop<W>(
    mut framed: FramedWrite<W, IrcCodec>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    failed: oneshot::Sender<String>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(Outbound { msg, sent }) = rx.recv().await {
        let quitting = msg.command == "QUIT";
        let outcome = match framed.send(msg).await {
            Ok(()) => Ok(()),
            Err(ProtocolError::Io(e)) => {
                error!(error = %e, "write failed");
                let _ = failed.send(e.to_string());
                return;
            }
            Err(e) => {
                warn!(error = %e, "dropping message that cannot be sent");
                Err(e)
            }
        };
        if let Some(sent) = sent {
            let _ = sent.send(outcome);
        }
        if quitting {
            break;
        }
    }
    if let Err(e) = framed.close().await {
        debug!(error = %e, "error closing write half");
    }
}

async fn read_loop<R>(
    shared: Arc<Shared>,
    mut lines: FramedRead<R, LineCodec>,
    mut writer_failed: oneshot::Receiver<String>,
    writer: JoinHandle<()>,
    status: watch::Sender<Status>,
) where
    R: AsyncRead + Unpin,
{
    let limit = lines.decoder().max_len();
    let idle = shared.timeouts.ping_idle();
    let grace = shared.timeouts.ping_timeout();
    let mut pinged = false;
    let mut writer_alive = true;
    let mut registered = false;

    let reason = loop {
        let wait = if pinged { grace } else { idle };
        tokio::select! {
            biased;
            _ = shared.shutdown.notified() => break DisconnectReason::Quit,
            failure = &mut writer_failed, if writer_alive => {
                writer_alive = false;
                if let Ok(e) = failure {
                    break DisconnectReason::Io(e);
                }
            }
            next = tokio::time::timeout(wait, lines.next()) => match next {
                Err(_) if pinged => {
                    warn!(secs = grace.as_secs(), "ping timeout");
                    break DisconnectReason::PingTimeout;
                }
                Err(_) => {
                    pinged = true;
                    let mut session = shared.session.lock();
                    session.send(Message::ping(KEEPALIVE_TOKEN));
                    shared.flush(&mut session);
                }
                Ok(None) => {
                    let quitting = shared.session.lock().state().registration().state()
                        == crate::state::ConnectionState::Terminated;
                    break if quitting {
                        DisconnectReason::Quit
                    } else {
                        DisconnectReason::RemoteClosed
                    };
                }
                Ok(Some(Err(ProtocolError::Io(e)))) => {
                    error!(error = %e, "read failed");
                    break DisconnectReason::Io(e.to_string());
                }
                Ok(Some(Err(e))) => {
                    error!(error = %e, "unrecoverable framing error");
                    break DisconnectReason::Protocol(e.to_string());
                }
                Ok(Some(Ok(Line::Overlong { head, len }))) => {
                    pinged = false;
                    warn!(len, limit, "dropping overlong line");
                    shared.session.lock().reject_line(
                        head,
                        MessageParseError::LineTooLong { actual: len, limit },
                    );
                }
                Ok(Some(Ok(Line::Text(line)))) => {
                    pinged = false;
                    let mut session = shared.session.lock();
                    session.feed_line(&line);
                    shared.flush(&mut session);
                    if !registered && session.state().is_registered() {
                        registered = true;
                        status.send_replace(Status::Registered);
                    }
                    if let Some(reason) = session.take_close() {
                        break reason;
                    }
                }
            }
        }
    };

    debug!(reason = %reason, "connection closed");
    {
        let mut session = shared.session.lock();
        session.disconnected(reason.clone());
        let _ = session.drain_outbound();
    }
    // Let a pending QUIT reach the wire before dropping the writer.
    if matches!(reason, DisconnectReason::NickExhausted | DisconnectReason::ServerError(_)) {
        let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
    } else {
        writer.abort();
    }
    status.send_replace(Status::Closed(reason));
}
