//! Handler registry and dispatch.
//!
//! A [`Dispatcher`] holds an ordered list of `(predicate, handler)`
//! registrations. For each [`Event`] every predicate is evaluated first,
//! against the state as it stood before the event, and then every matching
//! handler runs in registration order. The built-in handlers that keep
//! [`EngineState`] current are ordinary registrations installed ahead of
//! any user handler.
//!
//! A handler that returns an error or panics is reported to the error
//! observer; the remaining handlers still run. A predicate that panics is
//! reported the same way and treated as not matching.

mod builtin;
mod filter;

pub use self::filter::Filter;

pub(crate) use self::builtin::{install, BuiltinConfig};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{trace, warn};

use crate::error::{EngineError, HandlerError, HandlerFailure};
use crate::message::Message;
use crate::state::EngineState;

/// What handlers receive.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// One inbound message.
    Message(Message),
    /// The connection ended. Delivered once, after every other event.
    Disconnected(DisconnectReason),
}

impl Event {
    /// The message, for [`Event::Message`].
    pub fn message(&self) -> Option<&Message> {
        match self {
            Event::Message(msg) => Some(msg),
            Event::Disconnected(_) => None,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Event::Disconnected(_))
    }
}

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// We sent QUIT or closed the connection locally.
    Quit,
    /// The server closed the stream.
    RemoteClosed,
    /// Reading or writing failed.
    Io(String),
    /// No traffic after a keepalive PING.
    PingTimeout,
    /// The server sent ERROR.
    ServerError(String),
    /// No nick could be registered.
    NickExhausted,
    /// The server violated the protocol badly enough to stop.
    Protocol(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Quit => f.write_str("closed locally"),
            DisconnectReason::RemoteClosed => f.write_str("closed by server"),
            DisconnectReason::Io(e) => write!(f, "i/o error: {}", e),
            DisconnectReason::PingTimeout => f.write_str("ping timeout"),
            DisconnectReason::ServerError(reason) => write!(f, "server error: {}", reason),
            DisconnectReason::NickExhausted => f.write_str("no usable nick"),
            DisconnectReason::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

/// Handle to one registration, used to unregister it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Wrap a raw id.
    pub const fn from_raw(id: u64) -> Self {
        HandlerId(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a handler wants after running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    /// Stay registered.
    #[default]
    Continue,
    /// Remove this registration.
    Unregister,
}

/// Decides whether a handler runs for an event.
///
/// Predicates must be pure: they see the event and the tracked state and
/// nothing else.
pub trait Predicate: Send {
    fn matches(&self, event: &Event, state: &EngineState) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Event, &EngineState) -> bool + Send,
{
    fn matches(&self, event: &Event, state: &EngineState) -> bool {
        self(event, state)
    }
}

/// Reaction to a matched event.
///
/// Handlers run on the read path and must return promptly; hand long work
/// to a separate task.
pub type Handler = Box<dyn FnMut(&mut Context<'_>, &Event) -> anyhow::Result<Flow> + Send>;

/// Callback receiving every contained fault.
pub type ErrorObserver = Box<dyn FnMut(&EngineError) + Send>;

struct Entry {
    id: HandlerId,
    predicate: Box<dyn Predicate>,
    handler: Handler,
}

/// Handler-side view of the engine during one dispatch.
pub struct Context<'a> {
    id: HandlerId,
    state: &'a mut EngineState,
    outbox: &'a mut Vec<Message>,
    staged: &'a mut Vec<Entry>,
    removed: &'a mut Vec<HandlerId>,
    next_id: &'a mut u64,
    faults: &'a mut Vec<EngineError>,
    close: &'a mut Option<DisconnectReason>,
}

impl Context<'_> {
    /// The registration currently running.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Tracked state. Built-in handlers registered ahead of this one have
    /// already applied the current message.
    pub fn state(&self) -> &EngineState {
        self.state
    }

    /// Queue a message for the server.
    pub fn send(&mut self, msg: Message) {
        self.outbox.push(msg);
    }

    /// Register another handler. It sees events from the next one on.
    pub fn register<P, F>(&mut self, predicate: P, handler: F) -> HandlerId
    where
        P: Predicate + 'static,
        F: FnMut(&mut Context<'_>, &Event) -> anyhow::Result<Flow> + Send + 'static,
    {
        let id = HandlerId(*self.next_id);
        *self.next_id += 1;
        self.staged.push(Entry {
            id,
            predicate: Box::new(predicate),
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a registration. Takes effect immediately, including for the
    /// rest of the current event.
    pub fn unregister(&mut self, id: HandlerId) {
        self.removed.push(id);
    }

    pub(crate) fn state_mut(&mut self) -> &mut EngineState {
        self.state
    }

    pub(crate) fn report(&mut self, err: EngineError) {
        self.faults.push(err);
    }

    /// Ask the session to end the connection.
    pub(crate) fn close(&mut self, reason: DisconnectReason) {
        self.close.get_or_insert(reason);
    }
}

/// Ordered registry of handlers.
pub struct Dispatcher {
    entries: Vec<Entry>,
    next_id: u64,
    observer: ErrorObserver,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Empty registry whose observer logs each fault at `warn`.
    pub fn new() -> Self {
        Dispatcher {
            entries: Vec::new(),
            next_id: 1,
            observer: Box::new(|err| warn!(error = %err, "engine fault")),
        }
    }

    /// Append a registration.
    pub fn register<P, F>(&mut self, predicate: P, handler: F) -> HandlerId
    where
        P: Predicate + 'static,
        F: FnMut(&mut Context<'_>, &Event) -> anyhow::Result<Flow> + Send + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            predicate: Box::new(predicate),
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a registration. Returns whether it existed.
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the error observer.
    pub fn set_observer(&mut self, observer: ErrorObserver) {
        self.observer = observer;
    }

    /// Hand a fault to the observer.
    pub fn report(&mut self, err: &EngineError) {
        (self.observer)(err);
    }

    /// Run every matching handler for `event`.
    ///
    /// Messages handlers send are appended to `outbox`. Returns the reason
    /// if a handler asked to end the connection.
    pub fn dispatch(
        &mut self,
        event: &Event,
        state: &mut EngineState,
        outbox: &mut Vec<Message>,
    ) -> Option<DisconnectReason> {
        let mut matched = Vec::new();
        let before: &EngineState = state;
        for entry in &self.entries {
            let predicate = &entry.predicate;
            match catch_unwind(AssertUnwindSafe(|| predicate.matches(event, before))) {
                Ok(true) => matched.push(entry.id),
                Ok(false) => {}
                Err(payload) => {
                    // A panicking predicate counts as no match.
                    let failure = HandlerFailure::Panicked(panic_message(payload.as_ref()));
                    (self.observer)(&HandlerError { id: entry.id, failure }.into());
                }
            }
        }
        trace!(matched = matched.len(), "dispatching event");

        let mut staged = Vec::new();
        let mut removed = Vec::new();
        let mut faults = Vec::new();
        let mut close = None;

        for id in matched {
            let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
                // Unregistered by an earlier handler for this event.
                continue;
            };
            let mut ctx = Context {
                id,
                state: &mut *state,
                outbox: &mut *outbox,
                staged: &mut staged,
                removed: &mut removed,
                next_id: &mut self.next_id,
                faults: &mut faults,
                close: &mut close,
            };
            let handler = &mut entry.handler;
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&mut ctx, event)));
            let failure = match outcome {
                Ok(Ok(Flow::Continue)) => None,
                Ok(Ok(Flow::Unregister)) => {
                    removed.push(id);
                    None
                }
                Ok(Err(e)) => Some(HandlerFailure::Failed(e)),
                Err(payload) => Some(HandlerFailure::Panicked(panic_message(payload.as_ref()))),
            };
            if let Some(failure) = failure {
                faults.push(HandlerError { id, failure }.into());
            }
            for fault in faults.drain(..) {
                (self.observer)(&fault);
            }
            if !removed.is_empty() {
                self.entries.retain(|e| !removed.contains(&e.id));
                staged.retain(|e| !removed.contains(&e.id));
                removed.clear();
            }
        }

        self.entries.append(&mut staged);
        close
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
