//! Built-in handlers.
//!
//! Installed ahead of user handlers so that tracked state already reflects
//! a message when user code sees it.

use tracing::{debug, error, warn};

use crate::error::{EngineError, NickError};
use crate::message::Message;
use crate::response::Response;
use crate::state::RegistrationAction;

use super::{Context, DisconnectReason, Dispatcher, Event, Filter, Flow};

/// Post-registration behavior of the built-ins.
#[derive(Clone, Debug, Default)]
pub(crate) struct BuiltinConfig {
    /// Channels joined once 001 arrives.
    pub channels: Vec<String>,
    /// Sent to NickServ as IDENTIFY once 001 arrives.
    pub nickserv_password: Option<String>,
}

/// Register the built-ins, in the order they must run.
pub(crate) fn install(dispatcher: &mut Dispatcher, config: BuiltinConfig) {
    dispatcher.register(Filter::new().command("PING"), pong);
    dispatcher.register(
        Filter::new().response(Response::RPL_ISUPPORT),
        isupport,
    );
    dispatcher.register(
        Filter::new()
            .command("CAP")
            .command("ERROR")
            .response(Response::RPL_WELCOME),
        move |ctx: &mut Context<'_>, event: &Event| registration(ctx, event, &config),
    );
    dispatcher.register(
        Filter::new()
            .command("NICK")
            .numerics(431..=433)
            .numerics(436..=437),
        nick,
    );
    dispatcher.register(Filter::new(), membership);
}

fn pong(ctx: &mut Context<'_>, event: &Event) -> anyhow::Result<Flow> {
    if let Some(msg) = event.message() {
        ctx.send(Message::pong(msg.params.iter().cloned()));
    }
    Ok(Flow::Continue)
}

fn isupport(ctx: &mut Context<'_>, event: &Event) -> anyhow::Result<Flow> {
    if let Some(msg) = event.message() {
        let state = ctx.state_mut();
        if state.caps.ingest(msg) {
            state.sync_casemapping();
        }
    }
    Ok(Flow::Continue)
}

fn registration(
    ctx: &mut Context<'_>,
    event: &Event,
    config: &BuiltinConfig,
) -> anyhow::Result<Flow> {
    let Some(msg) = event.message() else {
        return Ok(Flow::Continue);
    };
    let actions = ctx.state_mut().registration.feed(msg);
    for action in actions {
        match action {
            RegistrationAction::Send(out) => ctx.send(*out),
            RegistrationAction::Complete => {
                ctx.state_mut().nick.on_welcome(msg.param(0));
                if let Some(ref password) = config.nickserv_password {
                    ctx.send(Message::privmsg("NickServ", format!("IDENTIFY {}", password)));
                }
                for channel in &config.channels {
                    let state = ctx.state_mut();
                    let name = state.caps.normalize_channel(channel);
                    state.membership.mark_pending(&name);
                    ctx.send(Message::join(name, None));
                }
            }
            RegistrationAction::ServerError(reason) => {
                warn!(reason = %reason, "server sent ERROR");
                ctx.close(DisconnectReason::ServerError(reason));
            }
        }
    }
    Ok(Flow::Continue)
}

fn nick(ctx: &mut Context<'_>, event: &Event) -> anyhow::Result<Flow> {
    let Some(msg) = event.message() else {
        return Ok(Flow::Continue);
    };
    if msg.command == "NICK" {
        if let (Some(old), Some(new)) = (msg.source_nick(), msg.param(0)) {
            ctx.state_mut().nick.on_nick(old, new);
        }
        return Ok(Flow::Continue);
    }

    // `433 <current|*> <rejected> :reason`; 431 names no nick.
    let rejected = if msg.is_response(Response::ERR_NONICKNAMEGIVEN) {
        None
    } else {
        msg.param(1)
    };
    let state = ctx.state_mut();
    let nicklen = state.caps.nicklen();
    let registered = state.registration.is_registered();
    match state.nick.on_rejected(rejected, nicklen) {
        Ok(Some(retry)) => ctx.send(retry),
        Ok(None) => {}
        Err(err) => exhausted(ctx, err, registered),
    }
    Ok(Flow::Continue)
}

fn exhausted(ctx: &mut Context<'_>, err: NickError, registered: bool) {
    if registered {
        // Still holding the previous nick.
        debug!(error = %err, "nick change abandoned");
        ctx.report(EngineError::NickExhausted(err));
    } else {
        error!(error = %err, "nick negotiation exhausted");
        ctx.report(EngineError::NickExhausted(err));
        ctx.send(Message::quit(Some("no usable nick")));
        ctx.close(DisconnectReason::NickExhausted);
    }
}

fn membership(ctx: &mut Context<'_>, event: &Event) -> anyhow::Result<Flow> {
    let Some(msg) = event.message() else {
        return Ok(Flow::Continue);
    };
    let state = ctx.state_mut();
    let result = state.membership.handle(msg, &state.nick, &state.caps);
    if let Err(cause) = result {
        let target = if msg.command == "MODE" {
            msg.param(0)
        } else {
            msg.param(1)
        };
        warn!(target = ?target, error = %cause, "rejected mode change");
        ctx.report(EngineError::UnknownModeLetter {
            target: target.unwrap_or_default().to_owned(),
            cause,
        });
    }
    Ok(Flow::Continue)
}
