//! One relay cycle: inbound payload in, ordered events out.
//!
//! For a valid payload the events are always `typing: true`, `typing: false`,
//! `response`, in that order. A rejected payload produces exactly one
//! `error` event and no gateway call.

use lib_common::utils::text::preview;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::bridge_logic::model::{ClientMessage, NO_TEXT_PROVIDED, PROCESSING_FAILED, ServerEvent};
use crate::bridge_logic::upstream::GatewayClient;

/// How a relay cycle ended. Returned for logging and tests; the client has
/// already been told by the time this is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Replied(String),
    Rejected(&'static str),
}

/// Runs one relay cycle for `raw` and pushes its events into `events`.
///
/// A closed `events` channel means the client went away; the cycle still
/// completes (the gateway call is not cancelled) but nothing is delivered.
pub async fn relay_message(
    client_id: usize,
    raw: &str,
    gateway: &GatewayClient,
    events: &UnboundedSender<ServerEvent>,
) -> RelayOutcome {
    let text = match ClientMessage::parse(raw) {
        Ok(msg) => msg.into_text(),
        Err(e) => {
            warn!(client_id, error = %e, "Error processing message");
            let _ = events.send(ServerEvent::error(PROCESSING_FAILED));
            return RelayOutcome::Rejected(PROCESSING_FAILED);
        }
    };

    let Some(text) = text else {
        info!(client_id, "Message without text");
        let _ = events.send(ServerEvent::error(NO_TEXT_PROVIDED));
        return RelayOutcome::Rejected(NO_TEXT_PROVIDED);
    };

    info!(client_id, text_preview = preview(&text, 50), "Received from client");

    let _ = events.send(ServerEvent::typing(true));
    let reply = gateway.send(&text).await;
    let _ = events.send(ServerEvent::typing(false));
    let _ = events.send(ServerEvent::response(reply.clone()));

    RelayOutcome::Replied(reply)
}
