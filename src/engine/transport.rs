//! # Bus transport seam (outbound side).
//!
//! The engine relays every script publish request to [`Transport::send`].
//! Inbound messages reach the engine through [`Engine::dispatch`] or the
//! message channel given to [`Engine::run`].
//!
//! [`ChannelTransport`] hands outbound messages to an mpsc receiver, which
//! makes it usable both as a test double and as the outbound half of an
//! I/O adapter living elsewhere.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::message::{Body, Header, Message, MessageKind};

/// Outbound side of the bus.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one message; `target` is `None` for broadcast.
    async fn send(
        &self,
        kind: &MessageKind,
        body_name: &str,
        body: &Body,
        target: Option<&str>,
    ) -> Result<(), TransportError>;
}

/// Transport writing every outbound message to a channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelTransport {
    /// Creates the transport and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(
        &self,
        kind: &MessageKind,
        body_name: &str,
        body: &Body,
        target: Option<&str>,
    ) -> Result<(), TransportError> {
        let msg = Message {
            kind: kind.clone(),
            header: Header {
                source: None,
                target: Some(target.unwrap_or("*").to_string()),
                hop: 1,
            },
            body_name: body_name.to_string(),
            body: body.clone(),
        };
        self.tx.send(msg).map_err(|_| TransportError::Send {
            message: "receiver dropped".to_string(),
        })
    }
}
