use std::fmt;

use crate::error::TransportError;
use crate::message::{Body, MessageKind};
use crate::script::Script;

/// Completion callback of an outbound message, run through the invocation
/// wrapper of the sending script.
pub type SendCallback = Box<dyn FnOnce(&Script, Result<(), TransportError>) -> anyhow::Result<()> + Send>;

/// Outbound message built by a script.
pub struct Outbound {
    /// Message kind.
    pub kind: MessageKind,
    /// Body schema.
    pub body_name: String,
    /// Body attributes.
    pub body: Body,
    /// Target; `None` broadcasts.
    pub target: Option<String>,
    pub(crate) on_done: Option<SendCallback>,
}

impl Outbound {
    /// Empty message of the given kind.
    pub fn new(kind: MessageKind, body_name: impl Into<String>) -> Self {
        Self {
            kind,
            body_name: body_name.into(),
            body: Body::new(),
            target: None,
            on_done: None,
        }
    }

    /// `xpl-cmnd`.
    pub fn command(body_name: impl Into<String>) -> Self {
        Self::new(MessageKind::Command, body_name)
    }

    /// `xpl-stat`.
    pub fn status(body_name: impl Into<String>) -> Self {
        Self::new(MessageKind::Status, body_name)
    }

    /// `xpl-trig`.
    pub fn trigger(body_name: impl Into<String>) -> Self {
        Self::new(MessageKind::Trigger, body_name)
    }

    /// Sets one body attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Addresses a single target.
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Called with the transport result once the message was handed over.
    pub fn on_done<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Script, Result<(), TransportError>) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_done = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("kind", &self.kind)
            .field("body_name", &self.body_name)
            .field("body", &self.body)
            .field("target", &self.target)
            .field("on_done", &self.on_done.is_some())
            .finish()
    }
}

/// Host → engine publish request.
pub(crate) struct SendRequest {
    pub(crate) script: Script,
    pub(crate) out: Outbound,
}
