use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key/value attributes of a message body.
pub type Body = BTreeMap<String, String>;

/// Message kind (the xPL "header name").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// `xpl-cmnd`
    Command,
    /// `xpl-stat`
    Status,
    /// `xpl-trig`
    Trigger,
    /// Any other kind, kept verbatim.
    Other(String),
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Command => "xpl-cmnd",
            MessageKind::Status => "xpl-stat",
            MessageKind::Trigger => "xpl-trig",
            MessageKind::Other(s) => s,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(s: &str) -> Self {
        match s {
            "xpl-cmnd" => MessageKind::Command,
            "xpl-stat" => MessageKind::Status,
            "xpl-trig" => MessageKind::Trigger,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        MessageKind::from(s.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bus header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Originating source identifier (`vendor-device.instance`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Target identifier, `*` for broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Hop count.
    #[serde(default)]
    pub hop: u32,
}

/// One parsed bus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message kind.
    pub kind: MessageKind,
    /// Bus header.
    #[serde(default)]
    pub header: Header,
    /// Schema of the body (`sensor.basic`, `control.basic`, ...).
    #[serde(rename = "bodyName", alias = "body_name", default)]
    pub body_name: String,
    /// Body attributes.
    #[serde(default)]
    pub body: Body,
}

impl Message {
    /// Creates an empty message of the given kind.
    pub fn new(kind: impl Into<MessageKind>, body_name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            header: Header::default(),
            body_name: body_name.into(),
            body: Body::new(),
        }
    }

    /// Sets the header source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.header.source = Some(source.into());
        self
    }

    /// Sets one body attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Header source, empty when absent.
    pub fn source(&self) -> &str {
        self.header.source.as_deref().unwrap_or("")
    }

    /// Body key holding the routed device: `device`, else `address`.
    pub(crate) fn device_key(&self) -> Option<&'static str> {
        non_empty_key(&self.body, "device", "address")
    }

    /// Body key holding the routed type: `type`, else `unit`.
    pub(crate) fn type_key(&self) -> Option<&'static str> {
        non_empty_key(&self.body, "type", "unit")
    }

    /// Routed device (`device`, falling back to `address`), empty when absent.
    pub fn routed_device(&self) -> &str {
        self.device_key()
            .and_then(|k| self.body.get(k))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Routed type (`type`, falling back to `unit`), if any.
    pub fn routed_type(&self) -> Option<&str> {
        self.type_key()
            .and_then(|k| self.body.get(k))
            .map(String::as_str)
    }

    /// `device` or `device/type`.
    pub fn routed_path(&self) -> String {
        match self.routed_type() {
            Some(t) => format!("{}/{}", self.routed_device(), t),
            None => self.routed_device().to_string(),
        }
    }

    /// Full addressable-unit path: `source/device[/type]`.
    pub fn unit_path(&self) -> String {
        format!("{}/{}", self.source(), self.routed_path())
    }
}

fn non_empty_key(body: &Body, first: &'static str, second: &'static str) -> Option<&'static str> {
    [first, second]
        .into_iter()
        .find(|k| body.get(*k).is_some_and(|v| !v.is_empty()))
}
