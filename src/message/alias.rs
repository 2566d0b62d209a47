//! Device alias table applied by the engine before fan-out.
//!
//! Two passes, each rewriting the body at most once:
//! 1. `device` (or `address`) looked up as-is;
//! 2. `device/type` looked up; on a hit the device takes the alias and the
//!    type (or unit) field is blanked.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::Message;

/// Mapping from a device token (or `device/type` token) to its replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAliases {
    map: HashMap<String, String>,
}

impl DeviceAliases {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one alias.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.map.insert(from.into(), to.into());
    }

    /// True when no alias is defined.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up one token.
    pub fn get(&self, token: &str) -> Option<&str> {
        self.map.get(token).map(String::as_str)
    }

    /// Parses `from=to,from2=to2`. Blank entries are skipped.
    pub fn from_inline(spec: &str) -> Result<Self, ConfigError> {
        let mut aliases = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (from, to) = entry
                .split_once('=')
                .map(|(f, t)| (f.trim(), t.trim()))
                .filter(|(f, t)| !f.is_empty() && !t.is_empty())
                .ok_or_else(|| ConfigError::AliasSyntax {
                    entry: entry.to_string(),
                })?;
            aliases.insert(from, to);
        }
        Ok(aliases)
    }

    /// Reads a JSON object `{ "from": "to", ... }`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::AliasFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::AliasJson {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Accepts either a path to a JSON file or an inline table.
    pub fn load(spec: &str) -> Result<Self, ConfigError> {
        let path = Path::new(spec);
        if path.is_file() {
            Self::from_json_file(path)
        } else {
            Self::from_inline(spec)
        }
    }

    /// Rewrites `msg` in place. Returns true if the body changed.
    ///
    /// Messages without a device/address field are left untouched.
    pub fn apply(&self, msg: &mut Message) -> bool {
        if self.is_empty() {
            return false;
        }
        let Some(device_key) = msg.device_key() else {
            return false;
        };

        let mut rewritten = false;
        let mut token = msg.routed_device().to_string();
        if let Some(alias) = self.get(&token) {
            token = alias.to_string();
            msg.body.insert(device_key.to_string(), token.clone());
            rewritten = true;
        }

        if let Some(type_key) = msg.type_key() {
            let composed = format!("{}/{}", token, msg.routed_type().unwrap_or(""));
            if let Some(alias) = self.get(&composed) {
                msg.body.insert(device_key.to_string(), alias.to_string());
                msg.body.insert(type_key.to_string(), String::new());
                rewritten = true;
            }
        }
        rewritten
    }
}

impl FromIterator<(String, String)> for DeviceAliases {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::message::MessageKind;

    fn trig(device: &str, kind: &str) -> Message {
        Message::new(MessageKind::Trigger, "sensor.basic")
            .with_source("acme-rf.home")
            .with_attr("device", device)
            .with_attr("type", kind)
    }

    #[test]
    fn device_alias_renames_device() {
        let aliases = DeviceAliases::from_inline("0x1a2b=kitchen").unwrap();
        let mut msg = trig("0x1a2b", "temp");
        assert!(aliases.apply(&mut msg));
        assert_eq!(msg.routed_path(), "kitchen/temp");
    }

    #[test]
    fn composed_alias_blanks_type() {
        let aliases = DeviceAliases::from_inline("0x1a2b=kitchen, kitchen/light=kitchen-light").unwrap();
        let mut msg = trig("0x1a2b", "light");
        assert!(aliases.apply(&mut msg));
        assert_eq!(msg.body.get("device").map(String::as_str), Some("kitchen-light"));
        assert_eq!(msg.body.get("type").map(String::as_str), Some(""));
        assert_eq!(msg.routed_path(), "kitchen-light");
    }

    #[test]
    fn address_field_is_rewritten_when_no_device() {
        let aliases = DeviceAliases::from_inline("A1=porch").unwrap();
        let mut msg = Message::new(MessageKind::Trigger, "x10.basic").with_attr("address", "A1");
        assert!(aliases.apply(&mut msg));
        assert_eq!(msg.body.get("address").map(String::as_str), Some("porch"));
        assert!(!msg.body.contains_key("device"));
    }

    #[test]
    fn unmatched_message_is_untouched() {
        let aliases = DeviceAliases::from_inline("a=b").unwrap();
        let mut msg = trig("zzz", "t");
        let before = msg.clone();
        assert!(!aliases.apply(&mut msg));
        assert_eq!(msg, before);
    }

    #[test]
    fn inline_rejects_malformed_entries() {
        let err = DeviceAliases::from_inline("ok=fine,broken").unwrap_err();
        assert_eq!(err.as_label(), "config_alias_syntax");
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"0x01":"garage"}}"#).unwrap();
        let aliases = DeviceAliases::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(aliases.get("0x01"), Some("garage"));
    }
}
