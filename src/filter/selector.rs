use regex::Regex;

use crate::message::Message;

use super::Filter;

/// Wildcard segment that ignores the header source.
const ANY_SOURCE: &str = "*/";

/// What a subscription listens to.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Filter over the addressable-unit path.
    Unit(Filter),
    /// Independent sub-filters, all of which must pass.
    Criteria(Criteria),
}

/// Object form of a selector. `None` fields are not tested.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    /// Addressable-unit path, with the same wildcard rules as [`Selector::Unit`].
    pub unit: Option<Filter>,
    /// Body schema name.
    pub body_name: Option<Filter>,
    /// Routed device (device, else address).
    pub device: Option<Filter>,
    /// Header source identifier.
    pub source: Option<Filter>,
}

impl Criteria {
    /// Sets the unit sub-filter.
    pub fn unit(mut self, f: impl Into<Filter>) -> Self {
        self.unit = Some(f.into());
        self
    }

    /// Sets the body-name sub-filter.
    pub fn body_name(mut self, f: impl Into<Filter>) -> Self {
        self.body_name = Some(f.into());
        self
    }

    /// Sets the device sub-filter.
    pub fn device(mut self, f: impl Into<Filter>) -> Self {
        self.device = Some(f.into());
        self
    }

    /// Sets the source sub-filter.
    pub fn source(mut self, f: impl Into<Filter>) -> Self {
        self.source = Some(f.into());
        self
    }
}

impl Selector {
    /// Selector matching every message.
    pub fn any() -> Self {
        Selector::Unit(Filter::Exact("*".to_string()))
    }

    /// Tests a message.
    pub fn matches(&self, msg: &Message) -> bool {
        match self {
            Selector::Unit(f) => unit_matches(f, msg),
            Selector::Criteria(c) => {
                c.unit.as_ref().map_or(true, |f| unit_matches(f, msg))
                    && c.body_name
                        .as_ref()
                        .map_or(true, |f| f.matches("bodyName", &msg.body_name, msg))
                    && c.device
                        .as_ref()
                        .map_or(true, |f| f.matches("device", msg.routed_device(), msg))
                    && c.source
                        .as_ref()
                        .map_or(true, |f| f.matches("source", msg.source(), msg))
            }
        }
    }
}

fn unit_matches(filter: &Filter, msg: &Message) -> bool {
    if let Filter::Exact(s) = filter {
        if s == "*" {
            return true;
        }
        if let Some(rest) = s.strip_prefix(ANY_SOURCE) {
            return rest == msg.routed_path();
        }
    }
    filter.matches("unit", &msg.unit_path(), msg)
}

impl Default for Selector {
    fn default() -> Self {
        Selector::any()
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Selector::Unit(Filter::from(s))
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::Unit(Filter::Exact(s))
    }
}

impl From<Regex> for Selector {
    fn from(re: Regex) -> Self {
        Selector::Unit(Filter::Pattern(re))
    }
}

impl From<Filter> for Selector {
    fn from(f: Filter) -> Self {
        Selector::Unit(f)
    }
}

impl From<Criteria> for Selector {
    fn from(c: Criteria) -> Self {
        Selector::Criteria(c)
    }
}
