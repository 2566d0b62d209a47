use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::message::Message;

/// User predicate: `(attribute name, candidate value, raw message) -> matched`.
pub type Predicate = Arc<dyn Fn(&str, &str, &Message) -> bool + Send + Sync>;

/// Matching rule over one string attribute.
#[derive(Clone)]
pub enum Filter {
    /// Always (or never) matches.
    Const(bool),
    /// Exact string equality.
    Exact(String),
    /// Matches if the value equals any entry.
    OneOf(Vec<String>),
    /// Regular expression search.
    Pattern(Regex),
    /// Arbitrary user predicate.
    Predicate(Predicate),
}

impl Filter {
    /// Builds a predicate filter.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &str, &Message) -> bool + Send + Sync + 'static,
    {
        Filter::Predicate(Arc::new(f))
    }

    /// Tests `value` (the attribute called `name`) of `msg`.
    pub fn matches(&self, name: &str, value: &str, msg: &Message) -> bool {
        match self {
            Filter::Const(b) => *b,
            Filter::Exact(s) => s == value,
            Filter::OneOf(list) => list.iter().any(|s| s == value),
            Filter::Pattern(re) => re.is_match(value),
            Filter::Predicate(f) => f(name, value, msg),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Const(b) => f.debug_tuple("Const").field(b).finish(),
            Filter::Exact(s) => f.debug_tuple("Exact").field(s).finish(),
            Filter::OneOf(l) => f.debug_tuple("OneOf").field(l).finish(),
            Filter::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Filter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<bool> for Filter {
    fn from(b: bool) -> Self {
        Filter::Const(b)
    }
}

impl From<&str> for Filter {
    fn from(s: &str) -> Self {
        Filter::Exact(s.to_string())
    }
}

impl From<String> for Filter {
    fn from(s: String) -> Self {
        Filter::Exact(s)
    }
}

impl From<Regex> for Filter {
    fn from(re: Regex) -> Self {
        Filter::Pattern(re)
    }
}

impl From<Vec<String>> for Filter {
    fn from(list: Vec<String>) -> Self {
        Filter::OneOf(list)
    }
}

impl From<&[&str]> for Filter {
    fn from(list: &[&str]) -> Self {
        Filter::OneOf(list.iter().map(|s| s.to_string()).collect())
    }
}
