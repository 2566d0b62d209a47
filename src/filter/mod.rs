//! # Subscription filters.
//!
//! A [`Filter`] tests one string attribute of a message; a [`Selector`]
//! decides whether a whole message is of interest to a subscription.
//!
//! ```text
//! Selector::Unit("*")                 every message
//! Selector::Unit("*/kitchen/light")   device/type == kitchen/light, any source
//! Selector::Unit("acme-rf.home/a1")   exact source/device/type path
//! Selector::Unit(Regex / OneOf / fn)  applied to the full source/device/type path
//! Selector::Criteria { .. }           AND of optional per-field filters
//! ```

mod filter;
mod selector;

pub use filter::{Filter, Predicate};
pub use selector::{Criteria, Selector};
