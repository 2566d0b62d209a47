//! Bus messages as the host sees them.
//!
//! - [`Message`], [`Header`], [`MessageKind`], [`Body`]: the parsed form
//!   delivered by the transport
//! - routing helpers that compose the addressable-unit path
//!   (`source/device/type`) subscriptions are matched against
//! - [`DeviceAliases`]: the engine-level device renaming table

mod alias;
mod model;

pub use alias::DeviceAliases;
pub use model::{Body, Header, Message, MessageKind};
