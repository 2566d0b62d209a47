use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use crate::filter::Selector;
use crate::message::{Message, MessageKind};
use crate::script::Script;

use super::HostCore;

/// Process-wide resource id counter.
static RESOURCE_IDS: AtomicU64 = AtomicU64::new(1);

/// Subscription callback.
pub type MessageHandler = Arc<dyn Fn(&Script, &Message) -> anyhow::Result<()> + Send + Sync>;

/// Kind of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Message subscription.
    Subscription,
    /// One-shot delayed call.
    Timeout,
    /// Periodic call.
    Interval,
    /// One-shot call on the next tick.
    Deferred,
    /// Cron job.
    ScheduledJob,
}

/// Dispatch pass a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    /// First pass.
    #[default]
    Main,
    /// Second pass, after every host saw the message.
    Post,
}

pub(crate) struct Subscription {
    pub(crate) stage: Stage,
    pub(crate) kind: Option<MessageKind>,
    pub(crate) selector: Selector,
    pub(crate) handler: MessageHandler,
}

impl Subscription {
    /// Matching steps after the owner check: kind, then selector.
    pub(crate) fn accepts(&self, stage: Stage, msg: &Message) -> bool {
        self.stage == stage
            && self.kind.as_ref().map_or(true, |k| *k == msg.kind)
            && self.selector.matches(msg)
    }
}

pub(crate) enum Payload {
    Subscription(Subscription),
    Timer(CancellationToken),
}

/// One live registration.
pub(crate) struct Resource {
    pub(crate) id: u64,
    pub(crate) kind: ResourceKind,
    pub(crate) owner: Script,
    pub(crate) payload: Payload,
    released: AtomicBool,
}

impl Resource {
    pub(crate) fn new(kind: ResourceKind, owner: &Script, payload: Payload) -> Self {
        Self {
            id: RESOURCE_IDS.fetch_add(1, Ordering::Relaxed),
            kind,
            owner: owner.clone(),
            payload,
            released: AtomicBool::new(false),
        }
    }

    /// Marks the resource released and runs the type-specific cleanup.
    /// Later calls do nothing.
    pub(crate) fn cleanup(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Payload::Timer(token) = &self.payload {
            token.cancel();
        }
    }

    /// True once the resource left the registry.
    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id,
            kind: self.kind,
            owner: self.owner.name().to_string(),
        }
    }
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Resource id.
    pub id: u64,
    /// Kind.
    pub kind: ResourceKind,
    /// Owning script name.
    pub owner: String,
}

/// Releases one resource. Clones release the same resource; releasing twice
/// is the same as releasing once.
#[derive(Clone)]
pub struct ReleaseHandle {
    id: u64,
    host: Weak<HostCore>,
}

impl ReleaseHandle {
    pub(crate) fn new(id: u64, host: &Arc<HostCore>) -> Self {
        Self {
            id,
            host: Arc::downgrade(host),
        }
    }

    /// Resource id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the resource and runs its cleanup. Returns false if it was
    /// already gone.
    pub fn release(&self) -> bool {
        self.host.upgrade().is_some_and(|core| core.release(self.id))
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle").field("id", &self.id).finish()
    }
}
