//! Timer-backed resources. Each one is a tokio task watching a
//! [`CancellationToken`]; releasing the resource cancels the token.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::HostError;
use crate::script::{FaultMode, Script};

use super::resource::{Payload, ReleaseHandle, ResourceKind};
use super::HostCore;

/// Shortest interval period; zero would spin.
const MIN_PERIOD: Duration = Duration::from_millis(1);

impl HostCore {
    fn register_timer(self: &Arc<Self>, kind: ResourceKind, owner: &Script) -> (ReleaseHandle, CancellationToken) {
        let token = CancellationToken::new();
        let handle = self.register(kind, owner, Payload::Timer(token.clone()));
        (handle, token)
    }

    pub(crate) fn set_timeout<F>(self: &Arc<Self>, owner: &Script, delay: Duration, f: F) -> ReleaseHandle
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        let (handle, token) = self.register_timer(ResourceKind::Timeout, owner);
        let owner = owner.clone();
        let done = handle.clone();
        self.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = time::sleep(delay) => {}
            }
            let _ = owner.invoke("timeout", FaultMode::Contain, None, f);
            done.release();
        });
        handle
    }

    pub(crate) fn set_interval<F>(self: &Arc<Self>, owner: &Script, period: Duration, mut f: F) -> ReleaseHandle
    where
        F: FnMut(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        let (handle, token) = self.register_timer(ResourceKind::Interval, owner);
        let owner = owner.clone();
        let period = period.max(MIN_PERIOD);
        self.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = owner.invoke("interval", FaultMode::Contain, None, |s| f(s));
                    }
                }
            }
        });
        handle
    }

    pub(crate) fn defer<F>(self: &Arc<Self>, owner: &Script, f: F) -> ReleaseHandle
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        let (handle, token) = self.register_timer(ResourceKind::Deferred, owner);
        let owner = owner.clone();
        let done = handle.clone();
        self.spawn(async move {
            tokio::task::yield_now().await;
            if token.is_cancelled() {
                return;
            }
            let _ = owner.invoke("deferred", FaultMode::Contain, None, f);
            done.release();
        });
        handle
    }

    pub(crate) fn schedule<F>(self: &Arc<Self>, owner: &Script, expr: &str, mut f: F) -> Result<ReleaseHandle, HostError>
    where
        F: FnMut(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        let schedule = cron::Schedule::from_str(expr).map_err(|e| HostError::InvalidSchedule {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        let (handle, token) = self.register_timer(ResourceKind::ScheduledJob, owner);
        let owner = owner.clone();
        let done = handle.clone();
        self.spawn(async move {
            let mut last = Utc::now();
            loop {
                // occurrences missed while a tick ran late are skipped
                let from = last.max(Utc::now());
                let upcoming = schedule.after(&from).next();
                let Some(next) = upcoming else { break };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = time::sleep(wait) => {}
                }
                let _ = owner.invoke("schedule", FaultMode::Contain, None, |s| f(s));
                last = next;
            }
            // no upcoming occurrence left
            done.release();
        });
        Ok(handle)
    }
}
