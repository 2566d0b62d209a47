//! What user code can ask of its script: subscriptions, publishing, timers,
//! logging and history queries. Everything here is routed to the owning host.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};

use crate::error::HostError;
use crate::filter::Selector;
use crate::host::{HostCore, Outbound, ReleaseHandle, Stage};
use crate::logs::LogLevel;
use crate::message::{Body, Message, MessageKind};
use crate::query::{Aggregate, QueryValue};

use super::{FaultMode, Phase, Script};

/// Default pattern of [`Script::format_date`].
pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

impl Script {
    /// Owning host, or why there is none.
    fn backend(&self) -> Result<Arc<HostCore>, HostError> {
        if self.phase() == Phase::Destroyed {
            return Err(HostError::ScriptDestroyed {
                script: self.name().to_string(),
            });
        }
        self.host_core().ok_or(HostError::HostGone)
    }

    // ---- subscriptions ----

    /// Registers a handler for messages matching `kind` (any kind when `None`)
    /// and `selector`, delivered during `stage`.
    pub fn subscribe<F>(
        &self,
        stage: Stage,
        kind: Option<MessageKind>,
        selector: impl Into<Selector>,
        handler: F,
    ) -> Result<ReleaseHandle, HostError>
    where
        F: Fn(&Script, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let core = self.backend()?;
        Ok(core.subscribe(self, stage, kind, selector.into(), Arc::new(handler)))
    }

    /// Any message kind.
    pub fn on_message<F>(&self, selector: impl Into<Selector>, handler: F) -> Result<ReleaseHandle, HostError>
    where
        F: Fn(&Script, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Stage::Main, None, selector, handler)
    }

    /// `xpl-cmnd` messages.
    pub fn on_command<F>(&self, selector: impl Into<Selector>, handler: F) -> Result<ReleaseHandle, HostError>
    where
        F: Fn(&Script, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Stage::Main, Some(MessageKind::Command), selector, handler)
    }

    /// `xpl-stat` messages.
    pub fn on_status<F>(&self, selector: impl Into<Selector>, handler: F) -> Result<ReleaseHandle, HostError>
    where
        F: Fn(&Script, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Stage::Main, Some(MessageKind::Status), selector, handler)
    }

    /// `xpl-trig` messages.
    pub fn on_trigger<F>(&self, selector: impl Into<Selector>, handler: F) -> Result<ReleaseHandle, HostError>
    where
        F: Fn(&Script, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Stage::Main, Some(MessageKind::Trigger), selector, handler)
    }

    /// Any message kind, delivered in the post pass after every host has seen
    /// the message.
    pub fn after_message<F>(&self, selector: impl Into<Selector>, handler: F) -> Result<ReleaseHandle, HostError>
    where
        F: Fn(&Script, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Stage::Post, None, selector, handler)
    }

    // ---- publishing ----

    /// Queues an outbound message for the transport.
    pub fn send(&self, out: Outbound) -> Result<(), HostError> {
        self.backend()?.send(self, out)
    }

    /// Sends an `xpl-cmnd` to every target.
    pub fn send_command(&self, body_name: impl Into<String>, body: Body) -> Result<(), HostError> {
        self.send(Outbound::command(body_name).with_body(body))
    }

    /// Sends an `xpl-stat` to every target.
    pub fn send_status(&self, body_name: impl Into<String>, body: Body) -> Result<(), HostError> {
        self.send(Outbound::status(body_name).with_body(body))
    }

    /// Sends an `xpl-trig` to every target.
    pub fn send_trigger(&self, body_name: impl Into<String>, body: Body) -> Result<(), HostError> {
        self.send(Outbound::trigger(body_name).with_body(body))
    }

    // ---- timers ----

    /// Calls `f` once after `delay`.
    pub fn set_timeout<F>(&self, delay: Duration, f: F) -> Result<ReleaseHandle, HostError>
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        Ok(self.backend()?.set_timeout(self, delay, f))
    }

    /// Calls `f` every `period`, first after one period.
    pub fn set_interval<F>(&self, period: Duration, f: F) -> Result<ReleaseHandle, HostError>
    where
        F: FnMut(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        Ok(self.backend()?.set_interval(self, period, f))
    }

    /// Calls `f` once on the next scheduler tick.
    pub fn defer<F>(&self, f: F) -> Result<ReleaseHandle, HostError>
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        Ok(self.backend()?.defer(self, f))
    }

    /// Calls `f` at each time matched by a cron expression
    /// (`sec min hour day-of-month month day-of-week [year]`, UTC).
    pub fn schedule<F>(&self, expr: &str, f: F) -> Result<ReleaseHandle, HostError>
    where
        F: FnMut(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        self.backend()?.schedule(self, expr, f)
    }

    // ---- logging ----

    /// Writes a `LOG` line to the module's script log.
    pub fn log(&self, message: impl Display) {
        self.write_log(LogLevel::Log, message.to_string(), None);
    }

    /// Writes an `ERROR` line to the module's script log.
    pub fn log_error(&self, message: impl Display) {
        self.write_log(LogLevel::Error, message.to_string(), None);
    }

    /// Formats a timestamp; `fmt` defaults to [`DEFAULT_DATE_FORMAT`].
    pub fn format_date<Tz>(&self, date: &DateTime<Tz>, fmt: Option<&str>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        date.format(fmt.unwrap_or(DEFAULT_DATE_FORMAT)).to_string()
    }

    // ---- queries ----

    /// Fetches the last value recorded at `path`, then calls `f` with it.
    ///
    /// Query failures are written to this script's error log; `f` is not called.
    pub fn query_last<F>(&self, path: &str, f: F) -> Result<(), HostError>
    where
        F: FnOnce(&Script, Option<QueryValue>) -> anyhow::Result<()> + Send + 'static,
    {
        let core = self.backend()?;
        let Some(client) = core.query() else {
            self.log_error(format!("no query client configured (last value of '{path}')"));
            return Ok(());
        };
        let script = self.clone();
        let path = path.to_string();
        core.spawn(async move {
            match client.last_value(&path).await {
                Ok(value) => {
                    let _ = script.invoke("query", FaultMode::Contain, None, |s| f(s, value));
                }
                Err(e) => script.log_error(format!("query '{path}' failed: {e:#}")),
            }
        });
        Ok(())
    }

    /// Fetches an aggregate over the last `window` at `path`, then calls `f`
    /// with it. Failures are handled as in [`query_last`](Script::query_last).
    pub fn query_aggregate<F>(
        &self,
        path: &str,
        func: Aggregate,
        window: Duration,
        f: F,
    ) -> Result<(), HostError>
    where
        F: FnOnce(&Script, Option<f64>) -> anyhow::Result<()> + Send + 'static,
    {
        let core = self.backend()?;
        let Some(client) = core.query() else {
            self.log_error(format!("no query client configured (aggregate of '{path}')"));
            return Ok(());
        };
        let script = self.clone();
        let path = path.to_string();
        core.spawn(async move {
            match client.aggregate(&path, func, window).await {
                Ok(value) => {
                    let _ = script.invoke("query", FaultMode::Contain, None, |s| f(s, value));
                }
                Err(e) => script.log_error(format!("query '{path}' failed: {e:#}")),
            }
        });
        Ok(())
    }
}
