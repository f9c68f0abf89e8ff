use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;

/// Identifies one armed timer. Ids are never reused within a running core, so
/// a late `Elapsed` for an old id can always be told apart from the live one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOperation {
    /// Fire once after `millis`.
    Start { id: TimerId, millis: u64 },
    /// Drop a pending timer. Cancelling an unknown or already fired id is a no-op
    /// for the shell.
    Cancel { id: TimerId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOutput {
    Elapsed { id: TimerId },
    Cancelled { id: TimerId },
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

#[derive(Capability)]
pub struct Timer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Timer<Ev> {
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }
}

impl<Ev> Timer<Ev>
where
    Ev: Send + 'static,
{
    /// Arms a one-shot timer. `make_event` runs only when the shell reports the
    /// timer as elapsed; a cancelled timer produces no event.
    pub fn start<F>(&self, id: TimerId, after: Duration, make_event: F)
    where
        F: FnOnce(TimerId) -> Ev + Send + 'static,
    {
        let millis = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
        let ctx = self.context.clone();
        self.context.spawn(async move {
            match ctx.request_from_shell(TimerOperation::Start { id, millis }).await {
                TimerOutput::Elapsed { id } => ctx.update_app(make_event(id)),
                TimerOutput::Cancelled { id } => {
                    tracing::debug!(timer = %id, "timer cancelled by shell");
                }
            }
        });
    }

    pub fn cancel(&self, id: TimerId) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(TimerOperation::Cancel { id }).await;
        });
    }
}
