//! Lifecycle of one outbound emergency call: start it, poll its status until
//! the backend reports it ended, then hand the transcript to whoever listens.
//!
//! The session never performs I/O. Every transition returns a
//! [`SessionOutput`] listing the requests and timers the host has to run and
//! the notifications it has to deliver, in order.
//!
//! ```text
//! Idle --initiate--> Initiating --call id--> InProgress --ended--> Completed
//! Initiating --error / no call id--> Failed --initiate--> Initiating
//! InProgress --non-terminal status or poll error--> InProgress
//! ```
//!
//! Polls never overlap: the poll timer is one-shot and is re-armed only once
//! the previous status response has arrived.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{CallStatusResponse, StartCallResponse};
use crate::capabilities::TimerId;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::model::CallId;
use crate::{DEFAULT_POLL_INTERVAL, NO_TRANSCRIPT_PLACEHOLDER, TERMINAL_CALL_STATUSES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    Initiating,
    InProgress,
    Completed,
    Failed,
}

impl CallState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initiating => "initiating",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn can_initiate(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Initiating | Self::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub transcript: String,
    pub recording_url: Option<String>,
}

/// Work the host must carry out for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    StartCall { attempt: u32 },
    CheckStatus { attempt: u32, call_id: CallId },
    ArmTimer { id: TimerId, after: Duration },
    CancelTimer { id: TimerId },
}

/// Delivered synchronously to the session's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNotification {
    StateChanged(CallState),
    Completed(CallResult),
    Failed(ApiError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct SessionOutput {
    pub commands: Vec<CallCommand>,
    pub notifications: Vec<CallNotification>,
}

impl SessionOutput {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.notifications.is_empty()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallSessionError {
    #[error("a call is already {}", state.as_str())]
    AlreadyActive { state: CallState },

    #[error("the call has already completed")]
    AlreadyCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

impl From<&ClientConfig> for PollPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts.filter(|max| *max > 0),
        }
    }
}

/// Present for as long as the session is polling. `pending` is the armed
/// one-shot timer, if any; `latest` is the last timer armed, fired or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PollHandle {
    pending: Option<TimerId>,
    latest: Option<TimerId>,
}

#[derive(Debug, Clone)]
pub struct CallSession {
    id: Option<CallId>,
    state: CallState,
    poll: Option<PollHandle>,
    in_flight: bool,
    result: Option<CallResult>,
    policy: PollPolicy,
    poll_attempts: u32,
    last_error: Option<ApiError>,
    attempt: u32,
    next_timer: u64,
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new(PollPolicy::default())
    }
}

#[must_use]
pub fn is_terminal_status(status: &str) -> bool {
    let status = status.trim();
    TERMINAL_CALL_STATUSES
        .iter()
        .any(|terminal| terminal.eq_ignore_ascii_case(status))
}

impl CallSession {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            id: None,
            state: CallState::Idle,
            poll: None,
            in_flight: false,
            result: None,
            policy,
            poll_attempts: 0,
            last_error: None,
            attempt: 0,
            next_timer: 1,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn call_id(&self) -> Option<&CallId> {
        self.id.as_ref()
    }

    pub fn result(&self) -> Option<&CallResult> {
        self.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.poll.and_then(|p| p.pending)
    }

    pub fn is_poll_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Takes effect from the next armed timer.
    pub fn set_policy(&mut self, policy: PollPolicy) {
        self.policy = policy;
    }

    pub fn initiate(&mut self) -> Result<SessionOutput, CallSessionError> {
        if !self.state.can_initiate() {
            return Err(match self.state {
                CallState::Completed => CallSessionError::AlreadyCompleted,
                state => CallSessionError::AlreadyActive { state },
            });
        }

        let mut out = SessionOutput::default();
        self.attempt = self.attempt.wrapping_add(1);
        self.id = None;
        self.result = None;
        self.last_error = None;
        self.poll_attempts = 0;
        self.in_flight = false;

        self.transition(CallState::Initiating, &mut out);
        out.commands.push(CallCommand::StartCall {
            attempt: self.attempt,
        });
        info!(attempt = self.attempt, "emergency call initiating");
        Ok(out)
    }

    pub fn on_call_started(
        &mut self,
        attempt: u32,
        result: Result<StartCallResponse, ApiError>,
    ) -> SessionOutput {
        let mut out = SessionOutput::default();
        if attempt != self.attempt || self.state != CallState::Initiating {
            debug!(attempt, current = self.attempt, state = self.state.as_str(), "ignoring stale call start response");
            return out;
        }

        let call_id = result.and_then(|response| {
            response
                .call_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .map(CallId::new)
                .ok_or_else(|| ApiError::missing_field("call_id"))
        });

        match call_id {
            Ok(call_id) => {
                info!(call_id = %call_id, "emergency call started");
                self.id = Some(call_id);
                self.transition(CallState::InProgress, &mut out);
                self.poll = Some(PollHandle {
                    pending: None,
                    latest: None,
                });
                self.arm(&mut out);
            }
            Err(error) => self.fail(error, &mut out),
        }
        out
    }

    pub fn on_timer_elapsed(&mut self, id: TimerId) -> SessionOutput {
        match self.poll.as_mut() {
            Some(handle) if handle.pending == Some(id) => {
                handle.pending = None;
                self.poll()
            }
            _ => {
                debug!(timer = %id, "ignoring stale poll tick");
                SessionOutput::default()
            }
        }
    }

    /// Issues one status check. Normally driven by the poll timer; does
    /// nothing unless the call is in progress and no check is outstanding.
    pub fn poll(&mut self) -> SessionOutput {
        let mut out = SessionOutput::default();
        if self.state != CallState::InProgress || self.in_flight {
            return out;
        }
        let Some(call_id) = self.id.clone() else {
            return out;
        };
        if self.limit_reached() {
            self.fail(
                ApiError::PollLimitReached {
                    attempts: self.poll_attempts,
                },
                &mut out,
            );
            return out;
        }

        if let Some(id) = self.poll.as_mut().and_then(|handle| handle.pending.take()) {
            out.commands.push(CallCommand::CancelTimer { id });
        }

        self.in_flight = true;
        self.poll_attempts += 1;
        debug!(call_id = %call_id, poll = self.poll_attempts, "checking call status");
        out.commands.push(CallCommand::CheckStatus {
            attempt: self.attempt,
            call_id,
        });
        out
    }

    pub fn on_status(
        &mut self,
        attempt: u32,
        result: Result<CallStatusResponse, ApiError>,
    ) -> SessionOutput {
        let mut out = SessionOutput::default();
        if attempt != self.attempt || self.state != CallState::InProgress || !self.in_flight {
            debug!(attempt, current = self.attempt, state = self.state.as_str(), "ignoring stale status response");
            return out;
        }
        self.in_flight = false;

        match result {
            Ok(status) if is_terminal_status(&status.status) => {
                let result = CallResult {
                    transcript: status
                        .transcript
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| NO_TRANSCRIPT_PLACEHOLDER.to_string()),
                    recording_url: status.recording_url.filter(|u| !u.trim().is_empty()),
                };
                self.release(&mut out);
                self.result = Some(result.clone());
                self.transition(CallState::Completed, &mut out);
                info!(polls = self.poll_attempts, "emergency call completed");
                out.notifications.push(CallNotification::Completed(result));
            }
            Ok(status) => {
                debug!(status = %status.status, "call still in progress");
                self.schedule_next(&mut out);
            }
            Err(error) => {
                warn!(%error, poll = self.poll_attempts, "call status check failed, will retry");
                self.last_error = Some(error);
                self.schedule_next(&mut out);
            }
        }
        out
    }

    /// Stops tracking the call: cancels the poll timer and drops any response
    /// still on its way. A call that had not finished goes back to `Idle`.
    pub fn teardown(&mut self) -> SessionOutput {
        let mut out = SessionOutput::default();
        // The shell drops the loop's latest timer even if its tick was already delivered.
        if let Some(id) = self.poll.take().and_then(|handle| handle.latest) {
            out.commands.push(CallCommand::CancelTimer { id });
        }
        self.in_flight = false;
        self.attempt = self.attempt.wrapping_add(1);
        if self.state.is_active() {
            info!(state = self.state.as_str(), "emergency call tracking torn down");
            self.transition(CallState::Idle, &mut out);
        }
        out
    }

    /// Teardown plus forgetting the previous call entirely.
    pub fn reset(&mut self) -> SessionOutput {
        let mut out = self.teardown();
        self.id = None;
        self.result = None;
        self.last_error = None;
        self.poll_attempts = 0;
        if self.state != CallState::Idle {
            self.transition(CallState::Idle, &mut out);
        }
        out
    }

    fn limit_reached(&self) -> bool {
        self.policy
            .max_attempts
            .is_some_and(|max| self.poll_attempts >= max)
    }

    fn schedule_next(&mut self, out: &mut SessionOutput) {
        if self.limit_reached() {
            self.fail(
                ApiError::PollLimitReached {
                    attempts: self.poll_attempts,
                },
                out,
            );
        } else {
            self.arm(out);
        }
    }

    fn arm(&mut self, out: &mut SessionOutput) {
        let Some(handle) = self.poll.as_mut() else {
            return;
        };
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        if let Some(previous) = handle.pending.replace(id) {
            out.commands.push(CallCommand::CancelTimer { id: previous });
        }
        handle.latest = Some(id);
        out.commands.push(CallCommand::ArmTimer {
            id,
            after: self.policy.interval,
        });
    }

    /// Idempotent: a second release finds no handle and emits nothing.
    fn release(&mut self, out: &mut SessionOutput) {
        if let Some(id) = self.poll.take().and_then(|handle| handle.pending) {
            out.commands.push(CallCommand::CancelTimer { id });
        }
    }

    fn fail(&mut self, error: ApiError, out: &mut SessionOutput) {
        warn!(%error, state = self.state.as_str(), "emergency call failed");
        self.release(out);
        self.in_flight = false;
        self.last_error = Some(error.clone());
        self.transition(CallState::Failed, out);
        out.notifications.push(CallNotification::Failed(error));
    }

    fn transition(&mut self, next: CallState, out: &mut SessionOutput) {
        debug!(from = self.state.as_str(), to = next.as_str(), "call state transition");
        self.state = next;
        out.notifications.push(CallNotification::StateChanged(next));
    }
}
