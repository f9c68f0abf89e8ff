use serde::{Deserialize, Serialize};
use std::fmt;

use crate::call_session::{CallSession, PollPolicy};
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::location::Coordinate;
use crate::report::ReportDraft;
use crate::wizard::Wizard;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(CallId);

/// What the person reported, forwarded as-is to the first-aid endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub transcription: String,
    /// Opaque analysis payload; only the view looks inside it.
    pub image_result: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstAidStatus {
    #[default]
    Idle,
    Pending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Model {
    pub config: ClientConfig,
    pub wizard: Wizard,
    pub report: ReportDraft,
    pub call: CallSession,
    pub first_aid: FirstAidStatus,
    /// Position the outstanding reverse-geocode request was sent for.
    pub pending_geocode: Option<Coordinate>,
    pub active_error: Option<AppError>,
}

impl Default for Model {
    fn default() -> Self {
        let config = ClientConfig::default();
        Self {
            call: CallSession::new(PollPolicy::from(&config)),
            config,
            wizard: Wizard::default(),
            report: ReportDraft::default(),
            first_aid: FirstAidStatus::default(),
            pending_geocode: None,
            active_error: None,
        }
    }
}

impl Model {
    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn is_loading(&self) -> bool {
        self.report.is_busy()
            || self.first_aid == FirstAidStatus::Pending
            || self.call.state() == crate::call_session::CallState::Initiating
    }
}
