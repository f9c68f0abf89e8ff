use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::FirstAidResponse;
use crate::call_session::CallResult;
use crate::location::Location;
use crate::model::EmergencyReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    ReportCapture,
    ResponseProcessing,
    InstructionsAndCall,
    CallCompleted,
}

impl WizardStep {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReportCapture => "report_capture",
            Self::ResponseProcessing => "response_processing",
            Self::InstructionsAndCall => "instructions_and_call",
            Self::CallCompleted => "call_completed",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardInput {
    Report,
    FirstAid,
    CallCompleted,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot apply {event:?} in step {from}")]
    InvalidTransition { from: WizardStep, event: WizardInput },
}

/// Drives the four-step flow. Each step keeps the data it was entered with,
/// so a step is never shown without what it needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wizard {
    step: WizardStep,
    report: Option<EmergencyReport>,
    first_aid: Option<FirstAidResponse>,
    call_result: Option<CallResult>,
    location: Option<Location>,
}

impl Wizard {
    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn report(&self) -> Option<&EmergencyReport> {
        self.report.as_ref()
    }

    pub fn first_aid(&self) -> Option<&FirstAidResponse> {
        self.first_aid.as_ref()
    }

    pub fn call_result(&self) -> Option<&CallResult> {
        self.call_result.as_ref()
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn location_mut(&mut self) -> Option<&mut Location> {
        self.location.as_mut()
    }

    pub fn advance_on_report(&mut self, report: EmergencyReport) -> Result<(), TransitionError> {
        self.require(WizardStep::ReportCapture, WizardInput::Report)?;
        self.report = Some(report);
        self.enter(WizardStep::ResponseProcessing);
        Ok(())
    }

    pub fn advance_on_first_aid(&mut self, response: FirstAidResponse) -> Result<(), TransitionError> {
        self.require(WizardStep::ResponseProcessing, WizardInput::FirstAid)?;
        self.first_aid = Some(response);
        self.enter(WizardStep::InstructionsAndCall);
        Ok(())
    }

    pub fn advance_on_call_completed(&mut self, result: CallResult) -> Result<(), TransitionError> {
        self.require(WizardStep::InstructionsAndCall, WizardInput::CallCompleted)?;
        self.call_result = Some(result);
        self.enter(WizardStep::CallCompleted);
        Ok(())
    }

    /// Back to the first step. The last known location survives.
    pub fn reset(&mut self) {
        self.report = None;
        self.first_aid = None;
        self.call_result = None;
        self.enter(WizardStep::ReportCapture);
    }

    pub fn update_location(&mut self, location: Location) {
        self.location = Some(location);
    }

    fn require(&self, step: WizardStep, event: WizardInput) -> Result<(), TransitionError> {
        if self.step == step {
            Ok(())
        } else {
            warn!(from = %self.step, ?event, "rejected wizard transition");
            Err(TransitionError::InvalidTransition {
                from: self.step,
                event,
            })
        }
    }

    fn enter(&mut self, step: WizardStep) {
        info!(from = %self.step, to = %step, "wizard step");
        self.step = step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Coordinate;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn report() -> EmergencyReport {
        EmergencyReport {
            transcription: "He collapsed".into(),
            image_result: json!({"has_emergency": true}),
        }
    }

    fn first_aid() -> FirstAidResponse {
        FirstAidResponse {
            response: "Check breathing.".into(),
        }
    }

    fn call_result() -> CallResult {
        CallResult {
            transcript: "Agent: help is coming".into(),
            recording_url: None,
        }
    }

    #[test]
    fn test_full_forward_path() {
        let mut wizard = Wizard::default();
        assert_eq!(wizard.step(), WizardStep::ReportCapture);

        wizard.advance_on_report(report()).unwrap();
        assert_eq!(wizard.step(), WizardStep::ResponseProcessing);
        assert_eq!(wizard.report(), Some(&report()));

        wizard.advance_on_first_aid(first_aid()).unwrap();
        assert_eq!(wizard.step(), WizardStep::InstructionsAndCall);

        wizard.advance_on_call_completed(call_result()).unwrap();
        assert_eq!(wizard.step(), WizardStep::CallCompleted);
        assert_eq!(wizard.call_result(), Some(&call_result()));
    }

    #[test]
    fn test_steps_are_ordered() {
        assert!(WizardStep::ReportCapture < WizardStep::ResponseProcessing);
        assert!(WizardStep::InstructionsAndCall < WizardStep::CallCompleted);
    }

    #[test]
    fn test_call_completed_in_report_capture_is_rejected() {
        let mut wizard = Wizard::default();
        let before = wizard.clone();
        assert_matches!(
            wizard.advance_on_call_completed(call_result()),
            Err(TransitionError::InvalidTransition {
                from: WizardStep::ReportCapture,
                event: WizardInput::CallCompleted
            })
        );
        assert_eq!(wizard, before);
    }

    #[test]
    fn test_steps_cannot_be_skipped_or_repeated() {
        let mut wizard = Wizard::default();
        assert!(wizard.advance_on_first_aid(first_aid()).is_err());

        wizard.advance_on_report(report()).unwrap();
        assert!(wizard.advance_on_report(report()).is_err());
        assert!(wizard.advance_on_call_completed(call_result()).is_err());
        assert_eq!(wizard.step(), WizardStep::ResponseProcessing);
    }

    #[test]
    fn test_reset_from_any_step_keeps_location() {
        let location = Location::new(Coordinate::new(10.0, 20.0).unwrap());
        let mut wizard = Wizard::default();
        wizard.update_location(location.clone());
        wizard.advance_on_report(report()).unwrap();
        wizard.advance_on_first_aid(first_aid()).unwrap();

        wizard.reset();
        assert_eq!(wizard.step(), WizardStep::ReportCapture);
        assert!(wizard.report().is_none());
        assert!(wizard.first_aid().is_none());
        assert_eq!(wizard.location(), Some(&location));

        wizard.advance_on_report(report()).unwrap();
        assert_eq!(wizard.step(), WizardStep::ResponseProcessing);
    }
}
