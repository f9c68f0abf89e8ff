use serde::{Deserialize, Serialize};

use crate::call_session::{CallSession, CallState};
use crate::error::UserFacingError;
use crate::location::{Location, MapLinks};
use crate::model::{FirstAidStatus, Model};
use crate::report::{CaptureMode, ImageFindings};
use crate::transcript::{parse_transcript, TranscriptLine};
use crate::wizard::WizardStep;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneView {
    pub has_emergency: bool,
    pub detections: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CallView {
    pub state: CallState,
    pub can_start: bool,
    pub can_retry: bool,
    pub status_checks: u32,
}

impl From<&CallSession> for CallView {
    fn from(session: &CallSession) -> Self {
        Self {
            state: session.state(),
            can_start: session.state() == CallState::Idle,
            can_retry: session.state() == CallState::Failed,
            status_checks: session.poll_attempts(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LocationView {
    pub lat: f64,
    pub lon: f64,
    /// "lat, lon" to six decimals.
    pub coordinates: String,
    pub address: Option<String>,
    pub maps_search_url: String,
    pub maps_embed_url: Option<String>,
}

impl LocationView {
    fn new(location: &Location, maps_api_key: Option<&str>) -> Self {
        let links = MapLinks::for_coordinate(&location.coordinate, maps_api_key);
        Self {
            lat: location.coordinate.lat(),
            lon: location.coordinate.lon(),
            coordinates: location.coordinate.display(),
            address: location.address.clone(),
            maps_search_url: links.search_url,
            maps_embed_url: links.embed_url,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    ReportCapture {
        mode: CaptureMode,
        is_recording: bool,
        is_transcribing: bool,
        transcription: Option<String>,
        has_image: bool,
        is_analyzing: bool,
        /// The camera screen is up and no position is known yet.
        wants_location: bool,
    },
    ResponseProcessing {
        transcription: String,
        scene: SceneView,
        is_processing_first_aid: bool,
        can_retry_first_aid: bool,
    },
    InstructionsAndCall {
        instructions: String,
        call: CallView,
    },
    CallCompleted {
        instructions: String,
        transcript: Vec<TranscriptLine>,
        recording_url: Option<String>,
    },
    Error {
        title: String,
        message: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub step: WizardStep,
    pub state: ViewState,
    pub location: Option<LocationView>,
    pub error: Option<UserFacingError>,
    pub is_global_loading: bool,
}

pub(crate) fn build(model: &Model) -> ViewModel {
    let wizard = &model.wizard;
    let instructions = wizard.first_aid().map(|f| f.response.clone());

    let state = match wizard.step() {
        WizardStep::ReportCapture => ViewState::ReportCapture {
            mode: model.report.mode(),
            is_recording: model.report.is_recording(),
            is_transcribing: model.report.is_transcribing(),
            transcription: model.report.transcription().map(str::to_string),
            has_image: model.report.has_image(),
            is_analyzing: model.report.is_analyzing(),
            wants_location: model.report.mode() == CaptureMode::Camera && wizard.location().is_none(),
        },

        WizardStep::ResponseProcessing => match wizard.report() {
            Some(report) => {
                let findings = ImageFindings::from_value(&report.image_result);
                ViewState::ResponseProcessing {
                    transcription: report.transcription.clone(),
                    scene: SceneView {
                        has_emergency: findings.has_emergency,
                        detections: findings.summaries(),
                    },
                    is_processing_first_aid: model.first_aid == FirstAidStatus::Pending,
                    can_retry_first_aid: model.first_aid == FirstAidStatus::Failed,
                }
            }
            None => missing("Report Required", "Please describe the emergency first"),
        },

        WizardStep::InstructionsAndCall => match instructions {
            Some(instructions) => ViewState::InstructionsAndCall {
                instructions,
                call: CallView::from(&model.call),
            },
            None => missing("Instructions Required", "First aid instructions are not available"),
        },

        WizardStep::CallCompleted => match (instructions, wizard.call_result()) {
            (Some(instructions), Some(result)) => ViewState::CallCompleted {
                instructions,
                transcript: parse_transcript(&result.transcript),
                recording_url: result.recording_url.clone(),
            },
            _ => missing("Call Required", "The emergency call has not finished"),
        },
    };

    ViewModel {
        step: wizard.step(),
        state,
        location: wizard
            .location()
            .map(|l| LocationView::new(l, model.config.maps_api_key.as_deref())),
        error: model.active_error.as_ref().map(UserFacingError::from),
        is_global_loading: model.is_loading(),
    }
}

fn missing(title: &str, message: &str) -> ViewState {
    ViewState::Error {
        title: title.into(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FirstAidResponse;
    use crate::call_session::CallResult;
    use crate::error::{AppError, ErrorKind};
    use crate::location::Coordinate;
    use crate::model::EmergencyReport;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn model_at_instructions() -> Model {
        let mut model = Model::default();
        model
            .wizard
            .advance_on_report(EmergencyReport {
                transcription: "He fell".into(),
                image_result: json!({
                    "has_emergency": true,
                    "emergency_detections": [{"class": "person", "confidence": 0.92}]
                }),
            })
            .unwrap();
        model
            .wizard
            .advance_on_first_aid(FirstAidResponse {
                response: "Keep him still.".into(),
            })
            .unwrap();
        model
    }

    #[test]
    fn test_initial_view() {
        let view = build(&Model::default());
        assert_eq!(view.step, WizardStep::ReportCapture);
        assert_matches!(
            view.state,
            ViewState::ReportCapture {
                mode: CaptureMode::Initial,
                is_recording: false,
                wants_location: false,
                ..
            }
        );
        assert!(view.location.is_none());
        assert!(view.error.is_none());
        assert!(!view.is_global_loading);
    }

    #[test]
    fn test_processing_view_summarises_scene() {
        let mut model = Model::default();
        model
            .wizard
            .advance_on_report(EmergencyReport {
                transcription: "He fell".into(),
                image_result: json!({
                    "has_emergency": true,
                    "emergency_detections": [{"class": "person", "confidence": 0.92}]
                }),
            })
            .unwrap();
        model.first_aid = FirstAidStatus::Pending;

        let view = build(&model);
        assert!(view.is_global_loading);
        match view.state {
            ViewState::ResponseProcessing {
                scene,
                is_processing_first_aid,
                ..
            } => {
                assert!(is_processing_first_aid);
                assert_eq!(scene.detections, vec!["person (Confidence: 92%)"]);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_call_view_affordances() {
        let model = model_at_instructions();
        let view = build(&model);
        assert_matches!(
            view.state,
            ViewState::InstructionsAndCall {
                call: CallView {
                    state: CallState::Idle,
                    can_start: true,
                    can_retry: false,
                    ..
                },
                ..
            }
        );
    }

    #[test]
    fn test_completed_view_parses_transcript() {
        let mut model = model_at_instructions();
        model
            .wizard
            .advance_on_call_completed(CallResult {
                transcript: "Agent: Hello\n\nCaller: Hi".into(),
                recording_url: Some("https://example.com/r.wav".into()),
            })
            .unwrap();

        match build(&model).state {
            ViewState::CallCompleted {
                instructions,
                transcript,
                recording_url,
            } => {
                assert_eq!(instructions, "Keep him still.");
                assert_eq!(transcript.len(), 2);
                assert_eq!(recording_url.as_deref(), Some("https://example.com/r.wav"));
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_location_and_error_projection() {
        let mut model = Model::default();
        model.config.maps_api_key = Some("key".into());
        model
            .wizard
            .update_location(Location::new(Coordinate::new(1.5, 2.25).unwrap()));
        model.set_error(AppError::new(
            ErrorKind::Network,
            "Failed to analyze image. Please try again.",
        ));

        let view = build(&model);
        let location = view.location.unwrap();
        assert_eq!(location.coordinates, "1.500000, 2.250000");
        assert!(location.maps_embed_url.is_some());
        let error = view.error.unwrap();
        assert_eq!(error.message, "Failed to analyze image. Please try again.");
        assert!(error.is_retryable);
    }
}
