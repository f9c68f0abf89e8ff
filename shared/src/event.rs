use serde::{Deserialize, Serialize};

use crate::api::{
    CallStatusResponse, FirstAidResponse, ImageAnalysisResponse, ReverseGeocodeResponse,
    StartCallResponse, TranscriptionResponse,
};
use crate::capabilities::TimerId;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::location::Coordinate;
use crate::report::UploadId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Noop,
    Configure(ClientConfig),

    // Report capture
    StartRecording,
    RecordingFinished {
        #[serde(with = "serde_bytes")]
        audio: Vec<u8>,
    },
    RecordingFailed {
        reason: String,
    },
    TranscriptionReceived {
        upload: UploadId,
        result: Result<TranscriptionResponse, ApiError>,
    },
    CaptureImageRequested,
    PhotoTaken {
        #[serde(with = "serde_bytes")]
        image: Vec<u8>,
    },
    ImageAnalyzed {
        upload: UploadId,
        result: Result<ImageAnalysisResponse, ApiError>,
    },
    ResetForm,

    // First aid
    FirstAidReceived(Result<FirstAidResponse, ApiError>),
    RetryFirstAid,

    // Emergency call
    CallRequested,
    CallStarted {
        attempt: u32,
        result: Result<StartCallResponse, ApiError>,
    },
    PollTimerElapsed {
        id: TimerId,
    },
    CallStatusReceived {
        attempt: u32,
        result: Result<CallStatusResponse, ApiError>,
    },

    // Location
    LocationUpdated {
        lat: f64,
        lon: f64,
    },
    LocationFailed {
        reason: String,
    },
    AddressResolved {
        at: Coordinate,
        result: Result<ReverseGeocodeResponse, ApiError>,
    },

    DismissError,
    ResetRequested,
    ViewTornDown,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Configure(_) => "configure",
            Self::StartRecording => "start_recording",
            Self::RecordingFinished { .. } => "recording_finished",
            Self::RecordingFailed { .. } => "recording_failed",
            Self::TranscriptionReceived { .. } => "transcription_received",
            Self::CaptureImageRequested => "capture_image_requested",
            Self::PhotoTaken { .. } => "photo_taken",
            Self::ImageAnalyzed { .. } => "image_analyzed",
            Self::ResetForm => "reset_form",
            Self::FirstAidReceived(_) => "first_aid_received",
            Self::RetryFirstAid => "retry_first_aid",
            Self::CallRequested => "call_requested",
            Self::CallStarted { .. } => "call_started",
            Self::PollTimerElapsed { .. } => "poll_timer_elapsed",
            Self::CallStatusReceived { .. } => "call_status_received",
            Self::LocationUpdated { .. } => "location_updated",
            Self::LocationFailed { .. } => "location_failed",
            Self::AddressResolved { .. } => "address_resolved",
            Self::DismissError => "dismiss_error",
            Self::ResetRequested => "reset_requested",
            Self::ViewTornDown => "view_torn_down",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::StartRecording
                | Self::RecordingFinished { .. }
                | Self::CaptureImageRequested
                | Self::PhotoTaken { .. }
                | Self::ResetForm
                | Self::RetryFirstAid
                | Self::CallRequested
                | Self::DismissError
                | Self::ResetRequested
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_initiated_classification() {
        assert!(Event::CallRequested.is_user_initiated());
        assert!(Event::ResetRequested.is_user_initiated());
        assert!(!Event::PollTimerElapsed { id: TimerId(1) }.is_user_initiated());
        assert!(!Event::CallStarted {
            attempt: 1,
            result: Err(ApiError::network("down")),
        }
        .is_user_initiated());
    }

    #[test]
    fn test_media_payloads_serialize_as_bytes() {
        let event = Event::PhotoTaken {
            image: vec![0xFF, 0xD8],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"PhotoTaken": {"image": [255, 216]}}));
        assert_eq!(event.name(), "photo_taken");
    }

    #[test]
    fn test_out_of_range_coordinate_does_not_deserialize() {
        let bad = serde_json::json!({
            "AddressResolved": {
                "at": {"lat": 91.0, "lon": 0.0},
                "result": {"Ok": {"display_name": null}}
            }
        });
        assert!(serde_json::from_value::<Event>(bad).is_err());

        let good = serde_json::json!({
            "AddressResolved": {
                "at": {"lat": 45.0, "lon": 7.5},
                "result": {"Ok": {"display_name": "Turin"}}
            }
        });
        assert!(matches!(
            serde_json::from_value::<Event>(good),
            Ok(Event::AddressResolved { .. })
        ));
    }
}
