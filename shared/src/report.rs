//! Gathering the emergency report: a voice description that the backend
//! transcribes, and a photo of the scene that the backend analyses. The
//! report is ready once both have come back.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ImageAnalysisResponse, TranscriptionResponse};
use crate::error::ApiError;
use crate::model::EmergencyReport;
use crate::MAX_UPLOAD_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Image,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio recording"),
            Self::Image => f.write_str("photo"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("the {kind} is empty")]
    Empty { kind: MediaKind },

    #[error("the {kind} is {size} bytes, limit is {max}")]
    TooLarge {
        kind: MediaKind,
        size: usize,
        max: usize,
    },
}

pub fn check_upload(kind: MediaKind, bytes: &[u8]) -> Result<(), MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::Empty { kind });
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(MediaError::TooLarge {
            kind,
            size: bytes.len(),
            max: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    Initial,
    Audio,
    Camera,
}

/// Sequence number of one accepted upload. Only the newest recording and the
/// newest photo are waited for; replies carrying an older number are dropped.
pub type UploadId = u32;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportDraft {
    mode: CaptureMode,
    recording: bool,
    transcription: Option<String>,
    image_captured: bool,
    image_analysis: Option<serde_json::Value>,
    submitted: bool,
    /// Last id handed out. Survives [`ReportDraft::reset`].
    last_upload: UploadId,
    pending_audio: Option<UploadId>,
    pending_image: Option<UploadId>,
}

impl ReportDraft {
    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_transcribing(&self) -> bool {
        self.pending_audio.is_some()
    }

    pub fn is_analyzing(&self) -> bool {
        self.pending_image.is_some()
    }

    pub fn has_image(&self) -> bool {
        self.image_captured
    }

    pub fn transcription(&self) -> Option<&str> {
        self.transcription.as_deref()
    }

    pub fn image_analysis(&self) -> Option<&serde_json::Value> {
        self.image_analysis.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.is_transcribing() || self.is_analyzing()
    }

    /// The shell opens the microphone once it sees the recording flag.
    pub fn start_recording(&mut self) {
        self.mode = CaptureMode::Audio;
        self.recording = true;
    }

    pub fn recording_failed(&mut self) {
        self.recording = false;
    }

    /// Accepts the finished recording for transcription. A transcription
    /// still outstanding for an earlier recording no longer counts.
    pub fn finish_recording(&mut self, audio: &[u8]) -> Result<UploadId, MediaError> {
        self.recording = false;
        check_upload(MediaKind::Audio, audio)?;
        let upload = self.next_upload();
        if let Some(previous) = self.pending_audio.replace(upload) {
            debug!(previous, upload, "recording superseded");
        }
        self.transcription = None;
        debug!(upload, bytes = audio.len(), "recording accepted for transcription");
        Ok(upload)
    }

    /// Returns the finished report if the photo analysis was already in.
    pub fn on_transcription(
        &mut self,
        upload: UploadId,
        result: Result<TranscriptionResponse, ApiError>,
    ) -> Result<Option<EmergencyReport>, ApiError> {
        if self.pending_audio != Some(upload) {
            debug!(upload, "ignoring transcription for a superseded recording");
            return Ok(None);
        }
        self.pending_audio = None;
        let response = result?;
        self.transcription = Some(response.transcription.trim().to_string()).filter(|t| !t.is_empty());
        Ok(self.take_ready())
    }

    pub fn capture_image(&mut self) {
        self.mode = CaptureMode::Camera;
    }

    /// Accepts a photo for analysis. Retaking the photo makes any analysis
    /// still outstanding for the earlier one irrelevant.
    pub fn photo_taken(&mut self, image: &[u8]) -> Result<UploadId, MediaError> {
        check_upload(MediaKind::Image, image)?;
        let upload = self.next_upload();
        if let Some(previous) = self.pending_image.replace(upload) {
            debug!(previous, upload, "photo superseded");
        }
        self.image_analysis = None;
        self.image_captured = true;
        debug!(upload, bytes = image.len(), "photo accepted for analysis");
        Ok(upload)
    }

    /// Returns the finished report if a transcription is already in.
    pub fn on_image_analysis(
        &mut self,
        upload: UploadId,
        result: Result<ImageAnalysisResponse, ApiError>,
    ) -> Result<Option<EmergencyReport>, ApiError> {
        if self.pending_image != Some(upload) {
            debug!(upload, "ignoring analysis for a superseded photo");
            return Ok(None);
        }
        self.pending_image = None;
        let response = result?;
        self.image_analysis = Some(response.injury_detected);
        Ok(self.take_ready())
    }

    pub fn reset(&mut self) {
        *self = Self {
            last_upload: self.last_upload,
            ..Self::default()
        };
    }

    fn next_upload(&mut self) -> UploadId {
        self.last_upload = self.last_upload.wrapping_add(1);
        self.last_upload
    }

    /// Hands out the report at most once per draft.
    fn take_ready(&mut self) -> Option<EmergencyReport> {
        if self.submitted {
            return None;
        }
        let transcription = self.transcription.clone()?;
        let image_result = self.image_analysis.clone()?;
        self.submitted = true;
        info!("emergency report complete");
        Some(EmergencyReport {
            transcription,
            image_result,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub label: String,
    #[serde(default)]
    pub confidence: f64,
}

impl Detection {
    /// "person (Confidence: 92%)"
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn summary(&self) -> String {
        let percent = (self.confidence * 100.0).round() as i64;
        format!("{} (Confidence: {percent}%)", self.label)
    }
}

/// What the scene analysis found, read leniently out of the opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageFindings {
    #[serde(default)]
    pub has_emergency: bool,
    #[serde(default, rename = "emergency_detections")]
    pub detections: Vec<Detection>,
}

impl ImageFindings {
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            debug!(error = %e, "unrecognised image analysis payload");
            Self::default()
        })
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<String> {
        if !self.has_emergency {
            return Vec::new();
        }
        self.detections.iter().map(Detection::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn transcribed(text: &str) -> Result<TranscriptionResponse, ApiError> {
        Ok(TranscriptionResponse {
            transcription: text.into(),
        })
    }

    fn analysed(value: serde_json::Value) -> Result<ImageAnalysisResponse, ApiError> {
        Ok(ImageAnalysisResponse {
            injury_detected: value,
        })
    }

    #[test]
    fn test_upload_limits() {
        assert_matches!(
            check_upload(MediaKind::Audio, &[]),
            Err(MediaError::Empty {
                kind: MediaKind::Audio
            })
        );
        assert!(check_upload(MediaKind::Image, &[1, 2, 3]).is_ok());
        let big = vec![0u8; MAX_UPLOAD_BYTES + 1];
        assert_matches!(
            check_upload(MediaKind::Image, &big),
            Err(MediaError::TooLarge { size, .. }) if size == MAX_UPLOAD_BYTES + 1
        );
    }

    #[test]
    fn test_audio_then_image_produces_report() {
        let mut draft = ReportDraft::default();
        draft.start_recording();
        assert_eq!(draft.mode(), CaptureMode::Audio);
        assert!(draft.is_recording());

        let audio = draft.finish_recording(b"RIFF....").unwrap();
        assert!(!draft.is_recording());
        assert!(draft.is_transcribing());
        assert_eq!(draft.on_transcription(audio, transcribed("Someone fell")), Ok(None));
        assert_eq!(draft.transcription(), Some("Someone fell"));

        draft.capture_image();
        let photo = draft.photo_taken(&[0xFF, 0xD8, 0xFF]).unwrap();
        let report = draft
            .on_image_analysis(photo, analysed(json!({"has_emergency": true})))
            .unwrap()
            .unwrap();
        assert_eq!(report.transcription, "Someone fell");
        assert_eq!(report.image_result, json!({"has_emergency": true}));
    }

    #[test]
    fn test_image_without_transcription_waits() {
        let mut draft = ReportDraft::default();
        draft.capture_image();
        let photo = draft.photo_taken(&[1]).unwrap();
        assert_eq!(draft.on_image_analysis(photo, analysed(json!({}))), Ok(None));

        draft.start_recording();
        let audio = draft.finish_recording(&[1]).unwrap();
        let report = draft.on_transcription(audio, transcribed("help")).unwrap();
        assert!(report.is_some());
    }

    /// Transcribed draft with two photos taken back to back.
    fn two_photos() -> (ReportDraft, UploadId, UploadId) {
        let mut draft = ReportDraft::default();
        draft.start_recording();
        let audio = draft.finish_recording(&[1]).unwrap();
        let _ = draft.on_transcription(audio, transcribed("Cut on the leg"));
        draft.capture_image();
        let first = draft.photo_taken(b"first").unwrap();
        let second = draft.photo_taken(b"second").unwrap();
        assert_ne!(first, second);
        (draft, first, second)
    }

    #[test]
    fn test_retaken_photo_replies_in_order() {
        let (mut draft, first, second) = two_photos();

        assert_eq!(draft.on_image_analysis(first, analysed(json!({"photo": 1}))), Ok(None));
        assert!(draft.is_analyzing());
        assert_eq!(draft.image_analysis(), None);

        let report = draft
            .on_image_analysis(second, analysed(json!({"photo": 2})))
            .unwrap()
            .unwrap();
        assert_eq!(report.image_result, json!({"photo": 2}));
        assert!(!draft.is_analyzing());
    }

    #[test]
    fn test_retaken_photo_replies_out_of_order() {
        let (mut draft, first, second) = two_photos();

        let report = draft
            .on_image_analysis(second, analysed(json!({"photo": 2})))
            .unwrap()
            .unwrap();
        assert_eq!(report.image_result, json!({"photo": 2}));

        assert_eq!(draft.on_image_analysis(first, analysed(json!({"photo": 1}))), Ok(None));
        assert_eq!(draft.image_analysis(), Some(&json!({"photo": 2})));
    }

    #[test]
    fn test_retaken_photo_discards_earlier_analysis() {
        let mut draft = ReportDraft::default();
        let first = draft.photo_taken(b"first").unwrap();
        let _ = draft.on_image_analysis(first, analysed(json!({"photo": 1})));
        let second = draft.photo_taken(b"second").unwrap();
        assert_eq!(draft.image_analysis(), None);

        draft.start_recording();
        let audio = draft.finish_recording(&[1]).unwrap();
        assert_eq!(draft.on_transcription(audio, transcribed("help")), Ok(None));

        let report = draft
            .on_image_analysis(second, analysed(json!({"photo": 2})))
            .unwrap()
            .unwrap();
        assert_eq!(report.image_result, json!({"photo": 2}));
    }

    #[test]
    fn test_rerecording_uses_latest_transcription() {
        let mut draft = ReportDraft::default();
        let photo = draft.photo_taken(&[1]).unwrap();
        let _ = draft.on_image_analysis(photo, analysed(json!({})));

        draft.start_recording();
        let first = draft.finish_recording(b"first").unwrap();
        draft.start_recording();
        let second = draft.finish_recording(b"second").unwrap();

        assert_eq!(draft.on_transcription(first, transcribed("wrong take")), Ok(None));
        let report = draft
            .on_transcription(second, transcribed("right take"))
            .unwrap()
            .unwrap();
        assert_eq!(report.transcription, "right take");
    }

    #[test]
    fn test_report_is_handed_out_once() {
        let mut draft = ReportDraft::default();
        draft.start_recording();
        let audio = draft.finish_recording(&[1]).unwrap();
        let _ = draft.on_transcription(audio, transcribed("help"));
        let photo = draft.photo_taken(&[1]).unwrap();
        assert!(draft.on_image_analysis(photo, analysed(json!({}))).unwrap().is_some());

        let photo = draft.photo_taken(&[2]).unwrap();
        assert_eq!(draft.on_image_analysis(photo, analysed(json!({}))), Ok(None));
    }

    #[test]
    fn test_empty_transcription_does_not_count() {
        let mut draft = ReportDraft::default();
        draft.start_recording();
        let audio = draft.finish_recording(&[1]).unwrap();
        let _ = draft.on_transcription(audio, transcribed("   "));
        assert_eq!(draft.transcription(), None);
    }

    #[test]
    fn test_failed_transcription_clears_busy_flag() {
        let mut draft = ReportDraft::default();
        draft.start_recording();
        let audio = draft.finish_recording(&[1]).unwrap();
        assert!(draft.is_busy());
        assert_eq!(
            draft.on_transcription(audio, Err(ApiError::network("down"))),
            Err(ApiError::network("down"))
        );
        assert!(!draft.is_busy());
    }

    #[test]
    fn test_reset_discards_late_responses() {
        let mut draft = ReportDraft::default();
        draft.start_recording();
        let before_reset = draft.finish_recording(&[1]).unwrap();
        draft.reset();
        assert_eq!(draft.mode(), CaptureMode::Initial);
        assert_eq!(draft.on_transcription(before_reset, transcribed("late")), Ok(None));
        assert_eq!(draft.transcription(), None);

        draft.start_recording();
        let after_reset = draft.finish_recording(&[1]).unwrap();
        assert_ne!(before_reset, after_reset);
        assert_eq!(draft.on_transcription(before_reset, transcribed("late")), Ok(None));
        assert!(draft.is_transcribing());
    }

    #[test]
    fn test_findings_summary() {
        let findings = ImageFindings::from_value(&json!({
            "has_emergency": true,
            "emergency_detections": [
                {"class": "person", "confidence": 0.923},
                {"class": "blood", "confidence": 0.5}
            ]
        }));
        assert_eq!(
            findings.summaries(),
            vec!["person (Confidence: 92%)", "blood (Confidence: 50%)"]
        );
    }

    #[test]
    fn test_findings_tolerate_unknown_payloads() {
        let findings = ImageFindings::from_value(&json!("no detector"));
        assert!(!findings.has_emergency);
        assert!(findings.summaries().is_empty());

        let findings = ImageFindings::from_value(&json!({
            "has_emergency": false,
            "emergency_detections": [{"class": "person", "confidence": 0.9}]
        }));
        assert!(findings.summaries().is_empty());
    }
}
