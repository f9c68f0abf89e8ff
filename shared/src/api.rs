//! Request shapes of the emergency backend and classification of its replies.
//!
//! Builders return a validated [`OutgoingRequest`] for the http capability;
//! parsers turn crux_http's [`HttpOutcome`] into typed data or an [`ApiError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::capabilities::{HttpOutcome, OutgoingRequest, RequestError, ValidatedUrl};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::model::{CallId, EmergencyReport};

const GEOCODER_USER_AGENT: &str = "Emergency Response App";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    EmergencyCall,
    CallStatus,
    TranscribeAudio,
    AnalyzeImage,
    FirstAid,
}

impl Endpoint {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::EmergencyCall => "emergency-call/",
            Self::CallStatus => "call-status/",
            Self::TranscribeAudio => "transcribe-audio/",
            Self::AnalyzeImage => "analyze-image/",
            Self::FirstAid => "first-aid/",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCallResponse {
    #[serde(default)]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatusRequest {
    pub call_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatusResponse {
    pub status: String,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysisResponse {
    pub injury_detected: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstAidRequest<'a> {
    pub transcription: &'a str,
    pub image_result: &'a serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstAidResponse {
    pub response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseGeocodeResponse {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// FastAPI error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// A single-file `multipart/form-data` part.
#[derive(Debug, Clone, Copy)]
pub struct MultipartFile<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

impl MultipartFile<'_> {
    #[must_use]
    pub fn encode(&self, boundary: &str) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.data.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                self.field, self.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", self.content_type).as_bytes());
        body.extend_from_slice(self.data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }
}

/// Builds requests for the emergency backend rooted at the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendApi {
    base: Url,
}

impl BackendApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self {
            base: base_url(&config.api_base_url)?,
        })
    }

    pub fn url(&self, endpoint: Endpoint) -> Result<ValidatedUrl, ApiError> {
        let url = self.base.join(endpoint.path()).map_err(|e| ApiError::InvalidRequest {
            reason: e.to_string(),
        })?;
        ValidatedUrl::from_url(&url).map_err(invalid_request)
    }

    pub fn start_call(&self) -> Result<OutgoingRequest, ApiError> {
        self.post(Endpoint::EmergencyCall)
    }

    pub fn check_status(&self, call_id: &CallId) -> Result<OutgoingRequest, ApiError> {
        self.post(Endpoint::CallStatus)?
            .with_json(&CallStatusRequest {
                call_id: call_id.as_str().to_string(),
            })
            .map_err(invalid_request)
    }

    pub fn transcribe_audio(&self, audio: &[u8]) -> Result<OutgoingRequest, ApiError> {
        self.post_file(
            Endpoint::TranscribeAudio,
            MultipartFile {
                field: "file",
                filename: "recording.wav",
                content_type: "audio/wav",
                data: audio,
            },
        )
    }

    pub fn analyze_image(&self, image: &[u8]) -> Result<OutgoingRequest, ApiError> {
        let (filename, content_type) = match image::guess_format(image) {
            Ok(image::ImageFormat::Png) => ("image.png", "image/png"),
            Ok(image::ImageFormat::WebP) => ("image.webp", "image/webp"),
            _ => ("image.jpg", "image/jpeg"),
        };
        self.post_file(
            Endpoint::AnalyzeImage,
            MultipartFile {
                field: "file",
                filename,
                content_type,
                data: image,
            },
        )
    }

    pub fn first_aid(&self, report: &EmergencyReport) -> Result<OutgoingRequest, ApiError> {
        self.post(Endpoint::FirstAid)?
            .with_json(&FirstAidRequest {
                transcription: &report.transcription,
                image_result: &report.image_result,
            })
            .map_err(invalid_request)
    }

    fn post(&self, endpoint: Endpoint) -> Result<OutgoingRequest, ApiError> {
        Ok(OutgoingRequest::post(self.url(endpoint)?))
    }

    fn post_file(&self, endpoint: Endpoint, file: MultipartFile<'_>) -> Result<OutgoingRequest, ApiError> {
        let boundary = format!("----responder-{}", uuid::Uuid::new_v4().simple());
        let content_type = format!("multipart/form-data; boundary={boundary}");
        self.post(endpoint)?
            .with_body(&content_type, file.encode(&boundary))
            .map_err(invalid_request)
    }
}

/// Reverse geocoding against a Nominatim-compatible service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geocoder {
    base: Url,
}

impl Geocoder {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self {
            base: base_url(&config.geocoder_base_url)?,
        })
    }

    pub fn reverse(&self, lat: f64, lon: f64) -> Result<OutgoingRequest, ApiError> {
        let mut url = self.base.join("reverse").map_err(|e| ApiError::InvalidRequest {
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string())
            .append_pair("zoom", "18")
            .append_pair("addressdetails", "1");

        let url = ValidatedUrl::from_url(&url).map_err(invalid_request)?;
        OutgoingRequest::get(url)
            .with_header("User-Agent", GEOCODER_USER_AGENT)
            .map_err(invalid_request)
    }
}

fn base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ApiError::InvalidRequest {
        reason: format!("invalid base URL '{raw}': {e}"),
    })?;
    // `join` replaces the last path segment unless the base ends with a slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn invalid_request(e: RequestError) -> ApiError {
    ApiError::InvalidRequest {
        reason: e.to_string(),
    }
}

/// Classifies a shell result: transport failure, non-2xx, undecodable body.
///
/// crux_http already turns 4xx and 5xx into [`crux_http::Error::Http`],
/// keeping the body so FastAPI's `detail` can be surfaced.
pub fn parse_json<T: DeserializeOwned>(result: HttpOutcome) -> Result<T, ApiError> {
    let body = match result {
        Ok(mut response) => response.take_body().unwrap_or_default(),
        Err(crux_http::Error::Http(error)) => {
            let status = u16::from(error.code);
            let message = error
                .body
                .as_deref()
                .and_then(|body| serde_json::from_slice::<ErrorBody>(body).ok())
                .and_then(|b| {
                    b.message.or(b.detail.map(|d| match d {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    }))
                })
                .unwrap_or_else(|| format!("HTTP error: {status}"));
            return Err(ApiError::Backend { status, message });
        }
        Err(error) => return Err(ApiError::network(error.to_string())),
    };

    serde_json::from_slice(&body).map_err(|e| classify_decode_error(&e))
}

pub fn parse_start_call(result: HttpOutcome) -> Result<StartCallResponse, ApiError> {
    parse_json(result)
}

pub fn parse_call_status(result: HttpOutcome) -> Result<CallStatusResponse, ApiError> {
    parse_json(result)
}

pub fn parse_transcription(result: HttpOutcome) -> Result<TranscriptionResponse, ApiError> {
    parse_json(result)
}

pub fn parse_image_analysis(result: HttpOutcome) -> Result<ImageAnalysisResponse, ApiError> {
    parse_json(result)
}

pub fn parse_first_aid(result: HttpOutcome) -> Result<FirstAidResponse, ApiError> {
    parse_json(result)
}

pub fn parse_reverse_geocode(result: HttpOutcome) -> Result<ReverseGeocodeResponse, ApiError> {
    parse_json(result)
}

/// serde reports an absent required field as "missing field `name`"; keep
/// that case distinct from garbage bodies.
fn classify_decode_error(e: &serde_json::Error) -> ApiError {
    let text = e.to_string();
    if let Some(rest) = text.strip_prefix("missing field `") {
        if let Some(field) = rest.split('`').next() {
            return ApiError::missing_field(field);
        }
    }
    ApiError::MalformedResponse { reason: text }
}
