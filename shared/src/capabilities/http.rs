//! Checks applied before a request reaches [`crux_http::Http`].
//!
//! crux_http's builders panic on a URL they cannot parse and on non-ASCII
//! header text, so the core describes every request as an [`OutgoingRequest`]
//! whose URL and headers were validated when it was built, and only then
//! hands it to the capability.

use std::fmt;

use crux_http::Http;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::event::Event;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_HEADER_NAME_LENGTH: usize = 256;
pub const MAX_HEADER_VALUE_LENGTH: usize = 8192;

/// What the shell hands back for one request.
pub type HttpOutcome = crux_http::Result<crux_http::Response<Vec<u8>>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("{method} requests cannot have a body")]
    UnexpectedBody { method: Method },

    #[error("could not encode request body: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedUrl(String);

impl ValidatedUrl {
    /// Accepts absolute http(s) URLs with a host and no embedded credentials.
    pub fn new(url: impl Into<String>) -> Result<Self, RequestError> {
        let raw = url.into();
        let reject = |reason: String| RequestError::InvalidUrl {
            url: shorten(&raw, 100),
            reason,
        };

        if raw.trim().is_empty() {
            return Err(reject("empty URL".into()));
        }
        if raw.len() > MAX_URL_LENGTH {
            return Err(reject(format!("longer than {MAX_URL_LENGTH} bytes")));
        }
        let parsed = Url::parse(&raw).map_err(|e| reject(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(reject(format!("unsupported scheme '{}'", parsed.scheme())));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(reject("credentials are not allowed".into()));
        }
        if parsed.host_str().is_none() {
            return Err(reject("no host".into()));
        }

        Ok(Self(parsed.into()))
    }

    pub fn from_url(url: &Url) -> Result<Self, RequestError> {
        Self::new(url.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let cut = (0..=max).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
    format!("{}...", &text[..cut])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

/// A request whose every part crux_http will accept without panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    method: Method,
    url: ValidatedUrl,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl OutgoingRequest {
    pub fn get(url: ValidatedUrl) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: ValidatedUrl) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: ValidatedUrl) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any earlier value under the same name.
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let name = name.into();
        let value = value.into();
        validate_header(&name, &value)?;

        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value));
        Ok(self)
    }

    pub fn with_body(self, content_type: &str, body: Vec<u8>) -> Result<Self, RequestError> {
        if self.method != Method::Post {
            return Err(RequestError::UnexpectedBody {
                method: self.method,
            });
        }
        let mut request = self.with_header("Content-Type", content_type)?;
        request.body = Some(body);
        Ok(request)
    }

    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, RequestError> {
        let body = serde_json::to_vec(value).map_err(|e| RequestError::Encode(e.to_string()))?;
        self.with_body("application/json", body)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &ValidatedUrl {
        &self.url
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Hands the request to the shell. Headers go on before the body so the
    /// explicit Content-Type survives `body_bytes`.
    pub fn send<F>(self, http: &Http<Event>, make_event: F)
    where
        F: FnOnce(HttpOutcome) -> Event + Send + 'static,
    {
        let mut builder = match self.method {
            Method::Get => http.get(self.url.as_str()),
            Method::Post => http.post(self.url.as_str()),
        };
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = self.body {
            builder = builder.body_bytes(body);
        }
        builder.send(make_event);
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), RequestError> {
    let reject = |reason: String| RequestError::InvalidHeader {
        name: shorten(name, 50),
        reason,
    };

    if name.is_empty() || name.len() > MAX_HEADER_NAME_LENGTH {
        return Err(reject("bad header name length".into()));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return Err(reject(
            "header names are limited to letters, digits, '-' and '_'".into(),
        ));
    }
    if ["host", "content-length", "transfer-encoding"]
        .iter()
        .any(|reserved| name.eq_ignore_ascii_case(reserved))
    {
        return Err(reject("set by the shell".into()));
    }
    if value.len() > MAX_HEADER_VALUE_LENGTH {
        return Err(reject(format!(
            "value longer than {MAX_HEADER_VALUE_LENGTH} bytes"
        )));
    }
    if !value.is_ascii() || value.contains(['\r', '\n', '\0']) {
        return Err(reject("value must be ASCII without CR, LF or NUL".into()));
    }
    Ok(())
}
