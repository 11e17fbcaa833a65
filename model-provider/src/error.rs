//! Model layer error types

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use solace_protocol::{ErrorKind, StreamError};
use thiserror::Error;

/// Errors raised before or around a completion call.
///
/// Everything that happens once the request is on the wire travels as a
/// `StreamChunk::Error` instead.
#[derive(Error, Debug)]
pub enum ModelError {
  /// Model id is absent from the catalog or its provider is disabled
  #[error("Unknown model: {0}")]
  UnknownModel(String),

  /// Provider id is absent from the catalog
  #[error("Provider not found: {0}")]
  ProviderNotFound(String),

  /// Request needs a capability the target model lacks
  #[error("Model {model} does not support {capability}")]
  CapabilityUnsupported { model: String, capability: Capability },

  /// Protected messages alone exceed the prompt budget
  #[error("Context overflow: prompt needs ~{needed} tokens but only {available} fit")]
  ContextOverflow { needed: u32, available: u32 },

  /// Provider requires an API key and none is configured
  #[error("Missing credential for provider {0}")]
  MissingCredential(String),

  /// Catalog failed validation
  #[error("Invalid catalog: {0}")]
  InvalidCatalog(String),

  /// Provider API error
  #[error("Provider API error: {0}")]
  Api(ApiError),

  /// Network error
  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  /// JSON parse error
  #[error("JSON parse error: {0}")]
  Json(#[from] serde_json::Error),

  /// Bad provider base URL or endpoint
  #[error("Invalid URL: {0}")]
  Url(#[from] url::ParseError),

  /// Background turn task panicked or was aborted
  #[error("Turn task failed: {0}")]
  Task(String),
}

/// Alias for Result<T, ModelError>
pub type Result<T> = std::result::Result<T, ModelError>;

/// Optional model capability a request can depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
  Streaming,
  ToolCalling,
  Vision,
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Capability::Streaming => "streaming",
      Capability::ToolCalling => "tool calling",
      Capability::Vision => "vision",
    })
  }
}

/// Error reported by a provider, either as a non-2xx response body or as an
/// `{"error": ...}` event inside a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiError {
  #[serde(default)]
  pub message: String,

  #[serde(rename = "type", default)]
  pub error_type: Option<String>,

  #[serde(default, deserialize_with = "string_or_number")]
  pub code: Option<String>,

  #[serde(default, deserialize_with = "string_or_number")]
  pub param: Option<String>,

  #[serde(skip)]
  pub status: Option<u16>,

  /// Server-supplied retry delay
  #[serde(skip)]
  pub retry_after_ms: Option<u64>,
}

const RATE_LIMIT_MARKERS: &[&str] = &["rate_limit", "too_many_requests", "requests_limit"];
const AUTH_MARKERS: &[&str] = &[
  "authentication",
  "invalid_api_key",
  "permission",
  "unauthorized",
  "forbidden",
];
const SERVER_MARKERS: &[&str] = &[
  "server_error",
  "api_error",
  "overloaded",
  "internal_error",
  "service_unavailable",
];

impl ApiError {
  /// Error carrying only an HTTP status
  pub fn from_status(status: u16) -> Self {
    let message = reqwest::StatusCode::from_u16(status)
      .ok()
      .and_then(|code| code.canonical_reason())
      .unwrap_or("request failed")
      .to_string();
    Self {
      message,
      status: Some(status),
      ..Self::default()
    }
  }

  /// Builds an error from a non-2xx response's status, headers, and body
  pub fn from_response(status: u16, headers: &HeaderMap, body: &str) -> Self {
    let parsed = serde_json::from_str::<Value>(body)
      .ok()
      .and_then(|value| Self::from_json(&value));

    let mut error = match parsed {
      Some(error) => error,
      None => {
        let mut error = Self::from_status(status);
        let trimmed = body.trim();
        if !trimmed.is_empty() {
          error.message = trimmed.chars().take(500).collect();
        }
        error
      }
    };
    error.status = Some(status);
    error.retry_after_ms = parse_retry_after(headers, Utc::now());
    error
  }

  /// Reads `{"error": {...}}` or `{"error": "message"}`.
  ///
  /// A numeric `code` in the HTTP range doubles as the status when the
  /// error arrived without one (mid-stream errors).
  pub fn from_json(value: &Value) -> Option<Self> {
    let error = value.get("error")?;
    let mut parsed = match error {
      Value::String(message) => Self {
        message: message.clone(),
        ..Self::default()
      },
      Value::Object(_) => Self::deserialize(error).ok()?,
      _ => return None,
    };
    if parsed.status.is_none() {
      parsed.status = parsed
        .code
        .as_deref()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|status| (400..600).contains(status));
    }
    if parsed.message.is_empty() {
      parsed.message = "provider returned an error".to_string();
    }
    Some(parsed)
  }

  fn matches_any(&self, markers: &[&str]) -> bool {
    [self.error_type.as_deref(), self.code.as_deref()]
      .into_iter()
      .flatten()
      .map(str::to_ascii_lowercase)
      .any(|value| markers.iter().any(|marker| value.contains(marker)))
  }

  pub fn is_rate_limit(&self) -> bool {
    self.status == Some(429) || self.matches_any(RATE_LIMIT_MARKERS)
  }

  pub fn is_auth_error(&self) -> bool {
    matches!(self.status, Some(401 | 403)) || self.matches_any(AUTH_MARKERS)
  }

  pub fn is_server_error(&self) -> bool {
    self.status.is_some_and(|status| status >= 500) || self.matches_any(SERVER_MARKERS)
  }

  /// Auth failures are never retried, whatever else the error claims
  pub fn is_retryable(&self) -> bool {
    !self.is_auth_error() && (self.is_rate_limit() || self.is_server_error())
  }

  pub fn kind(&self) -> ErrorKind {
    if self.is_auth_error() {
      ErrorKind::Auth
    } else if self.is_rate_limit() {
      ErrorKind::RateLimited
    } else if self.is_server_error() {
      ErrorKind::Server
    } else {
      ErrorKind::Client
    }
  }

  pub fn to_stream_error(&self) -> StreamError {
    let mut error = StreamError::new(self.kind(), self.message.clone(), self.is_retryable())
      .with_retry_after_ms(self.retry_after_ms);
    error.code = self.code.clone().or_else(|| self.error_type.clone());
    error.status = self.status;
    error
  }
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.status {
      Some(status) => write!(f, "HTTP {status}: {}", self.message),
      None => f.write_str(&self.message),
    }
  }
}

impl From<ApiError> for ModelError {
  fn from(error: ApiError) -> Self {
    ModelError::Api(error)
  }
}

/// Reads `retry-after-ms`, then `Retry-After` as seconds or an HTTP date
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<u64> {
  let header = |name: &str| {
    headers
      .get(name)
      .and_then(|value| value.to_str().ok())
      .map(str::trim)
  };

  if let Some(ms) = header("retry-after-ms").and_then(|raw| raw.parse::<f64>().ok()) {
    return to_millis(ms);
  }

  let raw = header("retry-after")?;
  if let Ok(secs) = raw.parse::<f64>() {
    return to_millis(secs * 1000.0);
  }
  let at = DateTime::parse_from_rfc2822(raw).ok()?;
  let wait = at.with_timezone(&Utc) - now;
  Some(u64::try_from(wait.num_milliseconds()).unwrap_or(0))
}

fn to_millis(value: f64) -> Option<u64> {
  (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Option::<Value>::deserialize(deserializer)? {
    Some(Value::String(text)) => Some(text),
    Some(Value::Number(number)) => Some(number.to_string()),
    _ => None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use reqwest::header::HeaderValue;

  #[test]
  fn status_classification_matches_retry_rules() {
    for status in 100..600u16 {
      let error = ApiError::from_status(status);
      assert_eq!(
        error.is_retryable(),
        status == 429 || status >= 500,
        "status {status}"
      );
      assert!(
        !(error.is_auth_error() && error.is_retryable()),
        "status {status}"
      );
    }
    for status in [400, 401, 403, 404] {
      assert!(!ApiError::from_status(status).is_retryable());
    }
  }

  #[test]
  fn auth_type_wins_over_server_status() {
    let error = ApiError {
      error_type: Some("authentication_error".to_string()),
      status: Some(500),
      ..ApiError::default()
    };
    assert!(error.is_auth_error());
    assert!(!error.is_retryable());
    assert_eq!(error.kind(), ErrorKind::Auth);
  }

  #[test]
  fn parses_openai_error_body_and_retry_header() {
    let mut headers = HeaderMap::new();
    headers.insert("retry-after", HeaderValue::from_static("2"));
    let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded","param":null}}"#;

    let error = ApiError::from_response(429, &headers, body);
    assert_eq!(error.message, "Rate limit reached");
    assert_eq!(error.code.as_deref(), Some("rate_limit_exceeded"));
    assert_eq!(error.retry_after_ms, Some(2000));

    let stream_error = error.to_stream_error();
    assert_eq!(stream_error.kind, ErrorKind::RateLimited);
    assert!(stream_error.retryable);
    assert_eq!(stream_error.status, Some(429));
    assert_eq!(stream_error.retry_after_ms, Some(2000));
  }

  #[test]
  fn non_json_body_keeps_text_as_message() {
    let error = ApiError::from_response(404, &HeaderMap::new(), "no such route\n");
    assert_eq!(error.message, "no such route");
    assert_eq!(error.kind(), ErrorKind::Client);
    assert!(!error.is_retryable());
  }

  #[test]
  fn numeric_code_in_stream_error_becomes_status() {
    let value = serde_json::json!({"error": {"code": 502, "message": "upstream died"}});
    let error = ApiError::from_json(&value).expect("error payload");
    assert_eq!(error.status, Some(502));
    assert!(error.is_retryable());
  }

  #[test]
  fn retry_after_prefers_millisecond_header_and_reads_http_dates() {
    let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2026 07:28:00 GMT")
      .expect("date")
      .with_timezone(&Utc);

    let mut headers = HeaderMap::new();
    headers.insert(
      "retry-after",
      HeaderValue::from_static("Wed, 21 Oct 2026 07:28:03 GMT"),
    );
    assert_eq!(parse_retry_after(&headers, now), Some(3000));

    headers.insert("retry-after-ms", HeaderValue::from_static("150"));
    assert_eq!(parse_retry_after(&headers, now), Some(150));

    assert_eq!(parse_retry_after(&HeaderMap::new(), now), None);
  }
}
