//! HTTP provider implementations
//!
//! Concrete [`GenerationProvider`](crate::GenerationProvider) adapters for
//! self-hosted and hosted image and text backends.

pub mod gemini;
pub mod local_image;
pub mod local_text;
pub mod pollinations;
pub mod types;

pub use gemini::GeminiProvider;
pub use local_image::{LocalImageApi, LocalImageProvider};
pub use local_text::LocalTextProvider;
pub use pollinations::PollinationsProvider;

use crate::Shape;
use chimera_core::ProviderError;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use std::time::Duration;

pub(crate) fn request_failed(provider: &str, status: i32, message: impl Into<String>) -> ProviderError {
    ProviderError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> ProviderError {
    ProviderError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    }
}

pub(crate) fn unsupported_shape(provider: &str, shape: &Shape) -> ProviderError {
    ProviderError::UnsupportedShape {
        provider: provider.to_string(),
        shape: shape.name().to_string(),
    }
}

/// Map a transport error, keeping timeouts distinguishable.
pub(crate) fn transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        request_failed(provider, 0, format!("HTTP request failed: {}", e))
    }
}

pub(crate) fn parse_retry_after_ms(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

/// Turn a non-success response into a provider error.
///
/// `extract` pulls a human-readable message out of the error body when the
/// backend returns structured errors.
pub(crate) async fn error_from_response(
    provider: &str,
    response: Response,
    extract: fn(&str) -> Option<String>,
) -> ProviderError {
    let status = response.status();
    let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = extract(&body).unwrap_or(body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => rate_limited(provider, retry_after_ms),
        _ => request_failed(provider, status.as_u16() as i32, message),
    }
}

/// Error bodies shaped `{"error": {"message": ...}}`.
pub(crate) fn nested_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<types::ApiError>(body)
        .ok()
        .map(|e| e.error.message)
}
