//! Maps received responses to typed results or errors.
//!
//! Status codes are checked in a fixed priority order:
//!
//! | Status | Result |
//! |---|---|
//! | 402 | [`ApiErrorKind::RequestDeclined`], body decoded as the caller's type |
//! | 400 | [`ApiErrorKind::InvalidRequest`] |
//! | 401 | [`ApiErrorKind::InvalidCredentials`] |
//! | 403 | [`ApiErrorKind::Unauthorized`] |
//! | 409 | [`ApiErrorKind::RequestConflict`] |
//! | 5xx | [`ApiErrorKind::Server`] |
//! | other 2xx | success, body decoded as the caller's type |
//! | anything else | [`ApiErrorKind::Unmapped`], no structured detail |
//!
//! When a mapped error body cannot be parsed the result is
//! [`ApiErrorKind::UnreadableErrorResponse`], which still carries the original
//! status and correlation id.

use crate::error::{ApiError, ApiErrorKind, DeclinedResponse, ErrorDetail};
use crate::response::{RawResponse, Response};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::any::Any;
use std::time::Duration;

const UNSUCCESSFUL_MESSAGE: &str = "Payments API request unsuccessful";

/// `{"error": {...}}`, the shape of every error body.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

/// Turns a [`RawResponse`] into the caller's value or an [`Error`].
///
/// Runs once per call, after the last attempt; it never decides about retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseClassifier;

impl ResponseClassifier {
    /// Creates a classifier. It holds no state.
    pub fn new() -> Self {
        Self
    }

    /// Classifies `raw`, decoding a success body as `T`.
    ///
    /// `latency` and `attempts` describe the whole call and are copied into
    /// the returned [`Response`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] for non-2xx statuses and
    /// [`Error::DeserializationFailed`] when a 2xx body is not a valid `T`.
    pub fn classify<T>(&self, raw: RawResponse, latency: Duration, attempts: usize) -> Result<Response<T>>
    where
        T: DeserializeOwned + Any + Send + Sync,
    {
        if let Some(err) = self.api_error::<T>(&raw) {
            return Err(err.into());
        }

        match serde_json::from_slice::<T>(&raw.body) {
            Ok(data) => Ok(Response::new(data, raw, latency, attempts)),
            Err(e) => {
                let raw_response = raw.body_text();
                tracing::error!(
                    error = %e,
                    status = raw.status.as_u16(),
                    raw_response = %raw_response,
                    "Failed to deserialize response"
                );
                Err(Error::DeserializationFailed {
                    raw_response,
                    serde_error: e.to_string(),
                    status: raw.status,
                    correlation_id: raw.correlation_id().map(str::to_string),
                })
            }
        }
    }

    /// Classifies a response whose success body is ignored, such as a DELETE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] for non-2xx statuses.
    pub fn classify_empty(&self, raw: RawResponse, latency: Duration, attempts: usize) -> Result<Response<()>> {
        // A declined DELETE has no richer body type than the error envelope.
        if let Some(err) = self.api_error::<ErrorBody>(&raw) {
            return Err(err.into());
        }
        Ok(Response::new((), raw, latency, attempts))
    }

    /// Builds the error for a non-2xx response, or `None` for 2xx.
    fn api_error<T>(&self, raw: &RawResponse) -> Option<ApiError>
    where
        T: DeserializeOwned + Any + Send + Sync,
    {
        let status = raw.status;
        if status.is_success() {
            return None;
        }

        let kind = ApiErrorKind::for_status(status);
        let correlation_id = raw.correlation_id().map(str::to_string);
        let raw_response = raw.body_text();

        if !kind.has_error_body() {
            return Some(ApiError {
                kind,
                message: UNSUCCESSFUL_MESSAGE.to_string(),
                status,
                correlation_id,
                detail: None,
                raw_response,
                declined: None,
            });
        }

        let parsed = if kind == ApiErrorKind::RequestDeclined {
            parse_declined::<T>(&raw.body)
        } else {
            parse_envelope(&raw.body).map(|detail| (detail, None))
        };

        Some(match parsed {
            Ok((detail, declined)) => ApiError {
                kind,
                message: UNSUCCESSFUL_MESSAGE.to_string(),
                status,
                correlation_id,
                detail: Some(detail),
                raw_response,
                declined,
            },
            Err(e) => {
                tracing::error!(
                    error = %e,
                    status = status.as_u16(),
                    correlation_id = ?correlation_id,
                    "Exception while processing error response"
                );
                ApiError {
                    kind: ApiErrorKind::UnreadableErrorResponse,
                    message: format!(
                        "Exception while processing error response from Payments API: {}",
                        e
                    ),
                    status,
                    correlation_id,
                    detail: None,
                    raw_response,
                    declined: None,
                }
            }
        })
    }
}

/// Placeholder body type for calls that expect no success payload.
#[derive(Debug, Deserialize)]
struct ErrorBody {}

fn parse_envelope(body: &[u8]) -> serde_json::Result<ErrorDetail> {
    serde_json::from_slice::<ErrorEnvelope>(body).map(|envelope| envelope.error)
}

/// Decodes a 402 body both as the declared type and as the error envelope.
fn parse_declined<T>(body: &[u8]) -> serde_json::Result<(ErrorDetail, Option<DeclinedResponse>)>
where
    T: DeserializeOwned + Any + Send + Sync,
{
    let declined = serde_json::from_slice::<T>(body)?;
    let detail = parse_envelope(body)?;
    Ok((detail, Some(DeclinedResponse::new(declined))))
}
