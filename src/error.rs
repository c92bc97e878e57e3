//! Error types for payments API calls.
//!
//! Every failed call yields exactly one [`Error`]. Failures where the server
//! answered with a non-2xx status are grouped under [`Error::Api`], whose
//! [`ApiErrorKind`] says which row of the status table applied, while the
//! shared fields (status code, correlation id, structured error detail) stay
//! reachable without matching on the kind.

use crate::transport::TransportFailureKind;
use http::StatusCode;
use serde::Deserialize;
use std::any::Any;
use std::fmt;

/// The main error type for payments API calls.
///
/// # Examples
///
/// ```no_run
/// use paycall::{ApiErrorKind, Client, Error};
///
/// # fn example() -> Result<(), Error> {
/// let client = Client::builder().api_key("merchant:secret").build()?;
///
/// match client.get::<serde_json::Value>("/v1/monitor") {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::Api(err)) if err.kind == ApiErrorKind::InvalidRequest => {
///         for field in err.detail.iter().flat_map(|d| &d.field_errors) {
///             eprintln!("{}: {}", field.field, field.error);
///         }
///     }
///     Err(Error::Connection { message, .. }) => eprintln!("Network trouble: {}", message),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A client setting or per-call option was rejected.
    ///
    /// Raised before any network I/O and never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No HTTP response was obtained: the connection could not be established
    /// or the response did not arrive in time.
    ///
    /// The message names the target URL and the underlying cause.
    #[error("{message}")]
    Connection {
        /// `Error connecting to <url>, reason: <cause>`
        message: String,
        /// The URL the request was sent to.
        url: String,
        /// Which phase of the exchange failed.
        kind: TransportFailureKind,
    },

    /// The server answered with a non-2xx status code.
    #[error(transparent)]
    Api(Box<ApiError>),

    /// A 2xx response body could not be decoded into the expected type.
    ///
    /// Preserves the raw body and serde message for debugging schema
    /// mismatches.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
        /// The correlation id of the response, if present
        correlation_id: Option<String>,
    },

    /// The request body could not be encoded as JSON.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if the failure happened before any HTTP response was
    /// received, which is the only case eligible for automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// Returns the HTTP status code if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api(err) => Some(err.status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the correlation id of the response, if one was received and
    /// carried the header.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Error::Api(err) => err.correlation_id.as_deref(),
            Error::DeserializationFailed { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    /// Returns the structured error detail parsed from the response body.
    pub fn error_detail(&self) -> Option<&ErrorDetail> {
        match self {
            Error::Api(err) => err.detail.as_ref(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Api(err) => Some(&err.raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the API error kind for [`Error::Api`].
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Error::Api(err) => Some(err.kind),
            _ => None,
        }
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api(Box::new(err))
    }
}

/// Which row of the status table an API failure fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 400: the request was malformed or failed validation.
    InvalidRequest,
    /// 401: the credentials were not accepted.
    InvalidCredentials,
    /// 402: the request was declined; the declared response type is available.
    RequestDeclined,
    /// 403: the credentials lack permission for the operation.
    Unauthorized,
    /// 409: the request conflicts with the current state of the resource.
    RequestConflict,
    /// 5xx: the server failed.
    Server,
    /// Any other non-2xx status; carries no structured detail.
    Unmapped,
    /// The error body of an otherwise mapped status could not be parsed.
    UnreadableErrorResponse,
}

impl ApiErrorKind {
    /// Maps a non-2xx status code to its kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use http::StatusCode;
    /// use paycall::ApiErrorKind;
    ///
    /// assert_eq!(ApiErrorKind::for_status(StatusCode::CONFLICT), ApiErrorKind::RequestConflict);
    /// assert_eq!(ApiErrorKind::for_status(StatusCode::BAD_GATEWAY), ApiErrorKind::Server);
    /// assert_eq!(ApiErrorKind::for_status(StatusCode::NOT_FOUND), ApiErrorKind::Unmapped);
    /// ```
    pub fn for_status(status: StatusCode) -> Self {
        match status.as_u16() {
            402 => ApiErrorKind::RequestDeclined,
            400 => ApiErrorKind::InvalidRequest,
            401 => ApiErrorKind::InvalidCredentials,
            403 => ApiErrorKind::Unauthorized,
            409 => ApiErrorKind::RequestConflict,
            code if code >= 500 => ApiErrorKind::Server,
            _ => ApiErrorKind::Unmapped,
        }
    }

    /// Returns `true` if responses of this kind carry a parsed error body.
    pub fn has_error_body(&self) -> bool {
        !matches!(
            self,
            ApiErrorKind::Unmapped | ApiErrorKind::UnreadableErrorResponse
        )
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ApiErrorKind::InvalidRequest => "invalid request",
            ApiErrorKind::InvalidCredentials => "invalid credentials",
            ApiErrorKind::RequestDeclined => "request declined",
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::RequestConflict => "request conflict",
            ApiErrorKind::Server => "api error",
            ApiErrorKind::Unmapped => "unmapped status",
            ApiErrorKind::UnreadableErrorResponse => "unreadable error response",
        };
        f.write_str(text)
    }
}

/// An HTTP-level failure returned by the payments API.
#[derive(thiserror::Error, Debug)]
#[error("{message} ({kind}, status {status})")]
pub struct ApiError {
    /// The row of the status table that applied.
    pub kind: ApiErrorKind,
    /// Human-readable summary.
    pub message: String,
    /// The HTTP status code of the response.
    pub status: StatusCode,
    /// The `X-INTERNAL-CORRELATION-ID` header, for support investigations.
    pub correlation_id: Option<String>,
    /// The structured error from the response body, when one was parsed.
    pub detail: Option<ErrorDetail>,
    /// The raw response body.
    pub raw_response: String,
    /// For declined requests, the body decoded as the caller's response type.
    pub declined: Option<DeclinedResponse>,
}

impl ApiError {
    /// Returns the declined response decoded as `T`.
    ///
    /// Only present for [`ApiErrorKind::RequestDeclined`], and only for the
    /// type the failing call was made with.
    pub fn declined_response<T: Any>(&self) -> Option<&T> {
        self.declined.as_ref()?.downcast_ref()
    }
}

/// The caller's declared response type, decoded from a 402 body.
///
/// Declined requests return a partially populated resource next to the
/// error, so the body is decoded with the type the call expected.
pub struct DeclinedResponse(Box<dyn Any + Send + Sync>);

impl DeclinedResponse {
    /// Wraps a decoded response value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Returns the value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for DeclinedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeclinedResponse(..)")
    }
}

/// The error object returned by the payments API.
///
/// Unknown fields are ignored; missing or `null` fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Internal error code.
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    /// A description of the error that can be shown to customers.
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// Details of parameter value errors.
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: Vec<String>,
    /// Fields that have issues.
    #[serde(default, deserialize_with = "null_as_default")]
    pub field_errors: Vec<FieldError>,
    /// Additional data about a reject.
    #[serde(default, deserialize_with = "null_as_default")]
    pub additional_details: Vec<AdditionalDetail>,
}

/// A request field that failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    /// Name of the offending field, e.g. `amount`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub field: String,
    /// What is wrong with it, e.g. `required`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: String,
}

/// Extra information attached to an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AdditionalDetail {
    /// Category of the detail, sent as `type`.
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    /// Code within that category.
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    /// Human-readable description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A specialized `Result` type for payments API calls.
pub type Result<T> = std::result::Result<T, Error>;
