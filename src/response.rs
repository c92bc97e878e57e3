//! Raw and typed responses.
//!
//! A [`RawResponse`] is what one network round trip produced, whatever its
//! status code. A [`Response`] wraps the deserialized success value together
//! with the details of the exchange, making it easy to access timing
//! information, headers, and the raw response body for debugging.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// Header carrying the server-side correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-INTERNAL-CORRELATION-ID";

/// A complete HTTP response as received from the wire.
///
/// Header lookups are case-insensitive; when a header repeats, the last value
/// wins.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body, possibly empty.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Creates a new `RawResponse`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Returns the last value of a header, if present and valid UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// use http::{HeaderMap, StatusCode};
    /// use paycall::RawResponse;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.append("x-trace", "first".parse().unwrap());
    /// headers.append("x-trace", "second".parse().unwrap());
    ///
    /// let response = RawResponse::new(StatusCode::OK, headers, Vec::new());
    /// assert_eq!(response.header("X-TRACE"), Some("second"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_all(name).iter().last()?.to_str().ok()
    }

    /// Returns the value of the `X-INTERNAL-CORRELATION-ID` header.
    ///
    /// A missing header is not an error; the id is simply absent.
    pub fn correlation_id(&self) -> Option<&str> {
        self.header(CORRELATION_ID_HEADER)
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A wrapper around a successful API response.
///
/// # Type Parameters
///
/// * `T` - The type of the deserialized response data
///
/// # Examples
///
/// ```no_run
/// use paycall::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Refund {
///     id: String,
///     status: String,
/// }
///
/// # fn example() -> Result<(), paycall::Error> {
/// let client = Client::builder().api_key("merchant:secret").build()?;
///
/// let response = client.get::<Refund>("/v1/refunds/8f1b")?;
///
/// println!("Refund {} is {}", response.data.id, response.data.status);
/// println!("Request took {:?}", response.latency);
/// println!("Correlation id: {:?}", response.correlation_id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body as a string.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The value of the `X-INTERNAL-CORRELATION-ID` header, if present.
    pub correlation_id: Option<String>,

    /// The total latency of the call, including all attempts and backoff.
    pub latency: Duration,

    /// The number of attempts made to complete this call.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a `Response` from decoded data and the raw response it came from.
    pub fn new(data: T, raw: RawResponse, latency: Duration, attempts: usize) -> Self {
        let correlation_id = raw.correlation_id().map(str::to_string);
        Self {
            data,
            raw_body: raw.body_text(),
            status: raw.status,
            headers: raw.headers,
            correlation_id,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type, preserving the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use paycall::{RawResponse, Response};
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let raw = RawResponse::new(StatusCode::OK, HeaderMap::new(), b"42".to_vec());
    /// let response = Response::new(42, raw, Duration::from_millis(100), 1);
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            correlation_id: self.correlation_id,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns the last value of a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_all(name).iter().last()?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
