//! Per-request metadata.

use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// What to call: verb, path, extra headers, and query parameters.
///
/// The path is relative to the API root (`/paymenthub` is added by the
/// client). Query parameters keep their insertion order on the wire.
///
/// # Examples
///
/// ```
/// use paycall::metadata::RequestMetadata;
/// use http::Method;
///
/// let metadata = RequestMetadata::new(Method::GET, "/v1/payments")
///     .with_query_param("merchantRefNum", "order-42")
///     .with_optional_query_param("limit", Some(10))
///     .with_optional_query_param::<u32>("offset", None);
///
/// assert!(metadata.is_idempotent());
/// assert_eq!(metadata.query_params.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method.
    pub method: Method,

    /// The request path, starting with `/`.
    pub path: String,

    /// Headers added on top of the standard ones.
    pub headers: HeaderMap,

    /// Query parameters, in the order they are sent.
    pub query_params: Vec<(String, String)>,
}

impl RequestMetadata {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query_params: Vec::new(),
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    /// if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::InvalidConfiguration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::InvalidConfiguration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends a query parameter.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query_params.push((key.into(), value.to_string()));
        self
    }

    /// Appends a query parameter only when a value is present.
    pub fn with_optional_query_param<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_query_param(key, value),
            None => self,
        }
    }

    /// Whether the call may be repeated safely. Only GET is.
    pub fn is_idempotent(&self) -> bool {
        self.method == Method::GET
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}
