//! The network boundary.
//!
//! A [`Transport`] performs exactly one HTTP exchange and reports either a
//! complete [`RawResponse`] or a [`TransportFailure`]. [`ReqwestTransport`] is
//! the default, built on `reqwest`; tests and callers with
//! special TLS or pooling needs can inject their own implementation through
//! [`ClientBuilder::transport`](crate::ClientBuilder::transport).

use crate::config::Credential;
use crate::proxy::ProxyConfig;
use crate::response::RawResponse;
use crate::{Error, Result};
use http::{HeaderMap, Method};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use url::Url;

/// A fully prepared request, ready to be put on the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Sent as HTTP basic authentication.
    pub credential: Credential,
    pub body: Option<Vec<u8>>,
}

/// Time limits for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on establishing the connection.
    pub connect: Duration,
    /// Bound on receiving the response once connected.
    pub response: Duration,
}

/// Where an attempt failed before a response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFailureKind {
    /// The connection was refused, unroutable, or otherwise failed.
    Connect,
    /// The connection was not established within the connect timeout.
    ConnectTimeout,
    /// The response did not arrive within the response timeout.
    ResponseTimeout,
    /// The connection was made but the response was empty, truncated, or
    /// malformed.
    Response,
}

impl TransportFailureKind {
    /// Returns `true` for failures while connecting.
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            TransportFailureKind::Connect | TransportFailureKind::ConnectTimeout
        )
    }

    /// Returns `true` for either timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportFailureKind::ConnectTimeout | TransportFailureKind::ResponseTimeout
        )
    }
}

impl fmt::Display for TransportFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransportFailureKind::Connect => "connection",
            TransportFailureKind::ConnectTimeout => "connection timeout",
            TransportFailureKind::ResponseTimeout => "response timeout",
            TransportFailureKind::Response => "response",
        };
        f.write_str(text)
    }
}

/// An attempt that ended without an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    /// Description of the underlying cause.
    pub cause: String,
}

impl TransportFailure {
    pub fn new(kind: TransportFailureKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    /// Classifies a `reqwest` error raised while sending or reading.
    fn from_reqwest(err: &reqwest::Error) -> Self {
        let chain = error_chain(err);
        match (err.is_connect(), err.is_timeout()) {
            (true, true) => Self::new(
                TransportFailureKind::ConnectTimeout,
                format!("connect timed out ({chain})"),
            ),
            (true, false) => Self::new(TransportFailureKind::Connect, chain),
            (false, true) => Self::new(
                TransportFailureKind::ResponseTimeout,
                format!("Read timed out ({chain})"),
            ),
            (false, false) => Self::new(
                TransportFailureKind::Response,
                format!("The target server failed to respond ({chain})"),
            ),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.cause)
    }
}

/// Performs single HTTP exchanges.
///
/// Implementations must not retry on their own and must release the
/// connection (or hand it back to a pool) before returning.
pub trait Transport: Send + Sync {
    /// Sends `request` and reads the complete response within `timeouts`.
    ///
    /// Any status code counts as a response; only failures to obtain one are
    /// reported as [`TransportFailure`].
    fn send(
        &self,
        request: &PreparedRequest,
        timeouts: Timeouts,
    ) -> std::result::Result<RawResponse, TransportFailure>;
}

/// The default transport, backed by `reqwest` on a runtime owned by the
/// transport.
///
/// The connect timeout bounds establishing the connection and the response
/// timeout bounds every read after that, so a slow connect never eats into
/// the response budget. Proxy selection happens once, at construction.
/// Implicit proxy detection in `reqwest` is turned off so that only the
/// resolved proxy is used.
///
/// `send` blocks the calling thread and must not be called from within an
/// async runtime.
pub struct ReqwestTransport {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    timeouts: Timeouts,
    proxy: Option<ProxyConfig>,
}

impl ReqwestTransport {
    /// Creates a transport whose pooled client uses `timeouts`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the runtime or the HTTP
    /// client cannot be built.
    pub fn new(timeouts: Timeouts, proxy: Option<ProxyConfig>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("paycall-transport")
            .enable_all()
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("Failed to start runtime: {}", e)))?;
        let client = build_client(timeouts, proxy.as_ref())?;
        Ok(Self {
            runtime,
            client,
            timeouts,
            proxy,
        })
    }

    /// The proxy requests are routed through, if any.
    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: &PreparedRequest,
        timeouts: Timeouts,
    ) -> std::result::Result<RawResponse, TransportFailure> {
        // Both timeouts are client-level settings, so a per-call override
        // needs a dedicated client for that call.
        let dedicated;
        let client = if timeouts == self.timeouts {
            &self.client
        } else {
            dedicated = build_client(timeouts, self.proxy.as_ref())
                .map_err(|e| TransportFailure::new(TransportFailureKind::Connect, e.to_string()))?;
            &dedicated
        };

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .basic_auth(request.credential.id(), Some(request.credential.secret()));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        self.runtime.block_on(async {
            let response = builder
                .send()
                .await
                .map_err(|e| TransportFailure::from_reqwest(&e))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportFailure::from_reqwest(&e))?;

            Ok(RawResponse::new(status, headers, body.to_vec()))
        })
    }
}

fn build_client(timeouts: Timeouts, proxy: Option<&ProxyConfig>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.response)
        .no_proxy();
    if let Some(proxy) = proxy {
        let proxy = proxy
            .to_reqwest()
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid proxy: {}", e)))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| Error::InvalidConfiguration(format!("Failed to build HTTP client: {}", e)))
}

/// Joins an error and its sources into one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
