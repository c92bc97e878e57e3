//! Single-attempt request execution.

use crate::response::RawResponse;
use crate::transport::{PreparedRequest, Timeouts, Transport, TransportFailure};
use crate::Error;
use std::sync::Arc;
use std::time::Instant;

/// The result of one attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A 2xx response was received.
    Success(RawResponse),
    /// A response with any other status was received.
    HttpFailure(RawResponse),
    /// No response was obtained.
    TransportFailure(TransportFailure),
}

impl Outcome {
    /// Returns `true` if no HTTP response was obtained.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Outcome::TransportFailure(_))
    }

    /// Returns the received response, whatever its status.
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            Outcome::Success(raw) | Outcome::HttpFailure(raw) => Some(raw),
            Outcome::TransportFailure(_) => None,
        }
    }
}

/// Runs one attempt of a request through a [`Transport`].
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
}

impl RequestExecutor {
    /// Creates an executor sending through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Performs one attempt.
    ///
    /// The status code is only looked at to split 2xx from everything else;
    /// mapping statuses to errors is left to the classifier.
    pub fn execute(&self, request: &PreparedRequest, timeouts: Timeouts, attempt: usize) -> Outcome {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let started = Instant::now();
        match self.transport.send(request, timeouts) {
            Ok(raw) => {
                tracing::info!(
                    status = raw.status.as_u16(),
                    latency_ms = started.elapsed().as_millis(),
                    attempt = attempt,
                    "Received HTTP response"
                );
                if raw.status.is_success() {
                    Outcome::Success(raw)
                } else {
                    Outcome::HttpFailure(raw)
                }
            }
            Err(failure) => {
                tracing::warn!(
                    kind = %failure.kind,
                    cause = %failure.cause,
                    attempt = attempt,
                    url = %request.url,
                    "Request attempt failed"
                );
                Outcome::TransportFailure(failure)
            }
        }
    }
}

/// Turns a terminal transport failure into the caller-facing error.
pub(crate) fn connection_error(url: &url::Url, failure: TransportFailure) -> Error {
    Error::Connection {
        message: format!("Error connecting to {}, reason: {}", url, failure.cause),
        url: url.to_string(),
        kind: failure.kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use crate::transport::TransportFailureKind;
    use http::{HeaderMap, Method, StatusCode};
    use std::time::Duration;

    struct FixedTransport(std::result::Result<StatusCode, TransportFailureKind>);

    impl Transport for FixedTransport {
        fn send(
            &self,
            _request: &PreparedRequest,
            _timeouts: Timeouts,
        ) -> std::result::Result<RawResponse, TransportFailure> {
            match self.0 {
                Ok(status) => Ok(RawResponse::new(status, HeaderMap::new(), Vec::new())),
                Err(kind) => Err(TransportFailure::new(kind, "Read timed out")),
            }
        }
    }

    fn request() -> PreparedRequest {
        PreparedRequest {
            method: Method::GET,
            url: url::Url::parse("http://localhost:1/paymenthub/v1/monitor").unwrap(),
            headers: HeaderMap::new(),
            credential: Credential::parse("id:secret").unwrap(),
            body: None,
        }
    }

    fn timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(1),
            response: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_splits_success_from_http_failure() {
        let executor = RequestExecutor::new(Arc::new(FixedTransport(Ok(StatusCode::CREATED))));
        assert!(matches!(executor.execute(&request(), timeouts(), 1), Outcome::Success(_)));

        let executor = RequestExecutor::new(Arc::new(FixedTransport(Ok(StatusCode::BAD_GATEWAY))));
        let outcome = executor.execute(&request(), timeouts(), 1);
        assert!(matches!(outcome, Outcome::HttpFailure(_)));
        assert_eq!(outcome.response().unwrap().status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_transport_failure_message_names_url_and_cause() {
        let executor = RequestExecutor::new(Arc::new(FixedTransport(Err(
            TransportFailureKind::ResponseTimeout,
        ))));
        let request = request();
        let Outcome::TransportFailure(failure) = executor.execute(&request, timeouts(), 1) else {
            panic!("Expected a transport failure");
        };

        let err = connection_error(&request.url, failure);
        match err {
            Error::Connection { message, kind, .. } => {
                assert_eq!(kind, TransportFailureKind::ResponseTimeout);
                assert!(message.starts_with("Error connecting to http://localhost:1/paymenthub/v1/monitor"));
                assert!(message.contains("Read timed out"));
            }
            other => panic!("Expected Connection, got {:?}", other),
        }
    }
}
