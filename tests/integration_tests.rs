//! Integration tests using wiremock to simulate the payments API.
//!
//! The client is blocking, so each test owns a tokio runtime that is only used
//! to start and inspect the mock server; calls are made from the test thread,
//! outside that runtime.

use paycall::{
    ApiErrorKind, CallOptions, Client, Error, PaymentSimulator, PreparedRequest, RawResponse,
    Timeouts, Transport, TransportFailure, TransportFailureKind,
};
use paycall::metadata::RequestMetadata;
use paycall::transport::ReqwestTransport;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::io::Read;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use wiremock::matchers::{basic_auth, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Payment {
    id: String,
    merchant_ref_num: String,
    amount: u64,
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    merchant_ref_num: String,
    amount: u64,
    currency_code: String,
}

fn payment() -> Payment {
    Payment {
        id: "a7c5e0b6-1c1f-4f35-9b3c-d5d2b0e1f0aa".to_string(),
        merchant_ref_num: "order-42".to_string(),
        amount: 1099,
        status: "COMPLETED".to_string(),
    }
}

fn payment_request() -> PaymentRequest {
    PaymentRequest {
        merchant_ref_num: "order-42".to_string(),
        amount: 1099,
        currency_code: "USD".to_string(),
    }
}

fn error_body(code: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": code,
            "message": "Invalid field value",
            "details": ["Invalid value for amount"],
            "fieldErrors": [{"field": "amount", "error": "required"}]
        }
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A mock server plus the runtime that started it.
struct Stub {
    server: MockServer,
    rt: Runtime,
}

impl Stub {
    fn start() -> Self {
        init_tracing();
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    fn received(&self) -> usize {
        self.rt
            .block_on(self.server.received_requests())
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    fn client(&self) -> Client {
        Client::builder()
            .api_key("merchant:s3cret")
            .base_url(self.server.uri())
            .unwrap()
            .build()
            .unwrap()
    }
}

#[test]
fn test_successful_get_request() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("GET"))
            .and(path("/paymenthub/v1/payments/p-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(payment())
                    .insert_header("X-INTERNAL-CORRELATION-ID", "abc123"),
            ),
    );

    let response = stub.client().get::<Payment>("/v1/payments/p-1").unwrap();

    assert_eq!(response.data, payment());
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.correlation_id.as_deref(), Some("abc123"));
    assert_eq!(response.attempts, 1);
    assert!(!response.was_retried());
}

#[test]
fn test_post_sends_standard_headers_and_json_body() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("POST"))
            .and(path("/paymenthub/v1/payments"))
            .and(basic_auth("merchant", "s3cret"))
            .and(header("content-type", "application/json;charset=utf-8"))
            .and(header("x-transaction-source", "RustSDK"))
            .and(body_json(json!({
                "merchantRefNum": "order-42",
                "amount": 1099,
                "currencyCode": "USD"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(payment())),
    );

    let response = stub
        .client()
        .post::<_, Payment>("/v1/payments", &payment_request())
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.data.status, "COMPLETED");

    let requests = stub.rt.block_on(stub.server.received_requests()).unwrap();
    let user_agent = requests[0].headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(user_agent.starts_with("PaymentsAPI RustSDK/"), "{user_agent}");
}

#[test]
fn test_query_params_and_simulator_header() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("GET"))
            .and(path("/paymenthub/v1/payments"))
            .and(query_param("merchantRefNum", "order-42"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payments": []}))),
    );
    stub.mount(
        Mock::given(method("POST"))
            .and(path("/paymenthub/v1/payments"))
            .and(header("simulator", "EXTERNAL"))
            .respond_with(ResponseTemplate::new(201).set_body_json(payment())),
    );
    let client = stub.client();

    let metadata = RequestMetadata::new(Method::GET, "/v1/payments")
        .with_query_param("merchantRefNum", "order-42")
        .with_optional_query_param::<u32>("offset", None)
        .with_query_param("limit", 5);
    let listed = client
        .call::<(), serde_json::Value>(metadata, None, None)
        .unwrap();
    assert_eq!(listed.data, json!({"payments": []}));

    let options = CallOptions::new().simulator(PaymentSimulator::External);
    let created = client
        .call::<_, Payment>(
            RequestMetadata::new(Method::POST, "/v1/payments"),
            Some(&payment_request()),
            Some(&options),
        )
        .unwrap();
    assert_eq!(created.data, payment());
}

#[test]
fn test_invalid_request_keeps_field_errors() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("POST"))
            .and(path("/paymenthub/v1/payments"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(error_body("5068"))
                    .insert_header("X-INTERNAL-CORRELATION-ID", "abc123"),
            ),
    );

    let result = stub
        .client()
        .post::<_, Payment>("/v1/payments", &payment_request());

    match result {
        Err(Error::Api(err)) => {
            assert_eq!(err.kind, ApiErrorKind::InvalidRequest);
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.correlation_id.as_deref(), Some("abc123"));
            let detail = err.detail.as_ref().unwrap();
            assert_eq!(detail.code, "5068");
            assert_eq!(detail.field_errors[0].field, "amount");
            assert_eq!(detail.field_errors[0].error, "required");
        }
        other => panic!("Expected InvalidRequest, got {:?}", other),
    }
}

#[test]
fn test_declined_payment_exposes_typed_body() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("POST"))
            .and(path("/paymenthub/v1/payments"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "id": "p-declined",
                "merchantRefNum": "order-42",
                "amount": 1099,
                "status": "FAILED",
                "error": {"code": "3009", "message": "Your request has been declined by the issuing bank."}
            }))),
    );

    let err = stub
        .client()
        .post::<_, Payment>("/v1/payments", &payment_request())
        .unwrap_err();

    assert_eq!(err.api_kind(), Some(ApiErrorKind::RequestDeclined));
    assert_eq!(err.error_detail().unwrap().code, "3009");
    let Error::Api(api) = &err else {
        panic!("Expected Error::Api");
    };
    let declined = api.declined_response::<Payment>().unwrap();
    assert_eq!(declined.id, "p-declined");
    assert_eq!(declined.status, "FAILED");
}

#[test]
fn test_correlation_id_on_every_error_kind() {
    let table = [
        (400, ApiErrorKind::InvalidRequest),
        (401, ApiErrorKind::InvalidCredentials),
        (403, ApiErrorKind::Unauthorized),
        (404, ApiErrorKind::Unmapped),
        (409, ApiErrorKind::RequestConflict),
        (500, ApiErrorKind::Server),
        (503, ApiErrorKind::Server),
    ];

    for (code, kind) in table {
        let stub = Stub::start();
        stub.mount(
            Mock::given(method("GET"))
                .and(path("/paymenthub/v1/payments/p-1"))
                .respond_with(
                    ResponseTemplate::new(code)
                        .set_body_json(error_body("1000"))
                        .insert_header("X-INTERNAL-CORRELATION-ID", "abc123"),
                ),
        );

        let err = stub.client().get::<Payment>("/v1/payments/p-1").unwrap_err();
        assert_eq!(err.api_kind(), Some(kind), "status {code}");
        assert_eq!(err.status().map(|s| s.as_u16()), Some(code));
        assert_eq!(err.correlation_id(), Some("abc123"), "status {code}");
        assert_eq!(err.error_detail().is_some(), kind != ApiErrorKind::Unmapped);
    }
}

#[test]
fn test_unreadable_error_body() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("GET"))
            .and(path("/paymenthub/v1/monitor"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("<html>Internal Server Error</html>")
                    .insert_header("X-INTERNAL-CORRELATION-ID", "abc123"),
            ),
    );

    let err = stub
        .client()
        .get::<serde_json::Value>("/v1/monitor")
        .unwrap_err();

    assert_eq!(err.api_kind(), Some(ApiErrorKind::UnreadableErrorResponse));
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(err.correlation_id(), Some("abc123"));
    assert_eq!(err.raw_response(), Some("<html>Internal Server Error</html>"));
}

#[test]
fn test_deserialization_error() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("GET"))
            .and(path("/paymenthub/v1/payments/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("invalid json")),
    );

    let result = stub.client().get::<Payment>("/v1/payments/p-1");

    match result {
        Err(Error::DeserializationFailed {
            raw_response,
            status,
            ..
        }) => {
            assert_eq!(raw_response, "invalid json");
            assert_eq!(status.as_u16(), 200);
        }
        other => panic!("Expected DeserializationFailed, got {:?}", other),
    }
}

#[test]
fn test_http_errors_are_not_retried() {
    for code in [400, 404, 500, 503] {
        let stub = Stub::start();
        stub.mount(
            Mock::given(method("GET"))
                .and(path("/paymenthub/v1/monitor"))
                .respond_with(ResponseTemplate::new(code).set_body_json(error_body("1000"))),
        );

        let result = stub.client().get::<serde_json::Value>("/v1/monitor");

        assert!(matches!(result, Err(Error::Api(_))), "status {code}");
        assert_eq!(stub.received(), 1, "status {code}");
    }
}

#[test]
fn test_response_timeout_on_write_is_not_retried() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("POST"))
            .and(path("/paymenthub/v1/payments"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(payment())
                    .set_delay(Duration::from_secs(3)),
            ),
    );
    let client = Client::builder()
        .api_key("merchant:s3cret")
        .base_url(stub.server.uri())
        .unwrap()
        .response_timeout(Duration::from_secs(1))
        .max_automatic_retries(5)
        .build()
        .unwrap();

    let start = Instant::now();
    let err = client
        .post::<_, Payment>("/v1/payments", &payment_request())
        .unwrap_err();
    let elapsed = start.elapsed();

    // Bounded by the response timeout alone, not connect + response.
    assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(2500), "{elapsed:?}");

    match err {
        Error::Connection { message, kind, url } => {
            assert_eq!(kind, TransportFailureKind::ResponseTimeout);
            assert!(message.starts_with("Error connecting to "), "{message}");
            assert!(message.contains("Read timed out"), "{message}");
            assert!(url.ends_with("/paymenthub/v1/payments"), "{url}");
        }
        other => panic!("Expected Connection, got {:?}", other),
    }
    assert_eq!(stub.received(), 1);
}

#[test]
fn test_response_timeout_on_get_is_retried() {
    let stub = Stub::start();
    stub.mount(
        Mock::given(method("GET"))
            .and(path("/paymenthub/v1/payments/p-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(payment())
                    .set_delay(Duration::from_secs(2)),
            ),
    );
    let client = Client::builder()
        .api_key("merchant:s3cret")
        .base_url(stub.server.uri())
        .unwrap()
        .response_timeout(Duration::from_millis(500))
        .max_automatic_retries(1)
        .build()
        .unwrap();

    let err = client.get::<Payment>("/v1/payments/p-1").unwrap_err();

    match err {
        Error::Connection { kind, .. } => assert_eq!(kind, TransportFailureKind::ResponseTimeout),
        other => panic!("Expected Connection, got {:?}", other),
    }
    assert_eq!(stub.received(), 2);
}

#[test]
fn test_connect_timeout_to_unroutable_host() {
    init_tracing();
    let client = Client::builder()
        .api_key("merchant:s3cret")
        .base_url("http://10.255.255.1:81")
        .unwrap()
        .connect_timeout(Duration::from_secs(1))
        .max_automatic_retries(0)
        .build()
        .unwrap();

    let start = Instant::now();
    let err = client.get::<serde_json::Value>("/v1/monitor").unwrap_err();
    let elapsed = start.elapsed();

    let (message, kind) = match err {
        Error::Connection { message, kind, .. } => (message, kind),
        other => panic!("Expected Connection, got {:?}", other),
    };
    if kind == TransportFailureKind::Connect && elapsed < Duration::from_secs(1) {
        // The host network rejected the route outright; nothing to time out.
        eprintln!("skipping: 10.255.255.1 is unreachable here ({message})");
        return;
    }
    assert_eq!(kind, TransportFailureKind::ConnectTimeout, "{message}");
    assert!(message.contains("connect timed out"), "{message}");
    assert!(message.contains("10.255.255.1:81"), "{message}");
    assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
    assert!(elapsed <= Duration::from_secs(2), "{elapsed:?}");
}

/// Accepts connections, reads the request, and hangs up without answering.
fn hang_up_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut buffer = [0u8; 4096];
            let _ = stream.read(&mut buffer);
            drop(stream);
        }
    });
    format!("http://{address}")
}

#[test]
fn test_empty_response_is_a_response_failure() {
    init_tracing();
    let client = Client::builder()
        .api_key("merchant:s3cret")
        .base_url(hang_up_server())
        .unwrap()
        .build()
        .unwrap();

    let err = client
        .post::<_, serde_json::Value>("/v1/payments", &payment_request())
        .unwrap_err();

    match err {
        Error::Connection { message, kind, .. } => {
            assert_eq!(kind, TransportFailureKind::Response, "{message}");
            assert!(message.contains("failed to respond"), "{message}");
        }
        other => panic!("Expected Connection, got {:?}", other),
    }
}

/// Counts attempts while delegating to the real transport.
struct CountingTransport {
    inner: ReqwestTransport,
    attempts: AtomicUsize,
}

impl Transport for CountingTransport {
    fn send(
        &self,
        request: &PreparedRequest,
        timeouts: Timeouts,
    ) -> Result<RawResponse, TransportFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.send(request, timeouts)
    }
}

fn refused_timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(1),
        response: Duration::from_secs(60),
    }
}

fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

#[test]
fn test_get_retries_refused_connection_with_default_bound() {
    init_tracing();
    let transport = Arc::new(CountingTransport {
        inner: ReqwestTransport::new(refused_timeouts(), None).unwrap(),
        attempts: AtomicUsize::new(0),
    });
    let client = Client::builder()
        .api_key("merchant:s3cret")
        .base_url(refused_url())
        .unwrap()
        .connect_timeout(Duration::from_secs(1))
        .transport(transport.clone())
        .build()
        .unwrap();

    let start = Instant::now();
    let err = client.get::<serde_json::Value>("/v1/monitor").unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    assert!(err.is_retryable());
    match err {
        Error::Connection { message, kind, .. } => {
            assert!(kind.is_connect(), "{kind:?}");
            assert!(message.contains("/paymenthub/v1/monitor"), "{message}");
        }
        other => panic!("Expected Connection, got {:?}", other),
    }
    // Two backoff sleeps of at least 75ms and 225ms.
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
}

#[test]
fn test_write_on_refused_connection_is_attempted_once() {
    init_tracing();
    let transport = Arc::new(CountingTransport {
        inner: ReqwestTransport::new(refused_timeouts(), None).unwrap(),
        attempts: AtomicUsize::new(0),
    });
    let client = Client::builder()
        .api_key("merchant:s3cret")
        .base_url(refused_url())
        .unwrap()
        .connect_timeout(Duration::from_secs(1))
        .transport(transport.clone())
        .build()
        .unwrap();

    for result in [
        client.post::<_, serde_json::Value>("/v1/payments", &payment_request()).map(|_| ()),
        client.put::<_, serde_json::Value>("/v1/customers/c-1", &json!({})).map(|_| ()),
        client.patch::<_, serde_json::Value>("/v1/customers/c-1", &json!({})).map(|_| ()),
        client.delete("/v1/customers/c-1").map(|_| ()),
    ] {
        assert!(matches!(result, Err(Error::Connection { .. })));
    }
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
}

/// Replays a fixed script of outcomes and records when each attempt started.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportFailure>>>,
    started: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<RawResponse, TransportFailure>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            started: Mutex::new(Vec::new()),
        })
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        _request: &PreparedRequest,
        _timeouts: Timeouts,
    ) -> Result<RawResponse, TransportFailure> {
        self.started.lock().unwrap().push(Instant::now());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(TransportFailure::new(
                TransportFailureKind::Connect,
                "script exhausted",
            ))
        })
    }
}

fn refused() -> Result<RawResponse, TransportFailure> {
    Err(TransportFailure::new(
        TransportFailureKind::Connect,
        "Connection refused",
    ))
}

fn ok_json(body: serde_json::Value) -> Result<RawResponse, TransportFailure> {
    Ok(RawResponse::new(
        StatusCode::OK,
        HeaderMap::new(),
        serde_json::to_vec(&body).unwrap(),
    ))
}

fn scripted_client(transport: Arc<ScriptedTransport>, retries: u32) -> Client {
    Client::builder()
        .api_key("merchant:s3cret")
        .max_automatic_retries(retries)
        .transport(transport)
        .build()
        .unwrap()
}

#[test]
fn test_get_succeeds_after_transport_failures() {
    init_tracing();
    let transport = ScriptedTransport::new(vec![
        refused(),
        refused(),
        refused(),
        ok_json(json!({"status": "READY"})),
    ]);
    let client = scripted_client(transport.clone(), 3);

    let response = client.get::<serde_json::Value>("/v1/monitor").unwrap();

    assert_eq!(response.data["status"], "READY");
    assert_eq!(response.attempts, 4);
    assert!(response.was_retried());

    let started = transport.started.lock().unwrap();
    assert_eq!(started.len(), 4);
    let gaps: Vec<_> = started.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let minimums = [75, 225, 675].map(Duration::from_millis);
    for (gap, minimum) in gaps.iter().zip(minimums) {
        assert!(*gap >= minimum, "gap {gap:?} shorter than {minimum:?}");
    }
    assert!(gaps.windows(2).all(|pair| pair[0] <= pair[1]), "{gaps:?}");
}

#[test]
fn test_per_call_retry_override() {
    init_tracing();
    let transport = ScriptedTransport::new(vec![refused(), refused()]);
    let client = scripted_client(transport.clone(), 2);

    let metadata = RequestMetadata::new(Method::GET, "/v1/monitor");
    let options = CallOptions::new().max_automatic_retries(0);
    let err = client
        .call::<(), serde_json::Value>(metadata, None, Some(&options))
        .unwrap_err();

    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(transport.started.lock().unwrap().len(), 1);
}

#[test]
fn test_http_failure_ends_retry_loop() {
    init_tracing();
    let transport = ScriptedTransport::new(vec![
        refused(),
        Ok(RawResponse::new(
            StatusCode::CONFLICT,
            HeaderMap::new(),
            serde_json::to_vec(&error_body("5031")).unwrap(),
        )),
        ok_json(json!({})),
    ]);
    let client = scripted_client(transport.clone(), 5);

    let err = client.get::<serde_json::Value>("/v1/monitor").unwrap_err();

    assert_eq!(err.api_kind(), Some(ApiErrorKind::RequestConflict));
    assert_eq!(transport.started.lock().unwrap().len(), 2);
}

#[test]
fn test_invalid_configuration_is_rejected_before_io() {
    let cases = [
        (Client::builder(), "non-blank api key"),
        (Client::builder().api_key("no-colon"), "does not match format"),
        (
            Client::builder().api_key("merchant:s3cret").max_automatic_retries(6),
            "Maximum allowed number of automatic retries is 5",
        ),
        (
            Client::builder().api_key("merchant:s3cret").connect_timeout(Duration::ZERO),
            "Connect timeout must be a positive value",
        ),
        (
            Client::builder().api_key("merchant:s3cret").response_timeout(Duration::ZERO),
            "Response timeout must be a positive value",
        ),
    ];

    for (builder, expected) in cases {
        match builder.build() {
            Err(Error::InvalidConfiguration(message)) => {
                assert!(message.contains(expected), "{message}")
            }
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }
    }
}

#[test]
fn test_invalid_call_options_are_rejected() {
    let transport = ScriptedTransport::new(vec![ok_json(json!({}))]);
    let client = scripted_client(transport.clone(), 2);

    let options = CallOptions::new().max_automatic_retries(9);
    let err = client
        .call::<(), serde_json::Value>(
            RequestMetadata::new(Method::GET, "/v1/monitor"),
            None,
            Some(&options),
        )
        .unwrap_err();

    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert!(transport.started.lock().unwrap().is_empty());
}
