//! Blocking payments API client.
//!
//! The [`Client`] type is the main entry point for making API calls.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    classifier::ResponseClassifier,
    config::{
        CallOptions, ClientConfig, Credential, EffectiveOptions, Environment,
        DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_AUTOMATIC_RETRIES, DEFAULT_RESPONSE_TIMEOUT,
    },
    executor::{connection_error, Outcome, RequestExecutor},
    metadata::RequestMetadata,
    proxy::{self, ProxyConfig},
    response::RawResponse,
    retry::{RetryOutcome, RetryPolicy},
    transport::{PreparedRequest, ReqwestTransport, Timeouts, Transport},
    Error, Response, Result,
};
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Path prefix of every API endpoint.
pub const API_PATH_PREFIX: &str = "/paymenthub";

const CONTENT_TYPE_JSON: &str = "application/json;charset=utf-8";
const TRANSACTION_SOURCE_HEADER: &str = "x-transaction-source";
const TRANSACTION_SOURCE: &str = "RustSDK";
const SIMULATOR_HEADER: &str = "simulator";

/// A blocking client for the payments API.
///
/// The client is cheap to clone and safe to share between threads; every
/// call blocks the calling thread until it completes, including any backoff
/// sleeps between retries.
///
/// # Examples
///
/// ```no_run
/// use paycall::{Client, Environment, Response};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// #[serde(rename_all = "camelCase")]
/// struct PaymentRequest {
///     merchant_ref_num: String,
///     amount: u64,
///     currency_code: String,
///     payment_handle_token: String,
/// }
///
/// #[derive(Deserialize)]
/// struct Payment {
///     id: String,
///     status: String,
/// }
///
/// # fn example() -> Result<(), paycall::Error> {
/// let client = Client::builder()
///     .api_key("merchant:s3cret")
///     .environment(Environment::Test)
///     .build()?;
///
/// let request = PaymentRequest {
///     merchant_ref_num: "order-42".to_string(),
///     amount: 1099,
///     currency_code: "USD".to_string(),
///     payment_handle_token: "SCOtxdEzfcHW25lD".to_string(),
/// };
/// let payment: Response<Payment> = client.post("/v1/payments", &request)?;
/// println!("Payment {} is {}", payment.data.id, payment.data.status);
///
/// let fetched: Response<Payment> = client.get(format!("/v1/payments/{}", payment.data.id))?;
/// println!("Fetched after {} attempt(s)", fetched.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    credential: Credential,
    default_headers: HeaderMap,
    executor: RequestExecutor,
    classifier: ResponseClassifier,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The validated configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Makes a typed API call.
    ///
    /// Runs the whole pipeline: option validation, request preparation, one or
    /// more attempts under the retry policy, and classification of the final
    /// response. Only GET calls are retried, and only when no response was
    /// received at all.
    ///
    /// # Type Parameters
    ///
    /// * `Req` - The request body type (must implement `Serialize`)
    /// * `Res` - The success body type, also used to decode a 402 body
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidConfiguration`] if `options` are invalid
    /// * [`Error::SerializationFailed`] if `body` cannot be encoded
    /// * [`Error::Connection`] if no response was obtained
    /// * [`Error::Api`] for any non-2xx response
    /// * [`Error::DeserializationFailed`] if a 2xx body is not a valid `Res`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use paycall::{CallOptions, Client, metadata::RequestMetadata};
    /// use http::Method;
    /// use std::time::Duration;
    ///
    /// # fn example() -> Result<(), paycall::Error> {
    /// let client = Client::builder().api_key("merchant:s3cret").build()?;
    ///
    /// let metadata = RequestMetadata::new(Method::GET, "/v1/payments")
    ///     .with_query_param("merchantRefNum", "order-42")
    ///     .with_query_param("limit", 5);
    /// let options = CallOptions::new()
    ///     .response_timeout(Duration::from_secs(10))
    ///     .max_automatic_retries(4);
    ///
    /// let payments = client.call::<(), serde_json::Value>(metadata, None, Some(&options))?;
    /// println!("{}", payments.raw_body);
    /// # Ok(())
    /// # }
    /// ```
    pub fn call<Req, Res>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
        options: Option<&CallOptions>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned + Any + Send + Sync,
    {
        let (raw, latency, attempts) = self.execute(&metadata, body, options)?;
        self.inner.classifier.classify(raw, latency, attempts)
    }

    /// Makes an API call whose success body is ignored.
    ///
    /// Used for DELETE endpoints, which may answer with an empty body.
    ///
    /// # Errors
    ///
    /// Same as [`Client::call`], minus deserialization of the success body.
    pub fn call_empty<Req>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
        options: Option<&CallOptions>,
    ) -> Result<Response<()>>
    where
        Req: Serialize,
    {
        let (raw, latency, attempts) = self.execute(&metadata, body, options)?;
        self.inner.classifier.classify_empty(raw, latency, attempts)
    }

    /// Runs the attempts of one call and returns the final response.
    fn execute<Req>(
        &self,
        metadata: &RequestMetadata,
        body: Option<&Req>,
        options: Option<&CallOptions>,
    ) -> Result<(RawResponse, Duration, usize)>
    where
        Req: Serialize,
    {
        let effective = EffectiveOptions::resolve(&self.inner.config, options)?;
        let request = self.prepare(metadata, body, &effective)?;
        let timeouts = Timeouts {
            connect: effective.connect_timeout,
            response: effective.response_timeout,
        };
        let policy = RetryPolicy::new(effective.max_automatic_retries, metadata.is_idempotent());

        let start_time = Instant::now();
        let RetryOutcome { outcome, attempts } =
            policy.run(|attempt| self.inner.executor.execute(&request, timeouts, attempt));
        let latency = start_time.elapsed();

        match outcome {
            Outcome::Success(raw) | Outcome::HttpFailure(raw) => Ok((raw, latency, attempts)),
            Outcome::TransportFailure(failure) => {
                tracing::warn!(
                    method = %request.method,
                    path = %metadata.path,
                    attempts = attempts,
                    "Request failed without a response"
                );
                Err(connection_error(&request.url, failure))
            }
        }
    }

    /// Builds the URL, headers, and body of a call.
    fn prepare<Req>(
        &self,
        metadata: &RequestMetadata,
        body: Option<&Req>,
        effective: &EffectiveOptions,
    ) -> Result<PreparedRequest>
    where
        Req: Serialize,
    {
        let url = self.endpoint_url(metadata);

        let mut headers = self.inner.default_headers.clone();
        for (name, value) in &metadata.headers {
            headers.insert(name.clone(), value.clone());
        }
        if metadata.method != Method::GET && self.inner.config.environment == Environment::Test {
            if let Some(simulator) = effective.simulator {
                headers.insert(
                    HeaderName::from_static(SIMULATOR_HEADER),
                    HeaderValue::from_static(simulator.as_str()),
                );
            }
        }

        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| Error::SerializationFailed(e.to_string()))?;

        Ok(PreparedRequest {
            method: metadata.method.clone(),
            url,
            headers,
            credential: self.inner.credential.clone(),
            body,
        })
    }

    fn endpoint_url(&self, metadata: &RequestMetadata) -> Url {
        let base = &self.inner.config.base_url;
        let mut url = base.clone();

        let separator = if metadata.path.starts_with('/') { "" } else { "/" };
        url.set_path(&format!(
            "{}{}{}{}",
            base.path().trim_end_matches('/'),
            API_PATH_PREFIX,
            separator,
            metadata.path
        ));

        if !metadata.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(&metadata.query_params);
        }
        url
    }

    /// Makes a GET request to the specified path.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use paycall::Client;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Monitor { status: String }
    ///
    /// # fn example() -> Result<(), paycall::Error> {
    /// let client = Client::builder().api_key("merchant:s3cret").build()?;
    /// let monitor: paycall::Response<Monitor> = client.get("/v1/monitor")?;
    /// println!("API is {}", monitor.data.status);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned + Any + Send + Sync,
    {
        let metadata = RequestMetadata::new(Method::GET, path);
        self.call::<(), Res>(metadata, None, None)
    }

    /// Makes a POST request to the specified path with a JSON body.
    pub fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned + Any + Send + Sync,
    {
        let metadata = RequestMetadata::new(Method::POST, path);
        self.call(metadata, Some(body), None)
    }

    /// Makes a PUT request to the specified path with a JSON body.
    pub fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned + Any + Send + Sync,
    {
        let metadata = RequestMetadata::new(Method::PUT, path);
        self.call(metadata, Some(body), None)
    }

    /// Makes a PATCH request to the specified path with a JSON body.
    pub fn patch<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned + Any + Send + Sync,
    {
        let metadata = RequestMetadata::new(Method::PATCH, path);
        self.call(metadata, Some(body), None)
    }

    /// Makes a DELETE request to the specified path, ignoring any success body.
    pub fn delete(&self, path: impl Into<String>) -> Result<Response<()>> {
        let metadata = RequestMetadata::new(Method::DELETE, path);
        self.call_empty::<()>(metadata, None, None)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Nothing is validated until [`ClientBuilder::build`], which checks every
/// setting and fails before any client or connection pool is created.
///
/// # Examples
///
/// ```no_run
/// use paycall::{ClientBuilder, Environment, ProxyConfig};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), paycall::Error> {
/// let client = ClientBuilder::new()
///     .api_key("merchant:s3cret")
///     .environment(Environment::Live)
///     .connect_timeout(Duration::from_secs(10))
///     .response_timeout(Duration::from_secs(30))
///     .max_automatic_retries(3)
///     .proxy(ProxyConfig::new("http://proxy.internal:3128")?)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    api_key: Option<String>,
    environment: Environment,
    base_url: Option<Url>,
    connect_timeout: Duration,
    response_timeout: Duration,
    max_automatic_retries: u32,
    proxy: Option<ProxyConfig>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            api_key: None,
            environment: Environment::default(),
            base_url: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_automatic_retries: DEFAULT_MAX_AUTOMATIC_RETRIES,
            proxy: None,
            transport: None,
        }
    }

    /// Sets the API key, in `id:secret` form.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Selects the environment. Defaults to [`Environment::Test`].
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Overrides the environment's base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the time allowed to establish a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the time allowed for the response once connected.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets how many times an idempotent call is retried after a transport
    /// failure. At most 5.
    pub fn max_automatic_retries(mut self, retries: u32) -> Self {
        self.max_automatic_retries = retries;
        self
    }

    /// Routes requests through `proxy`, ignoring proxy environment variables.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Replaces the default `reqwest` transport.
    ///
    /// With a custom transport the proxy settings are left to it.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the settings and builds the `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for the first invalid setting,
    /// checked in the order credential, retries, connect timeout, response
    /// timeout.
    pub fn build(self) -> Result<Client> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(self.environment.base_url())?,
        };

        let config = ClientConfig {
            base_url,
            environment: self.environment,
            api_key: self.api_key.unwrap_or_default(),
            connect_timeout: self.connect_timeout,
            response_timeout: self.response_timeout,
            max_automatic_retries: self.max_automatic_retries,
            proxy: self.proxy,
        };
        let credential = config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let proxy = proxy::resolve(config.proxy.as_ref(), &config.base_url)?;
                if let Some(proxy) = &proxy {
                    tracing::debug!(proxy = %proxy.url(), "Using proxy");
                }
                let timeouts = Timeouts {
                    connect: config.connect_timeout,
                    response: config.response_timeout,
                };
                Arc::new(ReqwestTransport::new(timeouts, proxy)?)
            }
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                credential,
                default_headers: default_headers()?,
                executor: RequestExecutor::new(transport),
                classifier: ResponseClassifier::new(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_headers() -> Result<HeaderMap> {
    let user_agent = format!(
        "PaymentsAPI RustSDK/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    let user_agent = HeaderValue::from_str(&user_agent)
        .map_err(|e| Error::InvalidConfiguration(format!("Invalid header value: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    headers.insert(
        HeaderName::from_static(TRANSACTION_SOURCE_HEADER),
        HeaderValue::from_static(TRANSACTION_SOURCE),
    );
    headers.insert(USER_AGENT, user_agent);
    Ok(headers)
}
