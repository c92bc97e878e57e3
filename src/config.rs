//! Client configuration and per-call overrides.
//!
//! A [`ClientConfig`] is assembled by [`ClientBuilder`](crate::ClientBuilder) and
//! validated exactly once, before any client exists. [`CallOptions`] override a
//! subset of the settings for a single call and go through the same checks.

use crate::proxy::ProxyConfig;
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for the response to arrive once connected.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of automatic retries for idempotent calls.
pub const DEFAULT_MAX_AUTOMATIC_RETRIES: u32 = 2;

/// Upper bound accepted for `max_automatic_retries`.
pub const MAX_AUTOMATIC_RETRIES: u32 = 5;

const BASE_URL_LIVE: &str = "https://api.paysafe.com";
const BASE_URL_TEST: &str = "https://api.test.paysafe.com";

/// The payments environment a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production, `https://api.paysafe.com`.
    Live,
    /// Sandbox, `https://api.test.paysafe.com`.
    #[default]
    Test,
}

impl Environment {
    /// Returns the base URL of this environment.
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Live => BASE_URL_LIVE,
            Environment::Test => BASE_URL_TEST,
        }
    }
}

/// Simulated processing outcome, honoured by the test environment only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSimulator {
    /// The external simulator (default behaviour of the sandbox).
    External,
    /// The internal simulator.
    Internal,
}

impl PaymentSimulator {
    /// The value sent in the `Simulator` request header.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentSimulator::External => "EXTERNAL",
            PaymentSimulator::Internal => "INTERNAL",
        }
    }
}

/// API credentials in `id:secret` form.
///
/// The secret is never printed by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    secret: String,
}

impl Credential {
    /// Parses an `id:secret` API key.
    ///
    /// Both halves must be non-empty and contain neither whitespace nor `:`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the key is blank or malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use paycall::config::Credential;
    ///
    /// assert!(Credential::parse("merchant:s3cret").is_ok());
    /// assert!(Credential::parse("merchant").is_err());
    /// assert!(Credential::parse("merchant: s3cret").is_err());
    /// ```
    pub fn parse(api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "You must provide non-blank api key in format 'username:password'".to_string(),
            ));
        }

        let invalid = || {
            Error::InvalidConfiguration("Api key does not match format 'username:password'".to_string())
        };
        let (id, secret) = api_key.split_once(':').ok_or_else(invalid)?;
        let well_formed = |part: &str| {
            !part.is_empty() && !part.chars().any(|c| c == ':' || c.is_whitespace())
        };
        if !well_formed(id) || !well_formed(secret) {
            return Err(invalid());
        }

        Ok(Self {
            id: id.to_string(),
            secret: secret.to_string(),
        })
    }

    /// The public half of the key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The private half of the key.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Immutable, validated client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL requests are resolved against.
    pub base_url: Url,
    /// Environment the client was configured for.
    pub environment: Environment,
    /// Raw API key as supplied; parsed by [`ClientConfig::validate`].
    pub api_key: String,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Time allowed for the response once connected.
    pub response_timeout: Duration,
    /// Additional attempts allowed for idempotent calls after the first one.
    pub max_automatic_retries: u32,
    /// Explicit proxy; takes precedence over proxy environment variables.
    pub proxy: Option<ProxyConfig>,
}

impl ClientConfig {
    /// Checks every setting, returning the parsed credential on success.
    ///
    /// Checks run in a fixed order (credential, retries, connect timeout,
    /// response timeout) and the first violation is reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] describing the first invalid setting.
    pub fn validate(&self) -> Result<Credential> {
        let credential = Credential::parse(&self.api_key)?;
        validate_max_automatic_retries(Some(self.max_automatic_retries))?;
        validate_connect_timeout(Some(self.connect_timeout))?;
        validate_response_timeout(Some(self.response_timeout))?;
        Ok(credential)
    }
}

/// Per-call overrides of the client configuration.
///
/// Unset fields fall back to the client's [`ClientConfig`].
///
/// # Examples
///
/// ```
/// use paycall::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .connect_timeout(Duration::from_secs(5))
///     .max_automatic_retries(0);
/// assert_eq!(options.max_automatic_retries, Some(0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Connect timeout for this call.
    pub connect_timeout: Option<Duration>,
    /// Response timeout for this call.
    pub response_timeout: Option<Duration>,
    /// Retry bound for this call.
    pub max_automatic_retries: Option<u32>,
    /// Simulator for write calls against the test environment.
    pub simulator: Option<PaymentSimulator>,
}

impl CallOptions {
    /// Creates options that override nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Overrides the response timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Overrides the retry bound.
    pub fn max_automatic_retries(mut self, retries: u32) -> Self {
        self.max_automatic_retries = Some(retries);
        self
    }

    /// Selects the payment simulator.
    pub fn simulator(mut self, simulator: PaymentSimulator) -> Self {
        self.simulator = Some(simulator);
        self
    }

    /// Validates the overrides that are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for the first invalid override.
    pub fn validate(&self) -> Result<()> {
        validate_max_automatic_retries(self.max_automatic_retries)?;
        validate_connect_timeout(self.connect_timeout)?;
        validate_response_timeout(self.response_timeout)
    }
}

/// Settings in force for one call, after applying [`CallOptions`] on top of
/// the client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveOptions {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_automatic_retries: u32,
    pub simulator: Option<PaymentSimulator>,
}

impl EffectiveOptions {
    /// Validates `options` and merges them with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if an override is invalid.
    pub fn resolve(config: &ClientConfig, options: Option<&CallOptions>) -> Result<Self> {
        let Some(options) = options else {
            return Ok(Self {
                connect_timeout: config.connect_timeout,
                response_timeout: config.response_timeout,
                max_automatic_retries: config.max_automatic_retries,
                simulator: None,
            });
        };
        options.validate()?;

        Ok(Self {
            connect_timeout: options.connect_timeout.unwrap_or(config.connect_timeout),
            response_timeout: options.response_timeout.unwrap_or(config.response_timeout),
            max_automatic_retries: options
                .max_automatic_retries
                .unwrap_or(config.max_automatic_retries),
            simulator: options.simulator,
        })
    }
}

fn validate_max_automatic_retries(retries: Option<u32>) -> Result<()> {
    match retries {
        Some(retries) if retries > MAX_AUTOMATIC_RETRIES => Err(Error::InvalidConfiguration(format!(
            "Maximum allowed number of automatic retries is {MAX_AUTOMATIC_RETRIES}"
        ))),
        _ => Ok(()),
    }
}

fn validate_connect_timeout(timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(timeout) if timeout.is_zero() => Err(Error::InvalidConfiguration(
            "Connect timeout must be a positive value".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_response_timeout(timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(timeout) if timeout.is_zero() => Err(Error::InvalidConfiguration(
            "Response timeout must be a positive value".to_string(),
        )),
        _ => Ok(()),
    }
}
