//! # Paycall - A blocking payments API client
//!
//! Paycall executes typed calls against the payments API. It validates the
//! client configuration up front, applies connect and response timeouts,
//! retries idempotent calls that never got a response, and turns every
//! response into either the caller's type or a structured error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use paycall::{Client, Environment};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! #[serde(rename_all = "camelCase")]
//! struct CustomerRequest {
//!     merchant_customer_id: String,
//!     first_name: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct Customer {
//!     id: String,
//!     status: String,
//! }
//!
//! fn main() -> Result<(), paycall::Error> {
//!     let client = Client::builder()
//!         .api_key("merchant:s3cret")
//!         .environment(Environment::Test)
//!         .response_timeout(Duration::from_secs(20))
//!         .build()?;
//!
//!     let customer: paycall::Response<Customer> = client.post(
//!         "/v1/customers",
//!         &CustomerRequest {
//!             merchant_customer_id: "cust-42".to_string(),
//!             first_name: "Alice".to_string(),
//!         },
//!     )?;
//!     println!("Customer {} is {}", customer.data.id, customer.data.status);
//!     println!("Request took {:?}", customer.latency);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every non-2xx response becomes an [`ApiError`] whose [`ApiErrorKind`] is
//! picked from the status code. The correlation id of the response is kept on
//! every kind:
//!
//! ```no_run
//! use paycall::{ApiErrorKind, Client, Error};
//!
//! # fn example(client: &Client) {
//! match client.get::<serde_json::Value>("/v1/payments/unknown") {
//!     Ok(response) => println!("Success: {:?}", response.data),
//!     Err(Error::Api(err)) if err.kind == ApiErrorKind::InvalidRequest => {
//!         for field in err.detail.iter().flat_map(|d| &d.field_errors) {
//!             eprintln!("{}: {}", field.field, field.error);
//!         }
//!     }
//!     Err(Error::Api(err)) => {
//!         eprintln!("{} (correlation id {:?})", err, err.correlation_id);
//!     }
//!     Err(Error::Connection { message, .. }) => eprintln!("{}", message),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```
//!
//! ## Retries
//!
//! Only GET calls are retried, only when no response was received, and at
//! most [`config::MAX_AUTOMATIC_RETRIES`] times. Delays grow as
//! `100ms * 3^(n-1)` scaled by a random factor in `[0.75, 1.0]`; see
//! [`retry::Backoff`].

pub mod classifier;
mod client;
pub mod config;
mod error;
pub mod executor;
pub mod metadata;
pub mod proxy;
mod response;
pub mod retry;
pub mod transport;

pub use client::{Client, ClientBuilder, API_PATH_PREFIX};
pub use config::{CallOptions, Environment, PaymentSimulator};
pub use error::{
    AdditionalDetail, ApiError, ApiErrorKind, DeclinedResponse, Error, ErrorDetail, FieldError,
    Result,
};
pub use proxy::ProxyConfig;
pub use response::{RawResponse, Response, CORRELATION_ID_HEADER};
pub use transport::{PreparedRequest, Timeouts, Transport, TransportFailure, TransportFailureKind};
