//! Example demonstrating error handling.
//!
//! This example shows how to:
//! - Match on every error variant
//! - Read field errors from a rejected request
//! - Recover the typed body of a declined payment
//! - Report correlation ids to support
//!
//! Run with: `PAYCALL_API_KEY=id:secret cargo run --example error_handling`

use paycall::{ApiError, ApiErrorKind, Client, Error};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    merchant_ref_num: String,
    amount: u64,
    currency_code: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Payment {
    id: String,
    status: String,
}

fn describe(err: &Error) {
    match err {
        Error::InvalidConfiguration(message) => {
            println!("Configuration rejected: {}", message);
        }
        Error::Connection { message, kind, .. } => {
            println!("No response ({})", kind);
            println!("  {}", message);
            println!("  Retryable: {}", err.is_retryable());
        }
        Error::Api(api) => describe_api(api),
        Error::DeserializationFailed {
            raw_response,
            serde_error,
            status,
            ..
        } => {
            println!("Unexpected body (status {})", status);
            println!("  Serde error: {}", serde_error);
            println!("  Raw response: {}", raw_response);
        }
        Error::SerializationFailed(message) => {
            println!("Request could not be encoded: {}", message);
        }
        Error::InvalidUrl(e) => println!("Invalid URL: {}", e),
    }
}

fn describe_api(err: &ApiError) {
    println!("{} (status {})", err.kind, err.status);
    println!("  Correlation id: {:?}", err.correlation_id);

    match err.kind {
        ApiErrorKind::RequestDeclined => {
            if let Some(payment) = err.declined_response::<Payment>() {
                println!("  Declined payment {} is {}", payment.id, payment.status);
            }
        }
        ApiErrorKind::UnreadableErrorResponse => {
            println!("  {}", err.message);
            println!("  Raw response: {}", err.raw_response);
        }
        _ => {}
    }

    if let Some(detail) = &err.detail {
        println!("  Code {}: {}", detail.code, detail.message);
        for field in &detail.field_errors {
            println!("  Field {}: {}", field.field, field.error);
        }
        for line in &detail.details {
            println!("  - {}", line);
        }
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter("paycall=info").init();

    println!("=== Example 1: Invalid configuration ===");
    if let Err(e) = Client::builder().api_key("not-a-key").build() {
        describe(&e);
    }
    println!();

    let api_key = std::env::var("PAYCALL_API_KEY").unwrap_or_else(|_| "demo:demo".to_string());
    let client = match Client::builder().api_key(api_key).build() {
        Ok(client) => client,
        Err(e) => {
            describe(&e);
            return;
        }
    };

    println!("=== Example 2: Rejected request ===");
    let incomplete = PaymentRequest {
        merchant_ref_num: String::new(),
        amount: 0,
        currency_code: "USD".to_string(),
    };
    if let Err(e) = client.post::<_, Payment>("/v1/payments", &incomplete) {
        describe(&e);
    }
    println!();

    println!("=== Example 3: Unknown resource ===");
    if let Err(e) = client.get::<Payment>("/v1/payments/does-not-exist") {
        describe(&e);
    }
    println!();

    println!("=== Example 4: Unreachable host ===");
    let unreachable = Client::builder()
        .api_key("demo:demo")
        .base_url("http://127.0.0.1:9")
        .and_then(|builder| builder.connect_timeout(Duration::from_millis(500)).build());
    match unreachable {
        Ok(client) => {
            if let Err(e) = client.get::<Payment>("/v1/monitor") {
                describe(&e);
            }
        }
        Err(e) => describe(&e),
    }
}
