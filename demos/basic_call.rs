//! Basic example: health check, a payment, and reading it back.
//!
//! This example shows how to:
//! - Create a client for the test environment
//! - Make GET and POST requests
//! - Pass per-call options and query parameters
//! - Access response data and metadata
//!
//! Run with: `PAYCALL_API_KEY=id:secret cargo run --example basic_call`

use http::Method;
use paycall::metadata::RequestMetadata;
use paycall::{CallOptions, Client, Environment, Error, PaymentSimulator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Monitor {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    merchant_ref_num: String,
    amount: u64,
    currency_code: String,
    payment_handle_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct Payment {
    id: String,
    merchant_ref_num: String,
    amount: u64,
    status: String,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("paycall=debug,basic_call=info")
        .init();

    let api_key = std::env::var("PAYCALL_API_KEY").unwrap_or_default();
    let client = Client::builder()
        .api_key(api_key)
        .environment(Environment::Test)
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    println!("=== GET Request Example ===");
    let monitor = client.get::<Monitor>("/v1/monitor")?;
    println!("API status: {}", monitor.data.status);
    println!("Request latency: {:?}", monitor.latency);
    println!("Attempts: {}", monitor.attempts);
    println!();

    println!("=== POST Request Example ===");
    let request = PaymentRequest {
        merchant_ref_num: format!("demo-{}", std::process::id()),
        amount: 1099,
        currency_code: "USD".to_string(),
        payment_handle_token: "SCOtxdEzfcHW25lD".to_string(),
    };
    let options = CallOptions::new()
        .response_timeout(Duration::from_secs(30))
        .simulator(PaymentSimulator::External);
    let payment = client.call::<_, Payment>(
        RequestMetadata::new(Method::POST, "/v1/payments"),
        Some(&request),
        Some(&options),
    )?;
    println!("Created payment {} with status {}", payment.data.id, payment.data.status);
    println!("Correlation id: {:?}", payment.correlation_id);
    println!();

    println!("=== Query Example ===");
    let metadata = RequestMetadata::new(Method::GET, "/v1/payments")
        .with_query_param("merchantRefNum", &request.merchant_ref_num)
        .with_query_param("limit", 1);
    let found = client.call::<(), serde_json::Value>(metadata, None, None)?;
    println!("Raw response length: {} bytes", found.raw_body.len());
    println!("Content-Type: {:?}", found.header("content-type"));
    println!("Was retried: {}", found.was_retried());

    Ok(())
}
