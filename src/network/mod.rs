//! HTTP networking module
//!
//! Provides the HTTP client and rate-limit handling used by the hosted backends.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{check_response, delay_until, rate_limit_reset, retry_rate_limited, MAX_ATTEMPTS};
