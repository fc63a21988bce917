//! Rate-limit detection and bounded retry for hosted APIs

use crate::engines::EngineResponse;
use crate::error::{Result, SearchError};
use chrono::{DateTime, TimeZone, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Attempts per request before a rate limit becomes a hard failure
pub const MAX_ATTEMPTS: usize = 3;

/// Time left until `reset`, zero if it already passed
pub fn delay_until(reset: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (reset - now).to_std().unwrap_or(Duration::ZERO)
}

/// Reset instant of a rate-limited response, `None` if the response is not
/// a rate limit.
///
/// HTTP 429 is always a rate limit. HTTP 403 is one only when the API also
/// reports zero remaining requests or asks for a retry. The reset comes from
/// `x-ratelimit-reset` / `ratelimit-reset` (epoch seconds), then
/// `retry-after` (seconds), then `now`.
pub fn rate_limit_reset(response: &EngineResponse, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let remaining = response
        .header("x-ratelimit-remaining")
        .or_else(|| response.header("ratelimit-remaining"));
    let retry_after = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok());

    let limited = match response.status {
        429 => true,
        403 => remaining.map(str::trim) == Some("0") || retry_after.is_some(),
        _ => false,
    };
    if !limited {
        return None;
    }

    let reset = response
        .header("x-ratelimit-reset")
        .or_else(|| response.header("ratelimit-reset"))
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    Some(
        reset
            .or_else(|| retry_after.map(|secs| now + chrono::Duration::seconds(secs)))
            .unwrap_or(now),
    )
}

/// Turn a rate-limited response into [`SearchError::RateLimited`], any other
/// non-2xx response into [`SearchError::RemoteApi`].
pub fn check_response(response: EngineResponse, what: &str) -> Result<EngineResponse> {
    if response.is_success() {
        return Ok(response);
    }
    match rate_limit_reset(&response, Utc::now()) {
        Some(reset) => Err(SearchError::RateLimited { reset }),
        None => Err(response.error(what)),
    }
}

/// Run `op`, sleeping until the reported reset and retrying the same request
/// whenever it is rate limited, for at most [`MAX_ATTEMPTS`] attempts. Every
/// other error is returned immediately.
pub async fn retry_rate_limited<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_reset = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Err(SearchError::RateLimited { reset }) => {
                last_reset = Some(reset);
                if attempt == MAX_ATTEMPTS {
                    break;
                }
                let delay = delay_until(reset, Utc::now());
                debug!(
                    "{}: hit rate limit (attempt {}/{}), waiting {:?} before retrying",
                    what, attempt, MAX_ATTEMPTS, delay
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }

    Err(SearchError::RemoteApi(format!(
        "{}: rate limit still exceeded after {} attempts (resets at {})",
        what,
        MAX_ATTEMPTS,
        last_reset.map(|r| r.to_rfc3339()).unwrap_or_default()
    )))
}
