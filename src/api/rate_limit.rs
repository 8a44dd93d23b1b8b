//! Server-wide request throttling
//!
//! One token bucket covers every route. Rejected requests get the usual JSON
//! error body with a `Retry-After` header.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::{ApiError, ApiState};
use crate::Error;

/// Requests-per-minute bucket shared by all handlers
pub struct RequestThrottle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    clock: DefaultClock,
    per_minute: NonZeroU32,
}

impl RequestThrottle {
    /// Bucket refilling `requests_per_minute` tokens a minute, all available at once
    ///
    /// Zero is treated as one so a misconfigured limit still admits traffic.
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            clock: DefaultClock::default(),
            per_minute,
        }
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.per_minute.get()
    }

    /// Take a token, or report how long until one is free
    ///
    /// # Errors
    ///
    /// Returns the wait before the next request would be admitted
    pub fn admit(&self) -> std::result::Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

/// Reject requests over the configured rate; a no-op when no limit is set
pub async fn throttle(State(state): State<Arc<ApiState>>, req: Request, next: Next) -> Response {
    let Some(bucket) = &state.rate_limiter else {
        return next.run(req).await;
    };

    match bucket.admit() {
        Ok(()) => next.run(req).await,
        Err(wait) => {
            let retry_after = retry_after_secs(wait);
            tracing::warn!(
                path = %req.uri().path(),
                limit = bucket.limit(),
                retry_after,
                "rate limit exceeded"
            );
            let mut response = ApiError(Error::RateLimited(format!(
                "more than {} requests per minute; retry in {retry_after}s",
                bucket.limit()
            )))
            .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

/// Whole seconds to wait, never zero
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
