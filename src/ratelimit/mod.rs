//! Rate limiting logic and state management.

mod clock;
mod ledger;
mod limiter;
mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{Admission, EndpointStats, RateLimiter};
pub use retry::{
    RateLimitedCall, RetryCallback, RetryOptions, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY,
    DEFAULT_MAX_RETRIES,
};
