//! The global rate limiter port (§4.3): a cross-process gate shared by
//! every pipeline process touching the same external resource (e.g. an
//! LLM endpoint with a provider-side rate limit).

use async_trait::async_trait;

use crate::error::Result;

/// A permit to perform one rate-limited operation. Dropping the permit
/// releases any resource the implementation held (a lock file, a token
/// bucket slot); callers do not call an explicit `release`.
pub trait RatePermit: Send {}

/// A rate limiter shared across process boundaries. The domain only needs
/// the acquire/release lifecycle; the mechanism (file lock, shared memory
/// token bucket, external service) is an infrastructure concern.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Blocks until a permit is available, then returns it. The permit's
    /// `Drop` releases the slot.
    async fn acquire(&self) -> Result<Box<dyn RatePermit>>;
}
