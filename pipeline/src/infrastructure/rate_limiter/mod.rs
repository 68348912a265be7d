//! File-lock-backed implementation of the domain's `RateLimiter` port,
//! plus decorators that gate an `LlmClient`/`SearchAdapter` behind one.

pub mod file_rate_limiter;
pub mod limited_adapters;

pub use file_rate_limiter::FileRateLimiter;
pub use limited_adapters::{RateLimitedLlmClient, RateLimitedSearchAdapter};
