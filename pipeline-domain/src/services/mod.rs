//! Domain services: ports to external systems, and pure functions too
//! algorithm-heavy to inline at call sites.

pub mod json_extract;
pub mod llm_client;
pub mod rate_limiter;
pub mod search_adapter;
pub mod sentence_split;

pub use json_extract::extract_json_array;
pub use llm_client::LlmClient;
pub use rate_limiter::{RateLimiter, RatePermit};
pub use search_adapter::SearchAdapter;
pub use sentence_split::split_sentences;
