//! The LLM adapter port (§4.7): a single chat-style completion call
//! against a pool of interchangeable backends.

use async_trait::async_trait;

use crate::error::Result;

/// A chat completion backend. Implementations own retry-free transport
/// concerns only (HTTP, auth, response-format parsing); backoff and retry
/// belong to the stage driver (§5), not the adapter.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `prompt` (and an optional `system_prompt`) to the backend and
    /// returns its raw text response, with any `<think>...</think>`
    /// reasoning preamble already stripped.
    async fn query(&self, prompt: &str, system_prompt: &str) -> Result<String>;

    /// A short, stable label for the backend this client talks to, used in
    /// log fields and round-robin pool bookkeeping.
    fn label(&self) -> &str;
}
