// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Decorators that gate an `LlmClient` or `SearchAdapter` behind a
//! [`RateLimiter`] (§1 point 5, §4.3: "cross-cutting global rate limiters
//! shared across all processes for external HTTP services"). Kept
//! separate from `HttpLlmClient`/`HttpHybridSearch`/`HttpTaxonomicSearch`
//! themselves so any adapter — not just the HTTP ones — can be wrapped,
//! and so the composition root decides per-service whether a given
//! endpoint is actually rate-limited.

use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::error::Result;
use pipeline_domain::services::{LlmClient, RateLimiter, SearchAdapter};
use pipeline_domain::value_objects::Candidate;

/// An [`LlmClient`] that acquires a permit from a shared [`RateLimiter`]
/// before every `query` call.
pub struct RateLimitedLlmClient {
    inner: Arc<dyn LlmClient>,
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitedLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl LlmClient for RateLimitedLlmClient {
    async fn query(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        let permit = self.limiter.acquire().await?;
        let result = self.inner.query(prompt, system_prompt).await;
        drop(permit);
        result
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}

/// A [`SearchAdapter`] that acquires a permit from a shared [`RateLimiter`]
/// before every `search` call.
pub struct RateLimitedSearchAdapter {
    inner: Arc<dyn SearchAdapter>,
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitedSearchAdapter {
    pub fn new(inner: Arc<dyn SearchAdapter>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl SearchAdapter for RateLimitedSearchAdapter {
    async fn search(&self, index_name: &str, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let permit = self.limiter.acquire().await?;
        let result = self.inner.search(index_name, query, k).await;
        drop(permit);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLimiter {
        acquires: AtomicUsize,
    }

    struct NoopPermit;
    impl pipeline_domain::services::RatePermit for NoopPermit {}

    #[async_trait]
    impl RateLimiter for CountingLimiter {
        async fn acquire(&self) -> Result<Box<dyn pipeline_domain::services::RatePermit>> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopPermit))
        }
    }

    struct StaticLlm;
    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn query(&self, _prompt: &str, _system_prompt: &str) -> Result<String> {
            Ok("ok".to_string())
        }

        fn label(&self) -> &str {
            "static"
        }
    }

    #[tokio::test]
    async fn acquires_a_permit_per_query() {
        let limiter = Arc::new(CountingLimiter { acquires: AtomicUsize::new(0) });
        let client = RateLimitedLlmClient::new(Arc::new(StaticLlm), limiter.clone());

        client.query("hi", "sys").await.unwrap();
        client.query("hi", "sys").await.unwrap();

        assert_eq!(limiter.acquires.load(Ordering::SeqCst), 2);
    }
}
