// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The round-robin LLM pool a stage's callables rotate across (§4.4,
//! §4.7): a thread-safe cursor over the endpoints a stage is configured
//! to use, so concurrent sub-pipelines spread their calls evenly across
//! backends instead of hammering one. Stage callables own their pool
//! directly rather than receiving a client per call, since the domain's
//! `StageCallable::call` takes only a `doc_id` (§4.5 "pure function" shape
//! omits transport dependencies from the per-call signature).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pipeline_domain::services::llm_client::LlmClient;

/// A non-empty pool of interchangeable LLM backends, handed out in
/// round-robin order via an `AtomicUsize` cursor.
pub struct LlmPool {
    clients: Vec<Arc<dyn LlmClient>>,
    cursor: AtomicUsize,
}

impl LlmPool {
    pub fn new(clients: Vec<Arc<dyn LlmClient>>) -> Self {
        assert!(!clients.is_empty(), "llm pool must have at least one backend");
        Self { clients, cursor: AtomicUsize::new(0) }
    }

    /// Returns the next backend in rotation.
    pub fn next(&self) -> Arc<dyn LlmClient> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        Arc::clone(&self.clients[idx])
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
