// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! Hierarchical error type for the pipeline domain. Errors are categorized so
//! the stage driver can decide whether a failure is retryable, whether it
//! should stop the sub-pipeline for a document, or whether it indicates a
//! programmer mistake that should fail fast.
//!
//! ## Error categories
//!
//! - **InputMissing** — an expected artifact was absent.
//! - **ParseFailure** — LLM output did not match the expected schema.
//! - **TransientExternal** — HTTP errors, timeouts, rate-limit waits.
//! - **InvariantViolation** — e.g. a write attempted against a read-only
//!   store; a programmer error that should fail fast rather than retry.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("artifact missing: doc_id={doc_id} name={name}")]
    InputMissing { doc_id: i64, name: String },

    #[error("failed to parse LLM output as the expected schema: {0}")]
    ParseFailure(String),

    #[error("transient external failure: {0}")]
    TransientExternal(String),

    #[error("queue contention: {0}")]
    ClaimContention(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("rate limiter error: {0}")]
    RateLimiterError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    pub fn input_missing(doc_id: i64, name: impl Into<String>) -> Self {
        Self::InputMissing {
            doc_id,
            name: name.into(),
        }
    }

    pub fn parse_failure(msg: impl Into<String>) -> Self {
        Self::ParseFailure(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientExternal(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether the stage driver should retry the step that produced this
    /// error (§7, `TransientExternal`), as opposed to surfacing it directly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientExternal(_) | PipelineError::ClaimContention(_))
    }

    /// Broad category used for log fields and the progress surface's error
    /// slot; never exposed across a process boundary beyond its `Display`.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InputMissing { .. } => "input_missing",
            PipelineError::ParseFailure(_) => "parse_failure",
            PipelineError::TransientExternal(_) => "transient_external",
            PipelineError::ClaimContention(_) => "claim_contention",
            PipelineError::InvariantViolation(_) => "invariant_violation",
            PipelineError::StoreError(_) => "store_error",
            PipelineError::InvalidConfiguration(_) => "invalid_configuration",
            PipelineError::RateLimiterError(_) => "rate_limiter",
            PipelineError::InternalError(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::ParseFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
