// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Adaptive Pipeline
//!
//! A durable, restartable, multi-stage document-processing pipeline for
//! biomedical literature: relation extraction, ontology identifier
//! mapping, cross-ontology conversion, relation validation, and final
//! assembly, all driven off an embedded SQLite state store so any stage
//! can be killed and resumed without losing work.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              pipeline-bootstrap              │
//! │  CLI parsing, config loading, exit codes     │
//! └───────────────────────┬───────────────────────┘
//! ┌───────────────────────┴───────────────────────┐
//! │              application (this crate)          │
//! │  stage callables, ontology/species support,     │
//! │  the composition root that wires concrete        │
//! │  adapters to a stage's `StageKind`                │
//! └───────────────────────┬───────────────────────┘
//! ┌───────────────────────┴───────────────────────┐
//! │                 pipeline-domain                │
//! │  ports (StateStore, QueueStore, LlmClient,      │
//! │  SearchAdapter, RateLimiter), entities, errors   │
//! └───────────────────────┬───────────────────────┘
//! ┌───────────────────────┴───────────────────────┐
//! │            infrastructure (this crate)          │
//! │  SQLite state/queue store, HTTP adapters, the    │
//! │  stage driver, composer, and progress surface     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core concepts
//!
//! ### Stage
//! A stage is a named unit of work — relation extraction, ontology
//! mapping, validation, and so on — implemented as a
//! [`pipeline_domain::stage::StageCallable`] and run to completion against
//! every document a [`infrastructure::runtime::StageDriver`] claims for
//! it out of the queue subsystem.
//!
//! ### Queue subsystem
//! Documents move between stages through named done-sets and item
//! queues in the state store, not through any in-process channel: a
//! stage becomes ready for a document only once that document is present
//! in every queue it depends on, which is what makes the whole pipeline
//! resumable after a crash.
//!
//! ### Composer
//! The composer never builds an in-process task graph. It spawns one
//! `pipeline run-stage` child process per stage config file and lets the
//! queue names in those files encode the dependency DAG.
//!
//! ## Testing
//!
//! ```bash
//! cargo test
//! ```

pub mod application;
pub mod infrastructure;

pub use pipeline_domain::error::{PipelineError, Result};
