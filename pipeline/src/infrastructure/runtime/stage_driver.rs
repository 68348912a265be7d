// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The stage driver (§4.4): claims documents out of the queue subsystem,
//! runs each claimed document through a (possibly multi-step) sub-pipeline
//! with per-step concurrency caps and a fixed retry policy, and reports
//! progress through [`ProgressSurface`]. Two claim modes — "queue mode"
//! (N-way intersection over explicit item queues) and "resume-only mode"
//! (intersection over upstream done sets) — are chosen by which of
//! `op_queue_names`/`done_source_names` is non-empty, mirroring
//! [`adaptive_pipeline_bootstrap::StageConfig`]'s validation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use pipeline_domain::error::Result;
use pipeline_domain::repositories::queue_store::QueueStore;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::stage::{Info as DomainInfo, StageCallable};
use pipeline_domain::value_objects::{DocId, QueueName, StageName};

use super::progress::{Info as ProgressInfo, ProgressSurface};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Claim-mode and concurrency configuration for one stage run (§4.4).
pub struct StageDriverConfig {
    pub stage_name: StageName,
    /// One [`StageCallable`] per sub-pipeline step, run in order for each
    /// claimed document.
    pub sub_pipeline: Vec<Arc<dyn StageCallable>>,
    pub workers: usize,
    /// Per-step concurrency cap; defaults to `workers` for any step left
    /// unspecified or zero.
    pub per_step_max: Vec<usize>,
    pub doc_id_filter: Option<HashSet<DocId>>,
    pub limit: Option<usize>,
    pub op_queue_names: Vec<QueueName>,
    pub done_source_names: Vec<QueueName>,
    pub queue_sleep: Duration,
    pub clear_done_on_start: bool,
}

enum ClaimMode {
    Queue(Vec<QueueName>),
    ResumeOnly(Vec<QueueName>),
}

pub struct StageDriver {
    stage_name: StageName,
    state_store: Arc<dyn StateStore>,
    queue_store: Arc<dyn QueueStore>,
    sub_pipeline: Vec<Arc<dyn StageCallable>>,
    semaphores: Vec<Arc<Semaphore>>,
    workers: usize,
    doc_id_filter: Option<HashSet<DocId>>,
    limit: Option<usize>,
    claim_mode: ClaimMode,
    queue_sleep: Duration,
    clear_done_on_start: bool,
}

impl StageDriver {
    pub fn new(state_store: Arc<dyn StateStore>, queue_store: Arc<dyn QueueStore>, config: StageDriverConfig) -> Self {
        let claim_mode = if !config.op_queue_names.is_empty() {
            ClaimMode::Queue(config.op_queue_names)
        } else {
            ClaimMode::ResumeOnly(config.done_source_names)
        };

        let semaphores = (0..config.sub_pipeline.len())
            .map(|i| {
                let max = config.per_step_max.get(i).copied().filter(|m| *m > 0).unwrap_or(config.workers);
                Arc::new(Semaphore::new(max))
            })
            .collect();

        Self {
            stage_name: config.stage_name,
            state_store,
            queue_store,
            sub_pipeline: config.sub_pipeline,
            semaphores,
            workers: config.workers,
            doc_id_filter: config.doc_id_filter,
            limit: config.limit,
            claim_mode,
            queue_sleep: config.queue_sleep,
            clear_done_on_start: config.clear_done_on_start,
        }
    }

    async fn claim_next(&self) -> Result<Option<DocId>> {
        match &self.claim_mode {
            ClaimMode::Queue(names) => self.queue_store.queue_claim_intersection(names, &self.stage_name_as_queue()).await,
            ClaimMode::ResumeOnly(names) => {
                self.queue_store.queue_claim_done_intersection(names, &self.stage_name_as_queue()).await
            }
        }
    }

    fn stage_name_as_queue(&self) -> QueueName {
        QueueName::new(self.stage_name.as_str())
    }

    /// Runs this stage to completion against every currently-ready
    /// document (plus whatever becomes ready while running), honoring
    /// `doc_id_filter` and `limit` (§4.4 steps 1-6).
    pub async fn run(&self) -> Result<()> {
        let done_queue = self.stage_name_as_queue();

        if self.clear_done_on_start {
            self.queue_store.queue_done_clear(&done_queue).await?;
        }
        self.queue_store.queue_inflight_clear(std::slice::from_ref(&done_queue)).await?;

        let mut target: Vec<DocId> = self.state_store.all_doc_ids().await?;
        if let Some(filter) = &self.doc_id_filter {
            target.retain(|d| filter.contains(d));
        }
        if let Some(limit) = self.limit {
            target.truncate(limit);
        }
        let target_set: HashSet<DocId> = target.iter().copied().collect();

        let already_done = self.queue_store.queue_done_count_in(&done_queue, &target).await?;
        let progress = Arc::new(ProgressSurface::new(self.stage_name.as_str(), target.len() as u64, already_done as u64));
        let remaining_budget = target.len().saturating_sub(already_done);

        let mut join_set: JoinSet<(DocId, Vec<ProgressInfo>)> = JoinSet::new();
        let mut scheduled = 0usize;
        let mut processed = 0usize;

        loop {
            let mut skipped_this_cycle: HashSet<DocId> = HashSet::new();
            while join_set.len() < self.workers && scheduled < remaining_budget {
                let Some(doc_id) = self.claim_next().await? else {
                    break;
                };
                if !target_set.contains(&doc_id) {
                    self.queue_store.queue_inflight_remove(std::slice::from_ref(&done_queue), doc_id).await?;
                    if !skipped_this_cycle.insert(doc_id) {
                        // Already saw this out-of-target doc claimed again this cycle:
                        // nothing in-target is currently ready. Stop hot-spinning and
                        // fall through to the queue_sleep branch below.
                        break;
                    }
                    continue;
                }
                scheduled += 1;

                let sub_pipeline = self.sub_pipeline.clone();
                let semaphores = self.semaphores.clone();
                join_set.spawn(async move { run_sub_pipeline(doc_id, sub_pipeline, semaphores).await });
            }

            if join_set.is_empty() {
                if scheduled >= remaining_budget {
                    break;
                }
                tokio::time::sleep(self.queue_sleep).await;
                continue;
            }

            if let Some(joined) = join_set.join_next().await {
                let (doc_id, infos) = joined.map_err(|e| pipeline_domain::PipelineError::InternalError(e.to_string()))?;
                progress.record(&infos).await;
                self.queue_store.queue_mark_done(&done_queue, doc_id).await?;
                processed += 1;
            }
        }

        let _ = processed;
        progress.finish().await;
        Ok(())
    }
}

/// Runs every step of a claimed document's sub-pipeline in order, with
/// per-step concurrency limited by `semaphores[step]` and a fixed
/// 3-attempt/2s-backoff retry on either an `Err` or an `Info::Error`
/// entry (§4.4 point 6, §5). Stops at the first step that exhausts its
/// retries, discarding later steps for this document.
async fn run_sub_pipeline(
    doc_id: DocId,
    sub_pipeline: Vec<Arc<dyn StageCallable>>,
    semaphores: Vec<Arc<Semaphore>>,
) -> (DocId, Vec<ProgressInfo>) {
    let mut collected = Vec::new();

    for (idx, callable) in sub_pipeline.iter().enumerate() {
        let step = idx + 1;
        let semaphore = semaphores[idx].clone();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let permit = semaphore.acquire().await;
            let outcome = callable.call(doc_id).await;
            drop(permit);

            match outcome {
                Ok(report) => {
                    let has_error = report.has_error();
                    collected.extend(report.infos.iter().map(|i| to_progress_info(step, i)));
                    if has_error && attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                        continue;
                    }
                    if has_error {
                        return (doc_id, collected);
                    }
                    break;
                }
                Err(e) => {
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                        continue;
                    }
                    collected.push(ProgressInfo::Error { msg: e.to_string() });
                    return (doc_id, collected);
                }
            }
        }
    }

    collected
        .is_empty()
        .then(|| collected.push(ProgressInfo::Status { step: 1, name: "status".to_string(), description: "ok".to_string() }));
    (doc_id, collected)
}

fn to_progress_info(step: usize, info: &DomainInfo) -> ProgressInfo {
    match info {
        DomainInfo::Status { name, description } => {
            ProgressInfo::Status { step, name: name.clone(), description: description.clone() }
        }
        DomainInfo::Metric { name, correct, total } => {
            ProgressInfo::Metric { step, name: name.clone(), correct: *correct, total: *total }
        }
        DomainInfo::Error { message } => ProgressInfo::Error { msg: message.clone() },
    }
}
