// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ontology identifier mapping, Step B — LLM judgment (§4.5.3): for each
//! mapping record not yet judged, asks the LLM to pick one candidate (or
//! `None`, depending on judge policy) out of the hits Step A persisted.
//! Idempotent — a record with an existing `llm_best_match` is skipped.
//! Grounded on `original_source/src/pmcad/chebi_judge.py`.

use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::entities::mapping_record::MappingRecord;
use pipeline_domain::error::Result;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::stage::{Info, StageCallable, StageReport};
use pipeline_domain::value_objects::ontology::{JudgePolicy, OntologyDescriptor};
use pipeline_domain::value_objects::{ArtifactValue, DocId};

use crate::application::ontology_support::{build_judge_prompt, match_candidate, JUDGE_SYSTEM_PROMPT};
use crate::infrastructure::runtime::llm_pool::LlmPool;

pub struct JudgeDbIdStage {
    name: String,
    store: Arc<dyn StateStore>,
    llm_pool: Arc<LlmPool>,
    ontology: OntologyDescriptor,
}

impl JudgeDbIdStage {
    pub fn new(name: impl Into<String>, store: Arc<dyn StateStore>, llm_pool: Arc<LlmPool>, ontology: OntologyDescriptor) -> Self {
        Self { name: name.into(), store, llm_pool, ontology }
    }
}

#[async_trait]
impl StageCallable for JudgeDbIdStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, doc_id: DocId) -> Result<StageReport> {
        let artifact = self
            .store
            .get(doc_id, &self.ontology.filename)
            .await?
            .ok_or_else(|| pipeline_domain::PipelineError::input_missing(doc_id.get(), self.ontology.filename.clone()))?;
        let mut records: Vec<MappingRecord> = serde_json::from_value(
            artifact.into_json().ok_or_else(|| pipeline_domain::PipelineError::parse_failure("expected JSON artifact"))?,
        )?;

        let abstract_text = self.store.get_abstract(doc_id).await.unwrap_or_default();

        let mut correct = 0u64;
        let mut total = 0u64;

        for record in records.iter_mut() {
            if record.llm_best_match.is_some() {
                continue;
            }
            if record.hits.is_empty() {
                continue;
            }
            total += 1;

            let prompt = build_judge_prompt(self.ontology.judge_policy, record, &abstract_text);
            let llm = self.llm_pool.next();
            let raw = llm.query(&prompt, JUDGE_SYSTEM_PROMPT).await?;

            let matched = match_candidate(&raw, &record.hits);
            record.llm_best_match = matched.or_else(|| {
                if self.ontology.judge_policy == JudgePolicy::Forced {
                    record.hits.first().map(|c| c.id.clone())
                } else {
                    None
                }
            });

            if record.llm_best_match.is_some() {
                correct += 1;
            }
        }

        self.store
            .put(doc_id, &self.ontology.filename, ArtifactValue::Json(serde_json::to_value(&records)?))
            .await?;

        Ok(StageReport::new(vec![Info::metric("judge", correct, total)]))
    }
}
