// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Cross-ontology conversion (§4.5.4): entities a source ontology
//! couldn't resolve are re-queried against a target ontology and
//! re-judged; a successful match rewrites the entity's `type` in the
//! relations document and moves its mapping record from the source
//! artifact to the target artifact. Safety is by serialization through
//! the done-set (this stage only runs once the source ontology's judge
//! stage has finished with a document), not by any runtime lock.
//! Grounded on `original_source/src/pmcad/map_ontology.py`'s
//! `convert_failed_to_next_ontology`.

use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::entities::mapping_record::MappingRecord;
use pipeline_domain::entities::relation_doc::RelationsDocument;
use pipeline_domain::error::Result;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::services::search_adapter::SearchAdapter;
use pipeline_domain::stage::{Info, StageCallable, StageReport};
use pipeline_domain::value_objects::ontology::{JudgePolicy, OntologyDescriptor};
use pipeline_domain::value_objects::{ArtifactValue, DocId};

use crate::application::ontology_support::{build_judge_prompt, build_query, match_candidate, JUDGE_SYSTEM_PROMPT};
use crate::infrastructure::runtime::llm_pool::LlmPool;

const TOP_K: usize = 30;

pub struct ConvertFailedStage {
    name: String,
    store: Arc<dyn StateStore>,
    search: Arc<dyn SearchAdapter>,
    llm_pool: Arc<LlmPool>,
    relations_artifact: String,
    source: OntologyDescriptor,
    target: OntologyDescriptor,
}

impl ConvertFailedStage {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        search: Arc<dyn SearchAdapter>,
        llm_pool: Arc<LlmPool>,
        relations_artifact: impl Into<String>,
        source: OntologyDescriptor,
        target: OntologyDescriptor,
    ) -> Self {
        Self { name: name.into(), store, search, llm_pool, relations_artifact: relations_artifact.into(), source, target }
    }
}

#[async_trait]
impl StageCallable for ConvertFailedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, doc_id: DocId) -> Result<StageReport> {
        let mut src_records: Vec<MappingRecord> = match self.store.get(doc_id, &self.source.filename).await? {
            Some(value) => serde_json::from_value(value.into_json().unwrap_or(serde_json::Value::Array(vec![])))?,
            None => Vec::new(),
        };
        let mut tgt_records: Vec<MappingRecord> = match self.store.get(doc_id, &self.target.filename).await? {
            Some(value) => serde_json::from_value(value.into_json().unwrap_or(serde_json::Value::Array(vec![])))?,
            None => Vec::new(),
        };

        let artifact = self
            .store
            .get(doc_id, &self.relations_artifact)
            .await?
            .ok_or_else(|| pipeline_domain::PipelineError::input_missing(doc_id.get(), self.relations_artifact.clone()))?;
        let mut doc: RelationsDocument = serde_json::from_value(
            artifact.into_json().ok_or_else(|| pipeline_domain::PipelineError::parse_failure("expected JSON artifact"))?,
        )?;

        let abstract_text = self.store.get_abstract(doc_id).await.unwrap_or_default();

        let unresolved: Vec<MappingRecord> = src_records.iter().filter(|r| r.llm_best_match.is_none()).cloned().collect();
        let total = unresolved.len() as u64;
        let mut converted = 0u64;
        let target_type = self.target.ontology_types.first().cloned().unwrap_or_default();

        for rec in &unresolved {
            let query = build_query(&rec.entity_name, &rec.description, rec.species.as_deref());
            let hits = self.search.search(&self.target.index_name, &query, TOP_K).await?;
            if hits.is_empty() {
                continue;
            }

            let mut tgt_record = MappingRecord::new(rec.entity_name.clone(), target_type.clone());
            tgt_record.description = rec.description.clone();
            tgt_record.species = rec.species.clone();
            tgt_record.hits = hits;

            let prompt = build_judge_prompt(self.target.judge_policy, &tgt_record, &abstract_text);
            let llm = self.llm_pool.next();
            let raw = llm.query(&prompt, JUDGE_SYSTEM_PROMPT).await?;
            let matched = match_candidate(&raw, &tgt_record.hits);
            tgt_record.llm_best_match = matched.or_else(|| {
                if self.target.judge_policy == JudgePolicy::Forced {
                    tgt_record.hits.first().map(|c| c.id.clone())
                } else {
                    None
                }
            });

            if tgt_record.llm_best_match.is_none() {
                continue;
            }
            converted += 1;

            for sentence in doc.relations.iter_mut() {
                for relation in sentence.rel_from_this_sent.iter_mut() {
                    for entity in relation
                        .components
                        .iter_mut()
                        .chain(relation.targets.iter_mut())
                        .chain(relation.contexts.iter_mut())
                    {
                        if entity.name == rec.entity_name && self.source.handles(&entity.entity_type) {
                            entity.entity_type = target_type.clone();
                        }
                    }
                }
            }

            tgt_records.retain(|r| !(r.entity_name == tgt_record.entity_name && r.species == tgt_record.species));
            tgt_records.push(tgt_record);
            src_records.retain(|r| !(r.entity_name == rec.entity_name && r.species == rec.species));
        }

        self.store.put(doc_id, &self.relations_artifact, ArtifactValue::Json(serde_json::to_value(&doc)?)).await?;
        self.store
            .put(doc_id, &self.source.filename, ArtifactValue::Json(serde_json::to_value(&src_records)?))
            .await?;
        self.store
            .put(doc_id, &self.target.filename, ArtifactValue::Json(serde_json::to_value(&tgt_records)?))
            .await?;

        Ok(StageReport::new(vec![Info::metric("converted", converted, total)]))
    }
}
