// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entity decomposition (§4.5.2): for each entity of a configured type
//! (e.g. a compound biological-process or cell-type mention), asks the
//! LLM whether it should be rewritten as a more specific single entity,
//! keeping the original on any parse failure or a literal `None` answer.
//! Grounded on `original_source/src/pmcad/extract_relations.py`'s
//! post-extraction decomposition pass.

use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::entities::relation_doc::{Entity, RelationsDocument};
use pipeline_domain::error::Result;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::services::json_extract::extract_json_array;
use pipeline_domain::stage::{Info, StageCallable, StageReport};
use pipeline_domain::value_objects::{ArtifactValue, DocId};

use crate::infrastructure::runtime::llm_pool::LlmPool;

const SYSTEM_PROMPT: &str =
    "You are a biomedical terminology assistant. Answer with either the word None or a single JSON object.";

const PROMPT_TEMPLATE: &str = "\
The following named entity was extracted from a biomedical abstract. If it \
names a single well-defined concept, answer with the word None. If it \
actually names a more specific concept that should replace it (e.g. a \
compound or overly broad phrase that has one well-known specific \
meaning), answer with a JSON object shaped like \
{{\"name\": ..., \"type\": ..., \"description\": ...}} for the replacement.

Entity name: {name}
Entity type: {entity_type}
Entity description: {description}";

pub struct OntologyDecompositionStage {
    name: String,
    store: Arc<dyn StateStore>,
    llm_pool: Arc<LlmPool>,
    artifact: String,
    decompose_types: Vec<String>,
}

impl OntologyDecompositionStage {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        llm_pool: Arc<LlmPool>,
        artifact: impl Into<String>,
        decompose_types: Vec<String>,
    ) -> Self {
        Self { name: name.into(), store, llm_pool, artifact: artifact.into(), decompose_types }
    }
}

#[async_trait]
impl StageCallable for OntologyDecompositionStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, doc_id: DocId) -> Result<StageReport> {
        let artifact = self
            .store
            .get(doc_id, &self.artifact)
            .await?
            .ok_or_else(|| pipeline_domain::PipelineError::input_missing(doc_id.get(), self.artifact.clone()))?;
        let mut doc: RelationsDocument = serde_json::from_value(
            artifact.into_json().ok_or_else(|| pipeline_domain::PipelineError::parse_failure("expected JSON artifact"))?,
        )?;

        let mut decomposed = 0u64;
        let mut total = 0u64;

        for sentence in doc.relations.iter_mut() {
            for record in sentence.rel_from_this_sent.iter_mut() {
                for entity in record
                    .components
                    .iter_mut()
                    .chain(record.targets.iter_mut())
                    .chain(record.contexts.iter_mut())
                {
                    if !self.decompose_types.iter().any(|t| t == &entity.entity_type) {
                        continue;
                    }
                    total += 1;

                    let prompt = PROMPT_TEMPLATE
                        .replace("{name}", &entity.name)
                        .replace("{entity_type}", &entity.entity_type)
                        .replace("{description}", &entity.description);
                    let llm = self.llm_pool.next();
                    let raw = match llm.query(&prompt, SYSTEM_PROMPT).await {
                        Ok(raw) => raw,
                        Err(_) => continue,
                    };

                    if let Some(replacement) = try_parse_entity(&raw) {
                        *entity = replacement;
                        decomposed += 1;
                    }
                }
            }
        }

        self.store.put(doc_id, &self.artifact, ArtifactValue::Json(serde_json::to_value(&doc)?)).await?;

        Ok(StageReport::new(vec![Info::metric("decomposed", decomposed, total)]))
    }
}

fn try_parse_entity(raw: &str) -> Option<Entity> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return None;
    }
    let json = extract_json_array(trimmed).ok()?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&json).ok()?;
    let value = values.into_iter().next()?;
    serde_json::from_value(value).ok()
}
