// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Relation extraction (§4.5.1): splits a document's abstract into
//! sentences and, for each, asks the LLM for every relation the sentence
//! expresses, given everything extracted so far as background. Grounded
//! on `original_source/src/pmcad/extract_relations.py`.

use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::entities::relation_doc::{RelationRecord, RelationsDocument, SentenceRelations};
use pipeline_domain::error::Result;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::services::json_extract::extract_json_array;
use pipeline_domain::services::sentence_split::split_sentences;
use pipeline_domain::stage::{Info, StageCallable, StageReport};
use pipeline_domain::value_objects::DocId;

use crate::infrastructure::runtime::llm_pool::LlmPool;

const SYSTEM_PROMPT: &str = "You are a biomedical relation extraction assistant. \
You only answer with a JSON array, with no surrounding prose.";

const PROMPT_TEMPLATE: &str = "\
Extract every relation the new sentence expresses between named biomedical \
entities (genes, proteins, RNAs, chemicals, GO terms, cell types, cell \
lines, anatomical structures, diseases, sequence ontology terms, or \
species). Use everything already extracted from earlier sentences only as \
background context — only report relations the new sentence itself states.

Background (already extracted):
{background}

New sentence:
{sentence}

Respond with a JSON array of objects, each shaped like:
{{\"components\": [{{\"name\": ..., \"type\": ...}}], \"relation\": {{\"name\": ..., \"description\": ...}}, \
\"targets\": [{{\"name\": ..., \"type\": ...}}], \"contexts\": [{{\"name\": ..., \"type\": ...}}]}}
If the sentence expresses no relations, respond with an empty array [].";

pub struct ExtractRelationsStage {
    name: String,
    store: Arc<dyn StateStore>,
    llm_pool: Arc<LlmPool>,
    output_artifact: String,
}

impl ExtractRelationsStage {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        llm_pool: Arc<LlmPool>,
        output_artifact: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), store, llm_pool, output_artifact: output_artifact.into() }
    }
}

#[async_trait]
impl StageCallable for ExtractRelationsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, doc_id: DocId) -> Result<StageReport> {
        let abstract_text = self.store.get_abstract(doc_id).await?;
        let sentences = split_sentences(&abstract_text);

        let mut background = String::new();
        let mut relations = Vec::with_capacity(sentences.len());
        let mut parsed_ok = 0u64;
        let mut llm_errors = 0u64;

        for sentence in &sentences {
            let prompt = PROMPT_TEMPLATE
                .replace("{background}", if background.is_empty() { "(none yet)" } else { &background })
                .replace("{sentence}", sentence);

            let llm = self.llm_pool.next();
            let records = match llm.query(&prompt, SYSTEM_PROMPT).await {
                Ok(raw) => match parse_relations(&raw) {
                    Ok(records) => {
                        parsed_ok += 1;
                        records
                    }
                    Err(_) => {
                        llm_errors += 1;
                        Vec::new()
                    }
                },
                Err(_) => {
                    llm_errors += 1;
                    Vec::new()
                }
            };

            relations.push(SentenceRelations { sentence: sentence.clone(), rel_from_this_sent: records });
            background.push_str(sentence);
            background.push(' ');
        }

        let doc = RelationsDocument {
            pmid: doc_id.get(),
            abstract_text: abstract_text.clone(),
            relations,
            error: None,
        };
        self.store
            .put(doc_id, &self.output_artifact, pipeline_domain::value_objects::ArtifactValue::Json(serde_json::to_value(&doc)?))
            .await?;

        let total = sentences.len() as u64;
        Ok(StageReport::new(vec![
            Info::metric("judge", parsed_ok, total),
            Info::metric("llm_error", llm_errors, total),
        ]))
    }
}

fn parse_relations(raw: &str) -> Result<Vec<RelationRecord>> {
    let json = extract_json_array(raw)?;
    serde_json::from_str(&json).map_err(Into::into)
}
