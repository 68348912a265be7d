// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Relation validation (§4.5.5): asks the LLM, per relation, whether the
//! extracted relation is actually supported by the abstract, writing a
//! `valid` bool onto each [`RelationRecord`]. Idempotent via
//! `skip_existing`; optionally gated on a prerequisite artifact's
//! presence. Grounded on `original_source/src/pmcad/extract_relations.py`'s
//! validation pass.

use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::entities::relation_doc::RelationsDocument;
use pipeline_domain::error::Result;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::stage::{Info, StageCallable, StageReport};
use pipeline_domain::value_objects::{ArtifactValue, DocId};

use crate::infrastructure::runtime::llm_pool::LlmPool;

const SYSTEM_PROMPT: &str =
    "You are a biomedical fact-checking assistant. Answer with exactly one word: yes or no.";

const PROMPT_TEMPLATE: &str = "\
Does the following abstract support this extracted relation?

Relation: {component} {relation} {target}
Abstract:
{abstract_text}

Answer with exactly one word: yes or no.";

pub struct ValidateRelationsStage {
    name: String,
    store: Arc<dyn StateStore>,
    llm_pool: Arc<LlmPool>,
    relations_artifact: String,
    prerequisite_artifact: Option<String>,
    skip_existing: bool,
}

impl ValidateRelationsStage {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        llm_pool: Arc<LlmPool>,
        relations_artifact: impl Into<String>,
        prerequisite_artifact: Option<String>,
        skip_existing: bool,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            llm_pool,
            relations_artifact: relations_artifact.into(),
            prerequisite_artifact,
            skip_existing,
        }
    }
}

#[async_trait]
impl StageCallable for ValidateRelationsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, doc_id: DocId) -> Result<StageReport> {
        if let Some(prereq) = &self.prerequisite_artifact {
            if !self.store.has(doc_id, prereq).await? {
                return Ok(StageReport::new(vec![Info::error(format!(
                    "prerequisite artifact \"{prereq}\" missing for doc {doc_id}"
                ))]));
            }
        }

        let artifact = self
            .store
            .get(doc_id, &self.relations_artifact)
            .await?
            .ok_or_else(|| pipeline_domain::PipelineError::input_missing(doc_id.get(), self.relations_artifact.clone()))?;
        let mut doc: RelationsDocument = serde_json::from_value(
            artifact.into_json().ok_or_else(|| pipeline_domain::PipelineError::parse_failure("expected JSON artifact"))?,
        )?;

        let abstract_text = doc.abstract_text.clone();
        let mut valid_count = 0u64;
        let mut total = 0u64;

        for sentence in doc.relations.iter_mut() {
            for record in sentence.rel_from_this_sent.iter_mut() {
                if self.skip_existing && record.valid.is_some() {
                    continue;
                }
                total += 1;

                let component = record.components.first().map(|e| e.name.as_str()).unwrap_or("(unknown)");
                let target = record.targets.first().map(|e| e.name.as_str()).unwrap_or("(unknown)");
                let prompt = PROMPT_TEMPLATE
                    .replace("{component}", component)
                    .replace("{relation}", &record.relation.name)
                    .replace("{target}", target)
                    .replace("{abstract_text}", &abstract_text);

                let llm = self.llm_pool.next();
                let raw = llm.query(&prompt, SYSTEM_PROMPT).await?;
                let is_valid = raw.trim().to_lowercase().starts_with('y');
                record.valid = Some(is_valid);
                if is_valid {
                    valid_count += 1;
                }
            }
        }

        self.store
            .put(doc_id, &self.relations_artifact, ArtifactValue::Json(serde_json::to_value(&doc)?))
            .await?;

        Ok(StageReport::new(vec![Info::metric("valid", valid_count, total)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::entities::relation_doc::{Entity, RelationLabel, RelationRecord, SentenceRelations};
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeStore {
        artifacts: Mutex<StdHashMap<(i64, String), ArtifactValue>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self { artifacts: Mutex::new(StdHashMap::new()) }
        }
    }

    #[async_trait]
    impl StateStore for FakeStore {
        async fn get_abstract(&self, _doc_id: DocId) -> Result<String> {
            Ok(String::new())
        }

        async fn put_abstract(&self, _doc_id: DocId, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn get(&self, doc_id: DocId, name: &str) -> Result<Option<ArtifactValue>> {
            Ok(self.artifacts.lock().unwrap().get(&(doc_id.get(), name.to_string())).cloned())
        }

        async fn put(&self, doc_id: DocId, name: &str, value: ArtifactValue) -> Result<()> {
            self.artifacts.lock().unwrap().insert((doc_id.get(), name.to_string()), value);
            Ok(())
        }

        async fn has(&self, doc_id: DocId, name: &str) -> Result<bool> {
            Ok(self.artifacts.lock().unwrap().contains_key(&(doc_id.get(), name.to_string())))
        }

        async fn all_doc_ids(&self) -> Result<Vec<DocId>> {
            Ok(Vec::new())
        }
    }

    struct CountingLlm(&'static str, Arc<AtomicUsize>);

    #[async_trait]
    impl pipeline_domain::services::llm_client::LlmClient for CountingLlm {
        async fn query(&self, _prompt: &str, _system_prompt: &str) -> Result<String> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0.to_string())
        }

        fn label(&self) -> &str {
            "fake"
        }
    }

    fn doc_with_relation(valid: Option<bool>) -> RelationsDocument {
        RelationsDocument {
            pmid: 1,
            abstract_text: "Aspirin inhibits COX-1 in platelets.".to_string(),
            error: None,
            relations: vec![SentenceRelations {
                sentence: "Aspirin inhibits COX-1 in platelets.".to_string(),
                rel_from_this_sent: vec![RelationRecord {
                    components: vec![Entity::new("aspirin", "chemical")],
                    relation: RelationLabel { name: "inhibits".to_string(), description: String::new() },
                    targets: vec![Entity::new("COX-1", "gene")],
                    contexts: vec![],
                    valid,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn marks_valid_true_on_yes_answer() {
        let store: Arc<dyn StateStore> = Arc::new(FakeStore::new());
        let doc_id = DocId::new(1);
        store
            .put(doc_id, "ds.json", ArtifactValue::Json(serde_json::to_value(doc_with_relation(None)).unwrap()))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let llm: Arc<dyn pipeline_domain::services::llm_client::LlmClient> = Arc::new(CountingLlm("Yes", calls));
        let pool = Arc::new(LlmPool::new(vec![llm]));
        let stage = ValidateRelationsStage::new("validate", store.clone(), pool, "ds.json", None, true);

        let report = stage.call(doc_id).await.unwrap();
        assert!(!report.has_error());

        let doc: RelationsDocument = serde_json::from_value(store.get(doc_id, "ds.json").await.unwrap().unwrap().into_json().unwrap()).unwrap();
        assert_eq!(doc.relations[0].rel_from_this_sent[0].valid, Some(true));
    }

    #[tokio::test]
    async fn marks_valid_false_on_no_answer() {
        let store: Arc<dyn StateStore> = Arc::new(FakeStore::new());
        let doc_id = DocId::new(1);
        store
            .put(doc_id, "ds.json", ArtifactValue::Json(serde_json::to_value(doc_with_relation(None)).unwrap()))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let llm: Arc<dyn pipeline_domain::services::llm_client::LlmClient> = Arc::new(CountingLlm("no, not supported", calls));
        let pool = Arc::new(LlmPool::new(vec![llm]));
        let stage = ValidateRelationsStage::new("validate", store.clone(), pool, "ds.json", None, true);

        stage.call(doc_id).await.unwrap();
        let doc: RelationsDocument = serde_json::from_value(store.get(doc_id, "ds.json").await.unwrap().unwrap().into_json().unwrap()).unwrap();
        assert_eq!(doc.relations[0].rel_from_this_sent[0].valid, Some(false));
    }

    #[tokio::test]
    async fn skip_existing_does_not_rejudge() {
        let store: Arc<dyn StateStore> = Arc::new(FakeStore::new());
        let doc_id = DocId::new(1);
        store
            .put(doc_id, "ds.json", ArtifactValue::Json(serde_json::to_value(doc_with_relation(Some(true))).unwrap()))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let llm: Arc<dyn pipeline_domain::services::llm_client::LlmClient> = Arc::new(CountingLlm("no", calls.clone()));
        let pool = Arc::new(LlmPool::new(vec![llm]));
        let stage = ValidateRelationsStage::new("validate", store, pool, "ds.json", None, true);

        stage.call(doc_id).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_prerequisite_returns_soft_error() {
        let store: Arc<dyn StateStore> = Arc::new(FakeStore::new());
        let doc_id = DocId::new(1);
        store
            .put(doc_id, "ds.json", ArtifactValue::Json(serde_json::to_value(doc_with_relation(None)).unwrap()))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let llm: Arc<dyn pipeline_domain::services::llm_client::LlmClient> = Arc::new(CountingLlm("yes", calls.clone()));
        let pool = Arc::new(LlmPool::new(vec![llm]));
        let stage = ValidateRelationsStage::new("validate", store, pool, "ds.json", Some("decomposed.json".to_string()), true);

        let report = stage.call(doc_id).await.unwrap();
        assert!(report.has_error());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
