// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ontology identifier mapping, Step A — candidate generation (§4.5.3):
//! walks every entity an ontology handles, resolves its species (if the
//! ontology cares), builds a search query, and persists a
//! [`MappingRecord`] per unique `(name, description, species)` triple,
//! merging with anything already persisted rather than overwriting an
//! existing `llm_best_match` (idempotence rule, §4.5.3). Grounded on
//! `original_source/src/pmcad/map_ontology.py`'s `get_db_id`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::entities::mapping_record::MappingRecord;
use pipeline_domain::entities::relation_doc::RelationsDocument;
use pipeline_domain::error::Result;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::services::search_adapter::SearchAdapter;
use pipeline_domain::stage::{Info, StageCallable, StageReport};
use pipeline_domain::value_objects::ontology::OntologyDescriptor;
use pipeline_domain::value_objects::{ArtifactValue, DocId};

use crate::application::ontology_support::build_query;
use crate::application::species::{document_fallback_species, resolve_species};

const TOP_K: usize = 30;

pub struct GetDbIdStage {
    name: String,
    store: Arc<dyn StateStore>,
    search: Arc<dyn SearchAdapter>,
    ontology: OntologyDescriptor,
    relations_artifact: String,
    cell_line_species_artifact: Option<String>,
}

impl GetDbIdStage {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        search: Arc<dyn SearchAdapter>,
        ontology: OntologyDescriptor,
        relations_artifact: impl Into<String>,
        cell_line_species_artifact: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            search,
            ontology,
            relations_artifact: relations_artifact.into(),
            cell_line_species_artifact,
        }
    }

    async fn load_cell_line_species(&self, doc_id: DocId) -> Result<HashMap<String, String>> {
        let Some(artifact_name) = &self.cell_line_species_artifact else {
            return Ok(HashMap::new());
        };
        match self.store.get(doc_id, artifact_name).await? {
            Some(value) => {
                let json = value.into_json().unwrap_or(serde_json::Value::Null);
                Ok(serde_json::from_value(json).unwrap_or_default())
            }
            None => Ok(HashMap::new()),
        }
    }
}

#[async_trait]
impl StageCallable for GetDbIdStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, doc_id: DocId) -> Result<StageReport> {
        let artifact = self
            .store
            .get(doc_id, &self.relations_artifact)
            .await?
            .ok_or_else(|| pipeline_domain::PipelineError::input_missing(doc_id.get(), self.relations_artifact.clone()))?;
        let doc: RelationsDocument = serde_json::from_value(
            artifact.into_json().ok_or_else(|| pipeline_domain::PipelineError::parse_failure("expected JSON artifact"))?,
        )?;

        let mut records: Vec<MappingRecord> = match self.store.get(doc_id, &self.ontology.filename).await? {
            Some(value) => serde_json::from_value(value.into_json().unwrap_or(serde_json::Value::Array(vec![])))?,
            None => Vec::new(),
        };

        let cell_line_species = self.load_cell_line_species(doc_id).await?;
        let doc_fallback = document_fallback_species(&doc);

        let mut seen: HashSet<(String, String, Option<String>)> = records
            .iter()
            .map(|r| (r.entity_name.clone(), r.description.clone(), r.species.clone()))
            .collect();

        let mut new_candidates = 0u64;
        let mut total = 0u64;

        for sentence in &doc.relations {
            for record in &sentence.rel_from_this_sent {
                for entity in record.components.iter().chain(record.targets.iter()).chain(record.contexts.iter()) {
                    if !self.ontology.handles(&entity.entity_type) {
                        continue;
                    }
                    total += 1;

                    let species = if self.ontology.use_species {
                        resolve_species(doc_fallback.as_deref(), Some(record), entity, &cell_line_species)
                    } else {
                        None
                    };
                    let key = (entity.name.clone(), entity.description.clone(), species.clone());
                    if seen.contains(&key) {
                        continue;
                    }
                    seen.insert(key);

                    let query = build_query(&entity.name, &entity.description, species.as_deref());
                    let hits = self.search.search(&self.ontology.index_name, &query, TOP_K).await?;

                    let mut record = MappingRecord::new(entity.name.clone(), entity.entity_type.clone());
                    record.description = entity.description.clone();
                    record.species = species;
                    record.hits = hits;
                    records.push(record);
                    new_candidates += 1;
                }
            }
        }

        self.store
            .put(doc_id, &self.ontology.filename, ArtifactValue::Json(serde_json::to_value(&records)?))
            .await?;

        Ok(StageReport::new(vec![Info::metric("candidates", new_candidates, total)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::entities::relation_doc::{Entity, RelationLabel, RelationRecord, SentenceRelations};
    use pipeline_domain::value_objects::Candidate;
    use std::collections::HashMap as StdHashMap;
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

    struct FakeSearch(Vec<Candidate>);

    #[async_trait]
    impl SearchAdapter for FakeSearch {
        async fn search(&self, _index_name: &str, _query: &str, _k: usize) -> Result<Vec<Candidate>> {
            Ok(self.0.clone())
        }
    }

    fn sample_doc() -> RelationsDocument {
        RelationsDocument {
            pmid: 1,
            abstract_text: "A.".to_string(),
            error: None,
            relations: vec![SentenceRelations {
                sentence: "A.".to_string(),
                rel_from_this_sent: vec![RelationRecord {
                    components: vec![Entity::new("glucose", "chemical")],
                    relation: RelationLabel { name: "activates".to_string(), description: String::new() },
                    targets: vec![Entity::new("TP53", "gene")],
                    contexts: vec![],
                    valid: None,
                }],
            }],
        }
    }

    fn chemical_ontology() -> OntologyDescriptor {
        use pipeline_domain::value_objects::ontology::JudgePolicy;
        OntologyDescriptor::new(vec!["chemical".to_string()], "chebi", "chebi_map.json", false, "chebi", JudgePolicy::Strict)
    }

    #[tokio::test]
    async fn generates_one_record_per_unique_entity() {
        let store: Arc<dyn StateStore> = Arc::new(FakeStore::new());
        let doc_id = DocId::new(1);
        store
            .put(doc_id, "ds.json", ArtifactValue::Json(serde_json::to_value(sample_doc()).unwrap()))
            .await
            .unwrap();

        let search: Arc<dyn SearchAdapter> = Arc::new(FakeSearch(vec![Candidate::new("CHEBI:1", "glucose", 0.9)]));
        let stage = GetDbIdStage::new("get_chebi", store.clone(), search, chemical_ontology(), "ds.json", None);

        let report = stage.call(doc_id).await.unwrap();
        assert!(!report.has_error());

        let records: Vec<MappingRecord> =
            serde_json::from_value(store.get(doc_id, "chebi_map.json").await.unwrap().unwrap().into_json().unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_name, "glucose");
        assert_eq!(records[0].hits[0].id, "CHEBI:1");
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_existing_record() {
        let store: Arc<dyn StateStore> = Arc::new(FakeStore::new());
        let doc_id = DocId::new(1);
        store
            .put(doc_id, "ds.json", ArtifactValue::Json(serde_json::to_value(sample_doc()).unwrap()))
            .await
            .unwrap();

        let search: Arc<dyn SearchAdapter> = Arc::new(FakeSearch(vec![Candidate::new("CHEBI:1", "glucose", 0.9)]));
        let stage = GetDbIdStage::new("get_chebi", store.clone(), search, chemical_ontology(), "ds.json", None);

        stage.call(doc_id).await.unwrap();
        stage.call(doc_id).await.unwrap();

        let records: Vec<MappingRecord> =
            serde_json::from_value(store.get(doc_id, "chebi_map.json").await.unwrap().unwrap().into_json().unwrap()).unwrap();
        assert_eq!(records.len(), 1);
    }
}
