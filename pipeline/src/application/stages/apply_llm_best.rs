// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Final assembly (§4.5.6): rewrites every entity an ontology resolved
//! with the canonical name/description/id from its chosen candidate,
//! looked up by `(name, species_final)`, falling back to `(name, "")`
//! and then to the lone same-named candidate when species disambiguation
//! fails to narrow to one record. Entities that stay unresolved are
//! dropped unless they're themselves the `relation` label. Grounded on
//! `original_source/src/pmcad/map_ontology.py`'s final assembly pass.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use pipeline_domain::entities::mapping_record::MappingRecord;
use pipeline_domain::entities::relation_doc::{Entity, RelationRecord, RelationsDocument};
use pipeline_domain::error::Result;
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::stage::{Info, StageCallable, StageReport};
use pipeline_domain::value_objects::ontology::OntologyDescriptor;
use pipeline_domain::value_objects::{ArtifactValue, DocId};

use crate::application::species::{document_fallback_species, resolve_species};

pub struct ApplyLlmBestStage {
    name: String,
    store: Arc<dyn StateStore>,
    relations_artifact: String,
    final_artifact: String,
    ontologies: Vec<OntologyDescriptor>,
    cell_line_species_artifact: Option<String>,
}

impl ApplyLlmBestStage {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        relations_artifact: impl Into<String>,
        final_artifact: impl Into<String>,
        ontologies: Vec<OntologyDescriptor>,
        cell_line_species_artifact: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            relations_artifact: relations_artifact.into(),
            final_artifact: final_artifact.into(),
            ontologies,
            cell_line_species_artifact,
        }
    }

    async fn load_cell_line_species(&self, doc_id: DocId) -> Result<HashMap<String, String>> {
        let Some(artifact_name) = &self.cell_line_species_artifact else {
            return Ok(HashMap::new());
        };
        match self.store.get(doc_id, artifact_name).await? {
            Some(value) => Ok(serde_json::from_value(value.into_json().unwrap_or(serde_json::Value::Null)).unwrap_or_default()),
            None => Ok(HashMap::new()),
        }
    }
}

#[async_trait]
impl StageCallable for ApplyLlmBestStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, doc_id: DocId) -> Result<StageReport> {
        let artifact = self
            .store
            .get(doc_id, &self.relations_artifact)
            .await?
            .ok_or_else(|| pipeline_domain::PipelineError::input_missing(doc_id.get(), self.relations_artifact.clone()))?;
        let mut doc: RelationsDocument = serde_json::from_value(
            artifact.into_json().ok_or_else(|| pipeline_domain::PipelineError::parse_failure("expected JSON artifact"))?,
        )?;

        let mut maps: HashMap<String, Vec<MappingRecord>> = HashMap::new();
        for ontology in &self.ontologies {
            let records: Vec<MappingRecord> = match self.store.get(doc_id, &ontology.filename).await? {
                Some(value) => serde_json::from_value(value.into_json().unwrap_or(serde_json::Value::Array(vec![])))?,
                None => Vec::new(),
            };
            maps.insert(ontology.db_type.clone(), records);
        }

        let cell_line_species = self.load_cell_line_species(doc_id).await?;
        let doc_fallback = document_fallback_species(&doc);

        let mut assembled = 0u64;
        let mut total = 0u64;

        for sentence in doc.relations.iter_mut() {
            for record in sentence.rel_from_this_sent.iter_mut() {
                let snapshot = record.clone();
                let (c, a, t) = apply_best(
                    std::mem::take(&mut record.components),
                    std::mem::take(&mut record.targets),
                    std::mem::take(&mut record.contexts),
                    &snapshot,
                    doc_fallback.as_deref(),
                    &maps,
                    &self.ontologies,
                    &cell_line_species,
                    &mut assembled,
                    &mut total,
                );
                record.components = c;
                record.targets = a;
                record.contexts = t;
            }
        }

        self.store.put(doc_id, &self.final_artifact, ArtifactValue::Json(serde_json::to_value(&doc)?)).await?;

        Ok(StageReport::new(vec![Info::metric("assembled", assembled, total)]))
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_best(
    components: Vec<Entity>,
    targets: Vec<Entity>,
    contexts: Vec<Entity>,
    relation_snapshot: &RelationRecord,
    doc_fallback: Option<&str>,
    maps: &HashMap<String, Vec<MappingRecord>>,
    ontologies: &[OntologyDescriptor],
    cell_line_species: &HashMap<String, String>,
    assembled: &mut u64,
    total: &mut u64,
) -> (Vec<Entity>, Vec<Entity>, Vec<Entity>) {
    let c = apply_best_to_list(components, Some(relation_snapshot), doc_fallback, maps, ontologies, cell_line_species, assembled, total);
    let t = apply_best_to_list(targets, Some(relation_snapshot), doc_fallback, maps, ontologies, cell_line_species, assembled, total);
    let x = apply_best_to_list(contexts, Some(relation_snapshot), doc_fallback, maps, ontologies, cell_line_species, assembled, total);
    (c, t, x)
}

#[allow(clippy::too_many_arguments)]
fn apply_best_to_list(
    entities: Vec<Entity>,
    relation: Option<&RelationRecord>,
    doc_fallback: Option<&str>,
    maps: &HashMap<String, Vec<MappingRecord>>,
    ontologies: &[OntologyDescriptor],
    cell_line_species: &HashMap<String, String>,
    assembled: &mut u64,
    total: &mut u64,
) -> Vec<Entity> {
    let mut out = Vec::with_capacity(entities.len());

    for mut entity in entities {
        let Some(ontology) = ontologies.iter().find(|o| o.handles(&entity.entity_type)) else {
            entity.meta = apply_best_to_list(
                std::mem::take(&mut entity.meta),
                relation,
                doc_fallback,
                maps,
                ontologies,
                cell_line_species,
                assembled,
                total,
            );
            out.push(entity);
            continue;
        };

        *total += 1;
        let species_final = if ontology.use_species {
            resolve_species(doc_fallback, relation, &entity, cell_line_species)
        } else {
            None
        };

        let records = maps.get(&ontology.db_type);
        let found = records.and_then(|recs| {
            recs.iter()
                .find(|r| r.entity_name == entity.name && r.species.as_deref() == species_final.as_deref())
                .or_else(|| recs.iter().find(|r| r.entity_name == entity.name && r.species.as_deref() == Some("")))
                .or_else(|| {
                    let matches: Vec<&MappingRecord> = recs.iter().filter(|r| r.entity_name == entity.name).collect();
                    if matches.len() == 1 {
                        Some(matches[0])
                    } else {
                        None
                    }
                })
        });

        let resolved = found.and_then(|r| r.resolved());
        if let Some(candidate) = resolved {
            entity.db_id = Some(candidate.id.clone());
            entity.db_name = Some(candidate.name.clone());
            entity.name = candidate.name.clone();
            entity.description = candidate.description.clone();

            if let Some(species) = &species_final {
                entity.meta.retain(|m| m.entity_type != "species");
                entity.meta.push(Entity::new(species.clone(), "species"));
            }
            entity.meta = apply_best_to_list(
                std::mem::take(&mut entity.meta),
                relation,
                doc_fallback,
                maps,
                ontologies,
                cell_line_species,
                assembled,
                total,
            );

            *assembled += 1;
            out.push(entity);
        } else if entity.entity_type == "relation" {
            out.push(entity);
        }
        // else: drop the unresolved entity
    }

    out
}
