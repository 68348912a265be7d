//! The relation-extraction document entity, matching the `ds.json`
//! artifact contract (§6): one abstract broken into sentences, each
//! carrying the relations extracted from it.

use serde::{Deserialize, Serialize};

use crate::value_objects::DocId;

/// Top-level artifact produced by the relation-extraction stage and
/// threaded, enriched, through every later stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationsDocument {
    pub pmid: i64,
    pub abstract_text: String,
    pub relations: Vec<SentenceRelations>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RelationsDocument {
    pub fn doc_id(&self) -> DocId {
        DocId::new(self.pmid)
    }

    pub fn total_relation_count(&self) -> usize {
        self.relations.iter().map(|s| s.rel_from_this_sent.len()).sum()
    }
}

/// Relations extracted from a single sentence of the abstract, carried
/// alongside the sentence text so later stages (and a human reviewer) can
/// see the evidence a relation came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceRelations {
    pub sentence: String,
    pub rel_from_this_sent: Vec<RelationRecord>,
}

/// One extracted relation: components act on targets, within a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub components: Vec<Entity>,
    pub relation: RelationLabel,
    pub targets: Vec<Entity>,
    #[serde(default)]
    pub contexts: Vec<Entity>,
    /// Set by the relation-validation stage (§4.5.5); absent means
    /// "not yet judged".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationLabel {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A named, typed entity participating in a relation (gene, protein, RNA,
/// GO term, chemical, cell type, cell line, anatomy, disease, SO term,
/// species, or domain). Ontology mapping and conversion stages attach
/// `db_id`/`db_name` once a stable identifier has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub meta: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            description: String::new(),
            meta: Vec::new(),
            db_id: None,
            db_name: None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.db_id.is_some()
    }
}
