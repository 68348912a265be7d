//! Per-entity ontology mapping record produced by the mapping and judge
//! stages (§4.5.2, §4.5.3): the candidates a search turned up, and which
//! one (if any) was chosen as the entity's database identifier.

use serde::{Deserialize, Serialize};

use crate::value_objects::Candidate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub entity_name: String,
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub species: Option<String>,
    pub hits: Vec<Candidate>,
    #[serde(default)]
    pub llm_best_match: Option<String>,
}

impl MappingRecord {
    pub fn new(entity_name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            entity_type: entity_type.into(),
            description: String::new(),
            species: None,
            hits: Vec::new(),
            llm_best_match: None,
        }
    }

    /// The candidate chosen by the judge, resolved from `llm_best_match`
    /// against `hits` by id; `None` when no hit matched (chebi_judge's
    /// `match_llm_output_to_chebi` falls through to this case on an
    /// LLM answer that names no known candidate).
    pub fn resolved(&self) -> Option<&Candidate> {
        let best = self.llm_best_match.as_deref()?;
        self.hits.iter().find(|c| c.id == best)
    }
}
