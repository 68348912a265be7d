//! Ontology registry descriptors used by the mapping, conversion, and
//! assembly stages (§3 "Ontology descriptor", §4.5.3–§4.5.6) to know which
//! entity types an ontology backs, which search index and species handling
//! apply, and how an LLM judges a single best candidate out of several.

use serde::{Deserialize, Serialize};

/// One row of the ontology registry (§3): which entity `type` tags an
/// ontology backs, its stable short name, the artifact name its mapping
/// result is written under, whether species resolution applies, which
/// search index serves it, and its judge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyDescriptor {
    /// One or more semantic type tags this ontology backs, e.g.
    /// `["chemical"]` or `["biological_process", "cell_type"]`.
    pub ontology_types: Vec<String>,
    /// Stable short name, e.g. `"chebi"`, `"go"`, `"ncbitaxon"`.
    pub db_type: String,
    /// Artifact name this ontology's mapping result (a
    /// [`crate::entities::mapping_record::MappingRecord`] list) is written
    /// under, e.g. `"chebi_map.json"`.
    pub filename: String,
    /// Whether candidate queries for this ontology are disambiguated by
    /// resolved species (§4.5.3 Step A point 1's resolution ladder).
    pub use_species: bool,
    /// Hybrid or taxonomic search index this ontology's terms live in.
    pub index_name: String,
    pub judge_policy: JudgePolicy,
}

impl OntologyDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ontology_types: Vec<String>,
        db_type: impl Into<String>,
        filename: impl Into<String>,
        use_species: bool,
        index_name: impl Into<String>,
        judge_policy: JudgePolicy,
    ) -> Self {
        Self {
            ontology_types,
            db_type: db_type.into(),
            filename: filename.into(),
            use_species,
            index_name: index_name.into(),
            judge_policy,
        }
    }

    /// Whether `entity_type` is one of this ontology's tags.
    pub fn handles(&self, entity_type: &str) -> bool {
        self.ontology_types.iter().any(|t| t == entity_type)
    }
}

/// How a single best database id is chosen from several hybrid-search
/// candidates (§3, §4.5.3 Step B). `Strict` requires the model to commit to
/// exactly one candidate or `None`; `Relaxed` allows a looser selection
/// prompt tolerant of partial matches; `Forced` always takes a candidate
/// (falling back to the top hit rather than accepting `None`) for
/// ontologies where an unresolved entity is worse than a best-effort one
/// (e.g. species resolution against NCBITaxon).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgePolicy {
    Strict,
    Relaxed,
    Forced,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_checks_any_tag() {
        let ot = OntologyDescriptor::new(
            vec!["chemical".to_string(), "drug".to_string()],
            "chebi",
            "chebi_map.json",
            false,
            "chebi",
            JudgePolicy::Strict,
        );
        assert!(ot.handles("drug"));
        assert!(!ot.handles("gene"));
    }
}
