// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Converts the YAML-facing [`adaptive_pipeline_bootstrap::OntologyConfigEntry`]
//! into the domain's [`OntologyDescriptor`]. `pipeline-bootstrap` has no
//! dependency on `pipeline-domain` (it is the composition root's config
//! loader, not a domain-aware crate), so this conversion lives here, in
//! the one layer that depends on both.

use adaptive_pipeline_bootstrap::OntologyConfigEntry;
use pipeline_domain::value_objects::ontology::{JudgePolicy, OntologyDescriptor};
use pipeline_domain::PipelineError;

pub fn to_domain(entry: &OntologyConfigEntry) -> Result<OntologyDescriptor, PipelineError> {
    let judge_policy = match entry.judge_policy.to_lowercase().as_str() {
        "strict" => JudgePolicy::Strict,
        "relaxed" => JudgePolicy::Relaxed,
        "forced" => JudgePolicy::Forced,
        other => {
            return Err(PipelineError::invalid_config(format!(
                "ontology {}: unknown judge_policy \"{other}\" (expected strict, relaxed, or forced)",
                entry.db_type
            )))
        }
    };

    Ok(OntologyDescriptor::new(
        entry.ontology_types.clone(),
        entry.db_type.clone(),
        entry.filename.clone(),
        entry.use_species,
        entry.index_name.clone(),
        judge_policy,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_known_judge_policies() {
        let entry = OntologyConfigEntry {
            ontology_types: vec!["chemical".to_string()],
            db_type: "chebi".to_string(),
            filename: "chebi_map.json".to_string(),
            use_species: false,
            index_name: "chebi".to_string(),
            judge_policy: "Strict".to_string(),
            search_kind: "hybrid".to_string(),
        };
        let domain = to_domain(&entry).unwrap();
        assert_eq!(domain.judge_policy, JudgePolicy::Strict);
        assert!(domain.handles("chemical"));
    }

    #[test]
    fn rejects_unknown_judge_policy() {
        let entry = OntologyConfigEntry {
            ontology_types: vec!["chemical".to_string()],
            db_type: "chebi".to_string(),
            filename: "chebi_map.json".to_string(),
            use_species: false,
            index_name: "chebi".to_string(),
            judge_policy: "whatever".to_string(),
            search_kind: "hybrid".to_string(),
        };
        assert!(to_domain(&entry).is_err());
    }
}
