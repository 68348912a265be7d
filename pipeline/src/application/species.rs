// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The species resolution ladder (§4.5.3 Step A point 1), shared by
//! `get_db_id`, `convert_failed`, and `apply_llm_best` so the three
//! stages that need "what species is this entity's record for" agree on
//! one answer. Grounded on `original_source/src/pmcad/map_ontology.py`'s
//! `resolve_species` helper.
//!
//! Order of preference:
//! 1. an entity's own `meta` carries a `species`-typed sub-entity;
//! 2. the relation the entity participates in names a species, in its
//!    `contexts` first, then `components`/`targets` (and their `meta`);
//! 3. a `cell_line`-typed entity (on the entity itself or the relation)
//!    resolves to a species via the document's cell-line-to-species
//!    proxy map;
//! 4. the first species named anywhere else in the document.

use std::collections::HashMap;

use pipeline_domain::entities::relation_doc::{Entity, RelationRecord, RelationsDocument};

/// Resolves the species that should disambiguate `entity`'s ontology
/// query, given the relation it was found in (if any), a cell-line to
/// species proxy map, and a precomputed document-wide fallback (see
/// [`document_fallback_species`] — computed once up front by callers so
/// this function never needs to re-walk the whole document itself).
pub fn resolve_species(
    doc_fallback: Option<&str>,
    relation: Option<&RelationRecord>,
    entity: &Entity,
    cell_line_species: &HashMap<String, String>,
) -> Option<String> {
    if let Some(s) = find_species_tag(&entity.meta) {
        return Some(s);
    }

    if let Some(rel) = relation {
        if let Some(s) = find_species_tag(&rel.contexts) {
            return Some(s);
        }
        if let Some(s) = find_species_tag(&rel.components) {
            return Some(s);
        }
        if let Some(s) = find_species_tag(&rel.targets) {
            return Some(s);
        }
    }

    let cell_line = find_entity_of_type(std::slice::from_ref(entity), "cell_line").or_else(|| {
        relation.and_then(|r| {
            find_entity_of_type(&r.components, "cell_line").or_else(|| find_entity_of_type(&r.targets, "cell_line"))
        })
    });
    if let Some(cl) = cell_line {
        if let Some(species) = cell_line_species.get(&cl.name) {
            return Some(species.clone());
        }
    }

    doc_fallback.map(|s| s.to_string())
}

/// The first species named anywhere in the document, used as the last
/// rung of the resolution ladder. Computed once per stage call, before
/// any mutation, so later per-entity resolution never needs to borrow
/// the whole document.
pub fn document_fallback_species(doc: &RelationsDocument) -> Option<String> {
    for sentence in &doc.relations {
        for record in &sentence.rel_from_this_sent {
            if let Some(s) = find_species_tag(&record.contexts) {
                return Some(s);
            }
            if let Some(s) = find_species_tag(&record.components) {
                return Some(s);
            }
            if let Some(s) = find_species_tag(&record.targets) {
                return Some(s);
            }
        }
    }
    None
}

fn find_species_tag(entities: &[Entity]) -> Option<String> {
    for e in entities {
        if e.entity_type == "species" {
            return Some(e.name.clone());
        }
    }
    for e in entities {
        if let Some(s) = find_species_tag(&e.meta) {
            return Some(s);
        }
    }
    None
}

fn find_entity_of_type<'a>(entities: &'a [Entity], ty: &str) -> Option<&'a Entity> {
    entities.iter().find(|e| e.entity_type == ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::entities::relation_doc::RelationLabel;

    fn entity_with_species_meta(name: &str, ty: &str, species: &str) -> Entity {
        let mut e = Entity::new(name, ty);
        e.meta.push(Entity::new(species, "species"));
        e
    }

    #[test]
    fn prefers_entity_level_species() {
        let e = entity_with_species_meta("TP53", "gene", "human");
        let got = resolve_species(Some("mouse"), None, &e, &HashMap::new());
        assert_eq!(got.as_deref(), Some("human"));
    }

    #[test]
    fn falls_back_to_relation_contexts() {
        let e = Entity::new("TP53", "gene");
        let rel = RelationRecord {
            components: vec![],
            relation: RelationLabel { name: "activates".to_string(), description: String::new() },
            targets: vec![],
            contexts: vec![Entity::new("rat", "species")],
            valid: None,
        };
        let got = resolve_species(None, Some(&rel), &e, &HashMap::new());
        assert_eq!(got.as_deref(), Some("rat"));
    }

    #[test]
    fn resolves_cell_line_via_proxy_map() {
        let e = Entity::new("HeLa", "cell_line");
        let mut proxy = HashMap::new();
        proxy.insert("HeLa".to_string(), "human".to_string());
        let got = resolve_species(None, None, &e, &proxy);
        assert_eq!(got.as_deref(), Some("human"));
    }

    #[test]
    fn falls_back_to_document_wide_species_when_nothing_else_matches() {
        let e = Entity::new("unknown_gene", "gene");
        let got = resolve_species(Some("zebrafish"), None, &e, &HashMap::new());
        assert_eq!(got.as_deref(), Some("zebrafish"));
    }
}
