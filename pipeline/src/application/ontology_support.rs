// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Query construction, candidate rendering, and LLM-answer matching
//! shared by every ontology-mapping stage (§4.5.3 Step A/B, §4.5.4).
//! Grounded on `original_source/src/pmcad/chebi_judge.py`'s
//! `build_chebi_selection_prompt` and `match_llm_output_to_chebi` — the
//! judge-policy templates below are that function generalized over the
//! three policies instead of hardcoded to ChEBI.

use once_cell::sync::Lazy;
use regex::Regex;

use pipeline_domain::entities::mapping_record::MappingRecord;
use pipeline_domain::value_objects::candidate::Candidate;
use pipeline_domain::value_objects::ontology::JudgePolicy;

const MAX_CANDIDATES: usize = 30;
const MAX_DESCRIPTION_CHARS: usize = 200;
const MAX_CANDIDATE_BLOCK_CHARS: usize = 4000;

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").unwrap());

/// Builds the free-text search query for an entity: name, optional
/// description, optional resolved species, joined and stripped of
/// parenthetical/bracketed asides that tend to confuse hybrid search
/// (acronym expansions, cross-references).
pub fn build_query(name: &str, description: &str, species: Option<&str>) -> String {
    let mut q = name.to_string();
    if !description.is_empty() {
        q.push_str(", ");
        q.push_str(description);
    }
    if let Some(sp) = species {
        if !sp.is_empty() {
            q.push_str(", ");
            q.push_str(sp);
        }
    }
    PARENTHETICAL.replace_all(&q, "").trim().to_string()
}

fn render_candidates(hits: &[Candidate]) -> String {
    let mut block = String::new();
    for c in hits.iter().take(MAX_CANDIDATES) {
        let desc: String = c.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        let line = format!("- id: {} | name: {} | description: {}\n", c.id, c.name, desc);
        if block.len() + line.len() > MAX_CANDIDATE_BLOCK_CHARS {
            break;
        }
        block.push_str(&line);
    }
    block
}

const STRICT_TEMPLATE: &str = "\
You are choosing one database identifier for a named entity extracted from a \
biomedical abstract. Respond with exactly one candidate id, or the single \
word None if none of the candidates clearly refers to the entity.

Entity: {name}
Description: {description}

Candidates:
{candidates}

Context (abstract excerpt):
{context}

Answer with exactly one id from the candidate list above, or None.";

const RELAXED_TEMPLATE: &str = "\
You are choosing the database identifier that best matches a named entity \
extracted from a biomedical abstract. Minor differences in wording or \
specificity between the entity and a candidate's name are acceptable; \
choose the closest candidate. Respond with exactly one candidate id, or the \
single word None if truly nothing plausible is listed.

Entity: {name}
Description: {description}

Candidates:
{candidates}

Context (abstract excerpt):
{context}

Answer with exactly one id from the candidate list above, or None.";

const FORCED_TEMPLATE: &str = "\
You are choosing the database identifier that best matches a named entity \
extracted from a biomedical abstract. Always choose the single closest \
candidate from the list below, even if the match is imperfect — do not \
answer None.

Entity: {name}
Description: {description}

Candidates:
{candidates}

Context (abstract excerpt):
{context}

Answer with exactly one id from the candidate list above.";

/// Builds the Step B judge prompt (§4.5.3) for one mapping record, with
/// the abstract excerpt capped so the prompt stays a bounded size
/// regardless of abstract length.
pub fn build_judge_prompt(policy: JudgePolicy, record: &MappingRecord, abstract_text: &str) -> String {
    let template = match policy {
        JudgePolicy::Strict => STRICT_TEMPLATE,
        JudgePolicy::Relaxed => RELAXED_TEMPLATE,
        JudgePolicy::Forced => FORCED_TEMPLATE,
    };
    let context: String = abstract_text.chars().take(1500).collect();
    template
        .replace("{name}", &record.entity_name)
        .replace("{description}", &record.description)
        .replace("{candidates}", &render_candidates(&record.hits))
        .replace("{context}", &context)
}

pub const JUDGE_SYSTEM_PROMPT: &str =
    "You are a precise biomedical curation assistant. Only answer with a candidate id or the word None.";

/// Strips surrounding quotes/whitespace and upper-cases an LLM's answer,
/// matching `chebi_judge.py`'s normalization before substring matching.
fn normalize_answer(raw: &str) -> String {
    raw.trim().trim_matches(|c| c == '"' || c == '\'').to_uppercase()
}

/// Matches a judge's raw answer against a record's hits: by id first
/// (substring either direction), then by name, returning `None` if the
/// answer is literally "none" or matches nothing (§4.5.3 Step B).
pub fn match_candidate(raw_answer: &str, hits: &[Candidate]) -> Option<String> {
    let answer = normalize_answer(raw_answer);
    if answer.is_empty() || answer == "NONE" {
        return None;
    }
    for c in hits {
        let id_upper = c.id.to_uppercase();
        if answer.contains(&id_upper) || id_upper.contains(&answer) {
            return Some(c.id.clone());
        }
    }
    for c in hits {
        if answer.contains(&c.name.to_uppercase()) {
            return Some(c.id.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_strips_parentheticals_and_joins_parts() {
        let q = build_query("TP53 (tumor protein p53)", "a transcription factor", Some("human"));
        assert_eq!(q, "TP53, a transcription factor, human");
    }

    #[test]
    fn match_candidate_finds_by_id_substring() {
        let hits = vec![Candidate::new("CHEBI:1234", "glucose", 0.9)];
        assert_eq!(match_candidate("The answer is CHEBI:1234.", &hits).as_deref(), Some("CHEBI:1234"));
    }

    #[test]
    fn match_candidate_finds_by_name_when_id_absent() {
        let hits = vec![Candidate::new("CHEBI:1234", "glucose", 0.9)];
        assert_eq!(match_candidate("\"GLUCOSE\"", &hits).as_deref(), Some("CHEBI:1234"));
    }

    #[test]
    fn match_candidate_returns_none_for_none_answer() {
        let hits = vec![Candidate::new("CHEBI:1234", "glucose", 0.9)];
        assert_eq!(match_candidate("None", &hits), None);
    }

    #[test]
    fn match_candidate_returns_none_when_nothing_matches() {
        let hits = vec![Candidate::new("CHEBI:1234", "glucose", 0.9)];
        assert_eq!(match_candidate("CHEBI:9999", &hits), None);
    }
}
