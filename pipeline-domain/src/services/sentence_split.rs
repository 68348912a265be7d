//! Sentence tokenization for abstract text.
//!
//! The reference corpus splits abstracts into sentences with a trained
//! Punkt tokenizer; this crate has no equivalent model dependency, so it
//! applies a conservative rule-based splitter instead: break on `.`, `!`,
//! or `?` followed by whitespace and an uppercase letter or digit, while
//! holding back on a short list of common abbreviations so `"e.g."`,
//! `"Fig."`, and similar don't get treated as sentence boundaries.

use once_cell::sync::Lazy;
use regex::Regex;

const ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "etc.", "vs.", "Fig.", "fig.", "al.", "Dr.", "Mr.", "Mrs.", "Ms.", "no.", "No.",
    "approx.", "ca.", "cf.",
];

static BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?P<end>[.!?])\s+(?P<next>[A-Z0-9])").unwrap());

/// Splits `text` into sentences, preserving original whitespace within
/// each sentence and trimming the boundary whitespace between them.
pub fn split_sentences(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut start = 0usize;

    for m in BOUNDARY.find_iter(text) {
        let end_char = &text[m.start()..m.start() + 1];
        let boundary_end = m.start() + end_char.len();

        let preceding = &text[start..boundary_end];
        if ends_with_abbreviation(preceding) {
            continue;
        }

        sentences.push(text[start..boundary_end].trim().to_string());
        // next sentence begins at the captured uppercase/digit char
        start = m.end() - 1;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

fn ends_with_abbreviation(s: &str) -> bool {
    ABBREVIATIONS.iter().any(|abbr| s.ends_with(abbr))
}
