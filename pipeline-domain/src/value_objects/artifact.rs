//! Artifact naming and content, per the persisted artifact contract.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The name an artifact is stored and retrieved under within a document's
/// row, e.g. `"abstract"`, `"ds.json"`, `"2_ds.json"`. Stage numbering
/// prefixes (`"{idx}_"`) are baked into the name itself rather than kept
/// as a separate field, matching how the state store keys artifacts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactName(pub String);

impl ArtifactName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Builds a numbered artifact name for the given 1-based pipeline step
    /// index: the first step is unprefixed, later steps get `"{idx}_"`.
    pub fn numbered(step_index: usize, base: &str) -> Self {
        if step_index <= 1 {
            Self(base.to_string())
        } else {
            Self(format!("{step_index}_{base}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ArtifactName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The content stored under an artifact name. Most artifacts are structured
/// JSON; plain text (the source abstract) is kept as raw text rather than a
/// JSON string so it round-trips without quoting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ArtifactValue {
    Json(Value),
    Text(String),
}

impl ArtifactValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ArtifactValue::Json(v) => Some(v),
            ArtifactValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArtifactValue::Text(s) => Some(s),
            ArtifactValue::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            ArtifactValue::Json(v) => Some(v),
            ArtifactValue::Text(_) => None,
        }
    }
}
