//! Search result candidates returned by a [`crate::services::search_adapter::SearchAdapter`].

use serde::{Deserialize, Serialize};

/// One scored hit from a hybrid (dense + sparse) or taxonomic search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Final fused score (dense + SPLADE, each max-normalized before
    /// weighting), descending order within a result set.
    pub score: f64,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            score,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
