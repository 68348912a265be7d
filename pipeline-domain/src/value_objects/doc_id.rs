//! Document identity.

use std::fmt;

/// The externally assigned identifier for a document (a PubMed ID in the
/// reference corpus, but the domain only ever treats it as an opaque
/// integer key into the state store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DocId(pub i64);

impl DocId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DocId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

impl From<DocId> for i64 {
    fn from(v: DocId) -> Self {
        v.0
    }
}
