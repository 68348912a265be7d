//! The search adapter port (§4.7): hybrid dense+sparse ontology lookup and
//! plain taxonomic lookup, behind one trait since both return the same
//! candidate shape.

use async_trait::async_trait;

use crate::error::Result;
use crate::value_objects::Candidate;

/// A searchable ontology or taxonomy index.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Returns up to `k` candidates for `query` against `index_name`,
    /// ranked by fused score descending. Implementations performing
    /// hybrid search apply dense-KNN recall followed by SPLADE sparse
    /// rescoring and max-normalized fusion (§4.7); implementations
    /// performing plain taxonomic lookup may skip the sparse pass
    /// entirely and still satisfy this contract.
    async fn search(&self, index_name: &str, query: &str, k: usize) -> Result<Vec<Candidate>>;
}
