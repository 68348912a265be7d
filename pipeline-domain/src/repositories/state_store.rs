//! The embedded relational state store port (§4.1): per-document artifact
//! storage keyed by `(doc_id, artifact_name)`, plus the source abstract
//! text each document is seeded with.

use async_trait::async_trait;

use crate::error::Result;
use crate::value_objects::{ArtifactValue, DocId};

/// Durable storage for document abstracts and the artifacts each pipeline
/// stage produces. A single implementation (`pipeline`'s SQLite-backed
/// store) also implements [`crate::repositories::queue_store::QueueStore`]
/// against the same connection pool, but the two ports are kept separate
/// here because nothing above the infrastructure layer needs them bundled.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The source abstract text for a document. Returns
    /// [`crate::error::PipelineError::InputMissing`] if the document was
    /// never seeded.
    async fn get_abstract(&self, doc_id: DocId) -> Result<String>;

    /// Seeds or overwrites a document's abstract text.
    async fn put_abstract(&self, doc_id: DocId, text: &str) -> Result<()>;

    /// Reads one artifact for a document, if present.
    async fn get(&self, doc_id: DocId, name: &str) -> Result<Option<ArtifactValue>>;

    /// Writes (creating or overwriting) one artifact for a document.
    async fn put(&self, doc_id: DocId, name: &str, value: ArtifactValue) -> Result<()>;

    /// Whether an artifact exists for a document, without fetching it.
    async fn has(&self, doc_id: DocId, name: &str) -> Result<bool>;

    /// All document ids known to the store (i.e. that have a seeded
    /// abstract), in ascending order.
    async fn all_doc_ids(&self) -> Result<Vec<DocId>>;
}
