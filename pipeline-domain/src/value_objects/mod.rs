//! Value objects: small, immutable, equality-by-value types with no
//! identity of their own.

pub mod artifact;
pub mod candidate;
pub mod doc_id;
pub mod ontology;
pub mod queue_names;

pub use artifact::{ArtifactName, ArtifactValue};
pub use candidate::Candidate;
pub use doc_id::DocId;
pub use ontology::{JudgePolicy, OntologyDescriptor};
pub use queue_names::{QueueName, StageName};
