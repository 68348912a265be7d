//! Entities: domain objects with identity that persists across stages.

pub mod mapping_record;
pub mod relation_doc;

pub use mapping_record::MappingRecord;
pub use relation_doc::{Entity, RelationLabel, RelationRecord, RelationsDocument, SentenceRelations};
