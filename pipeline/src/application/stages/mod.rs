//! The seven concrete stage callables (§4.5), each implementing
//! [`pipeline_domain::stage::StageCallable`].

pub mod apply_llm_best;
pub mod convert_failed;
pub mod extract_relations;
pub mod get_db_id;
pub mod judge_db_id;
pub mod ontology_decomposition;
pub mod validate_relations;

pub use apply_llm_best::ApplyLlmBestStage;
pub use convert_failed::ConvertFailedStage;
pub use extract_relations::ExtractRelationsStage;
pub use get_db_id::GetDbIdStage;
pub use judge_db_id::JudgeDbIdStage;
pub use ontology_decomposition::OntologyDecompositionStage;
pub use validate_relations::ValidateRelationsStage;
