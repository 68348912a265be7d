//! Stage callables and the shared helpers they're built from (§4.5):
//! species resolution, ontology query/prompt/matching support, and the
//! config-to-domain ontology conversion the composition root uses to
//! build a stage's ontologies from YAML.

pub mod composition;
pub mod ontology_registry;
pub mod ontology_support;
pub mod search_routing;
pub mod species;
pub mod stages;
