//! External HTTP adapters implementing the domain's outbound ports
//! (`LlmClient`, `SearchAdapter`) plus the PubMed fetch helper.

pub mod hybrid_search;
pub mod llm_client;
pub mod pubmed_client;
pub mod taxonomic_search;

pub use hybrid_search::HttpHybridSearch;
pub use llm_client::HttpLlmClient;
pub use pubmed_client::PubmedClient;
pub use taxonomic_search::HttpTaxonomicSearch;
