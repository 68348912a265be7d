// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Configuration
//!
//! Two YAML documents loaded through the `config` crate's layered
//! builder (file + environment override), per §6 "Configuration" and
//! `SPEC_FULL.md` §1c:
//!
//! - [`ServiceConfig`] (`services.yaml`): LLM pool entries, the hybrid
//!   and taxonomic search endpoints, the PubMed fetch rate, the global
//!   rate limiter's state directory, and the state store's database
//!   path.
//! - [`StageConfig`] (one per stage, e.g. `stage_extract.yaml`): stage
//!   name, upstream op queue names, artifact names, ontology
//!   descriptors, judge policy, worker count, per-step concurrency caps,
//!   and which LLM pool entries the stage may use.
//!
//! Both deny unknown YAML fields so a misspelled key fails fast at
//! startup as `ConfigError::Validation` rather than silently no-op'ing —
//! the same validate-early posture `cli::validate_cli` takes for
//! command-line arguments.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// One LLM pool entry (§4.7, §6): a single HTTP chat-completion backend
/// workers round-robin across.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmEndpointConfig {
    /// Short, stable label used in round-robin bookkeeping and log fields.
    pub label: String,
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub proxy: Option<String>,
    /// Strip a leading `<think>...</think>` reasoning preamble from
    /// responses (§4.7).
    #[serde(default)]
    pub remove_think: bool,
    /// Wire format: `"openai"` (`/chat/completions`) or `"ollama"`
    /// (`/api/generate`) — supplements §4.7 from
    /// `original_source/src/services/llm.py`'s two supported response
    /// shapes.
    #[serde(default = "default_llm_format")]
    pub format: String,
}

fn default_llm_format() -> String {
    "openai".to_string()
}

/// Rate limiter settings for one named external service (§4.3): at most
/// `requests_per_window` requests per `window_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_requests")]
    pub requests_per_window: usize,
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: f64,
}

fn default_rate_requests() -> usize {
    5
}

fn default_rate_window_secs() -> f64 {
    1.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_rate_requests(),
            window_secs: default_rate_window_secs(),
        }
    }
}

/// Top-level service configuration (`services.yaml`): external endpoints
/// and process-wide infrastructure settings shared by every stage driver
/// process (§9 "Global mutable state as process-wide handles").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// SQLite connection URL for the state store, e.g.
    /// `sqlite://./pipeline.db`.
    pub database_url: String,
    pub llm_pool: Vec<LlmEndpointConfig>,
    pub hybrid_search_endpoint: String,
    #[serde(default)]
    pub hybrid_search_api_key: Option<String>,
    pub taxonomic_search_endpoint: String,
    #[serde(default)]
    pub taxonomic_search_api_key: Option<String>,
    /// PubMed E-utilities fetch rate in requests/second (default 1, §4.7).
    #[serde(default = "default_pubmed_rate")]
    pub pubmed_rate_per_sec: f64,
    /// Directory the file-lock-backed global rate limiter (§4.3) stores
    /// its per-service state files under.
    pub rate_limiter_state_dir: String,
    #[serde(default)]
    pub rate_limits: std::collections::HashMap<String, RateLimitConfig>,
}

fn default_pubmed_rate() -> f64 {
    1.0
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_yaml(path)
    }

    pub fn rate_limit_for(&self, service: &str) -> RateLimitConfig {
        self.rate_limits.get(service).cloned().unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_pool.is_empty() {
            return Err(ConfigError::Validation(
                "services.yaml: llm_pool must declare at least one endpoint".to_string(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "services.yaml: database_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One ontology descriptor row as expressed in stage configuration
/// (mirrors `pipeline_domain::value_objects::ontology::OntologyDescriptor`,
/// kept as a separate serde type here since the config file's shape
/// — `judge_policy` as a lowercase string — is a presentation detail of
/// the YAML format, not a domain concern; conversion to the domain type
/// happens in `pipeline`'s application layer, which owns the domain
/// dependency this crate deliberately does not take).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OntologyConfigEntry {
    /// Semantic type tags this ontology backs (§3), e.g. `["chemical"]`.
    pub ontology_types: Vec<String>,
    /// Stable short name, e.g. `"chebi"`.
    pub db_type: String,
    /// Artifact name this ontology's mapping result is written under.
    pub filename: String,
    #[serde(default)]
    pub use_species: bool,
    pub index_name: String,
    /// `"strict"`, `"relaxed"`, or `"forced"`.
    pub judge_policy: String,
    /// Which `search_func` (§3) backs `index_name`: `"hybrid"` (dense +
    /// sparse fusion, §4.7) or `"taxonomic"` (token-exact scoring). The
    /// domain descriptor doesn't carry this — it picks the concrete
    /// `SearchAdapter` the composition root wires up, not a domain concern.
    #[serde(default = "default_search_kind")]
    pub search_kind: String,
}

fn default_search_kind() -> String {
    "hybrid".to_string()
}

/// Which §4.5 stage callable this stage configuration builds. The
/// function-pointer/lookup-table dispatch §9's design notes recommend is
/// implemented as a match over this tag in `pipeline`'s composition root,
/// the one place that knows how to construct every concrete
/// `StageCallable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    ExtractRelations,
    OntologyDecomposition,
    GetDbId,
    JudgeDbId,
    ConvertFailed,
    ValidateRelations,
    ApplyLlmBest,
}

/// Per-stage configuration (one file per stage, e.g. `stage_extract.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Stage name; also the done-queue name (§4.2).
    pub stage_name: String,
    /// Which stage callable to construct (§4.5, §9).
    pub kind: StageKind,
    /// Upstream op queue names (either explicit item queues or another
    /// stage's done-set name, both resolved symmetrically by the queue
    /// store, §4.2).
    #[serde(default)]
    pub op_queue_names: Vec<String>,
    /// When set (and `op_queue_names` empty), resume-only mode: sources
    /// are upstream done-sets directly (§4.4's "resume-only mode").
    #[serde(default)]
    pub done_source_names: Vec<String>,
    pub input_artifact: Option<String>,
    pub output_artifact: Option<String>,
    #[serde(default)]
    pub ontologies: Vec<OntologyConfigEntry>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub per_step_max: Vec<usize>,
    /// Labels (from `ServiceConfig::llm_pool`) this stage may round-robin
    /// across; empty means "use the whole pool".
    #[serde(default)]
    pub llm_pool_labels: Vec<String>,
    #[serde(default = "default_queue_sleep")]
    pub queue_sleep_secs: f64,
    #[serde(default)]
    pub clear_done_on_start: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Entity types `ontology_decomposition` should try to decompose
    /// (§4.5.2), e.g. `["biological_process", "cell_type"]`.
    #[serde(default)]
    pub decompose_types: Vec<String>,
    /// `validate_relations`: skip relations that already carry a `valid`
    /// field (§4.5.5's idempotence rule). Defaults to true; set false to
    /// force re-judging everything.
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    /// `validate_relations`: an artifact name that must exist for the
    /// document before validation runs, otherwise the stage reports
    /// `InputMissing` and skips it (§4.5.5).
    #[serde(default)]
    pub prerequisite_artifact: Option<String>,
    /// `get_db_id`/`apply_llm_best`: artifact name of the sibling
    /// cell-line-to-species mapping used by the species resolution ladder
    /// (§4.5.3 Step A point 1).
    #[serde(default)]
    pub cell_line_species_artifact: Option<String>,
}

fn default_workers() -> usize {
    4
}

fn default_queue_sleep() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl StageConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg: Self = load_yaml(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stage_name.trim().is_empty() {
            return Err(ConfigError::Validation("stage_name must not be empty".to_string()));
        }
        if self.op_queue_names.is_empty() && self.done_source_names.is_empty() {
            return Err(ConfigError::Validation(format!(
                "stage {}: must declare op_queue_names or done_source_names (§4.4 queue mode / resume-only mode)",
                self.stage_name
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError::Validation(format!(
                "stage {}: workers must be greater than 0",
                self.stage_name
            )));
        }
        Ok(())
    }
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("PIPELINE").separator("__"))
        .build()
        .map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: serde_yaml::Error::custom(e.to_string()),
        })?;

    settings.try_deserialize().map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: serde_yaml::Error::custom(e.to_string()),
    })
}

/// `serde_yaml::Error` has no public constructor, so wrap a `config`-crate
/// error as one via its `Deserialize`-error path, keeping [`ConfigError`]'s
/// two I/O-vs-parse variants meaningful regardless of which underlying
/// crate actually detected the problem.
trait CustomYamlError {
    fn custom(msg: String) -> serde_yaml::Error;
}

impl CustomYamlError for serde_yaml::Error {
    fn custom(msg: String) -> serde_yaml::Error {
        match serde_yaml::from_str::<()>(&format!("!!! {msg}")) {
            Err(e) => e,
            Ok(_) => unreachable!("deliberately malformed YAML always fails to parse"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_valid_service_config() {
        let yaml = r#"
database_url: "sqlite://./pipeline.db"
llm_pool:
  - label: "primary"
    endpoint: "http://localhost:8000/v1/chat/completions"
    model: "qwen2.5"
hybrid_search_endpoint: "http://localhost:9200"
taxonomic_search_endpoint: "http://localhost:9201"
rate_limiter_state_dir: "/tmp/pipeline-rate-limits"
"#;
        let f = write_temp(yaml);
        let cfg = ServiceConfig::load(f.path()).unwrap();
        assert_eq!(cfg.llm_pool.len(), 1);
        assert_eq!(cfg.pubmed_rate_per_sec, 1.0);
    }

    #[test]
    fn rejects_empty_llm_pool() {
        let yaml = r#"
database_url: "sqlite://./pipeline.db"
llm_pool: []
hybrid_search_endpoint: "http://localhost:9200"
taxonomic_search_endpoint: "http://localhost:9201"
rate_limiter_state_dir: "/tmp/pipeline-rate-limits"
"#;
        let f = write_temp(yaml);
        let err = ServiceConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_field() {
        let yaml = r#"
database_url: "sqlite://./pipeline.db"
llm_pool:
  - label: "primary"
    endpoint: "http://localhost:8000"
    model: "qwen2.5"
hybrid_search_endpoint: "http://localhost:9200"
taxonomic_search_endpoint: "http://localhost:9201"
rate_limiter_state_dir: "/tmp/pipeline-rate-limits"
totally_unknown_field: true
"#;
        let f = write_temp(yaml);
        assert!(ServiceConfig::load(f.path()).is_err());
    }

    #[test]
    fn loads_valid_stage_config() {
        let yaml = r#"
stage_name: "extract"
kind: extract_relations
op_queue_names: []
done_source_names: ["ingest"]
input_artifact: null
output_artifact: "qw.json"
workers: 8
"#;
        let f = write_temp(yaml);
        let cfg = StageConfig::load(f.path()).unwrap();
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.done_source_names, vec!["ingest".to_string()]);
    }

    #[test]
    fn rejects_stage_with_no_op_sources() {
        let yaml = r#"
stage_name: "extract"
kind: extract_relations
output_artifact: "qw.json"
"#;
        let f = write_temp(yaml);
        let err = StageConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
