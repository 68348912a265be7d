// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Composition-root helpers (§9's "function-pointer/lookup-table
//! representation" for stage construction): turns a loaded
//! [`ServiceConfig`]/[`StageConfig`] pair into the concrete LLM pool,
//! search router, and single [`StageCallable`] a `run-stage` invocation
//! needs. Kept out of `main.rs` so the binary itself stays a thin CLI
//! shell around these functions.

use std::collections::HashMap;
use std::sync::Arc;

use adaptive_pipeline_bootstrap::{LlmEndpointConfig, OntologyConfigEntry, RateLimitConfig, ServiceConfig, StageConfig, StageKind};

use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::repositories::state_store::StateStore;
use pipeline_domain::services::{LlmClient, RateLimiter, SearchAdapter};
use pipeline_domain::stage::StageCallable;
use pipeline_domain::value_objects::ontology::OntologyDescriptor;

use crate::application::ontology_registry;
use crate::application::search_routing::RoutingSearchAdapter;
use crate::application::stages::{
    ApplyLlmBestStage, ConvertFailedStage, ExtractRelationsStage, GetDbIdStage, JudgeDbIdStage, OntologyDecompositionStage,
    ValidateRelationsStage,
};
use crate::infrastructure::adapters::{HttpHybridSearch, HttpLlmClient, HttpTaxonomicSearch};
use crate::infrastructure::rate_limiter::{FileRateLimiter, RateLimitedLlmClient, RateLimitedSearchAdapter};
use crate::infrastructure::runtime::LlmPool;

fn build_rate_limiter(service: &ServiceConfig, service_name: &str, rate_limit: RateLimitConfig) -> Arc<dyn RateLimiter> {
    Arc::new(FileRateLimiter::new(
        &service.rate_limiter_state_dir,
        service_name,
        rate_limit.requests_per_window,
        rate_limit.window_secs,
    ))
}

fn build_llm_client(service: &ServiceConfig, entry: &LlmEndpointConfig) -> Result<Arc<dyn LlmClient>> {
    let http = HttpLlmClient::new(
        entry.label.clone(),
        entry.endpoint.clone(),
        entry.model.clone(),
        entry.api_key.clone(),
        entry.format.clone(),
        entry.remove_think,
        entry.temperature,
        entry.proxy.as_deref(),
    )?;

    let service_name = format!("llm_{}", entry.label);
    let limiter = build_rate_limiter(service, &service_name, service.rate_limit_for(&service_name));
    Ok(Arc::new(RateLimitedLlmClient::new(Arc::new(http), limiter)))
}

/// Builds the round-robin LLM pool for one stage, restricted to `labels`
/// when non-empty (empty means "use the whole configured pool"), each
/// backend individually rate-limited (§4.3, §4.7).
pub fn build_llm_pool(service: &ServiceConfig, labels: &[String]) -> Result<Arc<LlmPool>> {
    let entries: Vec<&LlmEndpointConfig> =
        service.llm_pool.iter().filter(|e| labels.is_empty() || labels.iter().any(|l| l == &e.label)).collect();

    if entries.is_empty() {
        return Err(PipelineError::invalid_config("no llm_pool entries match this stage's llm_pool_labels"));
    }

    let clients = entries.into_iter().map(|entry| build_llm_client(service, entry)).collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(LlmPool::new(clients)))
}

/// Builds a search router covering every index a stage's ontologies
/// reference, each routed to a rate-limited hybrid or taxonomic adapter
/// by `search_kind` (§3, §4.7).
pub fn build_search_router(service: &ServiceConfig, ontologies: &[OntologyConfigEntry]) -> Result<Arc<dyn SearchAdapter>> {
    let hybrid_limiter = build_rate_limiter(service, "hybrid_search", service.rate_limit_for("hybrid_search"));
    let taxonomic_limiter = build_rate_limiter(service, "taxonomic_search", service.rate_limit_for("taxonomic_search"));

    let hybrid: Arc<dyn SearchAdapter> = Arc::new(RateLimitedSearchAdapter::new(
        Arc::new(HttpHybridSearch::new(service.hybrid_search_endpoint.clone(), service.hybrid_search_api_key.clone())?),
        hybrid_limiter,
    ));
    let taxonomic: Arc<dyn SearchAdapter> = Arc::new(RateLimitedSearchAdapter::new(
        Arc::new(HttpTaxonomicSearch::new(service.taxonomic_search_endpoint.clone(), service.taxonomic_search_api_key.clone())?),
        taxonomic_limiter,
    ));

    let mut routes: HashMap<String, Arc<dyn SearchAdapter>> = HashMap::new();
    for entry in ontologies {
        let adapter = if entry.search_kind == "taxonomic" { taxonomic.clone() } else { hybrid.clone() };
        routes.insert(entry.index_name.clone(), adapter);
    }

    Ok(Arc::new(RoutingSearchAdapter::new(routes)))
}

/// Converts every ontology entry to its domain form, preserving order
/// (`convert_failed` relies on index 0/1 being source/target, §4.5.4).
pub fn build_ontologies(entries: &[OntologyConfigEntry]) -> Result<Vec<OntologyDescriptor>> {
    entries.iter().map(ontology_registry::to_domain).collect()
}

fn require_artifact(stage: &StageConfig, value: Option<&str>, field: &str) -> Result<String> {
    value.map(|s| s.to_string()).ok_or_else(|| {
        PipelineError::invalid_config(format!("stage {}: {field} is required for kind {:?}", stage.stage_name, stage.kind))
    })
}

fn require_ontology(stage_name: &str, ontologies: &[OntologyDescriptor], index: usize) -> Result<OntologyDescriptor> {
    ontologies.get(index).cloned().ok_or_else(|| {
        PipelineError::invalid_config(format!("stage {stage_name}: expected at least {} ontolog{} declared", index + 1, if index == 0 { "y" } else { "ies" }))
    })
}

/// Constructs the single [`StageCallable`] a [`StageConfig`] describes
/// (§4.5, §9): the only place in the system that dispatches on
/// [`StageKind`] to build a concrete stage.
pub fn build_stage_callable(
    stage: &StageConfig,
    store: Arc<dyn StateStore>,
    llm_pool: Arc<LlmPool>,
    search: Arc<dyn SearchAdapter>,
) -> Result<Arc<dyn StageCallable>> {
    let ontologies = build_ontologies(&stage.ontologies)?;
    let name = stage.stage_name.clone();

    let callable: Arc<dyn StageCallable> = match stage.kind {
        StageKind::ExtractRelations => {
            let output = require_artifact(stage, stage.output_artifact.as_deref(), "output_artifact")?;
            Arc::new(ExtractRelationsStage::new(name, store, llm_pool, output))
        }
        StageKind::OntologyDecomposition => {
            let artifact = stage.output_artifact.clone().or_else(|| stage.input_artifact.clone()).ok_or_else(|| {
                PipelineError::invalid_config(format!("stage {name}: ontology_decomposition needs input_artifact or output_artifact"))
            })?;
            Arc::new(OntologyDecompositionStage::new(name, store, llm_pool, artifact, stage.decompose_types.clone()))
        }
        StageKind::GetDbId => {
            let ontology = require_ontology(&name, &ontologies, 0)?;
            let relations = require_artifact(stage, stage.input_artifact.as_deref(), "input_artifact")?;
            Arc::new(GetDbIdStage::new(name, store, search, ontology, relations, stage.cell_line_species_artifact.clone()))
        }
        StageKind::JudgeDbId => {
            let ontology = require_ontology(&name, &ontologies, 0)?;
            Arc::new(JudgeDbIdStage::new(name, store, llm_pool, ontology))
        }
        StageKind::ConvertFailed => {
            let source = require_ontology(&name, &ontologies, 0)?;
            let target = require_ontology(&name, &ontologies, 1)?;
            let relations = require_artifact(stage, stage.input_artifact.as_deref(), "input_artifact")?;
            Arc::new(ConvertFailedStage::new(name, store, search, llm_pool, relations, source, target))
        }
        StageKind::ValidateRelations => {
            let relations = require_artifact(stage, stage.input_artifact.as_deref(), "input_artifact")?;
            Arc::new(ValidateRelationsStage::new(
                name,
                store,
                llm_pool,
                relations,
                stage.prerequisite_artifact.clone(),
                stage.skip_existing,
            ))
        }
        StageKind::ApplyLlmBest => {
            let relations = require_artifact(stage, stage.input_artifact.as_deref(), "input_artifact")?;
            let final_artifact = require_artifact(stage, stage.output_artifact.as_deref(), "output_artifact")?;
            Arc::new(ApplyLlmBestStage::new(name, store, relations, final_artifact, ontologies, stage.cell_line_species_artifact.clone()))
        }
    };

    Ok(callable)
}
