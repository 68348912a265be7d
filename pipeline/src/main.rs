// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `pipeline` binary: the composition root. Parses and validates the CLI
//! (`pipeline-bootstrap`), then dispatches to one of three modes (§6):
//!
//! - `run-stage` — build one stage's concrete callable and run a
//!   [`StageDriver`] against it to completion in this process.
//! - `compose` — discover every stage config file in a directory and
//!   launch one `run-stage` child per file via [`Composer`] (§4.6).
//! - `status` — print a stage's done/inflight counts, an operational
//!   read-only convenience with no effect on pipeline semantics.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use adaptive_pipeline_bootstrap::{parse_and_validate, result_to_exit_code, ConfigError, ServiceConfig, StageConfig, ValidatedCommand};

use pipeline::application::composition::{build_llm_pool, build_search_router, build_stage_callable};
use pipeline::infrastructure::repositories::SqliteStateStore;
use pipeline::infrastructure::runtime::{Composer, StageDriver, StageDriverConfig};
use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::repositories::{QueueStore, StateStore};
use pipeline_domain::value_objects::{QueueName, StageName};

fn main() -> ExitCode {
    let validated = match parse_and_validate() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("argument error: {e}");
            return ExitCode::from(64);
        }
    };

    adaptive_pipeline_bootstrap::init_tracing(validated.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(71);
        }
    };

    result_to_exit_code(runtime.block_on(run(validated.command)))
}

async fn run(command: ValidatedCommand) -> Result<()> {
    match command {
        ValidatedCommand::RunStage {
            service_config,
            stage_config,
        } => run_stage(&service_config, &stage_config).await,
        ValidatedCommand::Compose {
            service_config,
            stage_config_dir,
            log_dir,
        } => compose(&service_config, &stage_config_dir, log_dir).await,
        ValidatedCommand::Status { service_config, stage } => status(&service_config, &stage).await,
    }
}

fn config_err(e: ConfigError) -> PipelineError {
    PipelineError::invalid_config(e.to_string())
}

async fn run_stage(service_config_path: &Path, stage_config_path: &Path) -> Result<()> {
    let service = ServiceConfig::load(service_config_path).map_err(config_err)?;
    let stage = StageConfig::load(stage_config_path).map_err(config_err)?;

    let store = Arc::new(SqliteStateStore::connect(&service.database_url).await?);
    let state_store: Arc<dyn StateStore> = store.clone();
    let queue_store: Arc<dyn QueueStore> = store;

    let llm_pool = build_llm_pool(&service, &stage.llm_pool_labels)?;
    let search = build_search_router(&service, &stage.ontologies)?;
    let callable = build_stage_callable(&stage, state_store.clone(), llm_pool, search)?;

    let driver = StageDriver::new(
        state_store,
        queue_store,
        StageDriverConfig {
            stage_name: StageName::new(stage.stage_name.clone()),
            sub_pipeline: vec![callable],
            workers: stage.workers,
            per_step_max: stage.per_step_max.clone(),
            doc_id_filter: None,
            limit: stage.limit,
            op_queue_names: stage.op_queue_names.iter().map(|n| QueueName::new(n.as_str())).collect(),
            done_source_names: stage.done_source_names.iter().map(|n| QueueName::new(n.as_str())).collect(),
            queue_sleep: std::time::Duration::from_secs_f64(stage.queue_sleep_secs),
            clear_done_on_start: stage.clear_done_on_start,
        },
    );

    driver.run().await
}

async fn compose(service_config_path: &Path, stage_config_dir: &Path, log_dir: Option<PathBuf>) -> Result<()> {
    // Loaded only to fail fast on a malformed services.yaml before any
    // child process is spawned; the composer itself re-exec's this same
    // binary, which reloads it per child.
    ServiceConfig::load(service_config_path).map_err(config_err)?;

    if let Some(dir) = &log_dir {
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::invalid_config(format!("log_dir {}: {e}", dir.display())))?;
    }

    let binary_path = std::env::current_exe().map_err(|e| PipelineError::InternalError(e.to_string()))?;
    let stage_configs = Composer::discover_stage_configs(stage_config_dir)
        .map_err(|e| PipelineError::invalid_config(format!("{}: {e}", stage_config_dir.display())))?;

    let composer = Composer::new(binary_path, service_config_path.to_path_buf(), log_dir);
    composer.run(&stage_configs).await
}

async fn status(service_config_path: &Path, stage: &str) -> Result<()> {
    let service = ServiceConfig::load(service_config_path).map_err(config_err)?;
    let store = SqliteStateStore::connect(&service.database_url).await?;

    let queue_name = QueueName::new(stage);
    let total = store.all_doc_ids().await?.len();
    let done = store.queue_done_list(&queue_name).await?.len();
    let inflight = store.queue_inflight_count(&queue_name).await?;

    println!("stage: {stage}");
    println!("documents: {total}");
    println!("done: {done}");
    println!("inflight: {inflight}");

    Ok(())
}
