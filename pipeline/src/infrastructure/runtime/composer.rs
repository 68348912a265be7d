// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The pipeline composer (§4.6): declares the stage DAG implicitly
//! through each stage config file's `op_queue_names`/`done_source_names`,
//! and launches one `pipeline run-stage` child process per file, each
//! wired to the others only through the shared state store and the queue
//! names it reads and writes. No in-process dependency graph is built —
//! the DAG lives entirely in the queue-name wiring between config files,
//! per §4.6 "declare the stage DAG and launch each stage as an
//! independent long-running process that shares only the state store."

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::future::join_all;
use pipeline_domain::error::{PipelineError, Result};
use tokio::process::Command;

/// One stage config file the composer will launch as a child process.
pub struct StageLaunch {
    pub stage_config_path: PathBuf,
}

/// Launches and waits on one `pipeline run-stage` child per discovered
/// stage config file (§4.6's launch protocol).
pub struct Composer {
    /// Path to the `pipeline` binary to re-exec for each stage (the
    /// composer is itself a `pipeline` invocation; it spawns siblings of
    /// itself rather than importing stage-construction code directly, so
    /// each stage remains an independently crash-recoverable process per
    /// §4.6 and §5's "Composer's expected interruption is process
    /// termination").
    binary_path: PathBuf,
    service_config_path: PathBuf,
    log_dir: Option<PathBuf>,
}

impl Composer {
    pub fn new(binary_path: impl Into<PathBuf>, service_config_path: impl Into<PathBuf>, log_dir: Option<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            service_config_path: service_config_path.into(),
            log_dir,
        }
    }

    /// Discovers every `*.yaml`/`*.yml` file directly under
    /// `stage_config_dir`, sorted for deterministic launch order (launch
    /// order has no semantic effect since readiness is queue-driven, but
    /// deterministic logs are easier to read).
    pub fn discover_stage_configs(stage_config_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(stage_config_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(OsStr::to_str).is_some_and(|ext| ext == "yaml" || ext == "yml"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Builds every `run-stage` child, spawns them concurrently, and waits
    /// for all to exit. A non-zero exit from any child is reported as
    /// this call's error, matching §6 "Any stage driver returning
    /// non-zero from its process fails the composer" — but every child is
    /// still awaited to completion first, so one stage's failure never
    /// kills sibling stages out from under the documents they're mid-way
    /// through.
    pub async fn run(&self, stage_config_paths: &[PathBuf]) -> Result<()> {
        if stage_config_paths.is_empty() {
            return Err(PipelineError::invalid_config("composer: no stage config files found"));
        }

        let children = stage_config_paths.iter().map(|path| self.spawn_one(path));
        let results = join_all(children).await;

        let mut failures = Vec::new();
        for (path, result) in stage_config_paths.iter().zip(results) {
            match result {
                Ok(status) if status.success() => {}
                Ok(status) => failures.push(format!("{}: exited with {status}", path.display())),
                Err(e) => failures.push(format!("{}: {e}", path.display())),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InternalError(format!(
                "composer: {} stage(s) failed: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }

    async fn spawn_one(&self, stage_config_path: &Path) -> std::io::Result<std::process::ExitStatus> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("run-stage")
            .arg("--service-config")
            .arg(&self.service_config_path)
            .arg("--stage-config")
            .arg(stage_config_path);

        if let Some(log_dir) = &self.log_dir {
            let stem = stage_config_path.file_stem().and_then(OsStr::to_str).unwrap_or("stage");
            let log_path = log_dir.join(format!("{stem}.log"));
            let log_file = std::fs::File::create(&log_path)?;
            let log_file_err = log_file.try_clone()?;
            command.stdout(Stdio::from(log_file)).stderr(Stdio::from(log_file_err));
        }

        let mut child = command.spawn()?;
        child.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_only_yaml_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_stage.yaml"), "").unwrap();
        std::fs::write(dir.path().join("a_stage.yml"), "").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();

        let found = Composer::discover_stage_configs(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a_stage.yml", "b_stage.yaml"]);
    }

    #[tokio::test]
    async fn run_fails_fast_message_on_empty_dir() {
        let composer = Composer::new("pipeline", "services.yaml", None);
        let err = composer.run(&[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }
}
