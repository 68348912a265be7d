// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design (§6 "A CLI *is*
//! defined — by `pipeline-bootstrap`, sitting outside the core").
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parse_cli()                     │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate_cli()                  │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```

pub mod validator;

pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// `pipeline` — run one stage driver, compose the full DAG, or inspect
/// stage progress (§6).
#[derive(Debug, Parser)]
#[command(name = "pipeline", version, about = "Biomedical document pipeline scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose (debug-level) logging.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one stage driver to completion in this process — what the
    /// composer spawns as a child process per stage.
    RunStage {
        #[arg(long)]
        service_config: PathBuf,
        #[arg(long)]
        stage_config: PathBuf,
    },
    /// Run the composer: spawn one `run-stage` child per stage config
    /// file found in `stage_config_dir`, wiring op/done queue names per
    /// the declared DAG (§4.6).
    Compose {
        #[arg(long)]
        service_config: PathBuf,
        #[arg(long)]
        stage_config_dir: PathBuf,
        /// Directory per-stage stdout/stderr logs are redirected to.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Print done/inflight counts for one stage — an operational
    /// convenience with no effect on pipeline semantics.
    Status {
        #[arg(long)]
        service_config: PathBuf,
        #[arg(long)]
        stage: String,
    },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Validated CLI configuration: all paths checked for dangerous patterns
/// (path traversal, shell metacharacters) before any I/O is attempted.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    RunStage {
        service_config: PathBuf,
        stage_config: PathBuf,
    },
    Compose {
        service_config: PathBuf,
        stage_config_dir: PathBuf,
        log_dir: Option<PathBuf>,
    },
    Status {
        service_config: PathBuf,
        stage: String,
    },
}

/// Parses CLI arguments with clap, then applies security validation.
///
/// # Errors
///
/// Returns [`ParseError`] if any argument fails validation. Clap itself
/// handles `--help`/`--version` and malformed flags by exiting the
/// process directly.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let command = match cli.command {
        Commands::RunStage {
            service_config,
            stage_config,
        } => ValidatedCommand::RunStage {
            service_config: SecureArgParser::validate_path(&service_config.to_string_lossy())?,
            stage_config: SecureArgParser::validate_path(&stage_config.to_string_lossy())?,
        },
        Commands::Compose {
            service_config,
            stage_config_dir,
            log_dir,
        } => {
            let validated_log_dir = match log_dir {
                Some(ref p) => {
                    SecureArgParser::validate_argument(&p.to_string_lossy())?;
                    Some(p.clone())
                }
                None => None,
            };

            ValidatedCommand::Compose {
                service_config: SecureArgParser::validate_path(&service_config.to_string_lossy())?,
                stage_config_dir: SecureArgParser::validate_path(&stage_config_dir.to_string_lossy())?,
                log_dir: validated_log_dir,
            }
        }
        Commands::Status { service_config, stage } => {
            SecureArgParser::validate_argument(&stage)?;
            ValidatedCommand::Status {
                service_config: SecureArgParser::validate_path(&service_config.to_string_lossy())?,
                stage,
            }
        }
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
    })
}
