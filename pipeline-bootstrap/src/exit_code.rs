// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardized Unix exit codes following BSD `sysexits.h` conventions
//! (§6: "Any stage driver returning non-zero from its process fails the
//! composer"). Every `adaptive-pipeline` binary invocation — a single
//! stage driver or the composer itself — maps its final `Result` to one
//! of these codes before calling `std::process::exit`.

use std::fmt;

use pipeline_domain::PipelineError;

/// Exit codes following Unix conventions (BSD sysexits.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,
    Error = 1,
    UsageError = 64,
    DataError = 65,
    NoInput = 66,
    Unavailable = 69,
    Software = 70,
    OsError = 71,
    CantCreate = 73,
    IoError = 74,
    TempFail = 75,
    Protocol = 76,
    NoPerm = 77,
    Config = 78,
    Interrupted = 130,
    Terminated = 143,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps the domain error taxonomy (§7) onto a `sysexits.h` code.
    /// `ClaimContention` never reaches here (§7: "never surfaced to
    /// callers") but is mapped defensively for completeness.
    pub fn from_pipeline_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::InputMissing { .. } => ExitCode::NoInput,
            PipelineError::ParseFailure(_) => ExitCode::DataError,
            PipelineError::TransientExternal(_) => ExitCode::TempFail,
            PipelineError::ClaimContention(_) => ExitCode::TempFail,
            PipelineError::InvariantViolation(_) => ExitCode::Software,
            PipelineError::StoreError(_) => ExitCode::IoError,
            PipelineError::InvalidConfiguration(_) => ExitCode::Config,
            PipelineError::RateLimiterError(_) => ExitCode::Unavailable,
            PipelineError::InternalError(_) => ExitCode::Software,
        }
    }

    /// Fallback mapping for non-domain errors (CLI parsing, I/O at the
    /// bootstrap boundary) based on textual heuristics, kept for parity
    /// with generic `anyhow`/`std::error::Error` failures the binary may
    /// surface before a `PipelineError` is even constructed.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        let s = error.to_string().to_lowercase();
        if s.contains("permission") || s.contains("access denied") {
            ExitCode::NoPerm
        } else if s.contains("not found") || s.contains("no such") {
            ExitCode::NoInput
        } else if s.contains("invalid") || s.contains("argument") {
            ExitCode::UsageError
        } else if s.contains("parse") || s.contains("format") {
            ExitCode::DataError
        } else if s.contains("io") || s.contains("read") || s.contains("write") {
            ExitCode::IoError
        } else if s.contains("config") {
            ExitCode::Config
        } else if s.contains("unavailable") {
            ExitCode::Unavailable
        } else {
            ExitCode::Error
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::Error => "General error",
            ExitCode::UsageError => "Command line usage error",
            ExitCode::DataError => "Data format error",
            ExitCode::NoInput => "Cannot open input",
            ExitCode::Unavailable => "Service unavailable",
            ExitCode::Software => "Internal software error",
            ExitCode::OsError => "System error",
            ExitCode::CantCreate => "Cannot create output file",
            ExitCode::IoError => "I/O error",
            ExitCode::TempFail => "Temporary failure, retry",
            ExitCode::Protocol => "Remote error in protocol",
            ExitCode::NoPerm => "Permission denied",
            ExitCode::Config => "Configuration error",
            ExitCode::Interrupted => "Interrupted by signal (SIGINT)",
            ExitCode::Terminated => "Terminated by signal (SIGTERM)",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn is_error(self) -> bool {
        !self.is_success()
    }

    pub fn is_signal(self) -> bool {
        matches!(self, ExitCode::Interrupted | ExitCode::Terminated)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

/// Maps a top-level `PipelineError` to an exit code, for use at a
/// binary's `main` boundary.
pub fn map_error_to_exit_code(error: &PipelineError) -> ExitCode {
    ExitCode::from_pipeline_error(error)
}

/// Converts a stage driver's or composer's terminal result into a process
/// exit code (§6 exit-code contract).
pub fn result_to_exit_code(result: Result<(), PipelineError>) -> std::process::ExitCode {
    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => {
            tracing::error!(error = %e, category = e.category(), "pipeline run failed");
            map_error_to_exit_code(&e).into()
        }
    }
}
