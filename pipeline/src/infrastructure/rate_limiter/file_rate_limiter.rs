// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Cross-process global rate limiter (§4.3): a sliding request-count window
//! shared by every process on the host that touches the same external
//! service, coordinated through an advisory file lock rather than shared
//! memory so unrelated processes with no IPC channel between them still
//! see one consistent window.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use fd_lock::RwLock as FdRwLock;
use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::services::{RateLimiter, RatePermit};
use serde::{Deserialize, Serialize};

/// A no-op permit: the limiter's work is done entirely inside `acquire`
/// before returning, so there is nothing left to release on drop. It only
/// exists to satisfy the [`RatePermit`] marker.
struct FilePermit;
impl RatePermit for FilePermit {}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WindowState {
    /// Recent request timestamps, epoch-millis, oldest first.
    timestamps: VecDeque<i64>,
}

/// A [`RateLimiter`] backed by one JSON state file per service identifier,
/// guarded by `fd-lock`'s OS-level advisory lock so the window is
/// correctly shared across processes (§4.3: "must work correctly across
/// unrelated processes on the same host").
pub struct FileRateLimiter {
    path: PathBuf,
    max_requests: usize,
    window: std::time::Duration,
}

impl FileRateLimiter {
    /// `state_dir` holds one file per service, named `<service>.json`.
    /// `max_requests` and `window` are `R` and `W` from §4.3, per-service
    /// configured values (defaults `R=5`, `W=1s`).
    pub fn new(state_dir: impl AsRef<Path>, service: &str, max_requests: usize, window_secs: f64) -> Self {
        let path = state_dir.as_ref().join(format!("{service}.json"));
        Self {
            path,
            max_requests,
            window: std::time::Duration::from_secs_f64(window_secs),
        }
    }

    fn now_millis() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
    }

    /// One pass of the §4.3 algorithm: takes the lock, prunes the window,
    /// and either records a new request or reports how long the caller
    /// must wait before retrying.
    fn try_once(&self) -> Result<std::result::Result<(), std::time::Duration>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::RateLimiterError(e.to_string()))?;
        }

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| PipelineError::RateLimiterError(e.to_string()))?;

        let mut lock = FdRwLock::new(file);
        let mut guard = lock.write().map_err(|e| PipelineError::RateLimiterError(e.to_string()))?;

        let mut contents = String::new();
        guard
            .read_to_string(&mut contents)
            .map_err(|e| PipelineError::RateLimiterError(e.to_string()))?;

        let mut state: WindowState = if contents.trim().is_empty() {
            WindowState::default()
        } else {
            serde_json::from_str(&contents).unwrap_or_default()
        };

        let now = Self::now_millis();
        let window_millis = self.window.as_millis() as i64;
        while let Some(&oldest) = state.timestamps.front() {
            if now - oldest >= window_millis {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }

        let outcome = if state.timestamps.len() < self.max_requests {
            state.timestamps.push_back(now);
            Ok(())
        } else {
            let oldest = *state.timestamps.front().expect("len >= max_requests > 0");
            let wait_millis = window_millis - (now - oldest);
            Err(std::time::Duration::from_millis(wait_millis.max(0) as u64))
        };

        if outcome.is_ok() {
            let serialized = serde_json::to_string(&state)?;
            guard
                .seek(SeekFrom::Start(0))
                .map_err(|e| PipelineError::RateLimiterError(e.to_string()))?;
            guard
                .write_all(serialized.as_bytes())
                .map_err(|e| PipelineError::RateLimiterError(e.to_string()))?;
            guard
                .set_len(serialized.len() as u64)
                .map_err(|e| PipelineError::RateLimiterError(e.to_string()))?;
        }

        Ok(outcome)
    }
}

#[async_trait]
impl RateLimiter for FileRateLimiter {
    async fn acquire(&self) -> Result<Box<dyn RatePermit>> {
        loop {
            match self.try_once()? {
                Ok(()) => return Ok(Box::new(FilePermit)),
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn allows_up_to_r_requests_immediately() {
        let dir = TempDir::new().unwrap();
        let limiter = FileRateLimiter::new(dir.path(), "svc", 5, 1.0);

        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }
    }

    #[tokio::test]
    async fn sixth_request_waits_for_the_window() {
        let dir = TempDir::new().unwrap();
        let limiter = FileRateLimiter::new(dir.path(), "svc", 2, 0.3);

        let start = std::time::Instant::now();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(250));
    }

    #[tokio::test]
    async fn shared_across_two_limiter_handles_on_same_file() {
        let dir = TempDir::new().unwrap();
        let a = FileRateLimiter::new(dir.path(), "svc", 3, 1.0);
        let b = FileRateLimiter::new(dir.path(), "svc", 3, 1.0);

        a.acquire().await.unwrap();
        a.acquire().await.unwrap();
        b.acquire().await.unwrap();

        let start = std::time::Instant::now();
        b.acquire().await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(500));
    }
}
