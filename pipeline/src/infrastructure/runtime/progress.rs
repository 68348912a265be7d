// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Terminal progress surface for the stage driver (info protocol, §4.4
//! point 5): a process-local, line-overwriting status line, separate
//! from structured logging the way the teacher's `progress_indicator.rs`
//! keeps terminal feedback separate from `tracing`. Progress writes to
//! stdout; logs go elsewhere, so both can run at once.
//!
//! Unlike the teacher's single chunk counter, this surface tracks a
//! named set of slots (one per `status`/`metric` tag the callables
//! report) plus the document-count progress `(done, total)`.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug, Default, Clone)]
struct MetricAccumulator {
    correct: u64,
    total: u64,
}

impl MetricAccumulator {
    fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

#[derive(Default)]
struct Slots {
    statuses: HashMap<String, String>,
    metrics: HashMap<String, MetricAccumulator>,
    last_error: Option<String>,
}

/// Aggregates `status`/`metric`/`error` info entries from a stage's
/// sub-pipelines into a single throttled terminal status line.
pub struct ProgressSurface {
    stage_name: String,
    total: u64,
    done: Arc<AtomicU64>,
    slots: Arc<Mutex<Slots>>,
    terminal_mutex: Arc<Mutex<()>>,
    last_update: Arc<Mutex<Instant>>,
}

/// A single `info` entry reported by a stage callable, per the info
/// protocol (§4.4 point 5). `step` is the 1-based step index within a
/// multi-step sub-pipeline; steps `k >= 2` prefix their slot name with
/// `"{k}_"` so contributions from different steps of the same document
/// don't collide on the progress surface.
pub enum Info {
    Status { step: usize, name: String, description: String },
    Metric { step: usize, name: String, correct: u64, total: u64 },
    Error { msg: String },
}

impl ProgressSurface {
    pub fn new(stage_name: impl Into<String>, total: u64, already_done: u64) -> Self {
        let stage_name = stage_name.into();
        println!();
        print!("\r[{stage_name}] {already_done:06}/{total:06}");
        io::stdout().flush().ok();

        Self {
            stage_name,
            total,
            done: Arc::new(AtomicU64::new(already_done)),
            slots: Arc::new(Mutex::new(Slots::default())),
            terminal_mutex: Arc::new(Mutex::new(())),
            last_update: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Folds one document's info list into the aggregate slots and
    /// advances the done counter by one, throttling the actual terminal
    /// write to once per 100ms or every 10th document, whichever comes
    /// first, matching the teacher's throttle policy.
    pub async fn record(&self, infos: &[Info]) {
        let mut slots = self.slots.lock().await;
        for info in infos {
            match info {
                Info::Status { step, name, description } => {
                    let key = slot_key(*step, name);
                    slots.statuses.insert(key, description.clone());
                }
                Info::Metric { step, name, correct, total } => {
                    let key = slot_key(*step, name);
                    let entry = slots.metrics.entry(key).or_default();
                    entry.correct += correct;
                    entry.total += total;
                }
                Info::Error { msg } => {
                    slots.last_error = Some(msg.clone());
                }
            }
        }
        drop(slots);

        let completed = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        let should_update = {
            let mut last_update = self.last_update.lock().await;
            let now = Instant::now();
            if now.duration_since(*last_update) >= Duration::from_millis(100) || completed % 10 == 0 {
                *last_update = now;
                true
            } else {
                false
            }
        };

        if should_update {
            self.write_line(completed).await;
        }
    }

    async fn write_line(&self, completed: u64) {
        let slots = self.slots.lock().await;
        let mut line = format!("\r[{}] {:06}/{:06}", self.stage_name, completed, self.total);

        let mut metric_names: Vec<&String> = slots.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let acc = &slots.metrics[name];
            line.push_str(&format!(" {name}={:.2}({}/{})", acc.accuracy(), acc.correct, acc.total));
        }
        if let Some(err) = &slots.last_error {
            line.push_str(&format!(" last_error=\"{err}\""));
        }
        drop(slots);

        let _terminal_lock = self.terminal_mutex.lock().await;
        print!("{line}");
        io::stdout().flush().ok();
    }

    /// Prints a final summary line and leaves the cursor on a fresh line.
    pub async fn finish(&self) {
        let completed = self.done.load(Ordering::Relaxed);
        self.write_line(completed).await;
        println!();
    }
}

fn slot_key(step: usize, name: &str) -> String {
    if step >= 2 {
        format!("{step}_{name}")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metric_accuracy_accumulates_across_documents() {
        let surface = ProgressSurface::new("stage", 10, 0);
        surface
            .record(&[Info::Metric { step: 1, name: "judge".to_string(), correct: 3, total: 4 }])
            .await;
        surface
            .record(&[Info::Metric { step: 1, name: "judge".to_string(), correct: 1, total: 1 }])
            .await;

        let slots = surface.slots.lock().await;
        let acc = &slots.metrics["judge"];
        assert_eq!(acc.correct, 4);
        assert_eq!(acc.total, 5);
    }

    #[tokio::test]
    async fn step_two_and_above_prefixes_slot_names() {
        assert_eq!(slot_key(1, "judge"), "judge");
        assert_eq!(slot_key(2, "judge"), "2_judge");
    }

    #[tokio::test]
    async fn status_overwrites_prior_value_for_same_name() {
        let surface = ProgressSurface::new("stage", 1, 0);
        surface
            .record(&[Info::Status { step: 1, name: "phase".to_string(), description: "fetching".to_string() }])
            .await;
        surface
            .record(&[Info::Status { step: 1, name: "phase".to_string(), description: "done".to_string() }])
            .await;

        let slots = surface.slots.lock().await;
        assert_eq!(slots.statuses["phase"], "done");
    }

    #[tokio::test]
    async fn error_info_sets_last_error() {
        let surface = ProgressSurface::new("stage", 1, 0);
        surface.record(&[Info::Error { msg: "boom".to_string() }]).await;
        let slots = surface.slots.lock().await;
        assert_eq!(slots.last_error.as_deref(), Some("boom"));
    }
}
