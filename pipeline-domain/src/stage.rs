//! The stage contract (§4.4, §4.5): every pipeline stage is a callable
//! that claims a document, does its work, and reports back a structured
//! info stream the driver aggregates into progress and metrics.

use async_trait::async_trait;

use crate::error::Result;
use crate::value_objects::DocId;

/// One unit of structured feedback a stage emits about a single document.
/// The driver folds a stream of these into running totals for the
/// terminal progress surface (§4.4): `Status` overwrites a named slot,
/// `Metric` accumulates `correct`/`total` under a named counter, `Error`
/// both records the failure and (per stage, per §5) stops that document's
/// remaining sub-pipeline steps.
#[derive(Debug, Clone, PartialEq)]
pub enum Info {
    Status { name: String, description: String },
    Metric { name: String, correct: u64, total: u64 },
    Error { message: String },
}

impl Info {
    pub fn status(name: impl Into<String>, description: impl Into<String>) -> Self {
        Info::Status {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn metric(name: impl Into<String>, correct: u64, total: u64) -> Self {
        Info::Metric {
            name: name.into(),
            correct,
            total,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Info::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Info::Error { .. })
    }
}

/// The outcome of running one stage against one document: nothing about
/// success/failure is implied by the absence of an `Info::Error` entry
/// alone — a stage that returns `Err` from [`StageCallable::call`] is a
/// hard failure eligible for the driver's retry policy (§5), while an
/// `Info::Error` in an `Ok` result is a soft, per-document failure the
/// stage itself decided not to retry.
#[derive(Debug, Default)]
pub struct StageReport {
    pub infos: Vec<Info>,
}

impl StageReport {
    pub fn new(infos: Vec<Info>) -> Self {
        Self { infos }
    }

    pub fn has_error(&self) -> bool {
        self.infos.iter().any(Info::is_error)
    }
}

/// A single pipeline stage, claimed to a document at a time by the stage
/// driver. Implementations live in the application layer, where they have
/// access to the concrete state store, queue store, and adapters.
#[async_trait]
pub trait StageCallable: Send + Sync {
    /// Stable name used for queue naming, log fields, and artifact
    /// prefixes (§6).
    fn name(&self) -> &str;

    /// Runs the stage's work for one claimed document.
    async fn call(&self, doc_id: DocId) -> Result<StageReport>;
}
