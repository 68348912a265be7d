//! The queue subsystem port (§4.2): N-way intersection claiming over one
//! or more named item queues, with an inflight set for crash recovery and
//! a done set for idempotent completion tracking.
//!
//! A "claim" is the atomic unit of this port: it must never hand the same
//! document to two callers concurrently, and a document left inflight by a
//! crashed worker must become claimable again without operator
//! intervention (§5, §8 crash-recovery scenario).

use async_trait::async_trait;

use crate::error::Result;
use crate::value_objects::{DocId, QueueName};

/// Readiness claims a document ready in every queue of `op_queue_names`
/// and not yet present in `done_queue`, per §4.2's two claim modes.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Appends a document to a named item queue (no-op if already present).
    async fn queue_append(&self, queue_name: &QueueName, doc_id: DocId) -> Result<()>;

    /// Moves `doc_id` to the tail of each queue in `queue_names`: deletes
    /// any existing entry for `doc_id` in that queue, then re-inserts it
    /// with a fresh timestamp (§4.2).
    async fn queue_requeue_many(&self, queue_names: &[QueueName], doc_id: DocId) -> Result<()>;

    /// Classic-mode claim (§4.2, Open Questions): intersects `op_queue_names`
    /// by document id, excludes anything already in `done_queue`, and
    /// atomically marks the oldest ready candidate inflight across all of
    /// `op_queue_names`. Returns `None` when nothing is currently ready.
    async fn queue_claim_intersection(
        &self,
        op_queue_names: &[QueueName],
        done_queue: &QueueName,
    ) -> Result<Option<DocId>>;

    /// Pass-through-mode claim: same semantics as
    /// [`Self::queue_claim_intersection`], but the readiness sources are
    /// other stages' done sets (`source_done_queues`) rather than op item
    /// queues, so upstream stages need not explicitly push into a
    /// dedicated queue for every downstream consumer.
    async fn queue_claim_done_intersection(
        &self,
        source_done_queues: &[QueueName],
        done_queue: &QueueName,
    ) -> Result<Option<DocId>>;

    /// Removes a document from the inflight set of the given queues,
    /// called once a claimed unit of work finishes (successfully or not).
    async fn queue_inflight_remove(&self, queue_names: &[QueueName], doc_id: DocId) -> Result<()>;

    /// Clears the entire inflight set for the given queues. Used at
    /// process startup to recover documents an earlier, crashed run left
    /// claimed but never completed (§8 crash-recovery scenario).
    async fn queue_inflight_clear(&self, queue_names: &[QueueName]) -> Result<()>;

    /// Marks a document done in `done_queue` (idempotent: adding an
    /// already-done document is a no-op) and removes it from that queue's
    /// inflight set.
    async fn queue_mark_done(&self, done_queue: &QueueName, doc_id: DocId) -> Result<()>;

    async fn queue_done_has(&self, done_queue: &QueueName, doc_id: DocId) -> Result<bool>;

    async fn queue_done_add(&self, done_queue: &QueueName, doc_id: DocId) -> Result<()>;

    async fn queue_done_clear(&self, done_queue: &QueueName) -> Result<()>;

    async fn queue_done_list(&self, done_queue: &QueueName) -> Result<Vec<DocId>>;

    /// Counts how many of `doc_ids` are present in `done_queue`, chunking
    /// the `IN (...)` lookup internally to stay under the store's bound
    /// variable limit for large id sets.
    async fn queue_done_count_in(&self, done_queue: &QueueName, doc_ids: &[DocId]) -> Result<usize>;

    /// Counts documents currently inflight for `queue_name` — an
    /// operational convenience for the `status` CLI command, with no
    /// effect on claim/mark-done semantics.
    async fn queue_inflight_count(&self, queue_name: &QueueName) -> Result<usize>;

    /// Seeds `target_queue` with every document already present in
    /// `source_done_queue`, used when a new stage is added downstream of
    /// one that has already processed a backlog.
    async fn queue_seed_from_done(&self, source_done_queue: &QueueName, target_queue: &QueueName) -> Result<()>;
}
