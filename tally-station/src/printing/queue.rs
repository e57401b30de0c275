//! Durable print queue contract
//!
//! The session only ever inserts; a reconciliation pass (see
//! [`QueueReplayer`](super::replay::QueueReplayer)) drains pending jobs.

use async_trait::async_trait;
use shared::models::{NewPrintJob, PrintJob};

use super::storage::QueueResult;

/// Bounds applied to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Pending jobs kept per restaurant; inserting past this evicts the
    /// oldest pending job to `failed`. 0 disables the bound.
    pub max_pending: usize,
    /// Replay attempts before a job is marked `failed`
    pub max_attempts: u32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_pending: 500,
            max_attempts: 5,
        }
    }
}

/// Message stored on jobs pushed out by the pending bound
pub const EVICTED_MESSAGE: &str = "evicted: print queue full";

#[async_trait]
pub trait PrintQueue: Send + Sync {
    /// Record a new `pending` job
    async fn insert(&self, job: NewPrintJob) -> QueueResult<PrintJob>;

    /// Pending jobs for a restaurant, oldest first
    async fn list_pending(&self, restaurant_id: &str) -> QueueResult<Vec<PrintJob>>;

    async fn count_pending(&self, restaurant_id: &str) -> QueueResult<usize>;

    async fn mark_printed(&self, id: &str) -> QueueResult<()>;

    async fn mark_failed(&self, id: &str, message: &str) -> QueueResult<()>;

    /// Count a failed replay; the job stays `pending`
    async fn record_attempt(&self, id: &str, message: &str) -> QueueResult<PrintJob>;

    async fn delete(&self, id: &str) -> QueueResult<()>;
}
