//! Queue reconciliation
//!
//! Pull-based: the caller decides when to replay (after a connect, on a
//! timer, from a button). Nothing here schedules itself.

use std::sync::Arc;

use shared::models::PrintPayload;
use tracing::{info, instrument, warn};

use super::queue::{PrintQueue, QueuePolicy};
use super::session::{DeliveryFailure, PrinterSession};
use super::storage::QueueResult;

/// Counts from one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub printed: usize,
    /// Failed again, still pending
    pub retried: usize,
    /// Out of attempts, marked failed
    pub failed: usize,
    /// Left pending because the printer went away
    pub skipped: usize,
}

pub struct QueueReplayer {
    queue: Arc<dyn PrintQueue>,
    restaurant_id: String,
    policy: QueuePolicy,
    default_currency: String,
}

impl QueueReplayer {
    pub fn new(
        queue: Arc<dyn PrintQueue>,
        restaurant_id: impl Into<String>,
        policy: QueuePolicy,
    ) -> Self {
        Self {
            queue,
            restaurant_id: restaurant_id.into(),
            policy,
            default_currency: String::new(),
        }
    }

    /// Symbol for stored receipts that were queued without one
    pub fn with_default_currency(mut self, symbol: impl Into<String>) -> Self {
        self.default_currency = symbol.into();
        self
    }

    fn resolve(&self, payload: &PrintPayload) -> PrintPayload {
        match payload {
            PrintPayload::Receipt {
                document,
                currency_symbol,
            } if currency_symbol.is_empty() => PrintPayload::Receipt {
                document: document.clone(),
                currency_symbol: self.default_currency.clone(),
            },
            other => other.clone(),
        }
    }

    /// Send every pending job through `session`, oldest first
    #[instrument(skip_all, fields(restaurant_id = %self.restaurant_id))]
    pub async fn replay_pending(&self, session: &PrinterSession) -> QueueResult<ReplaySummary> {
        let jobs = self.queue.list_pending(&self.restaurant_id).await?;
        let mut summary = ReplaySummary::default();

        for (i, job) in jobs.iter().enumerate() {
            match session.deliver(&self.resolve(&job.payload)).await {
                Ok(()) => {
                    self.queue.mark_printed(&job.id).await?;
                    summary.printed += 1;
                }
                Err(DeliveryFailure::NotConnected) => {
                    summary.skipped = jobs.len() - i;
                    info!(remaining = summary.skipped, "Printer not connected, replay stopped");
                    break;
                }
                Err(DeliveryFailure::WriteFailed(message)) => {
                    if job.attempts + 1 >= self.policy.max_attempts {
                        warn!(job_id = %job.id, attempts = job.attempts + 1, error = %message, "Print job failed permanently");
                        self.queue.mark_failed(&job.id, &message).await?;
                        summary.failed += 1;
                    } else {
                        warn!(job_id = %job.id, error = %message, "Replay failed, job kept pending");
                        self.queue.record_attempt(&job.id, &message).await?;
                        summary.retried += 1;
                    }
                }
            }
        }

        info!(
            printed = summary.printed,
            retried = summary.retried,
            failed = summary.failed,
            skipped = summary.skipped,
            "Replay finished"
        );
        Ok(summary)
    }
}
