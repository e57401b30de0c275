//! redb-based storage for queued print jobs

use async_trait::async_trait;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
};
use serde::{Deserialize, Serialize};
use shared::models::{NewPrintJob, PrintJob, PrintJobStatus};
use shared::util::{new_job_id, now_millis};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::queue::{EVICTED_MESSAGE, PrintQueue, QueuePolicy};

/// Jobs table: key = job_id, value = JSON
const JOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("print_jobs");

/// Index: (restaurant_id, seq) -> job_id, pending jobs only
const PENDING_TABLE: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("pending_jobs_by_restaurant");

/// Counters
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("queue_meta");

const NEXT_SEQ_KEY: &str = "next_seq";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Print job not found: {0}")]
    JobNotFound(String),

    /// Backend could not be reached (non-redb queues)
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Stored form; `seq` orders pending jobs oldest first
#[derive(Debug, Serialize, Deserialize)]
struct StoredJob {
    seq: u64,
    job: PrintJob,
}

type JobsTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

fn read_stored(table: &JobsTable<'_>, id: &str) -> QueueResult<Option<StoredJob>> {
    match table.get(id)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

fn write_stored(table: &mut JobsTable<'_>, stored: &StoredJob) -> QueueResult<()> {
    let value = serde_json::to_vec(stored)?;
    table.insert(stored.job.id.as_str(), value.as_slice())?;
    Ok(())
}

/// (seq, job_id) of pending jobs for a restaurant, oldest first
fn pending_keys(
    table: &impl ReadableTable<(&'static str, u64), &'static str>,
    restaurant_id: &str,
) -> QueueResult<Vec<(u64, String)>> {
    let range_start: (&str, u64) = (restaurant_id, 0);
    let range_end: (&str, u64) = (restaurant_id, u64::MAX);

    let mut keys = Vec::new();
    for result in table.range(range_start..=range_end)? {
        let (key, value) = result?;
        let (_, seq) = key.value();
        keys.push((seq, value.value().to_string()));
    }
    Ok(keys)
}

/// Print queue persisted in a redb file
#[derive(Clone)]
pub struct RedbPrintQueue {
    db: Arc<Database>,
    policy: QueuePolicy,
}

impl RedbPrintQueue {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>, policy: QueuePolicy) -> QueueResult<Self> {
        let db = Database::create(path)?;
        Self::init(db, policy)
    }

    /// Open in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(policy: QueuePolicy) -> QueueResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db, policy)
    }

    fn init(db: Database, policy: QueuePolicy) -> QueueResult<Self> {
        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(JOBS_TABLE)?;
            let _ = write_txn.open_table(PENDING_TABLE)?;
            let _ = write_txn.open_table(META_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            policy,
        })
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Get a job by ID
    pub fn get(&self, id: &str) -> QueueResult<Option<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        match table.get(id)? {
            Some(guard) => {
                let stored: StoredJob = serde_json::from_slice(guard.value())?;
                Ok(Some(stored.job))
            }
            None => Ok(None),
        }
    }

    /// Store a new pending job, evicting the oldest pending ones past the bound
    ///
    /// Eviction and insert share one write transaction.
    fn store_new(&self, input: NewPrintJob) -> QueueResult<PrintJob> {
        let now = now_millis();
        let job = PrintJob::pending(new_job_id(), input, now);

        let txn = self.db.begin_write()?;
        {
            let mut meta = txn.open_table(META_TABLE)?;
            let seq = meta.get(NEXT_SEQ_KEY)?.map(|g| g.value()).unwrap_or(0);
            meta.insert(NEXT_SEQ_KEY, seq + 1)?;

            let mut jobs = txn.open_table(JOBS_TABLE)?;
            let mut pending = txn.open_table(PENDING_TABLE)?;
            let restaurant_id = job.restaurant_id.as_str();

            if self.policy.max_pending > 0 {
                let keys = pending_keys(&pending, restaurant_id)?;
                let excess = (keys.len() + 1).saturating_sub(self.policy.max_pending);
                for (old_seq, old_id) in keys.into_iter().take(excess) {
                    pending.remove((restaurant_id, old_seq))?;
                    if let Some(mut stored) = read_stored(&jobs, &old_id)? {
                        stored.job.status = PrintJobStatus::Failed;
                        stored.job.error = Some(EVICTED_MESSAGE.to_string());
                        stored.job.updated_at = now;
                        write_stored(&mut jobs, &stored)?;
                    }
                    tracing::warn!(job_id = %old_id, restaurant_id, "Print queue full, evicted oldest job");
                }
            }

            pending.insert((restaurant_id, seq), job.id.as_str())?;
            write_stored(
                &mut jobs,
                &StoredJob {
                    seq,
                    job: job.clone(),
                },
            )?;
        }
        txn.commit()?;

        Ok(job)
    }

    /// Apply `f` to a job, dropping it from the pending index once it leaves `pending`
    fn update(&self, id: &str, f: impl FnOnce(&mut PrintJob)) -> QueueResult<PrintJob> {
        let txn = self.db.begin_write()?;
        let job = {
            let mut jobs = txn.open_table(JOBS_TABLE)?;
            let mut pending = txn.open_table(PENDING_TABLE)?;

            let mut stored =
                read_stored(&jobs, id)?.ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
            let was_pending = stored.job.is_pending();
            f(&mut stored.job);
            stored.job.updated_at = now_millis();

            if was_pending && !stored.job.is_pending() {
                pending.remove((stored.job.restaurant_id.as_str(), stored.seq))?;
            }
            write_stored(&mut jobs, &stored)?;
            stored.job
        };
        txn.commit()?;

        Ok(job)
    }

    fn remove(&self, id: &str) -> QueueResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut jobs = txn.open_table(JOBS_TABLE)?;
            let mut pending = txn.open_table(PENDING_TABLE)?;

            let stored =
                read_stored(&jobs, id)?.ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
            if stored.job.is_pending() {
                pending.remove((stored.job.restaurant_id.as_str(), stored.seq))?;
            }
            jobs.remove(id)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn pending_for(&self, restaurant_id: &str) -> QueueResult<Vec<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(PENDING_TABLE)?;
        let data_table = read_txn.open_table(JOBS_TABLE)?;

        let mut jobs = Vec::new();
        for (_, id) in pending_keys(&idx_table, restaurant_id)? {
            if let Some(guard) = data_table.get(id.as_str())? {
                let stored: StoredJob = serde_json::from_slice(guard.value())?;
                jobs.push(stored.job);
            }
        }
        Ok(jobs)
    }

    fn pending_count_for(&self, restaurant_id: &str) -> QueueResult<usize> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(PENDING_TABLE)?;
        Ok(pending_keys(&idx_table, restaurant_id)?.len())
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> QueueResult<QueueStats> {
        let read_txn = self.db.begin_read()?;
        let jobs = read_txn.open_table(JOBS_TABLE)?;
        let pending = read_txn.open_table(PENDING_TABLE)?;

        Ok(QueueStats {
            job_count: jobs.len()?,
            pending_count: pending.len()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub job_count: u64,
    /// Across all restaurants
    pub pending_count: u64,
}

#[async_trait]
impl PrintQueue for RedbPrintQueue {
    async fn insert(&self, job: NewPrintJob) -> QueueResult<PrintJob> {
        self.store_new(job)
    }

    async fn list_pending(&self, restaurant_id: &str) -> QueueResult<Vec<PrintJob>> {
        self.pending_for(restaurant_id)
    }

    async fn count_pending(&self, restaurant_id: &str) -> QueueResult<usize> {
        self.pending_count_for(restaurant_id)
    }

    async fn mark_printed(&self, id: &str) -> QueueResult<()> {
        self.update(id, |job| {
            job.status = PrintJobStatus::Printed;
            job.error = None;
        })
        .map(|_| ())
    }

    async fn mark_failed(&self, id: &str, message: &str) -> QueueResult<()> {
        self.update(id, |job| {
            job.status = PrintJobStatus::Failed;
            job.error = Some(message.to_string());
        })
        .map(|_| ())
    }

    async fn record_attempt(&self, id: &str, message: &str) -> QueueResult<PrintJob> {
        self.update(id, |job| {
            job.attempts += 1;
            job.error = Some(message.to_string());
        })
    }

    async fn delete(&self, id: &str) -> QueueResult<()> {
        self.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared::models::{KitchenTicketDocument, KitchenTicketItem, PrintJobKind, PrintPayload};

    fn new_job(restaurant_id: &str, order_number: &str) -> NewPrintJob {
        NewPrintJob {
            restaurant_id: restaurant_id.to_string(),
            order_id: Some(format!("order-{}", order_number)),
            payload: PrintPayload::KitchenTicket {
                document: KitchenTicketDocument {
                    order_number: order_number.to_string(),
                    table_number: "T1".to_string(),
                    timestamp: NaiveDate::from_ymd_opt(2024, 3, 9)
                        .unwrap()
                        .and_hms_opt(12, 0, 0)
                        .unwrap(),
                    items: vec![KitchenTicketItem::new("Veg Biryani", 1)],
                },
            },
            error: None,
        }
    }

    fn queue(max_pending: usize) -> RedbPrintQueue {
        RedbPrintQueue::open_in_memory(QueuePolicy {
            max_pending,
            max_attempts: 3,
        })
        .unwrap()
    }

    fn order_numbers(jobs: &[PrintJob]) -> Vec<String> {
        jobs.iter()
            .map(|j| match &j.payload {
                PrintPayload::KitchenTicket { document } => document.order_number.clone(),
                PrintPayload::Receipt { document, .. } => document.invoice_number.clone(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_insert_and_list_pending_oldest_first() {
        let q = queue(0);
        for n in ["101", "102", "103"] {
            q.insert(new_job("r-1", n)).await.unwrap();
        }
        q.insert(new_job("r-2", "201")).await.unwrap();

        let pending = q.list_pending("r-1").await.unwrap();
        assert_eq!(order_numbers(&pending), vec!["101", "102", "103"]);
        assert!(pending.iter().all(|j| j.kind == PrintJobKind::Kitchen && j.is_pending()));
        assert_eq!(q.count_pending("r-2").await.unwrap(), 1);
        assert_eq!(q.count_pending("r-3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_printed_leaves_pending_index() {
        let q = queue(0);
        let job = q.insert(new_job("r-1", "101")).await.unwrap();

        q.mark_printed(&job.id).await.unwrap();

        assert_eq!(q.count_pending("r-1").await.unwrap(), 0);
        let stored = q.get(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, PrintJobStatus::Printed);
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn test_record_attempt_keeps_job_pending() {
        let q = queue(0);
        let job = q.insert(new_job("r-1", "101")).await.unwrap();

        let updated = q.record_attempt(&job.id, "Write failed: timeout").await.unwrap();
        assert_eq!(updated.attempts, 1);
        assert_eq!(updated.error.as_deref(), Some("Write failed: timeout"));
        assert!(updated.is_pending());
        assert_eq!(q.count_pending("r-1").await.unwrap(), 1);

        q.mark_failed(&job.id, "gave up").await.unwrap();
        assert_eq!(q.count_pending("r-1").await.unwrap(), 0);
        assert_eq!(
            q.get(&job.id).unwrap().unwrap().status,
            PrintJobStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest_pending() {
        let q = queue(2);
        let first = q.insert(new_job("r-1", "101")).await.unwrap();
        q.insert(new_job("r-1", "102")).await.unwrap();
        q.insert(new_job("r-1", "103")).await.unwrap();
        // other restaurants have their own bound
        q.insert(new_job("r-2", "201")).await.unwrap();

        let pending = q.list_pending("r-1").await.unwrap();
        assert_eq!(order_numbers(&pending), vec!["102", "103"]);

        let evicted = q.get(&first.id).unwrap().unwrap();
        assert_eq!(evicted.status, PrintJobStatus::Failed);
        assert_eq!(evicted.error.as_deref(), Some(EVICTED_MESSAGE));
        assert_eq!(q.count_pending("r-2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let q = queue(0);
        let job = q.insert(new_job("r-1", "101")).await.unwrap();

        q.delete(&job.id).await.unwrap();
        assert!(q.get(&job.id).unwrap().is_none());
        assert_eq!(q.count_pending("r-1").await.unwrap(), 0);

        assert!(matches!(
            q.delete(&job.id).await,
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let q = queue(0);
        assert!(matches!(
            q.mark_printed("missing").await,
            Err(QueueError::JobNotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_stats() {
        let q = queue(0);
        let job = q.insert(new_job("r-1", "101")).await.unwrap();
        q.insert(new_job("r-2", "201")).await.unwrap();
        q.mark_printed(&job.id).await.unwrap();

        let stats = q.get_stats().unwrap();
        assert_eq!(stats.job_count, 2);
        assert_eq!(stats.pending_count, 1);
    }
}
