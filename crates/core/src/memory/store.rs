use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::job::JobRecord;
use crate::store::{ConditionalWrite, JobStore, StoreError, WriteKind, WriteOutcome};

/// A [`JobStore`] backed by a map.
///
/// The write lock makes each conditional put atomic, matching the
/// single-item conditional update of a real store.
#[derive(Default)]
pub struct MemoryJobStore {
    records: RwLock<HashMap<String, JobRecord>>,
    /// Number of upcoming calls that fail with `Unavailable`.
    outages: AtomicUsize,
    writes_applied: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `calls` store calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, calls: usize) {
        self.outages.store(calls, Ordering::SeqCst);
    }

    /// Number of conditional writes that were applied.
    pub fn writes_applied(&self) -> usize {
        self.writes_applied.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_outage(&self) -> Result<(), StoreError> {
        let consumed = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(StoreError::Unavailable("injected outage".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        self.check_outage()?;
        Ok(self.records.read().await.get(job_id).cloned())
    }

    async fn conditional_put(
        &self,
        job_id: &str,
        write: ConditionalWrite,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_outage()?;
        let mut records = self.records.write().await;

        let outcome = match write.into_kind() {
            WriteKind::Create(record) => {
                if record.job_id != job_id {
                    return Err(StoreError::Backend(format!(
                        "Record id {} does not match key {job_id}",
                        record.job_id
                    )));
                }
                if records.contains_key(job_id) {
                    WriteOutcome::Conflict
                } else {
                    records.insert(job_id.to_string(), record);
                    WriteOutcome::Applied
                }
            }
            WriteKind::Transition { from, to, fields } => match records.get_mut(job_id) {
                Some(record) if record.status == from => {
                    record.status = to;
                    if fields.complete_time.is_some() {
                        record.complete_time = fields.complete_time;
                    }
                    if fields.result_bucket.is_some() {
                        record.result_bucket = fields.result_bucket;
                    }
                    if fields.result_object_key.is_some() {
                        record.result_object_key = fields.result_object_key;
                    }
                    if fields.log_object_key.is_some() {
                        record.log_object_key = fields.log_object_key;
                    }
                    if fields.failure_reason.is_some() {
                        record.failure_reason = fields.failure_reason;
                    }
                    WriteOutcome::Applied
                }
                _ => WriteOutcome::Conflict,
            },
        };

        if outcome == WriteOutcome::Applied {
            self.writes_applied.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}
