//! In-memory job tracking.
//!
//! A job is created when an upload has been stored and the client has been
//! told so. From then on its [`JobState`] is the only place the outcome of
//! extraction and rendering is recorded; `GET /jobs/{id}` reads it back.
//!
//! The registry also owns the semaphore that bounds how many jobs extract or
//! render at the same time. Uploads are never refused because of it; a job
//! simply stays `queued` until a permit is free.

use crate::config::ServiceConfig;
use crate::error::JobError;
use crate::output::{PipelineMetrics, RenderedDocument, UploadedArchive};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a job is in its life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Stored, waiting for a concurrency slot.
    Queued,
    Extracting,
    Rendering,
    Succeeded {
        pdf: PathBuf,
        file_name: String,
        bytes: u64,
        metrics: PipelineMetrics,
    },
    Failed {
        error: JobError,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded { .. } | JobState::Failed { .. })
    }

    pub fn succeeded(doc: &RenderedDocument) -> Self {
        JobState::Succeeded {
            pdf: doc.path.clone(),
            file_name: doc.file_name.clone(),
            bytes: doc.size_bytes,
            metrics: doc.metrics,
        }
    }
}

/// Everything known about one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub original_filename: String,
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState,
}

/// Job records plus the concurrency gate for job tasks.
#[derive(Debug)]
pub struct JobRegistry {
    records: RwLock<HashMap<Uuid, JobRecord>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl JobRegistry {
    pub fn new(max_concurrent_jobs: usize, max_tracked_jobs: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            capacity: max_tracked_jobs.max(1),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.max_concurrent_jobs, config.max_tracked_jobs)
    }

    /// Register a freshly stored upload as a `queued` job.
    ///
    /// When the registry is full the oldest finished job is forgotten. If
    /// every tracked job is still running the registry grows past its
    /// capacity rather than drop a live job.
    pub async fn insert(&self, upload: &UploadedArchive) -> JobRecord {
        let now = Utc::now();
        let record = JobRecord {
            id: upload.job_id,
            original_filename: upload.original_filename.clone(),
            stored_path: upload.stored_path.clone(),
            size_bytes: upload.size_bytes,
            created_at: now,
            updated_at: now,
            state: JobState::Queued,
        };

        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            let oldest = records
                .values()
                .filter(|r| r.state.is_terminal())
                .min_by_key(|r| r.created_at)
                .map(|r| r.id);
            match oldest {
                Some(id) => {
                    records.remove(&id);
                    debug!("Evicted job {} from registry", id);
                }
                None => warn!(
                    "Job registry over capacity ({} live jobs)",
                    records.len() + 1
                ),
            }
        }
        records.insert(record.id, record.clone());
        record
    }

    /// Move a job to `state`. Returns `false` if the job is not tracked.
    pub async fn transition(&self, id: Uuid, state: JobState) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) => {
                debug!("Job {}: {:?} -> {:?}", id, record.state, state);
                record.state = state;
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait for a job slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, JobError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| JobError::Internal {
                detail: format!("job semaphore closed: {}", e),
            })
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> UploadedArchive {
        let job_id = Uuid::new_v4();
        UploadedArchive {
            job_id,
            original_filename: name.to_string(),
            stored_path: PathBuf::from(format!("uploads/{job_id}.zip")),
            size_bytes: 42,
            content_type: "application/zip".into(),
        }
    }

    fn failed() -> JobState {
        JobState::Failed {
            error: JobError::RenderTimeout { secs: 1 },
        }
    }

    #[tokio::test]
    async fn insert_starts_queued() {
        let reg = JobRegistry::new(2, 8);
        assert!(reg.is_empty().await);
        let up = upload("site.zip");
        let rec = reg.insert(&up).await;

        assert_eq!(rec.state, JobState::Queued);
        assert_eq!(rec.original_filename, "site.zip");
        assert_eq!(reg.get(up.job_id).await.unwrap().size_bytes, 42);
    }

    #[tokio::test]
    async fn transition_updates_state_and_timestamp() {
        let reg = JobRegistry::new(2, 8);
        let up = upload("a.zip");
        let before = reg.insert(&up).await.updated_at;

        assert!(reg.transition(up.job_id, JobState::Extracting).await);
        let rec = reg.get(up.job_id).await.unwrap();
        assert_eq!(rec.state, JobState::Extracting);
        assert!(rec.updated_at >= before);

        assert!(!reg.transition(Uuid::new_v4(), JobState::Rendering).await);
    }

    #[tokio::test]
    async fn full_registry_evicts_oldest_finished_job() {
        let reg = JobRegistry::new(1, 2);
        let first = upload("1.zip");
        let second = upload("2.zip");
        reg.insert(&first).await;
        reg.insert(&second).await;
        reg.transition(first.job_id, failed()).await;

        let third = upload("3.zip");
        reg.insert(&third).await;

        assert_eq!(reg.len().await, 2);
        assert!(reg.get(first.job_id).await.is_none());
        assert!(reg.get(second.job_id).await.is_some());
        assert!(reg.get(third.job_id).await.is_some());
    }

    #[tokio::test]
    async fn live_jobs_are_never_evicted() {
        let reg = JobRegistry::new(1, 1);
        let a = upload("a.zip");
        let b = upload("b.zip");
        reg.insert(&a).await;
        reg.insert(&b).await;

        assert_eq!(reg.len().await, 2);
        assert!(reg.get(a.job_id).await.is_some());
    }

    #[tokio::test]
    async fn permits_bound_concurrency() {
        let reg = JobRegistry::new(1, 8);
        let held = reg.acquire().await.unwrap();
        assert_eq!(reg.available_permits(), 0);

        let waiting = tokio::time::timeout(std::time::Duration::from_millis(50), reg.acquire()).await;
        assert!(waiting.is_err(), "second permit should not be granted");

        drop(held);
        assert!(reg.acquire().await.is_ok());
    }

    #[test]
    fn record_serialises_state_inline() {
        let rec = JobRecord {
            id: Uuid::nil(),
            original_filename: "site.zip".into(),
            stored_path: PathBuf::from("uploads/x.zip"),
            size_bytes: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            state: failed(),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"]["kind"], "render_timeout");
        assert_eq!(json["error"]["secs"], 1);
    }
}
