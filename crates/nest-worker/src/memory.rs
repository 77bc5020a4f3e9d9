//! In-memory fakes of the three collaborator traits, used by the
//! worker-loop tests. Grounded in `rootsignal-scout-supervisor`'s
//! `NotifyBackend`/`NoopBackend` pattern: a trait with a real adapter
//! and a test double sharing the same interface.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::model::{
    ItemGeometry, JobStatus, NestJob, NestJobItem, NestResultRow, QueueStatus, QueueTask,
};
use crate::traits::{JobStore, ObjectStore, WorkQueue};

/// A single queued task plus a mutable job/item/result fixture, all
/// behind a `Mutex` so the fake can be shared across the async worker
/// loop in tests without `&mut self` receivers.
pub struct InMemoryBackend {
    pub queue: Mutex<Vec<QueueTask>>,
    pub jobs: Mutex<HashMap<Uuid, NestJob>>,
    pub items: Mutex<HashMap<Uuid, Vec<NestJobItem>>>,
    pub results: Mutex<Vec<NestResultRow>>,
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            jobs: Mutex::new(HashMap::new()),
            items: Mutex::new(HashMap::new()),
            results: Mutex::new(Vec::new()),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed_job(&self, job: NestJob, items: Vec<NestJobItem>, task: QueueTask) {
        self.jobs.lock().unwrap().insert(job.id, job);
        self.items.lock().unwrap().insert(items[0].nest_job_id, items);
        self.queue.lock().unwrap().push(task);
    }

    pub fn put_blob(&self, path: &str, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(path.to_string(), bytes);
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for InMemoryBackend {
    async fn poll_next_pending(&self, task_type: &str) -> Result<Option<QueueTask>, WorkerError> {
        let queue = self.queue.lock().unwrap();
        Ok(queue
            .iter()
            .filter(|t| t.task_type == task_type && t.status == QueueStatus::Pending)
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn claim(&self, task_id: Uuid) -> Result<bool, WorkerError> {
        let mut queue = self.queue.lock().unwrap();
        if let Some(task) = queue.iter_mut().find(|t| t.id == task_id) {
            if task.status == QueueStatus::Pending {
                task.status = QueueStatus::Processing;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), WorkerError> {
        let mut queue = self.queue.lock().unwrap();
        if let Some(task) = queue.iter_mut().find(|t| t.id == task_id) {
            task.status = QueueStatus::Completed;
        }
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, _message: &str) -> Result<(), WorkerError> {
        let mut queue = self.queue.lock().unwrap();
        if let Some(task) = queue.iter_mut().find(|t| t.id == task_id) {
            task.status = QueueStatus::Failed;
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryBackend {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<NestJob>, WorkerError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), WorkerError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&job_id) {
            job.status = status;
        }
        Ok(())
    }

    async fn list_job_items(&self, job_id: Uuid) -> Result<Vec<NestJobItem>, WorkerError> {
        Ok(self.items.lock().unwrap().get(&job_id).cloned().unwrap_or_default())
    }

    async fn update_job_item_geometry(
        &self,
        item_id: Uuid,
        geometry: ItemGeometry,
    ) -> Result<(), WorkerError> {
        let mut items = self.items.lock().unwrap();
        for list in items.values_mut() {
            if let Some(item) = list.iter_mut().find(|i| i.id == item_id) {
                item.bounding_box_w = Some(geometry.bounding_box_w);
                item.bounding_box_h = Some(geometry.bounding_box_h);
                item.area_sq_in = Some(geometry.area_sq_in);
            }
        }
        Ok(())
    }

    async fn insert_result_rows(&self, rows: &[NestResultRow]) -> Result<(), WorkerError> {
        self.results.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn finalize_job(
        &self,
        job_id: Uuid,
        _sheets_used: u32,
        _total_parts_placed: u32,
        _avg_utilization: f64,
        _manifest: &serde_json::Value,
    ) -> Result<(), WorkerError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&job_id) {
            job.status = JobStatus::Completed;
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, _error_message: &str) -> Result<(), WorkerError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&job_id) {
            job.status = JobStatus::Failed;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryBackend {
    async fn download(&self, path: &str) -> Result<Vec<u8>, WorkerError> {
        self.blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| WorkerError::BadInputError {
                item: path.to_string(),
                message: "no such blob".to_string(),
            })
    }

    async fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), WorkerError> {
        self.blobs.lock().unwrap().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueueTaskPayload, NEST_PARTS_TASK_TYPE};
    use chrono::Utc;

    fn sample_task() -> QueueTask {
        QueueTask {
            id: Uuid::new_v4(),
            task_type: NEST_PARTS_TASK_TYPE.to_string(),
            status: QueueStatus::Pending,
            payload: QueueTaskPayload { nest_job_id: Uuid::new_v4() },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_claim_succeeds_once_then_fails() {
        let backend = InMemoryBackend::new();
        let task = sample_task();
        backend.queue.lock().unwrap().push(task.clone());

        assert!(backend.claim(task.id).await.unwrap());
        assert!(!backend.claim(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_poll_next_pending_ignores_non_pending() {
        let backend = InMemoryBackend::new();
        let task = sample_task();
        backend.queue.lock().unwrap().push(task.clone());
        backend.claim(task.id).await.unwrap();

        let next = backend.poll_next_pending(NEST_PARTS_TASK_TYPE).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_object_store_roundtrip() {
        let backend = InMemoryBackend::new();
        backend.upload("a/b.dxf", b"hello", "application/dxf").await.unwrap();
        let bytes = backend.download("a/b.dxf").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_download_missing_blob_is_bad_input() {
        let backend = InMemoryBackend::new();
        let result = backend.download("missing.dxf").await;
        assert!(matches!(result, Err(WorkerError::BadInputError { .. })));
    }
}
