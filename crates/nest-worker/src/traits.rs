//! External collaborator boundaries. The worker loop is written only
//! against these traits; `pg_store` and `http_object_store` are the
//! production adapters, `memory` holds in-memory fakes for tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::model::{ItemGeometry, JobStatus, NestJob, NestJobItem, NestResultRow, QueueTask};

/// The durable work queue: pending/processing/completed/failed rows
/// with atomic conditional-update claim.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn poll_next_pending(&self, task_type: &str) -> Result<Option<QueueTask>, WorkerError>;

    /// Conditional update gated on the row still being `pending`.
    /// Returns `true` iff this call won the claim.
    async fn claim(&self, task_id: Uuid) -> Result<bool, WorkerError>;

    async fn complete(&self, task_id: Uuid) -> Result<(), WorkerError>;

    async fn fail(&self, task_id: Uuid, message: &str) -> Result<(), WorkerError>;
}

/// The relational store for nest job, job-item, and result rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<NestJob>, WorkerError>;

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), WorkerError>;

    async fn list_job_items(&self, job_id: Uuid) -> Result<Vec<NestJobItem>, WorkerError>;

    async fn update_job_item_geometry(
        &self,
        item_id: Uuid,
        geometry: ItemGeometry,
    ) -> Result<(), WorkerError>;

    async fn insert_result_rows(&self, rows: &[NestResultRow]) -> Result<(), WorkerError>;

    /// Finalizes a completed job: writes totals, status, manifest, and
    /// completion timestamp in one update.
    async fn finalize_job(
        &self,
        job_id: Uuid,
        sheets_used: u32,
        total_parts_placed: u32,
        avg_utilization: f64,
        manifest: &serde_json::Value,
    ) -> Result<(), WorkerError>;

    /// Marks a job failed with a (caller-truncated) error message.
    async fn fail_job(&self, job_id: Uuid, error_message: &str) -> Result<(), WorkerError>;
}

/// Blob storage keyed by path, relative to a single bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>, WorkerError>;

    /// Upsert semantics: succeeds whether or not `path` already exists.
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), WorkerError>;
}
