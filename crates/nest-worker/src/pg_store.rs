//! Postgres-backed `WorkQueue` and `JobStore`, grounded in
//! `rootsignal-api`'s `db::models` query style (`sqlx::query_as` with
//! bound params over a shared `PgPool`).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::model::{
    ItemGeometry, JobStatus, NestJob, NestJobItem, NestResultRow, QueueStatus, QueueTask,
    QueueTaskPayload,
};
use crate::traits::{JobStore, WorkQueue};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for PgStore {
    async fn poll_next_pending(&self, task_type: &str) -> Result<Option<QueueTask>, WorkerError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, serde_json::Value, chrono::DateTime<Utc>)>(
            r#"
            SELECT id, task_type, status, payload, created_at
            FROM work_queue
            WHERE status = 'pending' AND task_type = $1
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(task_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WorkerError::QueuePollError(e.to_string()))?;

        Ok(row.map(|(id, task_type, status, payload, created_at)| QueueTask {
            id,
            task_type,
            status: parse_queue_status(&status),
            payload: serde_json::from_value::<QueueTaskPayload>(payload)
                .unwrap_or(QueueTaskPayload { nest_job_id: Uuid::nil() }),
            created_at,
        }))
    }

    async fn claim(&self, task_id: Uuid) -> Result<bool, WorkerError> {
        let result = sqlx::query(
            r#"
            UPDATE work_queue
            SET status = 'processing', started_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), WorkerError> {
        sqlx::query(
            r#"UPDATE work_queue SET status = 'completed', completed_at = now() WHERE id = $1"#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, message: &str) -> Result<(), WorkerError> {
        sqlx::query(
            r#"
            UPDATE work_queue
            SET status = 'failed', completed_at = now(), error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<NestJob>, WorkerError> {
        #[allow(clippy::type_complexity)]
        let row = sqlx::query_as::<
            _,
            (Uuid, Uuid, String, f64, f64, f64, Option<String>, f64, f64, f64, String, String),
        >(
            r#"
            SELECT id, project_id, material, thickness, sheet_width_in, sheet_height_in,
                   sheet_label, spacing_in, margin_in, rotation_step_deg, output_prefix, status
            FROM nest_jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(
                id,
                project_id,
                material,
                thickness_in,
                sheet_width_in,
                sheet_height_in,
                sheet_label,
                spacing_in,
                margin_in,
                rotation_step_deg,
                output_prefix,
                status,
            )| NestJob {
                id,
                project_id,
                material,
                thickness_in,
                sheet_width_in,
                sheet_height_in,
                sheet_label,
                spacing_in,
                margin_in,
                rotation_step_deg,
                output_prefix,
                status: parse_job_status(&status),
            },
        ))
    }

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), WorkerError> {
        sqlx::query(r#"UPDATE nest_jobs SET status = $2 WHERE id = $1"#)
            .bind(job_id)
            .bind(job_status_str(status))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_job_items(&self, job_id: Uuid) -> Result<Vec<NestJobItem>, WorkerError> {
        let rows = sqlx::query_as::<
            _,
            (Uuid, Uuid, String, i32, String, Option<f64>, Option<f64>, Option<f64>),
        >(
            r#"
            SELECT id, nest_job_id, item_number, quantity, dxf_file_path,
                   bounding_box_w, bounding_box_h, area_sq_in
            FROM nest_job_items
            WHERE nest_job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, nest_job_id, item_number, quantity, dxf_file_path, bw, bh, area)| {
                    NestJobItem {
                        id,
                        nest_job_id,
                        item_number,
                        quantity: quantity.max(0) as u32,
                        dxf_file_path,
                        bounding_box_w: bw,
                        bounding_box_h: bh,
                        area_sq_in: area,
                    }
                },
            )
            .collect())
    }

    async fn update_job_item_geometry(
        &self,
        item_id: Uuid,
        geometry: ItemGeometry,
    ) -> Result<(), WorkerError> {
        sqlx::query(
            r#"
            UPDATE nest_job_items
            SET bounding_box_w = $2, bounding_box_h = $3, area_sq_in = $4
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .bind(round4(geometry.bounding_box_w))
        .bind(round4(geometry.bounding_box_h))
        .bind(round4(geometry.area_sq_in))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_result_rows(&self, rows: &[NestResultRow]) -> Result<(), WorkerError> {
        for row in rows {
            let placements = serde_json::to_value(&row.placements)
                .map_err(|e| WorkerError::PersistenceError(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO nest_results
                    (nest_job_id, sheet_index, dxf_path, svg_path, utilization, parts_on_sheet, placements)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(row.nest_job_id)
            .bind(row.sheet_index as i32)
            .bind(&row.dxf_path)
            .bind(&row.svg_path)
            .bind(round4(row.utilization))
            .bind(row.parts_on_sheet as i32)
            .bind(placements)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn finalize_job(
        &self,
        job_id: Uuid,
        sheets_used: u32,
        total_parts_placed: u32,
        avg_utilization: f64,
        manifest: &serde_json::Value,
    ) -> Result<(), WorkerError> {
        sqlx::query(
            r#"
            UPDATE nest_jobs
            SET status = 'completed',
                sheets_used = $2,
                total_parts_placed = $3,
                avg_utilization = $4,
                manifest = $5,
                completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(sheets_used as i32)
        .bind(total_parts_placed as i32)
        .bind(round4(avg_utilization))
        .bind(manifest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error_message: &str) -> Result<(), WorkerError> {
        sqlx::query(
            r#"
            UPDATE nest_jobs
            SET status = 'failed', error_message = $2, completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn parse_queue_status(s: &str) -> QueueStatus {
    match s {
        "processing" => QueueStatus::Processing,
        "completed" => QueueStatus::Completed,
        "failed" => QueueStatus::Failed,
        _ => QueueStatus::Pending,
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round4_rounds_to_four_decimals() {
        assert_eq!(round4(0.123456), 0.1235);
    }

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(parse_job_status(job_status_str(status)), status);
        }
    }
}
