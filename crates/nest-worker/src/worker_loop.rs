//! The main polling loop and the per-job pipeline it drives. Mirrors
//! `nest_worker.py`'s `main()`/`process_nest_task()` step numbering;
//! the step comments below reference the same steps as spec §4.5.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nest_dxf::reader::ReaderOptions;
use nest_packer::{nest_instances, NestConfig, NestingResult, PartInput};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{truncate_error_message, WorkerError};
use crate::model::{
    strip_bucket_prefix, ItemGeometry, JobStatus, Manifest, ManifestOutput, ManifestParams,
    ManifestResults, ManifestSheet, NestJob, NestJobItem, NestResultRow, PlacementRecord,
    NEST_PARTS_TASK_TYPE,
};
use crate::traits::{JobStore, ObjectStore, WorkQueue};

const MAX_ERROR_MESSAGE_CHARS: usize = 2000;

pub struct Worker<Q, J, O> {
    pub queue: Arc<Q>,
    pub jobs: Arc<J>,
    pub objects: Arc<O>,
    pub config: WorkerConfig,
}

impl<Q, J, O> Worker<Q, J, O>
where
    Q: WorkQueue,
    J: JobStore,
    O: ObjectStore,
{
    pub fn new(queue: Arc<Q>, jobs: Arc<J>, objects: Arc<O>, config: WorkerConfig) -> Self {
        Self { queue, jobs, objects, config }
    }

    /// Runs the poll loop forever. Step 1-2: poll and claim.
    pub async fn run(&self) -> ! {
        info!(
            poll_interval = self.config.poll_interval_secs,
            temp_dir = %self.config.temp_dir,
            bucket = %self.config.storage_bucket,
            "DXF nesting worker starting"
        );

        loop {
            match self.poll_once().await {
                Ok(()) => {}
                Err(e) => warn!(error = %e, "poll cycle failed"),
            }
            tokio::time::sleep(std::time::Duration::from_secs(self.config.poll_interval_secs)).await;
        }
    }

    async fn poll_once(&self) -> Result<(), WorkerError> {
        let Some(task) = self.queue.poll_next_pending(NEST_PARTS_TASK_TYPE).await? else {
            return Ok(());
        };

        if !self.queue.claim(task.id).await? {
            info!(task_id = %task.id, "task already claimed by another worker");
            return Ok(());
        }

        let job_id = task.payload.nest_job_id;
        info!(task_id = %task.id, job_id = %job_id, "claimed nesting task");

        match self.process_job(job_id).await {
            Ok(()) => {
                self.queue.complete(task.id).await?;
                info!(job_id = %job_id, "nest job completed successfully");
            }
            Err(e) => {
                let message = truncate_error_message(&e.to_string());
                error!(job_id = %job_id, error = %message, "nest job failed");
                let _ = self.jobs.fail_job(job_id, &message).await;
                let _ = self.queue.fail(task.id, &message).await;
            }
        }

        Ok(())
    }

    /// Steps 3-12: the full per-job pipeline. Step 13 (scratch
    /// directory cleanup) is guaranteed here regardless of outcome.
    async fn process_job(&self, job_id: Uuid) -> Result<(), WorkerError> {
        self.jobs.update_job_status(job_id, JobStatus::Processing).await?;

        let scratch_dir = PathBuf::from(&self.config.temp_dir).join(job_id.to_string());
        std::fs::create_dir_all(&scratch_dir)
            .map_err(|e| WorkerError::PersistenceError(format!("scratch dir: {e}")))?;

        let result = self.process_job_inner(job_id, &scratch_dir).await;

        let _ = std::fs::remove_dir_all(&scratch_dir);

        result
    }

    async fn process_job_inner(&self, job_id: Uuid, scratch_dir: &Path) -> Result<(), WorkerError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| WorkerError::PersistenceError(format!("nest job not found: {job_id}")))?;

        let items = self.jobs.list_job_items(job_id).await?;
        if items.is_empty() {
            return Err(WorkerError::PersistenceError("no items in nest job".to_string()));
        }

        info!(
            job_id = %job_id,
            material = %job.material,
            sheet_w = job.sheet_width_in,
            sheet_h = job.sheet_height_in,
            item_count = items.len(),
            "job and items loaded"
        );

        // Step 6: download every item's DXF.
        let mut local_paths: HashMap<String, PathBuf> = HashMap::new();
        for item in &items {
            let path_in_bucket = strip_bucket_prefix(&item.dxf_file_path, &self.config.storage_bucket);
            match self.objects.download(&path_in_bucket).await {
                Ok(bytes) => {
                    let local_path = scratch_dir.join(format!("{}.dxf", item.item_number));
                    std::fs::write(&local_path, &bytes)
                        .map_err(|e| WorkerError::WriteError(format!("scratch write: {e}")))?;
                    local_paths.insert(item.item_number.clone(), local_path);
                }
                Err(e) => {
                    warn!(item = %item.item_number, error = %e, "failed to download DXF, skipping item");
                }
            }
        }

        if local_paths.is_empty() {
            return Err(WorkerError::BadInputError {
                item: "*".to_string(),
                message: "failed to download any DXF files".to_string(),
            });
        }

        // Step 7: parse each DXF, persist geometry metadata, build nester inputs.
        let mut parts = Vec::new();
        for item in &items {
            let Some(local_path) = local_paths.get(&item.item_number) else { continue };

            let options = ReaderOptions::default();
            let polygons = nest_dxf::read_polygons(local_path, &options)?;
            if polygons.is_empty() {
                warn!(item = %item.item_number, "no valid polygons found, skipping item");
                continue;
            }

            let outline = polygons[0].clone();
            let bounds = outline.bounds().unwrap_or(nest_core::Bounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            });
            let area = polygons.iter().map(|p| p.area()).sum::<f64>();

            self.jobs
                .update_job_item_geometry(
                    item.id,
                    ItemGeometry {
                        bounding_box_w: bounds.width(),
                        bounding_box_h: bounds.height(),
                        area_sq_in: area,
                    },
                )
                .await?;

            parts.push(PartInput { id: item.item_number.clone(), polygon: outline, quantity: item.quantity });
        }

        if parts.is_empty() {
            return Err(WorkerError::BadInputError {
                item: "*".to_string(),
                message: "no valid geometry found in any DXF files".to_string(),
            });
        }

        // Step 8: run the nester.
        let nest_config = NestConfig {
            sheet_width: job.sheet_width_in,
            sheet_height: job.sheet_height_in,
            spacing: job.spacing_in,
            margin: job.margin_in,
            rotation_step: job.rotation_step_deg,
        };
        let result = nest_instances(&parts, &nest_config);
        info!(
            job_id = %job_id,
            sheets = result.total_sheets,
            parts_placed = result.total_parts_placed,
            "nesting complete"
        );

        // Steps 9-10: write/upload each sheet and the manifest.
        let (result_rows, manifest) =
            self.write_and_upload_outputs(&job, scratch_dir, &result).await?;

        // Step 11: persist result rows and finalize the job.
        self.jobs.insert_result_rows(&result_rows).await?;

        let manifest_json = serde_json::to_value(&manifest)
            .map_err(|e| WorkerError::PersistenceError(e.to_string()))?;
        self.jobs
            .finalize_job(
                job_id,
                result.total_sheets as u32,
                result.total_parts_placed as u32,
                result.avg_utilization,
                &manifest_json,
            )
            .await?;

        Ok(())
    }

    async fn write_and_upload_outputs(
        &self,
        job: &NestJob,
        scratch_dir: &Path,
        result: &NestingResult,
    ) -> Result<(Vec<NestResultRow>, Manifest), WorkerError> {
        let mut result_rows = Vec::with_capacity(result.sheets.len());
        let mut outputs = Vec::with_capacity(result.sheets.len());

        for sheet in &result.sheets {
            let dxf_name = format!("sheet_{:02}.dxf", sheet.index);
            let svg_name = format!("sheet_{:02}.svg", sheet.index);
            let dxf_local = scratch_dir.join(&dxf_name);
            let svg_local = scratch_dir.join(&svg_name);

            info!(
                sheet = sheet.index,
                parts = sheet.placements.len(),
                utilization = sheet.utilization,
                "writing sheet"
            );

            let source_paths = self.source_dxf_paths_for_sheet(scratch_dir, sheet)?;
            nest_dxf::write_nested_sheet(sheet, &source_paths, &dxf_local)?;
            nest_dxf::svg::write_svg_from_dxf(&dxf_local, &svg_local, sheet.width, sheet.height)?;

            let dxf_path = format!("{}{}", job.output_prefix, dxf_name);
            let svg_path = format!("{}{}", job.output_prefix, svg_name);

            let dxf_bytes = std::fs::read(&dxf_local)
                .map_err(|e| WorkerError::WriteError(format!("read back {dxf_name}: {e}")))?;
            let svg_bytes = std::fs::read(&svg_local)
                .map_err(|e| WorkerError::WriteError(format!("read back {svg_name}: {e}")))?;

            self.objects.upload(&dxf_path, &dxf_bytes, "application/dxf").await?;
            self.objects.upload(&svg_path, &svg_bytes, "image/svg+xml").await?;

            let placements: Vec<PlacementRecord> = sheet
                .placements
                .iter()
                .map(|p| PlacementRecord {
                    part_id: p.part_id.clone(),
                    instance: p.instance,
                    x: round4(p.x),
                    y: round4(p.y),
                    rotation: p.rotation,
                })
                .collect();

            result_rows.push(NestResultRow {
                nest_job_id: job.id,
                sheet_index: sheet.index as u32,
                dxf_path: dxf_path.clone(),
                svg_path: svg_path.clone(),
                utilization: round4(sheet.utilization),
                parts_on_sheet: sheet.placements.len() as u32,
                placements: placements.clone(),
            });

            outputs.push(ManifestOutput {
                sheet_index: sheet.index as u32,
                dxf_path,
                utilization: round4(sheet.utilization),
                parts_on_sheet: sheet.placements.len() as u32,
                placements,
            });
        }

        // Step 10: manifest built from the same values as the result rows.
        let manifest = Manifest {
            job_id: job.id,
            material: job.material.clone(),
            thickness: job.thickness_in,
            sheet: ManifestSheet {
                width_in: job.sheet_width_in,
                height_in: job.sheet_height_in,
                margin_in: job.margin_in,
            },
            params: ManifestParams {
                spacing_in: job.spacing_in,
                rotation_step_deg: job.rotation_step_deg,
            },
            results: ManifestResults {
                sheets: result.total_sheets as u32,
                parts_placed: result.total_parts_placed as u32,
                avg_utilization: round4(result.avg_utilization),
            },
            outputs,
        };

        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| WorkerError::WriteError(e.to_string()))?;
        let manifest_path = format!("{}manifest.json", job.output_prefix);
        self.objects.upload(&manifest_path, &manifest_bytes, "application/json").await?;

        Ok((result_rows, manifest))
    }

    /// The DXF Writer re-reads each part's source file by id; this
    /// resolves the same local scratch paths the download step wrote.
    fn source_dxf_paths_for_sheet(
        &self,
        scratch_dir: &Path,
        sheet: &nest_packer::SheetResult,
    ) -> Result<HashMap<String, PathBuf>, WorkerError> {
        let mut paths = HashMap::new();
        for placement in &sheet.placements {
            let candidate = scratch_dir.join(format!("{}.dxf", placement.part_id));
            if candidate.exists() {
                paths.insert(placement.part_id.clone(), candidate);
            }
        }
        Ok(paths)
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::model::{JobStatus, NestJob, NestJobItem, QueueStatus, QueueTask, QueueTaskPayload};
    use chrono::Utc;

    fn make_job(id: Uuid) -> NestJob {
        NestJob {
            id,
            project_id: Uuid::new_v4(),
            material: "Aluminum".to_string(),
            thickness_in: 0.125,
            sheet_width_in: 10.0,
            sheet_height_in: 10.0,
            sheet_label: None,
            spacing_in: 0.125,
            margin_in: 0.5,
            rotation_step_deg: 90.0,
            output_prefix: format!("projects/p1/nests/{id}/"),
            status: JobStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_poll_once_with_no_items_fails_job_cleanly() {
        let job_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let backend = Arc::new(InMemoryBackend::new());

        let job = make_job(job_id);
        let item = NestJobItem {
            id: item_id,
            nest_job_id: job_id,
            item_number: "part-1".to_string(),
            quantity: 1,
            dxf_file_path: "projects/p1/items/part-1.dxf".to_string(),
            bounding_box_w: None,
            bounding_box_h: None,
            area_sq_in: None,
        };
        let task = QueueTask {
            id: Uuid::new_v4(),
            task_type: NEST_PARTS_TASK_TYPE.to_string(),
            status: QueueStatus::Pending,
            payload: QueueTaskPayload { nest_job_id: job_id },
            created_at: Utc::now(),
        };
        backend.seed_job(job, vec![item], task);
        // Deliberately do not seed the blob: download will fail for every item.

        let config = WorkerConfig {
            database_url: "mem".to_string(),
            object_store_base_url: "mem".to_string(),
            object_store_token: "mem".to_string(),
            poll_interval_secs: 5,
            temp_dir: std::env::temp_dir().join("nest-worker-test").to_string_lossy().to_string(),
            storage_bucket: "pdm-files".to_string(),
        };

        let worker = Worker::new(backend.clone(), backend.clone(), backend.clone(), config);
        worker.poll_once().await.unwrap();

        let job_after = backend.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job_after.status, JobStatus::Failed);
    }
}
