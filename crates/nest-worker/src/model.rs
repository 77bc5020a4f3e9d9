//! Row and payload shapes for the three external collaborators: the
//! work queue, the relational job store, and the object store. Field
//! names mirror the external interfaces table directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NEST_PARTS_TASK_TYPE: &str = "NEST_PARTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueTaskPayload {
    pub nest_job_id: Uuid,
}

/// A row from the durable work queue.
#[derive(Debug, Clone)]
pub struct QueueTask {
    pub id: Uuid,
    pub task_type: String,
    pub status: QueueStatus,
    pub payload: QueueTaskPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A nest job row. `output_prefix` is set once `job_id` is known, by
/// the API that created it; by the time the worker reads it the value
/// is already `projects/{project_code}/nests/{job_id}/`.
#[derive(Debug, Clone)]
pub struct NestJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub material: String,
    pub thickness_in: f64,
    pub sheet_width_in: f64,
    pub sheet_height_in: f64,
    pub sheet_label: Option<String>,
    pub spacing_in: f64,
    pub margin_in: f64,
    pub rotation_step_deg: f64,
    pub output_prefix: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone)]
pub struct NestJobItem {
    pub id: Uuid,
    pub nest_job_id: Uuid,
    pub item_number: String,
    pub quantity: u32,
    pub dxf_file_path: String,
    pub bounding_box_w: Option<f64>,
    pub bounding_box_h: Option<f64>,
    pub area_sq_in: Option<f64>,
}

/// Geometry metadata the reader fills in on an item after parsing.
#[derive(Debug, Clone, Copy)]
pub struct ItemGeometry {
    pub bounding_box_w: f64,
    pub bounding_box_h: f64,
    pub area_sq_in: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacementRecord {
    pub part_id: String,
    pub instance: u32,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NestResultRow {
    pub nest_job_id: Uuid,
    pub sheet_index: u32,
    pub dxf_path: String,
    pub svg_path: String,
    pub utilization: f64,
    pub parts_on_sheet: u32,
    pub placements: Vec<PlacementRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestSheet {
    pub width_in: f64,
    pub height_in: f64,
    pub margin_in: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestParams {
    pub spacing_in: f64,
    pub rotation_step_deg: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestResults {
    pub sheets: u32,
    pub parts_placed: u32,
    pub avg_utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestOutput {
    pub sheet_index: u32,
    pub dxf_path: String,
    pub utilization: f64,
    pub parts_on_sheet: u32,
    pub placements: Vec<PlacementRecord>,
}

/// Written once per job, redundant with the result rows by design: it
/// lets a sheet be interpreted from storage alone. `outputs` is built
/// from the same per-sheet values as the result rows, never
/// recomputed, so the two can never disagree.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub job_id: Uuid,
    pub material: String,
    pub thickness: f64,
    pub sheet: ManifestSheet,
    pub params: ManifestParams,
    pub results: ManifestResults,
    pub outputs: Vec<ManifestOutput>,
}

/// Strips a leading `{bucket}/` prefix from a stored path if present,
/// so job items created with either a bucket-relative or
/// bucket-qualified path resolve correctly against the object store.
pub fn strip_bucket_prefix(path: &str, bucket: &str) -> String {
    let prefix = format!("{bucket}/");
    path.strip_prefix(prefix.as_str()).unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bucket_prefix_removes_when_present() {
        assert_eq!(
            strip_bucket_prefix("pdm-files/projects/p1/items/a.dxf", "pdm-files"),
            "projects/p1/items/a.dxf"
        );
    }

    #[test]
    fn test_strip_bucket_prefix_leaves_bare_path_alone() {
        assert_eq!(
            strip_bucket_prefix("projects/p1/items/a.dxf", "pdm-files"),
            "projects/p1/items/a.dxf"
        );
    }
}
