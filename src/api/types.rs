//! Request and response bodies exchanged with the backend.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Active => "active",
            ExperimentStatus::Paused => "paused",
            ExperimentStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Auto,
    Zh,
    En,
}

// -----------------------------------------------------------------------------
// Creative tasks
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TaskData {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreativeData {
    pub id: String,
    pub format: String,
    pub image_url: String,
    pub width: u32,
    pub height: u32,
    pub title: Option<String>,
    pub product_name: Option<String>,
    pub cta_text: Option<String>,
    pub selling_points: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TaskDetailData {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub progress: f64,
    pub error: Option<String>,
    #[serde(default)]
    pub creatives: Vec<CreativeData>,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
    #[serde(default)]
    pub selling_points: Vec<String>,
    pub product_image_url: Option<String>,
    #[serde(default)]
    pub requested_formats: Vec<String>,
    pub style: Option<String>,
    pub cta_text: Option<String>,
    pub num_variants: Option<u32>,
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TaskListItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub created_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub product_name: Option<String>,
    pub cta_text: Option<String>,
    pub selling_points: Option<Vec<String>>,
    pub first_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TasksListData {
    #[serde(default)]
    pub tasks: Vec<TaskListItem>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeleteTaskResponse {
    pub task_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetData {
    pub id: String,
    pub numeric_id: Option<u64>,
    pub task_id: u64,
    pub format: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub file_size: Option<u64>,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub public_url: String,
    pub image_url: Option<String>,
    pub style: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    pub title: Option<String>,
    pub product_name: Option<String>,
    pub cta_text: Option<String>,
    pub selling_points: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetsListData {
    #[serde(default)]
    pub assets: Vec<AssetData>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ListTasksParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ListAssetsParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub format: Option<String>,
    pub task_id: Option<String>,
}

/// Single-shot generation request kept for older backends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub title: String,
    pub selling_points: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image_url: Option<String>,
    pub requested_formats: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta_text: Option<String>,
    pub num_variants: u32,
}

// -----------------------------------------------------------------------------
// Copywriting workflow
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateCopywritingRequest {
    pub product_name: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CopywritingCandidates {
    pub task_id: String,
    #[serde(default)]
    pub cta_candidates: Vec<String>,
    #[serde(default)]
    pub selling_point_candidates: Vec<String>,
}

/// Per-variant overrides; unset fields fall back to the global configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct VariantConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmCopywritingRequest {
    pub task_id: String,
    pub selected_cta_index: usize,
    pub selected_sp_indexes: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_cta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_sps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_variants: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_configs: Option<Vec<VariantConfig>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartCreativeRequest {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_variants: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_configs: Option<Vec<VariantConfig>>,
}

// -----------------------------------------------------------------------------
// Experiments
// -----------------------------------------------------------------------------

/// Creative ids are sent as strings but listed back as numbers.
fn creative_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }
    Ok(match Repr::deserialize(deserializer)? {
        Repr::Number(n) => n.to_string(),
        Repr::Text(s) => s,
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExperimentVariantInput {
    #[serde(deserialize_with = "creative_id_text")]
    pub creative_id: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_end: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selling_points: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateExperimentRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub variants: Vec<ExperimentVariantInput>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreatedExperiment {
    pub experiment_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub product_name: Option<String>,
    pub status: ExperimentStatus,
    pub created_at: Option<String>,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    #[serde(default)]
    pub variants: Vec<ExperimentVariantInput>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExperimentsListData {
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ListExperimentsParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<ExperimentStatus>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VariantMetrics {
    pub creative_id: u64,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    /// Server-computed; recomputed locally when absent or not finite.
    #[serde(default)]
    pub ctr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExperimentMetrics {
    pub experiment_id: String,
    #[serde(default)]
    pub variants: Vec<VariantMetrics>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExperimentAssignData {
    pub creative_id: u64,
    pub asset_uuid: Option<String>,
    pub task_id: Option<u64>,
    pub title: Option<String>,
    pub product_name: Option<String>,
    pub cta_text: Option<String>,
    pub selling_points: Option<Vec<String>>,
    pub image_url: Option<String>,
}

// -----------------------------------------------------------------------------
// Traces and warmup
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TraceStep {
    pub step_name: String,
    pub component: String,
    pub status: String,
    #[serde(default)]
    pub duration_ms: u64,
    pub start_at: String,
    pub end_at: String,
    pub input_preview: Option<String>,
    pub output_preview: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TraceItem {
    pub trace_id: String,
    pub model_name: String,
    #[serde(default)]
    pub model_version: String,
    pub status: String,
    #[serde(default)]
    pub duration_ms: u64,
    pub start_at: String,
    pub end_at: String,
    pub source: Option<String>,
    pub input_preview: Option<String>,
    pub output_preview: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub steps: Vec<TraceStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TraceListData {
    #[serde(default)]
    pub traces: Vec<TraceItem>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ListTracesParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
    pub model_name: Option<String>,
    pub trace_id: Option<String>,
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WarmupRecord {
    pub started_at: String,
    /// Milliseconds
    #[serde(default)]
    pub duration: u64,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub actions_run: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct WarmupStats {
    #[serde(default)]
    pub runs: u64,
    #[serde(default)]
    pub successes: u64,
    #[serde(default)]
    pub failures: u64,
    pub last_run: Option<String>,
    pub last_success: Option<String>,
    pub last_error: Option<String>,
    #[serde(default)]
    pub recent: Vec<WarmupRecord>,
}
