/// JSON wire types for the `/general-analysis/*` backend contract.
///
/// The backend is an external collaborator; only the shapes below matter.
/// Response types are tolerant of absent fields so that older backend
/// versions do not break deserialization.
use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body for `POST /general-analysis/analyze-selected`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeSelectedRequest {
    /// Correlation keys of the form `criteria_<id>`, in submission order.
    pub criteria_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_paths: Option<Vec<String>>,
    pub analysis_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_code_entry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_entry_id: Option<i64>,
}

/// One entry of the `criteria_results` map: the backend-echoed display name
/// and the raw LLM prose for a single criterion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CriteriaResultEntry {
    pub name: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Response of `POST /general-analysis/analyze-selected`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeSelectedResponse {
    pub success: bool,
    pub analysis_name: Option<String>,
    pub criteria_count: Option<u32>,
    pub model_used: Option<String>,
    pub usage: Option<TokenUsage>,
    /// Keyed by correlation key (`criteria_<n>`) or positional key.
    #[serde(default)]
    pub criteria_results: HashMap<String, CriteriaResultEntry>,
    pub raw_response: Option<String>,
    pub modified_prompt: Option<String>,
    #[serde(default)]
    pub file_paths: Vec<String>,
    /// Id of the persisted analysis row grouping this batch.
    pub db_result_id: Option<i64>,
}

/// One persisted analysis row from `GET /general-analysis/results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub id: i64,
    pub analysis_name: Option<String>,
    #[serde(default)]
    pub criteria_results: HashMap<String, CriteriaResultEntry>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultListResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<StoredAnalysis>,
    pub total: Option<u64>,
}

/// Body for the bulk `DELETE /general-analysis/results`.
#[derive(Debug, Clone, Serialize)]
pub struct BulkDeleteRequest {
    pub result_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestPromptResponse {
    pub success: bool,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestResponseResponse {
    pub success: bool,
    pub response: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestRawResponse {
    pub success: bool,
    pub raw_response: Option<String>,
}
