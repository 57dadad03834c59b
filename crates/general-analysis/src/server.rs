/// MCP server for the general-analysis workflow.
///
/// Exposes criteria CRUD, the analysis triggers and the result list as
/// tools. Every trigger path funnels through the same reconciliation
/// pipeline (`AnalysisService` → `merge_results`), and all user-facing
/// errors are plain strings.
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use avalia_common::api::TokenUsage;
use avalia_common::backend::BackendClient;

use crate::analysis::{AnalysisOptions, AnalysisService};
use crate::cache::StateCache;
use crate::model::{AnalysisResult, Criterion};
use crate::registry::CriterionRegistry;
use crate::store::ResultStore;

/// Shared mutable state: the registry and the live result list. A single
/// RwLock keeps the original's single-writer discipline; analysis holds the
/// write guard across the backend call, so only one analysis is in flight
/// at a time.
pub struct AppState {
    pub registry: CriterionRegistry,
    pub store: ResultStore,
    /// Name of the most recent analysis, for the raw-response cache lookup.
    pub last_analysis_name: Option<String>,
}

#[derive(Clone)]
pub struct GeneralAnalysisServer {
    state: Arc<RwLock<AppState>>,
    analysis: Arc<AnalysisService>,
    client: Arc<BackendClient>,
    cache: Arc<StateCache>,
    tool_router: ToolRouter<GeneralAnalysisServer>,
}

impl GeneralAnalysisServer {
    pub fn new(
        registry: CriterionRegistry,
        store: ResultStore,
        analysis: Arc<AnalysisService>,
        client: Arc<BackendClient>,
        cache: Arc<StateCache>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(AppState {
                registry,
                store,
                last_analysis_name: None,
            })),
            analysis,
            client,
            cache,
            tool_router: Self::tool_router(),
        }
    }

    /// Best-effort persistence after a mutation. Failures degrade to a
    /// memory-only session.
    async fn persist(&self, state: &AppState) {
        self.cache.set_registry(&state.registry.snapshot()).await;
        self.cache.set_results(state.store.results()).await;
    }

    async fn run_analysis(
        &self,
        criterion_ids: Vec<i64>,
        options: AnalysisOptions,
    ) -> Result<Json<AnalyzeResponse>, String> {
        if criterion_ids.is_empty() {
            return Err("no criteria selected for analysis".to_string());
        }

        // Held across the backend call: one analysis in flight at a time.
        let mut state = self.state.write().await;

        let outcome = self
            .analysis
            .run(&criterion_ids, &state.registry, options)
            .await
            .map_err(|e| format!("analysis failed: {e}"))?;

        state.store.set_merged(outcome.batch.clone());
        state.last_analysis_name = Some(outcome.analysis_name.clone());
        self.persist(&state).await;
        if let Some(raw) = &outcome.raw_response {
            self.cache
                .set_raw_response(&outcome.analysis_name, raw)
                .await;
        }

        Ok(Json(AnalyzeResponse {
            results: state.store.results().to_vec(),
            batch: outcome.batch,
            model_used: outcome.model_used,
            usage: outcome.usage,
            db_result_id: outcome.db_result_id,
        }))
    }
}

// --- Tool parameter / response types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct AddCriterionParams {
    /// Criterion text; omitted or blank gets a placeholder.
    text: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EditCriterionParams {
    criterion_id: i64,
    text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SetCriterionActiveParams {
    criterion_id: i64,
    active: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DeleteCriterionParams {
    criterion_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AnalyzeSelectedParams {
    /// Ids of the criteria to analyze, in the order they should be sent.
    criterion_ids: Vec<i64>,
    analysis_name: Option<String>,
    file_paths: Option<Vec<String>>,
    code_entry_id: Option<i64>,
    /// Delete persisted backend rows before analyzing (non-fatal on failure).
    purge_prior: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AnalyzeAllParams {
    analysis_name: Option<String>,
    file_paths: Option<Vec<String>>,
    code_entry_id: Option<i64>,
    purge_prior: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DeleteResultsParams {
    /// Numeric result ids as shown in the result list.
    result_ids: Vec<i64>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct CriteriaListResponse {
    criteria: Vec<Criterion>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct CriterionResponse {
    criterion: Criterion,
}

#[derive(Debug, Serialize, JsonSchema)]
struct AnalyzeResponse {
    /// The full merged result list after this analysis.
    results: Vec<AnalysisResult>,
    /// Only the results produced by this batch.
    batch: Vec<AnalysisResult>,
    model_used: Option<String>,
    usage: Option<TokenUsage>,
    db_result_id: Option<i64>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct ResultsResponse {
    results: Vec<AnalysisResult>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct OkResponse {
    ok: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
struct TextResponse {
    text: Option<String>,
}

#[tool_router]
impl GeneralAnalysisServer {
    #[tool(description = "List all evaluation criteria in display order, with activation state.")]
    async fn list_criteria(&self) -> Result<Json<CriteriaListResponse>, String> {
        let state = self.state.read().await;
        Ok(Json(CriteriaListResponse {
            criteria: state.registry.ordered(),
        }))
    }

    #[tool(description = "Create a new evaluation criterion. Blank text gets a placeholder; the criterion starts active.")]
    async fn add_criterion(
        &self,
        Parameters(params): Parameters<AddCriterionParams>,
    ) -> Result<Json<CriterionResponse>, String> {
        let mut state = self.state.write().await;
        let criterion = state.registry.add(params.text);
        self.persist(&state).await;
        Ok(Json(CriterionResponse { criterion }))
    }

    #[tool(description = "Replace the text of an existing criterion.")]
    async fn edit_criterion(
        &self,
        Parameters(params): Parameters<EditCriterionParams>,
    ) -> Result<Json<CriterionResponse>, String> {
        let text = params.text.trim().to_string();
        if text.is_empty() {
            return Err("text must not be empty".to_string());
        }

        let mut state = self.state.write().await;
        if !state.registry.edit_text(params.criterion_id, text) {
            return Err(format!("criterion not found: {}", params.criterion_id));
        }
        self.persist(&state).await;
        let criterion = state
            .registry
            .get(params.criterion_id)
            .cloned()
            .ok_or_else(|| format!("criterion not found: {}", params.criterion_id))?;
        Ok(Json(CriterionResponse { criterion }))
    }

    #[tool(description = "Activate or deactivate a criterion for 'analyze all'.")]
    async fn set_criterion_active(
        &self,
        Parameters(params): Parameters<SetCriterionActiveParams>,
    ) -> Result<Json<CriterionResponse>, String> {
        let mut state = self.state.write().await;
        if !state.registry.set_active(params.criterion_id, params.active) {
            return Err(format!("criterion not found: {}", params.criterion_id));
        }
        self.persist(&state).await;
        let criterion = state
            .registry
            .get(params.criterion_id)
            .cloned()
            .ok_or_else(|| format!("criterion not found: {}", params.criterion_id))?;
        Ok(Json(CriterionResponse { criterion }))
    }

    #[tool(description = "Delete a criterion. Existing results keep their denormalized copy of its text.")]
    async fn delete_criterion(
        &self,
        Parameters(params): Parameters<DeleteCriterionParams>,
    ) -> Result<Json<OkResponse>, String> {
        let mut state = self.state.write().await;
        if state.registry.remove(params.criterion_id).is_none() {
            return Err(format!("criterion not found: {}", params.criterion_id));
        }
        self.persist(&state).await;
        Ok(Json(OkResponse { ok: true }))
    }

    #[tool(description = "Analyze every active criterion against the configured code. Merges the batch into the result list without touching unrelated results.")]
    async fn analyze_all(
        &self,
        Parameters(params): Parameters<AnalyzeAllParams>,
    ) -> Result<Json<AnalyzeResponse>, String> {
        let criterion_ids = {
            let state = self.state.read().await;
            state.registry.active_ids()
        };
        self.run_analysis(
            criterion_ids,
            AnalysisOptions {
                analysis_name: params.analysis_name,
                file_paths: params.file_paths,
                code_entry_id: params.code_entry_id,
                purge_prior: params.purge_prior.unwrap_or(false),
            },
        )
        .await
    }

    #[tool(description = "Analyze an explicit list of criterion ids (also the re-analysis path). Merges the batch into the result list.")]
    async fn analyze_selected(
        &self,
        Parameters(params): Parameters<AnalyzeSelectedParams>,
    ) -> Result<Json<AnalyzeResponse>, String> {
        self.run_analysis(
            params.criterion_ids,
            AnalysisOptions {
                analysis_name: params.analysis_name,
                file_paths: params.file_paths,
                code_entry_id: params.code_entry_id,
                purge_prior: params.purge_prior.unwrap_or(false),
            },
        )
        .await
    }

    #[tool(description = "List the current merged analysis results.")]
    async fn list_results(&self) -> Result<Json<ResultsResponse>, String> {
        let state = self.state.read().await;
        Ok(Json(ResultsResponse {
            results: state.store.results().to_vec(),
        }))
    }

    #[tool(description = "Delete results by id. The removal is optimistic: if the backend rejects the delete, the results reappear.")]
    async fn delete_results(
        &self,
        Parameters(params): Parameters<DeleteResultsParams>,
    ) -> Result<Json<OkResponse>, String> {
        if params.result_ids.is_empty() {
            return Err("result_ids must not be empty".to_string());
        }

        let mut state = self.state.write().await;
        for id in &params.result_ids {
            if state.store.get(*id).is_none() {
                warn!(result_id = id, "delete requested for unknown result id");
            }
        }
        let removed = state.store.remove(&params.result_ids);
        if removed.is_empty() {
            return Err("no results matched the given ids".to_string());
        }

        // Backend rows referenced by the removed results, deduplicated.
        let mut backend_rows: Vec<i64> = removed
            .iter()
            .filter_map(|(_, r)| r.result_id)
            .collect();
        backend_rows.sort_unstable();
        backend_rows.dedup();

        // Single-row deletes use the per-id endpoint; multiple rows go
        // through the bulk delete.
        let backend_delete = match backend_rows.as_slice() {
            [] => Ok(None),
            [row] => self.client.delete_result(*row).await.map(Some),
            rows => self.client.delete_results(rows).await.map(Some),
        };
        if let Err(e) = backend_delete {
            state.store.restore(removed);
            return Err(format!("delete failed, results restored: {e}"));
        }

        self.persist(&state).await;
        info!(deleted = removed.len(), "results deleted");
        Ok(Json(OkResponse { ok: true }))
    }

    #[tool(description = "Clear the whole result list, locally and in the backend. Rolled back if the backend delete fails.")]
    async fn clear_results(&self) -> Result<Json<OkResponse>, String> {
        let mut state = self.state.write().await;
        if state.store.is_empty() {
            return Ok(Json(OkResponse { ok: true }));
        }
        let snapshot = state.store.clear();

        if let Err(e) = self.client.delete_all_results().await {
            state.store.set_replaced(snapshot);
            return Err(format!("clear failed, results restored: {e}"));
        }

        // Cached raw responses go with the results; the registry is
        // re-persisted right after.
        self.cache.invalidate_all().await;
        self.persist(&state).await;
        Ok(Json(OkResponse { ok: true }))
    }

    #[tool(description = "Fetch analyses persisted in the backend, reconcile them against the current criteria and merge them into the result list.")]
    async fn load_stored_results(&self) -> Result<Json<ResultsResponse>, String> {
        let listing = self
            .client
            .list_results()
            .await
            .map_err(|e| format!("loading stored results failed: {e}"))?;
        if !listing.success {
            return Err("backend reported success=false".to_string());
        }

        let mut state = self.state.write().await;
        for stored in &listing.results {
            let batch = self.analysis.reconcile_stored(stored, &state.registry);
            state.store.set_merged(batch);
        }
        self.persist(&state).await;

        info!(rows = listing.results.len(), "stored results loaded");
        Ok(Json(ResultsResponse {
            results: state.store.results().to_vec(),
        }))
    }

    #[tool(description = "Fetch the most recent prompt the backend sent to the LLM.")]
    async fn latest_prompt(&self) -> Result<Json<TextResponse>, String> {
        let resp = self
            .client
            .latest_prompt()
            .await
            .map_err(|e| format!("latest_prompt failed: {e}"))?;
        Ok(Json(TextResponse { text: resp.prompt }))
    }

    #[tool(description = "Fetch the most recent processed LLM response held by the backend.")]
    async fn latest_response(&self) -> Result<Json<TextResponse>, String> {
        let resp = self
            .client
            .latest_response()
            .await
            .map_err(|e| format!("latest_response failed: {e}"))?;
        Ok(Json(TextResponse { text: resp.response }))
    }

    #[tool(description = "Fetch the most recent raw LLM response. Falls back to the local cache when the backend has none.")]
    async fn latest_raw_response(&self) -> Result<Json<TextResponse>, String> {
        match self.client.latest_raw_response().await {
            Ok(resp) if resp.raw_response.is_some() => Ok(Json(TextResponse {
                text: resp.raw_response,
            })),
            Ok(_) => Ok(Json(TextResponse { text: None })),
            Err(e) => {
                warn!(error = %e, "backend latest-raw-response failed, trying local cache");
                let name = {
                    let state = self.state.read().await;
                    state.last_analysis_name.clone()
                };
                let cached = match name {
                    Some(name) => self.cache.get_raw_response(&name).await,
                    None => None,
                };
                match cached {
                    Some(raw) => Ok(Json(TextResponse { text: Some(raw) })),
                    None => Err(format!("latest_raw_response failed: {e}")),
                }
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for GeneralAnalysisServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "general-analysis".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "AVALIA general-analysis server. Manage evaluation criteria with \
                 list_criteria/add_criterion/edit_criterion/set_criterion_active/delete_criterion, \
                 run analyses with analyze_all or analyze_selected, and inspect the merged \
                 result list with list_results. Deletion is explicit via delete_results or \
                 clear_results; load_stored_results pulls previously persisted analyses back in."
                    .to_string(),
            ),
        }
    }
}
