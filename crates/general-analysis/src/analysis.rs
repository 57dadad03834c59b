/// Analysis orchestration: build the backend request, run it, reconcile the
/// response into `AnalysisResult`s.
///
/// Reconciliation is a pure function over the response, the submitted id
/// list and the registry, so every trigger path (analyze all, analyze
/// selected, re-analysis, loading persisted rows) produces results the same
/// way.
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use avalia_common::api::{
    AnalyzeSelectedRequest, AnalyzeSelectedResponse, CriteriaResultEntry, StoredAnalysis,
    TokenUsage,
};
use avalia_common::backend::BackendClient;

use crate::error::AppError;
use crate::matcher::{key_position, match_criterion, resolve_criterion};
use crate::model::AnalysisResult;
use crate::registry::CriterionRegistry;
use crate::verdict::{ExtractVerdict, MarkerExtractor, extract_evidence, extract_recommendations};

/// Caller-tunable parts of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub analysis_name: Option<String>,
    pub file_paths: Option<Vec<String>>,
    pub code_entry_id: Option<i64>,
    /// Delete all persisted backend rows before analyzing. A failure here is
    /// non-fatal: it is logged and the analysis proceeds.
    pub purge_prior: bool,
}

/// What one run produced, beyond the reconciled batch itself.
pub struct AnalysisOutcome {
    pub batch: Vec<AnalysisResult>,
    pub analysis_name: String,
    pub model_used: Option<String>,
    pub usage: Option<TokenUsage>,
    pub db_result_id: Option<i64>,
    pub raw_response: Option<String>,
}

pub struct AnalysisService {
    client: Arc<BackendClient>,
    extractor: Arc<dyn ExtractVerdict + Send + Sync>,
    default_temperature: f32,
    default_max_tokens: u32,
    default_analysis_name: String,
}

impl AnalysisService {
    pub fn new(
        client: Arc<BackendClient>,
        default_temperature: f32,
        default_max_tokens: u32,
        default_analysis_name: String,
    ) -> Self {
        Self {
            client,
            extractor: Arc::new(MarkerExtractor),
            default_temperature,
            default_max_tokens,
            default_analysis_name,
        }
    }

    /// Analyze the given criteria. Nothing is committed on failure: the
    /// caller only sees a batch when the backend call succeeded.
    pub async fn run(
        &self,
        criterion_ids: &[i64],
        registry: &CriterionRegistry,
        options: AnalysisOptions,
    ) -> Result<AnalysisOutcome, AppError> {
        if let Some(unknown) = criterion_ids.iter().find(|id| registry.get(**id).is_none()) {
            return Err(AppError::UnknownCriterion(*unknown));
        }

        if options.purge_prior {
            if let Err(e) = self.client.delete_all_results().await {
                warn!(error = %e, "pre-analysis purge of stored results failed, proceeding anyway");
            }
        }

        let analysis_name = options
            .analysis_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.default_analysis_name.clone());

        let request = AnalyzeSelectedRequest {
            criteria_ids: criterion_ids
                .iter()
                .map(|id| format!("criteria_{id}"))
                .collect(),
            file_paths: options.file_paths,
            analysis_name: analysis_name.clone(),
            temperature: self.default_temperature,
            max_tokens: self.default_max_tokens,
            use_code_entry: options.code_entry_id.map(|_| true),
            code_entry_id: options.code_entry_id,
        };

        let response = self.client.analyze_selected(&request, None).await?;
        if !response.success {
            return Err(AppError::AnalysisRejected(
                "backend reported success=false".to_string(),
            ));
        }

        let batch = reconcile_response(
            &response,
            criterion_ids,
            registry,
            self.extractor.as_ref(),
            now_millis(),
        );

        if let Some(usage) = &response.usage {
            info!(
                analysis_name = %analysis_name,
                criteria = batch.len(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                total_tokens = usage.total_tokens,
                "analysis complete"
            );
        } else {
            info!(analysis_name = %analysis_name, criteria = batch.len(), "analysis complete");
        }

        Ok(AnalysisOutcome {
            batch,
            analysis_name,
            model_used: response.model_used.clone(),
            usage: response.usage.clone(),
            db_result_id: response.db_result_id,
            raw_response: response.raw_response.clone(),
        })
    }

    /// Reconcile a persisted backend row fetched via `GET /results`. The
    /// original id list is gone, so resolution relies on echoed names and
    /// registry text matching.
    pub fn reconcile_stored(
        &self,
        stored: &StoredAnalysis,
        registry: &CriterionRegistry,
    ) -> Vec<AnalysisResult> {
        let entries = ordered_entries(&stored.criteria_results);
        let now = now_millis();

        entries
            .into_iter()
            .enumerate()
            .map(|(offset, (key, entry))| {
                let resolved = resolve_criterion(key, entry.name.as_deref(), &[], registry);
                let criteria_id = resolved
                    .criteria_id
                    .or_else(|| match_criterion(&resolved.text, registry));
                build_result(
                    entry,
                    criteria_id,
                    resolved.text,
                    self.extractor.as_ref(),
                    criteria_id.map(|id| format!("criteria_{id}")),
                    Some(stored.id),
                    now + offset as i64,
                )
            })
            .collect()
    }
}

/// Turn one backend response into a reconciled batch.
///
/// Entries are processed in key-position order so synthesized ids are
/// deterministic for a given response.
pub fn reconcile_response(
    response: &AnalyzeSelectedResponse,
    requested_ids: &[i64],
    registry: &CriterionRegistry,
    extractor: &dyn ExtractVerdict,
    now_ms: i64,
) -> Vec<AnalysisResult> {
    let entries = ordered_entries(&response.criteria_results);

    entries
        .into_iter()
        .enumerate()
        .map(|(offset, (key, entry))| {
            let resolved = resolve_criterion(key, entry.name.as_deref(), requested_ids, registry);

            // Correlate back to the request-time key, not the positional
            // key the backend answered under.
            let criterion_key = key_position(key)
                .and_then(|pos| requested_ids.get(pos))
                .map(|id| format!("criteria_{id}"))
                .or_else(|| Some(key.clone()));

            build_result(
                entry,
                resolved.criteria_id,
                resolved.text,
                extractor,
                criterion_key,
                response.db_result_id,
                now_ms + offset as i64,
            )
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    entry: &CriteriaResultEntry,
    criteria_id: Option<i64>,
    criterion_text: String,
    extractor: &dyn ExtractVerdict,
    criterion_key: Option<String>,
    result_id: Option<i64>,
    synthesized_id: i64,
) -> AnalysisResult {
    let verdict = extractor.extract(&entry.content);
    AnalysisResult {
        id: criteria_id.unwrap_or(synthesized_id),
        criterion: criterion_text,
        assessment: entry.content.clone(),
        status: verdict.status,
        confidence: verdict.confidence,
        evidence: extract_evidence(&entry.content),
        recommendations: extract_recommendations(&entry.content),
        criteria_id,
        criterion_key,
        result_id,
    }
}

/// Map entries sorted by key position (entries with no parsable position
/// come last, ordered by key for determinism).
fn ordered_entries(
    map: &std::collections::HashMap<String, CriteriaResultEntry>,
) -> Vec<(&String, &CriteriaResultEntry)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(key, _)| (key_position(key).unwrap_or(usize::MAX), (*key).clone()));
    entries
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
