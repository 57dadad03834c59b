/// Batch-scoped merging of analysis results.
///
/// Every trigger path (analyze all, analyze selected, re-analysis) funnels
/// through `merge_results`, a pure reducer: no side effects, same inputs →
/// same output. Results untouched by the current batch are retained, so
/// analyzing a subset of criteria never wipes unrelated prior results.
/// Deletion is a separate explicit operation and never happens here.
use crate::matcher::texts_match;
use crate::model::AnalysisResult;

/// Fold `incoming` into `previous`.
///
/// Existing entries hit by the batch are replaced in place, keeping their
/// `id` and `result_id` so the row identity survives re-analysis. Entries
/// the batch did not touch pass through unchanged. Incoming results that
/// matched nothing are appended. Idempotent: applying the same batch twice
/// yields the same list as applying it once.
pub fn merge_results(
    previous: &[AnalysisResult],
    incoming: Vec<AnalysisResult>,
) -> Vec<AnalysisResult> {
    let mut consumed = vec![false; incoming.len()];
    let mut merged = Vec::with_capacity(previous.len() + incoming.len());

    for existing in previous {
        let hit = incoming
            .iter()
            .enumerate()
            .find(|(idx, candidate)| !consumed[*idx] && answers_same_criterion(existing, candidate))
            .map(|(idx, _)| idx);

        match hit {
            Some(idx) => {
                consumed[idx] = true;
                merged.push(apply_update(existing, &incoming[idx]));
            }
            None => merged.push(existing.clone()),
        }
    }

    for (idx, fresh) in incoming.into_iter().enumerate() {
        if !consumed[idx] {
            merged.push(fresh);
        }
    }

    merged
}

/// Identity check between an existing result and an incoming one.
///
/// `criteria_id` equality is the primary join; the normalized-text fallback
/// only applies when one side predates criterion ids (legacy/ad-hoc rows).
fn answers_same_criterion(existing: &AnalysisResult, incoming: &AnalysisResult) -> bool {
    match (existing.criteria_id, incoming.criteria_id) {
        (Some(a), Some(b)) => a == b,
        _ => texts_match(&existing.criterion, &incoming.criterion),
    }
}

/// Replace the mutable fields of `existing` with the fresh analysis while
/// preserving row identity (`id`, `result_id` stays unless the batch was
/// persisted under a new backend row).
fn apply_update(existing: &AnalysisResult, incoming: &AnalysisResult) -> AnalysisResult {
    AnalysisResult {
        id: existing.id,
        criterion: incoming.criterion.clone(),
        assessment: incoming.assessment.clone(),
        status: incoming.status,
        confidence: incoming.confidence,
        evidence: incoming.evidence.clone(),
        recommendations: incoming.recommendations.clone(),
        criteria_id: existing.criteria_id.or(incoming.criteria_id),
        criterion_key: incoming.criterion_key.clone(),
        result_id: incoming.result_id.or(existing.result_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComplianceStatus;

    fn result(id: i64, criteria_id: Option<i64>, criterion: &str, assessment: &str) -> AnalysisResult {
        AnalysisResult {
            id,
            criterion: criterion.to_string(),
            assessment: assessment.to_string(),
            status: ComplianceStatus::Compliant,
            confidence: 0.8,
            evidence: vec![],
            recommendations: vec![],
            criteria_id,
            criterion_key: criteria_id.map(|c| format!("criteria_{c}")),
            result_id: None,
        }
    }

    #[test]
    fn subset_batch_preserves_untouched_results() {
        let previous = vec![
            result(1, Some(1), "A", "old a"),
            result(2, Some(2), "B", "old b"),
            result(3, Some(3), "C", "old c"),
        ];
        let batch = vec![result(2, Some(2), "B", "new b")];

        let merged = merge_results(&previous, batch);
        assert_eq!(merged.len(), 3, "merge must never shrink untouched results");
        assert_eq!(merged[0].assessment, "old a");
        assert_eq!(merged[1].assessment, "new b");
        assert_eq!(merged[2].assessment, "old c");
    }

    #[test]
    fn merge_is_idempotent() {
        let previous = vec![
            result(1, Some(1), "A", "old a"),
            result(2, Some(2), "B", "old b"),
        ];
        let batch = vec![
            result(2, Some(2), "B", "new b"),
            result(7, Some(7), "G", "new g"),
        ];

        let once = merge_results(&previous, batch.clone());
        let twice = merge_results(&once, batch);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.assessment, b.assessment);
            assert_eq!(a.criterion, b.criterion);
        }
    }

    #[test]
    fn replacement_preserves_row_identity() {
        let mut old = result(42, Some(5), "Naming: use descriptive names", "old");
        old.result_id = Some(900);
        let mut fresh = result(5, Some(5), "Naming: use descriptive names", "fresh");
        fresh.status = ComplianceStatus::NonCompliant;
        fresh.confidence = 0.6;

        let merged = merge_results(&[old], vec![fresh]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, 42, "original id must survive re-analysis");
        assert_eq!(merged[0].result_id, Some(900));
        assert_eq!(merged[0].assessment, "fresh");
        assert_eq!(merged[0].status, ComplianceStatus::NonCompliant);
        assert_eq!(merged[0].confidence, 0.6);
    }

    #[test]
    fn legacy_result_matches_by_short_name() {
        // Existing result predates criterion ids; the new result for the
        // "Naming" criterion must update it, not duplicate it.
        let legacy = result(99, None, "Naming: use descriptive names", "legacy");
        let fresh = result(5, Some(5), "Naming", "fresh");

        let merged = merge_results(&[legacy], vec![fresh]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, 99);
        assert_eq!(merged[0].assessment, "fresh");
        assert_eq!(
            merged[0].criteria_id,
            Some(5),
            "legacy row adopts the resolved criterion id"
        );
    }

    #[test]
    fn unmatched_incoming_results_are_appended() {
        let previous = vec![result(1, Some(1), "A", "old a")];
        let batch = vec![result(9, Some(9), "Brand new criterion", "new")];

        let merged = merge_results(&previous, batch);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].criterion, "Brand new criterion");
    }

    #[test]
    fn similar_text_does_not_insert_duplicate() {
        let previous = vec![result(99, None, "Docs: write docstrings", "old")];
        let batch = vec![result(3, Some(3), "Docs", "updated")];

        let merged = merge_results(&previous, batch);
        assert_eq!(merged.len(), 1, "near-identical text must update, not append");
        assert_eq!(merged[0].assessment, "updated");
    }

    #[test]
    fn empty_batch_changes_nothing() {
        let previous = vec![result(1, Some(1), "A", "old a")];
        let merged = merge_results(&previous, vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].assessment, "old a");
    }
}
