/// The live result list backing the results table.
///
/// Mutation happens only behind the server's state lock, mirroring the
/// single-writer discipline of the original event-loop design. Deletion is
/// optimistic: items are removed first and restored with `restore` if the
/// backend rejects the delete.
use crate::merge::merge_results;
use crate::model::AnalysisResult;

#[derive(Default)]
pub struct ResultStore {
    results: Vec<AnalysisResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_results(results: Vec<AnalysisResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[AnalysisResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Fold a batch in through the reducer (batch-scoped, never shrinks).
    pub fn set_merged(&mut self, batch: Vec<AnalysisResult>) {
        self.results = merge_results(&self.results, batch);
    }

    /// Replace the whole list, e.g. when restoring persisted state.
    pub fn set_replaced(&mut self, results: Vec<AnalysisResult>) {
        self.results = results;
    }

    /// Remove results by id, returning each removed item with the position
    /// it occupied so a failed backend delete can put it back exactly.
    pub fn remove(&mut self, ids: &[i64]) -> Vec<(usize, AnalysisResult)> {
        let mut removed = Vec::new();
        let mut index = 0;
        let mut kept = Vec::with_capacity(self.results.len());
        for result in self.results.drain(..) {
            if ids.contains(&result.id) {
                removed.push((index, result));
            } else {
                kept.push(result);
            }
            index += 1;
        }
        self.results = kept;
        removed
    }

    /// Undo a `remove`: reinsert items at their original positions.
    pub fn restore(&mut self, removed: Vec<(usize, AnalysisResult)>) {
        for (index, result) in removed {
            let at = index.min(self.results.len());
            self.results.insert(at, result);
        }
    }

    pub fn clear(&mut self) -> Vec<AnalysisResult> {
        std::mem::take(&mut self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComplianceStatus;

    fn result(id: i64, criterion: &str) -> AnalysisResult {
        AnalysisResult {
            id,
            criterion: criterion.to_string(),
            assessment: format!("assessment {id}"),
            status: ComplianceStatus::Compliant,
            confidence: 0.8,
            evidence: vec![],
            recommendations: vec![],
            criteria_id: Some(id),
            criterion_key: Some(format!("criteria_{id}")),
            result_id: None,
        }
    }

    #[test]
    fn remove_then_restore_roundtrips_positions() {
        let mut store =
            ResultStore::from_results(vec![result(1, "a"), result(2, "b"), result(3, "c")]);

        let removed = store.remove(&[2]);
        assert_eq!(store.len(), 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, 1);

        // Backend delete failed: roll back.
        store.restore(removed);
        let ids: Vec<i64> = store.results().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3], "rollback must restore the original order");
    }

    #[test]
    fn remove_of_unknown_id_is_a_noop() {
        let mut store = ResultStore::from_results(vec![result(1, "a")]);
        let removed = store.remove(&[42]);
        assert!(removed.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn merged_batch_goes_through_the_reducer() {
        let mut store = ResultStore::from_results(vec![result(1, "a"), result(2, "b")]);
        let mut updated = result(2, "b");
        updated.assessment = "updated".to_string();

        store.set_merged(vec![updated]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(2).unwrap().assessment, "updated");
        assert_eq!(store.get(1).unwrap().assessment, "assessment 1");
    }

    #[test]
    fn clear_returns_previous_contents() {
        let mut store = ResultStore::from_results(vec![result(1, "a")]);
        let drained = store.clear();
        assert!(store.is_empty());
        assert_eq!(drained.len(), 1);
    }
}
