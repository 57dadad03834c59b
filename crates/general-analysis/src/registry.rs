/// Criterion registry: the source of truth for criterion text, activation
/// and display order.
///
/// Ids are allocated from a monotonic counter and never reused within a
/// session, so deleting a criterion cannot make an old result point at a
/// different criterion later. Deleting a criterion does not cascade to
/// results; results carry a denormalized copy of the text.
use serde::{Deserialize, Serialize};

use crate::model::Criterion;

const PLACEHOLDER_TEXT: &str = "Novo critério";

pub struct CriterionRegistry {
    criteria: Vec<Criterion>,
    next_id: i64,
}

/// Serializable snapshot used for Redis persistence across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub criteria: Vec<Criterion>,
    pub next_id: i64,
}

impl CriterionRegistry {
    pub fn new() -> Self {
        Self {
            criteria: Vec::new(),
            next_id: 1,
        }
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        // Guard the watermark against snapshots written by older builds.
        let max_id = snapshot.criteria.iter().map(|c| c.id).max().unwrap_or(0);
        Self {
            next_id: snapshot.next_id.max(max_id + 1),
            criteria: snapshot.criteria,
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            criteria: self.criteria.clone(),
            next_id: self.next_id,
        }
    }

    /// Create a criterion. `None` text gets the placeholder. The new
    /// criterion is active and sorts after everything currently present.
    pub fn add(&mut self, text: Option<String>) -> Criterion {
        let id = self.next_id;
        self.next_id += 1;

        let order = self.criteria.iter().map(|c| c.order).max().unwrap_or(0) + 1;
        let criterion = Criterion {
            id,
            text: text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER_TEXT.to_string()),
            active: true,
            order,
        };
        self.criteria.push(criterion.clone());
        criterion
    }

    pub fn get(&self, id: i64) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    /// Replace the text of an existing criterion. Returns `false` when the
    /// id is unknown.
    pub fn edit_text(&mut self, id: i64, text: String) -> bool {
        match self.criteria.iter_mut().find(|c| c.id == id) {
            Some(criterion) => {
                criterion.text = text;
                true
            }
            None => false,
        }
    }

    pub fn set_active(&mut self, id: i64, active: bool) -> bool {
        match self.criteria.iter_mut().find(|c| c.id == id) {
            Some(criterion) => {
                criterion.active = active;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: i64) -> Option<Criterion> {
        let idx = self.criteria.iter().position(|c| c.id == id)?;
        Some(self.criteria.remove(idx))
    }

    /// Criteria in display order: by `order`, ties broken by insertion
    /// position (the sort is stable).
    pub fn ordered(&self) -> Vec<Criterion> {
        let mut out = self.criteria.clone();
        out.sort_by_key(|c| c.order);
        out
    }

    /// Ids of active criteria in display order, for "analyze all".
    pub fn active_ids(&self) -> Vec<i64> {
        self.ordered()
            .into_iter()
            .filter(|c| c.active)
            .map(|c| c.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

impl Default for CriterionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assigns_stable_monotonic_ids() {
        let mut registry = CriterionRegistry::new();
        let a = registry.add(Some("Naming: use descriptive names".to_string()));
        let b = registry.add(None);
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(b.text, "Novo critério");
        assert!(b.active);

        registry.remove(b.id);
        let c = registry.add(Some("Docs".to_string()));
        assert_eq!(c.id, 3, "ids must not be reused after deletion");
    }

    #[test]
    fn blank_text_falls_back_to_placeholder() {
        let mut registry = CriterionRegistry::new();
        let c = registry.add(Some("   ".to_string()));
        assert_eq!(c.text, "Novo critério");
    }

    #[test]
    fn ordered_breaks_ties_by_insertion_position() {
        let mut registry = CriterionRegistry::new();
        registry.add(Some("first".to_string()));
        registry.add(Some("second".to_string()));
        // Force an order collision.
        let mut snapshot = registry.snapshot();
        snapshot.criteria[1].order = snapshot.criteria[0].order;
        let registry = CriterionRegistry::from_snapshot(snapshot);

        let ordered = registry.ordered();
        assert_eq!(ordered[0].text, "first");
        assert_eq!(ordered[1].text, "second");
    }

    #[test]
    fn active_ids_skips_deactivated() {
        let mut registry = CriterionRegistry::new();
        let a = registry.add(Some("a".to_string()));
        let b = registry.add(Some("b".to_string()));
        let c = registry.add(Some("c".to_string()));
        registry.set_active(b.id, false);
        assert_eq!(registry.active_ids(), vec![a.id, c.id]);
    }

    #[test]
    fn snapshot_roundtrip_repairs_watermark() {
        let mut registry = CriterionRegistry::new();
        registry.add(Some("a".to_string()));
        registry.add(Some("b".to_string()));

        let mut snapshot = registry.snapshot();
        snapshot.next_id = 1; // corrupt watermark
        let mut restored = CriterionRegistry::from_snapshot(snapshot);
        let fresh = restored.add(None);
        assert_eq!(fresh.id, 3, "restored watermark must clear existing ids");
    }
}
