/// Resolution of LLM response entries back to registry criteria.
///
/// The backend keys each answer with the correlation key it was asked under
/// (`criteria_<n>`) or with a positional key. Numeric resolution through the
/// originally-submitted id list is authoritative; normalized text matching
/// exists only as a fallback for legacy results that carry no criterion id.
use crate::model::Criterion;
use crate::registry::CriterionRegistry;

/// Outcome of resolving one response entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCriterion {
    /// The originating criterion's id, when one could be determined.
    pub criteria_id: Option<i64>,
    /// Final display text: canonical registry text, the backend-echoed name
    /// when the backend rewrote it, or a synthesized label.
    pub text: String,
}

/// Derive a 0-based position from the trailing digits of a response key.
///
/// Keys are 1-based (`criteria_1` answers the first submitted criterion).
pub fn key_position(key: &str) -> Option<usize> {
    let digits: String = key
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let n: usize = digits.parse().ok()?;
    n.checked_sub(1)
}

/// Resolve a response entry to a criterion.
///
/// Primary strategy: key position → submitted id list → registry lookup.
/// The backend-echoed `name`, when present and different from the raw key,
/// overrides the display text (the backend is authoritative for naming once
/// it has rewritten it). When nothing resolves, a `Critério <id-or-key>`
/// label is synthesized; resolution never fails.
pub fn resolve_criterion(
    key: &str,
    echoed_name: Option<&str>,
    requested_ids: &[i64],
    registry: &CriterionRegistry,
) -> ResolvedCriterion {
    let criteria_id = key_position(key)
        .and_then(|pos| requested_ids.get(pos).copied())
        .filter(|id| registry.get(*id).is_some());

    let mut text = criteria_id
        .and_then(|id| registry.get(id))
        .map(|c| c.text.clone());

    if let Some(name) = echoed_name {
        let name = name.trim();
        if !name.is_empty() && name != key {
            text = Some(name.to_string());
        }
    }

    let text = text.unwrap_or_else(|| match criteria_id {
        Some(id) => format!("Critério {id}"),
        None => format!("Critério {key}"),
    });

    ResolvedCriterion { criteria_id, text }
}

/// Match free text against the registry using ordered strategies: exact
/// normalized equality, short-name equality, containment either direction.
/// Returns the first matching criterion id in display order.
pub fn match_criterion(candidate_text: &str, registry: &CriterionRegistry) -> Option<i64> {
    let candidate = normalize(candidate_text);
    if candidate.is_empty() {
        return None;
    }

    let ordered = registry.ordered();

    for criterion in &ordered {
        if normalize(&criterion.text) == candidate {
            return Some(criterion.id);
        }
    }

    for criterion in &ordered {
        if short_names_match(&candidate, criterion) {
            return Some(criterion.id);
        }
    }

    for criterion in &ordered {
        let text = normalize(&criterion.text);
        if text.contains(&candidate) || candidate.contains(&text) {
            return Some(criterion.id);
        }
    }

    None
}

/// Same strategy ladder applied to two free-text labels, used when neither
/// side is in the registry (merging a legacy result against an incoming one).
pub fn texts_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    if short_name(&a) == short_name(&b) {
        return true;
    }
    a.contains(&b) || b.contains(&a)
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// The segment before the first colon, e.g. "naming" in
/// "naming: use descriptive names". Whole text when there is no colon.
fn short_name(normalized: &str) -> &str {
    match normalized.split_once(':') {
        Some((name, _)) => name.trim(),
        None => normalized.trim(),
    }
}

fn short_names_match(candidate: &str, criterion: &Criterion) -> bool {
    let criterion_text = normalize(&criterion.text);
    short_name(candidate) == short_name(&criterion_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(texts: &[&str]) -> CriterionRegistry {
        let mut registry = CriterionRegistry::new();
        for text in texts {
            registry.add(Some(text.to_string()));
        }
        registry
    }

    #[test]
    fn key_position_reads_trailing_digits() {
        assert_eq!(key_position("criteria_1"), Some(0));
        assert_eq!(key_position("criteria_12"), Some(11));
        assert_eq!(key_position("resultado3"), Some(2));
        assert_eq!(key_position("criteria_"), None);
        assert_eq!(key_position("criteria_0"), None);
    }

    #[test]
    fn position_indexes_into_submitted_ids() {
        let registry = registry_with(&["a", "b", "c", "d", "e", "f", "g", "h", "i"]);
        // Criteria 5 and 9 were submitted; the backend answers with
        // positional keys criteria_1 and criteria_2.
        let requested = vec![5, 9];

        let first = resolve_criterion("criteria_1", None, &requested, &registry);
        assert_eq!(first.criteria_id, Some(5));
        assert_eq!(first.text, "e");

        let second = resolve_criterion("criteria_2", None, &requested, &registry);
        assert_eq!(second.criteria_id, Some(9));
        assert_eq!(second.text, "i");
    }

    #[test]
    fn echoed_name_overrides_registry_text() {
        let registry = registry_with(&["Naming: use descriptive names"]);
        let resolved = resolve_criterion("criteria_1", Some("Naming"), &[1], &registry);
        assert_eq!(resolved.criteria_id, Some(1));
        assert_eq!(resolved.text, "Naming");
    }

    #[test]
    fn echoed_name_equal_to_key_is_ignored() {
        let registry = registry_with(&["Docs: document everything"]);
        let resolved = resolve_criterion("criteria_1", Some("criteria_1"), &[1], &registry);
        assert_eq!(resolved.text, "Docs: document everything");
    }

    #[test]
    fn unresolvable_entry_gets_synthesized_label() {
        let registry = registry_with(&["only one"]);
        let resolved = resolve_criterion("criteria_7", None, &[1], &registry);
        assert_eq!(resolved.criteria_id, None);
        assert_eq!(resolved.text, "Critério criteria_7");
    }

    #[test]
    fn deleted_criterion_does_not_resolve() {
        let mut registry = registry_with(&["gone"]);
        registry.remove(1);
        let resolved = resolve_criterion("criteria_1", None, &[1], &registry);
        assert_eq!(resolved.criteria_id, None);
        assert_eq!(resolved.text, "Critério criteria_1");
    }

    #[test]
    fn match_prefers_exact_over_containment() {
        let registry = registry_with(&["Naming rules extended", "Naming rules"]);
        assert_eq!(match_criterion("naming rules", &registry), Some(2));
    }

    #[test]
    fn match_by_short_name_prefix() {
        let registry = registry_with(&["Naming: use descriptive names"]);
        assert_eq!(match_criterion("Naming", &registry), Some(1));
    }

    #[test]
    fn match_by_containment_either_direction() {
        let registry = registry_with(&["use descriptive names"]);
        assert_eq!(match_criterion("descriptive names", &registry), Some(1));
        assert_eq!(
            match_criterion("always use descriptive names everywhere", &registry),
            Some(1)
        );
    }

    #[test]
    fn no_match_returns_none() {
        let registry = registry_with(&["error handling"]);
        assert_eq!(match_criterion("frontend styling", &registry), None);
        assert_eq!(match_criterion("   ", &registry), None);
    }

    #[test]
    fn texts_match_on_short_name_equality() {
        assert!(texts_match("Naming: use descriptive names", "Naming"));
        assert!(texts_match("Docs", "docs: write docstrings"));
        assert!(!texts_match("Naming", "Docs"));
        assert!(!texts_match("", "Docs"));
    }
}
