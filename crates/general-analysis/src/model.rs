use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A user-authored evaluation rule applied to submitted source code.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Criterion {
    /// Stable numeric id, assigned at creation, never reused in a session.
    pub id: i64,
    /// Canonical description. May carry a short-name prefix before a colon,
    /// e.g. "Naming: use descriptive names".
    pub text: String,
    /// Whether the criterion participates in "analyze all".
    pub active: bool,
    /// Display/sort key. Not guaranteed unique; ties break by insertion order.
    pub order: i64,
}

/// Compliance verdict for one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::PartiallyCompliant => "partially_compliant",
            ComplianceStatus::NonCompliant => "non_compliant",
        }
    }
}

/// Status plus confidence, extracted from one LLM answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    pub status: ComplianceStatus,
    /// Always in [0, 1].
    pub confidence: f64,
}

/// A code excerpt cited by the LLM as evidence for its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceBlock {
    pub code: String,
    pub language: String,
    pub file_path: String,
    pub line_numbers: Option<String>,
}

/// The reconciled, structured outcome of evaluating one criterion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    /// Prefers the originating criterion's id; falls back to a synthesized
    /// timestamp-based value when no criterion is resolvable.
    pub id: i64,
    /// Denormalized criterion text at analysis time (never just a short key).
    pub criterion: String,
    /// Raw LLM prose, kept verbatim for display and re-parsing.
    pub assessment: String,
    pub status: ComplianceStatus,
    pub confidence: f64,
    pub evidence: Vec<EvidenceBlock>,
    pub recommendations: Vec<String>,
    /// Numeric id of the originating criterion; primary join key for merges.
    pub criteria_id: Option<i64>,
    /// Request-time correlation key (`criteria_<id>`) sent to the backend.
    pub criterion_key: Option<String>,
    /// Id of the persisted backend row this result was saved under; absent
    /// for results that only exist in the current session.
    pub result_id: Option<i64>,
}
