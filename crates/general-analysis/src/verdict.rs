/// Verdict extraction from semi-structured LLM prose.
///
/// The prompt instructs the model to emit a bold `**Status:** <value>` field
/// and a confidence figure, but answers drift. Extraction is therefore
/// layered:
/// - a structured tier that reads the `**Status:**` marker when present,
/// - a keyword tier that scans the full text only when no marker exists.
///
/// Extraction never fails: absence of any signal yields the documented
/// permissive default, `compliant` at 0.8 confidence.
use regex::Regex;

use crate::model::{ComplianceStatus, EvidenceBlock, Verdict};

const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Seam for verdict extraction. The production implementation parses prose;
/// a structured-output LLM mode can provide its own implementation without
/// touching any calling code.
pub trait ExtractVerdict {
    fn extract(&self, assessment: &str) -> Verdict;
}

/// Production extractor: `**Status:**` marker first, keyword scan second.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerExtractor;

impl ExtractVerdict for MarkerExtractor {
    fn extract(&self, assessment: &str) -> Verdict {
        Verdict {
            status: extract_status(assessment),
            confidence: extract_confidence(assessment),
        }
    }
}

/// Pull a confidence value out of the text.
///
/// Accepts `confiança`/`confianca`/`confidence` followed by a number within
/// the next few characters. A value ≤ 1.0 is read as a fraction, anything
/// larger as a percentage. Clamped to [0, 1]; defaults to 0.8.
pub fn extract_confidence(text: &str) -> f64 {
    let re = Regex::new(r"(?i)confian[çc]a|confidence").expect("valid regex");
    let number_re = Regex::new(r"\d+(?:[.,]\d+)?").expect("valid regex");

    let Some(m) = re.find(text) else {
        return DEFAULT_CONFIDENCE;
    };

    // Only look at a short window after the keyword so an unrelated number
    // further down the prose is not picked up.
    let mut window_end = (m.end() + 40).min(text.len());
    while !text.is_char_boundary(window_end) {
        window_end -= 1;
    }
    let window = &text[m.end()..window_end];
    let Some(num) = number_re.find(window) else {
        return DEFAULT_CONFIDENCE;
    };

    let Ok(value) = num.as_str().replace(',', ".").parse::<f64>() else {
        return DEFAULT_CONFIDENCE;
    };

    let fraction = if value <= 1.0 { value } else { value / 100.0 };
    fraction.clamp(0.0, 1.0)
}

/// Determine the compliance status of one answer.
pub fn extract_status(text: &str) -> ComplianceStatus {
    match status_marker(text) {
        // Marker present but unrecognized falls to the permissive default,
        // not to the keyword tier.
        Some(marker) => status_from_marker(&marker).unwrap_or(ComplianceStatus::Compliant),
        None => status_from_keywords(text),
    }
}

/// Find the `**Status:** <text>` marker and return its value, lowercased
/// and trimmed.
fn status_marker(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)\*\*status:\*\*\s*([^\n*]+)").expect("valid regex");
    let caps = re.captures(text)?;
    Some(caps[1].trim().to_lowercase())
}

/// Structured tier. Exact-or-prefix first, then substring containment,
/// always checking non-compliant before compliant so that "conforme"
/// inside "não conforme" cannot misfire.
fn status_from_marker(marker: &str) -> Option<ComplianceStatus> {
    if marker.starts_with("não conforme") || marker.starts_with("nao conforme") {
        return Some(ComplianceStatus::NonCompliant);
    }
    if marker.starts_with("parcialmente conforme") {
        return Some(ComplianceStatus::PartiallyCompliant);
    }
    if marker.starts_with("conforme") {
        return Some(ComplianceStatus::Compliant);
    }

    if marker.contains("não conforme") || marker.contains("nao conforme") {
        return Some(ComplianceStatus::NonCompliant);
    }
    if marker.contains("parcialmente conforme") {
        return Some(ComplianceStatus::PartiallyCompliant);
    }
    if marker.contains("conforme") {
        return Some(ComplianceStatus::Compliant);
    }
    None
}

const NEGATIVE_KEYWORDS: &[&str] = &[
    "não atende",
    "nao atende",
    "não cumpre",
    "nao cumpre",
    "viol",
    "defeito",
    "problema",
];

const PARTIAL_KEYWORDS: &[&str] = &[
    "parcialmente",
    "atende parcialmente",
    "precisa melhorar",
    "recomenda",
];

/// Keyword tier, used only when no structured marker is present.
fn status_from_keywords(text: &str) -> ComplianceStatus {
    let lowered = text.to_lowercase();
    if NEGATIVE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return ComplianceStatus::NonCompliant;
    }
    if PARTIAL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return ComplianceStatus::PartiallyCompliant;
    }
    ComplianceStatus::Compliant
}

/// Collect fenced code blocks as evidence, in order of appearance.
///
/// The fence info string becomes the language ("text" when absent). A
/// `**Arquivo:**`/`**File:**` marker or a `Linha(s)`/`Line(s)` reference in
/// the prose immediately before a fence is attached to that block.
pub fn extract_evidence(assessment: &str) -> Vec<EvidenceBlock> {
    let file_re = Regex::new(r"(?i)\*{0,2}(?:arquivo|file)\*{0,2}\s*:\s*`?([^\s`*]+)`?")
        .expect("valid regex");
    let lines_re =
        Regex::new(r"(?i)(?:linhas?|lines?)\s*:?\s*(\d+(?:\s*[-–]\s*\d+)?)").expect("valid regex");

    let mut evidence = Vec::new();
    let mut in_block = false;
    let mut language = String::new();
    let mut code_lines: Vec<&str> = Vec::new();
    let mut pending_path: Option<String> = None;
    let mut pending_lines: Option<String> = None;

    for line in assessment.lines() {
        let trimmed = line.trim();
        if let Some(info) = trimmed.strip_prefix("```") {
            if in_block {
                evidence.push(EvidenceBlock {
                    code: code_lines.join("\n"),
                    language: std::mem::take(&mut language),
                    file_path: pending_path.take().unwrap_or_default(),
                    line_numbers: pending_lines.take(),
                });
                code_lines.clear();
                in_block = false;
            } else {
                let info = info.trim();
                language = if info.is_empty() {
                    "text".to_string()
                } else {
                    info.to_string()
                };
                in_block = true;
            }
            continue;
        }

        if in_block {
            code_lines.push(line);
            continue;
        }

        if let Some(caps) = file_re.captures(trimmed) {
            pending_path = Some(caps[1].to_string());
        }
        if let Some(caps) = lines_re.captures(trimmed) {
            pending_lines = Some(caps[1].split_whitespace().collect::<String>());
        }
    }

    evidence
}

/// Collect bullet items from a "Recomendações"/"Recommendations" section.
///
/// Collection starts at a heading containing "recomenda"/"recommend" and
/// stops at the next heading. Bullets may use `-`, `*` or `1.` markers.
pub fn extract_recommendations(assessment: &str) -> Vec<String> {
    let bullet_re = Regex::new(r"^(?:[-*]|\d+[.)])\s+(.+)$").expect("valid regex");

    let mut recommendations = Vec::new();
    let mut collecting = false;

    for line in assessment.lines() {
        let trimmed = line.trim();
        let is_heading = trimmed.starts_with('#')
            || (trimmed.starts_with("**") && trimmed.ends_with("**") && trimmed.len() > 4);

        if is_heading {
            let lowered = trimmed.to_lowercase();
            collecting = lowered.contains("recomenda") || lowered.contains("recommend");
            continue;
        }

        if collecting {
            if let Some(caps) = bullet_re.captures(trimmed) {
                recommendations.push(caps[1].trim().to_string());
            }
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Verdict {
        MarkerExtractor.extract(text)
    }

    #[test]
    fn confidence_percentage_is_normalized() {
        assert_eq!(extract_confidence("confidence: 95"), 0.95);
        assert_eq!(extract_confidence("Confiança: 85%"), 0.85);
    }

    #[test]
    fn confidence_fraction_is_kept() {
        assert_eq!(extract_confidence("confidence: 0.95"), 0.95);
        assert_eq!(extract_confidence("confiança de 0,75"), 0.75);
    }

    #[test]
    fn confidence_defaults_without_signal() {
        assert_eq!(extract_confidence("nenhum número aqui"), 0.8);
        assert_eq!(extract_confidence(""), 0.8);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(extract_confidence("confidence: 250"), 1.0);
    }

    #[test]
    fn confidence_ignores_distant_numbers() {
        let text = format!("confidence mentioned here.{} 95", " filler".repeat(20));
        assert_eq!(extract_confidence(&text), 0.8);
    }

    #[test]
    fn marker_non_compliant_wins_regardless_of_prose() {
        let text = "O código está bem escrito em geral.\n\
                    **Status:** Não Conforme\n\
                    Apesar de conforme em alguns pontos.";
        assert_eq!(extract_status(text), ComplianceStatus::NonCompliant);
    }

    #[test]
    fn marker_ascii_variant_is_recognized() {
        assert_eq!(
            extract_status("**Status:** Nao Conforme"),
            ComplianceStatus::NonCompliant
        );
    }

    #[test]
    fn marker_takes_precedence_over_keyword_scan() {
        // "não" appears in the prose, but the structured marker says
        // compliant and must win.
        let text = "A função não possui documentação extensa.\n\
                    **Status:** Conforme\n\
                    Confiança: 90%";
        let verdict = extract(text);
        assert_eq!(verdict.status, ComplianceStatus::Compliant);
        assert_eq!(verdict.confidence, 0.9);
    }

    #[test]
    fn marker_partial_with_trailing_prose() {
        assert_eq!(
            extract_status("**Status:** Parcialmente Conforme com ressalvas"),
            ComplianceStatus::PartiallyCompliant
        );
    }

    #[test]
    fn marker_containment_checks_non_compliant_first() {
        // The value embeds "não conforme"; a naive "conforme" substring
        // check would misread it.
        assert_eq!(
            extract_status("**Status:** o código é não conforme"),
            ComplianceStatus::NonCompliant
        );
    }

    #[test]
    fn unrecognized_marker_defaults_to_compliant() {
        assert_eq!(
            extract_status("**Status:** indeterminado"),
            ComplianceStatus::Compliant
        );
    }

    #[test]
    fn keyword_tier_detects_violations() {
        assert_eq!(
            extract_status("O código viola a convenção de nomes."),
            ComplianceStatus::NonCompliant
        );
        assert_eq!(
            extract_status("Há um problema na função principal."),
            ComplianceStatus::NonCompliant
        );
    }

    #[test]
    fn keyword_tier_detects_partial() {
        assert_eq!(
            extract_status("Atende parcialmente aos requisitos."),
            ComplianceStatus::PartiallyCompliant
        );
        assert_eq!(
            extract_status("Recomenda-se adicionar testes."),
            ComplianceStatus::PartiallyCompliant
        );
    }

    #[test]
    fn no_signal_defaults_to_compliant() {
        let verdict = extract("O código segue as convenções do projeto.");
        assert_eq!(verdict.status, ComplianceStatus::Compliant);
        assert_eq!(verdict.confidence, 0.8);
    }

    #[test]
    fn evidence_blocks_keep_language_and_order() {
        let text = "Arquivo: src/main.py\nLinhas 10-14\n\
                    ```python\ndef f():\n    pass\n```\n\
                    E também:\n```\nplain text\n```";
        let evidence = extract_evidence(text);
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].language, "python");
        assert_eq!(evidence[0].file_path, "src/main.py");
        assert_eq!(evidence[0].line_numbers.as_deref(), Some("10-14"));
        assert_eq!(evidence[0].code, "def f():\n    pass");
        assert_eq!(evidence[1].language, "text");
        assert_eq!(evidence[1].file_path, "");
        assert!(evidence[1].line_numbers.is_none());
    }

    #[test]
    fn file_marker_binds_to_the_next_fence_only() {
        let text = "**Arquivo:** lib/util.rs\n```rust\nlet x = 1;\n```\n\
                    ```rust\nlet y = 2;\n```";
        let evidence = extract_evidence(text);
        assert_eq!(evidence[0].file_path, "lib/util.rs");
        assert_eq!(evidence[1].file_path, "");
    }

    #[test]
    fn recommendations_come_from_their_section() {
        let text = "## Avaliação\n- isto não é uma recomendação\n\
                    ## Recomendações\n- Adicionar docstrings\n* Renomear variáveis\n\
                    1. Extrair função auxiliar\n\
                    ## Conclusão\n- nem isto";
        let recommendations = extract_recommendations(text);
        assert_eq!(
            recommendations,
            vec![
                "Adicionar docstrings",
                "Renomear variáveis",
                "Extrair função auxiliar"
            ]
        );
    }

    #[test]
    fn no_recommendation_section_yields_empty_list() {
        assert!(extract_recommendations("sem seções\n- solto").is_empty());
    }
}
