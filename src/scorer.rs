//! Hybrid risk scorer: model-based assessment plus deterministic rules.
//!
//! The primary path sends one batched completion request for all segments
//! and decodes a JSON array from the response, tolerating surrounding
//! prose and markdown fencing. Elements that fail strict decoding are
//! repaired field by field with defaults. If the batch request or parse
//! fails outright, every segment is scored independently with concurrent
//! single-segment requests; a failed single request yields a deterministic
//! placeholder instead of an error. The scorer never raises past this
//! boundary, so callers only see a `Vec` with one entry per input.
//!
//! After either path, the rule engine runs on each segment's original
//! text: the modifier is added to the model score, the result clamped to
//! `[1, 10]`, the risk level recomputed, and triggered rule labels
//! appended to the reason.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use crate::completion::CompletionService;
use crate::models::{clamp_score, RiskAssessment, RiskLevel};
use crate::rules::RiskRuleEngine;

/// One scoring unit: a segment id and its text.
#[derive(Debug, Clone)]
pub struct SegmentInput {
    pub id: String,
    pub text: String,
}

/// Batch scoring collaborator consumed by the analysis pipeline.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    /// Score a batch of segments, returning one assessment per input.
    async fn score_batch(&self, batch: &[SegmentInput]) -> Result<Vec<RiskAssessment>>;
}

pub struct HybridRiskScorer {
    completion: Arc<dyn CompletionService>,
    rules: RiskRuleEngine,
}

impl HybridRiskScorer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            rules: RiskRuleEngine::new(),
        }
    }
}

#[async_trait]
impl RiskScorer for HybridRiskScorer {
    /// Empty input returns an empty vector without any external calls.
    async fn score_batch(&self, batch: &[SegmentInput]) -> Result<Vec<RiskAssessment>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        match self.score_batch_once(batch).await {
            Ok(assessments) => Ok(assessments),
            Err(e) => {
                warn!("batch scoring failed ({}), falling back to per-segment calls", e);
                let singles = join_all(batch.iter().map(|seg| self.score_single(seg))).await;
                Ok(singles)
            }
        }
    }
}

impl HybridRiskScorer {
    /// The batched primary path. Any failure here (request, array
    /// extraction, JSON parse) triggers the per-segment fallback.
    async fn score_batch_once(&self, batch: &[SegmentInput]) -> Result<Vec<RiskAssessment>> {
        let segments_text = batch
            .iter()
            .map(|seg| format!("ID: {}\nContent: {}", seg.id, seg.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = batch_prompt(&segments_text);
        let response = self
            .completion
            .complete(&prompt)
            .await
            .map_err(|e| anyhow!(e.to_string()))?;

        let array_text = extract_json_array(&response)
            .ok_or_else(|| anyhow!("no JSON array found in batch response"))?;
        let items: Vec<serde_json::Value> = serde_json::from_str(array_text)?;

        let mut assessments = Vec::with_capacity(items.len());
        for item in items {
            let mut assessment = decode_or_repair(&item);

            // Map the assessment back to its input text for rule evaluation;
            // an unrecognized clause_id means rules see empty text.
            let original_text = batch
                .iter()
                .find(|seg| seg.id == assessment.clause_id)
                .map(|seg| seg.text.as_str())
                .unwrap_or("");

            self.apply_rules(&mut assessment, original_text);
            assessments.push(assessment);
        }

        Ok(assessments)
    }

    /// Score one segment; never fails. A request or parse failure yields
    /// a placeholder carrying the error description.
    async fn score_single(&self, seg: &SegmentInput) -> RiskAssessment {
        let prompt = single_prompt(&seg.id, &seg.text);

        let mut assessment = match self.completion.complete(&prompt).await {
            Ok(response) => match parse_single_response(&response, &seg.id) {
                Ok(assessment) => assessment,
                Err(e) => {
                    warn!("could not parse single-segment response for {}: {}", seg.id, e);
                    placeholder(&seg.id, &format!("Analysis error: {}", e))
                }
            },
            Err(e) => {
                warn!("single-segment scoring failed for {}: {}", seg.id, e);
                placeholder(&seg.id, &format!("Analysis error: {}", e))
            }
        };

        self.apply_rules(&mut assessment, &seg.text);
        assessment
    }

    fn apply_rules(&self, assessment: &mut RiskAssessment, text: &str) {
        let (modifier, triggered) = self.rules.evaluate(text);
        assessment.risk_score = clamp_score(assessment.risk_score + modifier);
        assessment.risk_level = RiskLevel::from_score(assessment.risk_score);
        if !triggered.is_empty() {
            assessment
                .reason
                .push_str(&format!(" | Rules triggered: {}", triggered.join(", ")));
        }
    }
}

/// Deterministic placeholder for a segment whose scoring failed.
fn placeholder(clause_id: &str, reason: &str) -> RiskAssessment {
    RiskAssessment {
        clause_id: clause_id.to_string(),
        clause_type: "Unknown".to_string(),
        risk_level: RiskLevel::Medium,
        risk_score: 5,
        reason: reason.to_string(),
        recommendation: "Manual review recommended.".to_string(),
    }
}

/// Strict decode of one array element, repaired field by field on failure.
fn decode_or_repair(item: &serde_json::Value) -> RiskAssessment {
    if let Ok(assessment) = serde_json::from_value::<RiskAssessment>(item.clone()) {
        return RiskAssessment {
            risk_score: clamp_score(assessment.risk_score),
            ..assessment
        };
    }

    let get_str = |key: &str, default: &str| {
        item.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    };

    // Models occasionally quote the score; accept "7" as well as 7.
    let risk_score = clamp_score(
        item.get("risk_score")
            .and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
            })
            .unwrap_or(5),
    );

    RiskAssessment {
        clause_id: get_str("clause_id", "Unknown"),
        clause_type: get_str("clause_type", "Unknown"),
        risk_level: item
            .get("risk_level")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(RiskLevel::Medium),
        risk_score,
        reason: get_str("reason", "N/A"),
        recommendation: get_str("recommendation", "Review manually."),
    }
}

/// First bracket-delimited substring of `text`: from the first `[` through
/// the last `]`. Tolerates markdown fences and surrounding prose.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// First brace-delimited substring, for single-segment responses.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_single_response(response: &str, clause_id: &str) -> Result<RiskAssessment> {
    let object_text = extract_json_object(response)
        .ok_or_else(|| anyhow!("no JSON object found in response for {}", clause_id))?;
    let assessment: RiskAssessment = serde_json::from_str(object_text)?;
    Ok(RiskAssessment {
        risk_score: clamp_score(assessment.risk_score),
        ..assessment
    })
}

fn batch_prompt(segments_text: &str) -> String {
    format!(
        r#"Analyze the following legal document segments and return a VALID JSON ARRAY.

Segments:
{segments_text}

For EACH segment provide:
1. Its purpose/topic in simple language.
2. Risks or critical facts.
3. A risk score from 1-10.

Return ONLY a valid JSON array (no markdown, no explanation) matching this schema:
[
  {{
    "clause_id": "<original_id>",
    "clause_type": "<type>",
    "risk_level": "<Low|Medium|High>",
    "risk_score": <1-10>,
    "reason": "<plain english explanation>",
    "recommendation": "<actionable advice>"
  }}
]"#
    )
}

fn single_prompt(clause_id: &str, clause_text: &str) -> String {
    format!(
        r#"Analyze the following legal document segment.
segment_id: {clause_id}
content: {clause_text}

Task:
1. Identify the main purpose or topic of this section in simple terms.
2. Detect potential risks, critical facts, or definitive statements.
3. Provide a risk score from 1-10 (10 = highest risk).

Return ONLY a valid JSON object (no markdown, no explanation) matching this schema:
{{
  "clause_id": "{clause_id}",
  "clause_type": "<type>",
  "risk_level": "<Low|Medium|High>",
  "risk_score": <1-10>,
  "reason": "<plain english explanation>",
  "recommendation": "<actionable advice>"
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted completion service: pops responses in order, repeating the
    /// last one once the script is exhausted. Counts calls.
    struct MockCompletion {
        script: Mutex<Vec<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl MockCompletion {
        fn new(script: Vec<Result<String, String>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionService for MockCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let entry = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            entry.map_err(CompletionError::Service)
        }
    }

    fn inputs(pairs: &[(&str, &str)]) -> Vec<SegmentInput> {
        pairs
            .iter()
            .map(|(id, text)| SegmentInput {
                id: id.to_string(),
                text: text.to_string(),
            })
            .collect()
    }

    fn assessment_json(clause_id: &str, score: i64) -> String {
        format!(
            r#"{{"clause_id": "{clause_id}", "clause_type": "General", "risk_level": "Medium", "risk_score": {score}, "reason": "ok", "recommendation": "none"}}"#
        )
    }

    #[tokio::test]
    async fn test_empty_input_no_calls() {
        let mock = Arc::new(MockCompletion::new(vec![Ok("[]".to_string())]));
        let scorer = HybridRiskScorer::new(mock.clone());
        let result = scorer.score_batch(&[]).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_path_with_markdown_fencing() {
        let response = format!(
            "Here is the analysis:\n```json\n[{}, {}]\n```",
            assessment_json("1.1", 3),
            assessment_json("1.2", 6)
        );
        let mock = Arc::new(MockCompletion::new(vec![Ok(response)]));
        let scorer = HybridRiskScorer::new(mock.clone());

        let batch = inputs(&[("1.1", "Plain definition text."), ("1.2", "Payment terms.")]);
        let result = scorer.score_batch(&batch).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].clause_id, "1.1");
        assert_eq!(result[0].risk_score, 3);
        assert_eq!(result[0].risk_level, RiskLevel::Low);
        assert_eq!(result[1].risk_score, 6);
        assert_eq!(result[1].risk_level, RiskLevel::Medium);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_rules_augment_batch_result() {
        let response = format!("[{}]", assessment_json("5.2", 4));
        let mock = Arc::new(MockCompletion::new(vec![Ok(response)]));
        let scorer = HybridRiskScorer::new(mock);

        let batch = inputs(&[(
            "5.2",
            "Vendor shall indemnify Customer for unlimited losses arising hereunder.",
        )]);
        let result = scorer.score_batch(&batch).await.unwrap();

        assert_eq!(result.len(), 1);
        // 4 + 7 (unlimited indemnity), clamped inside [1, 10]
        assert_eq!(result[0].risk_score, 10);
        assert_eq!(result[0].risk_level, RiskLevel::High);
        assert!(result[0].reason.contains("Rules triggered: unlimited indemnity"));
    }

    #[tokio::test]
    async fn test_unknown_clause_id_skips_rules() {
        // Model paraphrased the id; original text lookup misses, so the
        // rule engine sees empty text and the score stays as returned.
        let response = format!("[{}]", assessment_json("Clause 5.2", 4));
        let mock = Arc::new(MockCompletion::new(vec![Ok(response)]));
        let scorer = HybridRiskScorer::new(mock);

        let batch = inputs(&[("5.2", "Vendor shall indemnify for unlimited losses.")]);
        let result = scorer.score_batch(&batch).await.unwrap();
        assert_eq!(result[0].risk_score, 4);
        assert!(!result[0].reason.contains("Rules triggered"));
    }

    #[tokio::test]
    async fn test_repair_of_malformed_element() {
        // Missing most fields and a string risk_level the strict decoder
        // rejects; repair fills defaults.
        let response = r#"[{"clause_id": "2.1", "risk_level": "catastrophic"}]"#.to_string();
        let mock = Arc::new(MockCompletion::new(vec![Ok(response)]));
        let scorer = HybridRiskScorer::new(mock);

        let batch = inputs(&[("2.1", "Neutral text.")]);
        let result = scorer.score_batch(&batch).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].clause_type, "Unknown");
        assert_eq!(result[0].risk_score, 5);
        assert_eq!(result[0].risk_level, RiskLevel::Medium);
        assert_eq!(result[0].reason, "N/A");
        assert_eq!(result[0].recommendation, "Review manually.");
    }

    #[tokio::test]
    async fn test_repair_coerces_string_score() {
        let response =
            r#"[{"clause_id": "3.3", "clause_type": "Liability", "risk_score": "7"}]"#.to_string();
        let mock = Arc::new(MockCompletion::new(vec![Ok(response)]));
        let scorer = HybridRiskScorer::new(mock);

        let batch = inputs(&[("3.3", "Neutral text.")]);
        let result = scorer.score_batch(&batch).await.unwrap();

        assert_eq!(result[0].risk_score, 7);
        assert_eq!(result[0].risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_malformed_batch_falls_back_per_segment() {
        let script = vec![
            Ok("I cannot produce JSON today.".to_string()),
            Ok(assessment_json("1.1", 2)),
            Ok(assessment_json("1.2", 9)),
        ];
        let mock = Arc::new(MockCompletion::new(script));
        let scorer = HybridRiskScorer::new(mock.clone());

        let batch = inputs(&[("1.1", "First text."), ("1.2", "Second text.")]);
        let result = scorer.score_batch(&batch).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(mock.calls(), 3); // 1 batch + 2 singles
        let scores: Vec<i64> = result.iter().map(|a| a.risk_score).collect();
        assert!(scores.contains(&2) && scores.contains(&9));
    }

    #[tokio::test]
    async fn test_total_failure_yields_placeholders() {
        let mock = Arc::new(MockCompletion::new(vec![Err("connection refused".to_string())]));
        let scorer = HybridRiskScorer::new(mock.clone());

        let batch = inputs(&[("3.1", "Ordinary clause text without keywords.")]);
        let result = scorer.score_batch(&batch).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].clause_id, "3.1");
        assert_eq!(result[0].clause_type, "Unknown");
        assert_eq!(result[0].risk_level, RiskLevel::Medium);
        assert_eq!(result[0].risk_score, 5);
        assert!(result[0].reason.contains("connection refused"));
        assert_eq!(result[0].recommendation, "Manual review recommended.");
        assert_eq!(mock.calls(), 2); // failed batch + failed single
    }

    #[tokio::test]
    async fn test_fallback_failure_isolated_per_segment() {
        let script = vec![
            Ok("not json".to_string()),          // batch
            Err("timeout".to_string()),          // segment 1
            Ok(assessment_json("b", 7)),         // segment 2
        ];
        let mock = Arc::new(MockCompletion::new(script));
        let scorer = HybridRiskScorer::new(mock);

        let batch = inputs(&[("a", "Alpha text."), ("b", "Beta text.")]);
        let result = scorer.score_batch(&batch).await.unwrap();

        assert_eq!(result.len(), 2);
        let by_id = |id: &str| result.iter().find(|a| a.clause_id == id).unwrap();
        assert_eq!(by_id("a").risk_score, 5);
        assert!(by_id("a").reason.contains("timeout"));
        assert_eq!(by_id("b").risk_score, 7);
    }

    #[test]
    fn test_extract_json_array_spans_brackets() {
        assert_eq!(extract_json_array("junk [1, [2]] trailing"), Some("[1, [2]]"));
        assert_eq!(extract_json_array("no brackets"), None);
        assert_eq!(extract_json_array("] reversed ["), None);
    }
}
