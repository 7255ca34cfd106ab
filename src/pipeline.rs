//! Three-stage analysis pipeline: Retrieve, Score, Summarize.
//!
//! Stages run strictly in sequence and are modeled immutable-in /
//! immutable-out: each stage receives what it needs and returns only the
//! fields it changes; [`AnalysisPipeline::run`] composes the outputs into
//! the final [`AnalysisReport`]. This keeps stages independently testable
//! and avoids partial-mutation bugs.
//!
//! Failure policy: an index error during Retrieve propagates as a hard
//! error. A scorer error during Score short-circuits to an explanatory
//! `final_answer` that Summarize passes through. A synthesis failure in
//! Summarize degrades to a fixed quota-guidance answer while the overall
//! report is still populated from the computed statistics.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::completion::CompletionService;
use crate::index::SemanticIndex;
use crate::models::{OverallReport, RiskAssessment, Segment};
use crate::scorer::{HybridRiskScorer, RiskScorer, SegmentInput};

/// Final pipeline output for one query.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub query: String,
    pub documents: Vec<Segment>,
    pub risk_analysis: Vec<RiskAssessment>,
    pub final_answer: String,
    pub overall_report: Option<OverallReport>,
}

/// Fields changed by the Score stage.
struct ScoreOutcome {
    risk_analysis: Vec<RiskAssessment>,
    /// Set only when the scorer itself failed; Summarize passes it through.
    failure_answer: Option<String>,
}

/// Fields changed by the Summarize stage.
struct SummarizeOutcome {
    final_answer: String,
    overall_report: Option<OverallReport>,
}

pub struct AnalysisPipeline {
    index: Arc<dyn SemanticIndex>,
    scorer: Arc<dyn RiskScorer>,
    completion: Arc<dyn CompletionService>,
    top_k: usize,
}

impl AnalysisPipeline {
    pub fn new(
        index: Arc<dyn SemanticIndex>,
        completion: Arc<dyn CompletionService>,
        top_k: usize,
    ) -> Self {
        let scorer = Arc::new(HybridRiskScorer::new(completion.clone()));
        Self::with_scorer(index, scorer, completion, top_k)
    }

    pub fn with_scorer(
        index: Arc<dyn SemanticIndex>,
        scorer: Arc<dyn RiskScorer>,
        completion: Arc<dyn CompletionService>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            scorer,
            completion,
            top_k,
        }
    }

    /// Run the full pipeline for one query.
    ///
    /// Only an index failure during retrieval surfaces as `Err`; every
    /// downstream failure is rendered into `final_answer`.
    pub async fn run(&self, query: &str) -> Result<AnalysisReport> {
        let documents = self.retrieve(query).await?;
        info!(count = documents.len(), "retrieved segments");

        let score = self.score(&documents).await;
        info!(count = score.risk_analysis.len(), "scored segments");

        let summary = self
            .summarize(query, &score.risk_analysis, score.failure_answer)
            .await;

        Ok(AnalysisReport {
            query: query.to_string(),
            documents,
            risk_analysis: score.risk_analysis,
            final_answer: summary.final_answer,
            overall_report: summary.overall_report,
        })
    }

    /// Stage 1: top-k lookup against the semantic index. Ranking scores
    /// are discarded here; only the segments matter downstream.
    async fn retrieve(&self, query: &str) -> Result<Vec<Segment>> {
        let results = self.index.search(query, self.top_k).await?;
        Ok(results.into_iter().map(|(segment, _score)| segment).collect())
    }

    /// Stage 2: batch risk scoring of the retrieved segments.
    async fn score(&self, documents: &[Segment]) -> ScoreOutcome {
        if documents.is_empty() {
            return ScoreOutcome {
                risk_analysis: Vec::new(),
                failure_answer: None,
            };
        }

        let batch: Vec<SegmentInput> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| SegmentInput {
                id: if doc.clause_id.is_empty() {
                    format!("clause_{}", i)
                } else {
                    doc.clause_id.clone()
                },
                text: doc.text.clone(),
            })
            .collect();

        match self.scorer.score_batch(&batch).await {
            Ok(risk_analysis) => ScoreOutcome {
                risk_analysis,
                failure_answer: None,
            },
            Err(e) => {
                warn!("risk scoring failed: {}", e);
                ScoreOutcome {
                    risk_analysis: Vec::new(),
                    failure_answer: Some(format!("Risk analysis failed: {}", e)),
                }
            }
        }
    }

    /// Stage 3: aggregate statistics and synthesize a plain-language answer.
    async fn summarize(
        &self,
        query: &str,
        risk_analysis: &[RiskAssessment],
        preset_answer: Option<String>,
    ) -> SummarizeOutcome {
        // A failure answer from the Score stage passes through unchanged.
        if risk_analysis.is_empty() {
            if let Some(answer) = preset_answer {
                return SummarizeOutcome {
                    final_answer: answer,
                    overall_report: None,
                };
            }
            return SummarizeOutcome {
                final_answer:
                    "No relevant clauses found. Try a different query or ingest a document first."
                        .to_string(),
                overall_report: None,
            };
        }

        let report = OverallReport::from_assessments(risk_analysis);
        let prompt = synthesis_prompt(query, &report, risk_analysis);

        match self.completion.complete(&prompt).await {
            Ok(answer) => SummarizeOutcome {
                final_answer: answer,
                overall_report: Some(report),
            },
            Err(e) => {
                warn!("answer synthesis failed: {}", e);
                SummarizeOutcome {
                    final_answer: format!(
                        "Answer generation failed: {}\n\nThis is often caused by API quota \
                         limits (free tier: ~20 requests/day). Please wait and try again later.",
                        e
                    ),
                    overall_report: Some(report),
                }
            }
        }
    }
}

fn synthesis_prompt(query: &str, report: &OverallReport, risks: &[RiskAssessment]) -> String {
    let clause_lines = risks
        .iter()
        .map(|r| {
            format!(
                "- Clause {} ({}, Score: {}/10): {}\n  Recommendation: {}",
                r.clause_id, r.risk_level, r.risk_score, r.reason, r.recommendation
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a helpful and expert legal document assistant.
Explain things in simple, plain English that a non-lawyer can understand.

User question: '{query}'

--- Document Risk Statistics ---
Overall Risk Score: {overall}/10
Critical (High) Risks: {high}
Medium Risks: {medium}
Low Risks: {low}

--- Clause Analysis ---
{clause_lines}

--- Instructions ---
1. Identify the document type (e.g., SaaS Agreement, NDA, Vendor Contract).
2. Use plain language - avoid unexplained legal jargon.
3. Use * to highlight notable facts.
4. Use ** to highlight HIGH risks, critical deadlines, or requirements.
5. Directly and clearly answer the user's specific question based ONLY on the provided analysis.
6. End with a concise summary of key action items.
"#,
        query = query,
        overall = report.overall_risk_score,
        high = report.high_risk_count,
        medium = report.medium_risk_count,
        low = report.low_risk_count,
        clause_lines = clause_lines,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct StubIndex {
        segments: Vec<Segment>,
        fail: bool,
    }

    #[async_trait]
    impl SemanticIndex for StubIndex {
        async fn add_segments(
            &self,
            _segments: &[Segment],
            _clear_existing: bool,
        ) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _query: &str, k: usize) -> Result<Vec<(Segment, f64)>> {
            if self.fail {
                anyhow::bail!("index unavailable");
            }
            Ok(self
                .segments
                .iter()
                .take(k)
                .cloned()
                .map(|s| (s, 0.9))
                .collect())
        }
    }

    /// Completion that answers batch prompts with a fixed JSON array and
    /// synthesis prompts with fixed text (or an error).
    struct StubCompletion {
        batch_response: Result<String, String>,
        synthesis_response: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionService for StubCompletion {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let entry = if prompt.contains("legal document assistant") {
                &self.synthesis_response
            } else {
                &self.batch_response
            };
            entry.clone().map_err(CompletionError::Service)
        }
    }

    fn segment(clause_id: &str, text: &str) -> Segment {
        let mut metadata = BTreeMap::new();
        metadata.insert("clause_id".to_string(), clause_id.to_string());
        Segment {
            text: text.to_string(),
            clause_id: clause_id.to_string(),
            metadata,
        }
    }

    fn pipeline(index: StubIndex, completion: StubCompletion) -> AnalysisPipeline {
        AnalysisPipeline::new(Arc::new(index), Arc::new(completion), 5)
    }

    #[tokio::test]
    async fn test_happy_path_populates_report() {
        let index = StubIndex {
            segments: vec![segment("1.1", "Neutral clause text.")],
            fail: false,
        };
        let completion = StubCompletion {
            batch_response: Ok(r#"[{"clause_id": "1.1", "clause_type": "General", "risk_level": "High", "risk_score": 8, "reason": "r", "recommendation": "rec"}]"#.to_string()),
            synthesis_response: Ok("This is a vendor contract.".to_string()),
            prompts: Mutex::new(Vec::new()),
        };

        let report = pipeline(index, completion).run("what risks?").await.unwrap();

        assert_eq!(report.query, "what risks?");
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.risk_analysis.len(), 1);
        assert_eq!(report.final_answer, "This is a vendor contract.");
        let overall = report.overall_report.unwrap();
        assert_eq!(overall.overall_risk_score, 8.0);
        assert_eq!(overall.high_risk_count, 1);
    }

    #[tokio::test]
    async fn test_empty_retrieval_yields_fixed_message() {
        let index = StubIndex {
            segments: Vec::new(),
            fail: false,
        };
        let completion = StubCompletion {
            batch_response: Ok("[]".to_string()),
            synthesis_response: Ok("unused".to_string()),
            prompts: Mutex::new(Vec::new()),
        };

        let report = pipeline(index, completion).run("anything").await.unwrap();

        assert!(report.documents.is_empty());
        assert!(report.risk_analysis.is_empty());
        assert!(report.final_answer.contains("No relevant clauses found"));
        assert!(report.overall_report.is_none());
    }

    #[tokio::test]
    async fn test_index_failure_propagates() {
        let index = StubIndex {
            segments: Vec::new(),
            fail: true,
        };
        let completion = StubCompletion {
            batch_response: Ok("[]".to_string()),
            synthesis_response: Ok("unused".to_string()),
            prompts: Mutex::new(Vec::new()),
        };

        let result = pipeline(index, completion).run("anything").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_synthesis_failure_degrades_with_report() {
        let index = StubIndex {
            segments: vec![segment("2.1", "Neutral clause text.")],
            fail: false,
        };
        let completion = StubCompletion {
            batch_response: Ok(r#"[{"clause_id": "2.1", "clause_type": "General", "risk_level": "Medium", "risk_score": 6, "reason": "r", "recommendation": "rec"}]"#.to_string()),
            synthesis_response: Err("quota exceeded".to_string()),
            prompts: Mutex::new(Vec::new()),
        };

        let report = pipeline(index, completion).run("summary?").await.unwrap();

        assert!(report.final_answer.contains("Answer generation failed"));
        assert!(report.final_answer.contains("quota"));
        // Statistics are still populated from the computed assessments.
        let overall = report.overall_report.unwrap();
        assert_eq!(overall.overall_risk_score, 6.0);
        assert_eq!(overall.medium_risk_count, 1);
    }

    #[tokio::test]
    async fn test_completion_failure_everywhere_still_answers() {
        // Scorer falls back to placeholders, synthesis degrades; the
        // caller still gets a coherent report with no hard error.
        let index = StubIndex {
            segments: vec![segment("3.1", "Plain text."), segment("3.2", "More text.")],
            fail: false,
        };
        let completion = StubCompletion {
            batch_response: Err("service down".to_string()),
            synthesis_response: Err("service down".to_string()),
            prompts: Mutex::new(Vec::new()),
        };

        let report = pipeline(index, completion).run("risks?").await.unwrap();

        assert_eq!(report.risk_analysis.len(), 2);
        assert!(report
            .risk_analysis
            .iter()
            .all(|a| a.risk_score == 5 && a.recommendation == "Manual review recommended."));
        assert!(report.final_answer.contains("Answer generation failed"));
        assert_eq!(report.overall_report.unwrap().overall_risk_score, 5.0);
    }

    struct FailingScorer;

    #[async_trait]
    impl RiskScorer for FailingScorer {
        async fn score_batch(&self, _batch: &[SegmentInput]) -> Result<Vec<RiskAssessment>> {
            anyhow::bail!("scoring backend unavailable")
        }
    }

    #[tokio::test]
    async fn test_scorer_failure_short_circuits_summarize() {
        let index = StubIndex {
            segments: vec![segment("1.1", "Some clause text.")],
            fail: false,
        };
        let completion = StubCompletion {
            batch_response: Ok("[]".to_string()),
            synthesis_response: Ok("must not appear".to_string()),
            prompts: Mutex::new(Vec::new()),
        };
        let completion_ref = Arc::new(completion);
        let pipeline = AnalysisPipeline::with_scorer(
            Arc::new(index),
            Arc::new(FailingScorer),
            completion_ref.clone(),
            5,
        );

        let report = pipeline.run("risks?").await.unwrap();

        assert!(report.risk_analysis.is_empty());
        assert_eq!(
            report.final_answer,
            "Risk analysis failed: scoring backend unavailable"
        );
        assert!(report.overall_report.is_none());
        // Summarize passed the failure answer through without a synthesis call.
        assert!(completion_ref.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_prompt_contains_stats_and_clauses() {
        let index = StubIndex {
            segments: vec![segment("4.1", "Neutral clause.")],
            fail: false,
        };
        let completion = StubCompletion {
            batch_response: Ok(r#"[{"clause_id": "4.1", "clause_type": "Liability", "risk_level": "High", "risk_score": 9, "reason": "steep", "recommendation": "negotiate"}]"#.to_string()),
            synthesis_response: Ok("answer".to_string()),
            prompts: Mutex::new(Vec::new()),
        };
        let completion_ref = Arc::new(completion);
        let pipeline = AnalysisPipeline::new(
            Arc::new(index),
            completion_ref.clone(),
            5,
        );

        pipeline.run("what about liability?").await.unwrap();

        let prompts = completion_ref.prompts.lock().unwrap();
        let synthesis = prompts
            .iter()
            .find(|p| p.contains("legal document assistant"))
            .expect("synthesis prompt sent");
        assert!(synthesis.contains("what about liability?"));
        assert!(synthesis.contains("Overall Risk Score: 9/10"));
        assert!(synthesis.contains("Clause 4.1 (High, Score: 9/10): steep"));
        assert!(synthesis.contains("Recommendation: negotiate"));
    }
}
