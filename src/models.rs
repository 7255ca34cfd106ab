//! Core data models for the legal clause analysis pipeline.
//!
//! These types represent the segments, risk assessments, and aggregate
//! reports that flow through ingestion, retrieval, and scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A clause-level span of a legal document.
///
/// Segments from one document, concatenated in order, reconstruct the
/// document's lines exactly. `metadata` carries the caller-supplied
/// ingestion metadata plus the injected `clause_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub clause_id: String,
    pub metadata: BTreeMap<String, String>,
}

/// Risk level bucket, derived from the final clamped score:
/// High if >= 8, Medium if >= 5, Low otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: i64) -> Self {
        if score >= 8 {
            RiskLevel::High
        } else if score >= 5 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a raw risk score into the valid `[1, 10]` range.
pub fn clamp_score(score: i64) -> i64 {
    score.clamp(1, 10)
}

/// Structured risk assessment for a single scored segment.
///
/// Deserialized directly from model output on the strict decode path;
/// the scorer repairs malformed elements field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub clause_id: String,
    pub clause_type: String,
    pub risk_level: RiskLevel,
    pub risk_score: i64,
    pub reason: String,
    pub recommendation: String,
}

/// Aggregate statistics over a set of [`RiskAssessment`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallReport {
    /// Arithmetic mean of all risk scores, rounded to 2 decimals.
    /// Zero when the assessment set is empty.
    pub overall_risk_score: f64,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
}

impl OverallReport {
    pub fn from_assessments(assessments: &[RiskAssessment]) -> Self {
        let avg = if assessments.is_empty() {
            0.0
        } else {
            let sum: i64 = assessments.iter().map(|a| a.risk_score).sum();
            let mean = sum as f64 / assessments.len() as f64;
            (mean * 100.0).round() / 100.0
        };

        Self {
            overall_risk_score: avg,
            high_risk_count: count_level(assessments, RiskLevel::High),
            medium_risk_count: count_level(assessments, RiskLevel::Medium),
            low_risk_count: count_level(assessments, RiskLevel::Low),
        }
    }
}

fn count_level(assessments: &[RiskAssessment], level: RiskLevel) -> usize {
    assessments.iter().filter(|a| a.risk_level == level).count()
}
