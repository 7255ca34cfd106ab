//! Deterministic keyword rules layered on top of model-based scoring.
//!
//! Each rule carries a set of required keywords, a signed score modifier,
//! and a short label. A rule fires only when every keyword appears in the
//! text (case-insensitive substring match). The conjunctive match trades
//! recall for precision: "liability" alone never triggers the liability-cap
//! rule.

/// A single keyword rule.
struct Rule {
    keywords: &'static [&'static str],
    modifier: i64,
    label: &'static str,
}

/// Evaluates clause text against a fixed, ordered rule list.
pub struct RiskRuleEngine {
    rules: Vec<Rule>,
}

impl Default for RiskRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskRuleEngine {
    pub fn new() -> Self {
        let rules = vec![
            Rule {
                keywords: &["indemnify", "unlimited"],
                modifier: 7,
                label: "unlimited indemnity",
            },
            Rule {
                keywords: &["liability", "cap"],
                modifier: -2,
                label: "liability cap present",
            },
            Rule {
                keywords: &["termination", "convenience"],
                modifier: 3,
                label: "termination for convenience",
            },
            Rule {
                keywords: &["auto-renew"],
                modifier: 2,
                label: "auto-renewal clause",
            },
            Rule {
                keywords: &["confidential", "survival"],
                modifier: 1,
                label: "confidentiality survival",
            },
            Rule {
                keywords: &["no warranty", "as is"],
                modifier: 2,
                label: "warranty disclaimer",
            },
            Rule {
                keywords: &["governing law"],
                modifier: -1,
                label: "governing law defined",
            },
        ];

        Self { rules }
    }

    /// Returns the summed score modifier and the labels of all firing
    /// rules, in rule-definition order.
    pub fn evaluate(&self, text: &str) -> (i64, Vec<&'static str>) {
        let lower = text.to_lowercase();
        let mut score = 0;
        let mut triggered = Vec::new();

        for rule in &self.rules {
            if rule.keywords.iter().all(|kw| lower.contains(kw)) {
                score += rule.modifier;
                triggered.push(rule.label);
            }
        }

        (score, triggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_indemnity_fires_alone() {
        let engine = RiskRuleEngine::new();
        let (score, triggered) =
            engine.evaluate("This contract shall indemnify Buyer for unlimited losses");
        assert_eq!(score, 7);
        assert_eq!(triggered, vec!["unlimited indemnity"]);
    }

    #[test]
    fn test_conjunctive_match() {
        let engine = RiskRuleEngine::new();
        // "liability" without "cap" must not trigger the liability-cap rule.
        let (score, triggered) = engine.evaluate("The liability of the parties is described here");
        assert_eq!(score, 0);
        assert!(triggered.is_empty());
    }

    #[test]
    fn test_liability_cap_reduces_risk() {
        let engine = RiskRuleEngine::new();
        let (score, triggered) =
            engine.evaluate("Aggregate liability shall not exceed the cap of fees paid");
        assert_eq!(score, -2);
        assert_eq!(triggered, vec!["liability cap present"]);
    }

    #[test]
    fn test_case_insensitive() {
        let engine = RiskRuleEngine::new();
        let (score, triggered) = engine.evaluate("GOVERNING LAW: State of Delaware");
        assert_eq!(score, -1);
        assert_eq!(triggered, vec!["governing law defined"]);
    }

    #[test]
    fn test_multiple_rules_sum_in_order() {
        let engine = RiskRuleEngine::new();
        let text = "Party shall indemnify for unlimited claims. This agreement will auto-renew \
                    annually. Governing law is New York.";
        let (score, triggered) = engine.evaluate(text);
        assert_eq!(score, 7 + 2 - 1);
        assert_eq!(
            triggered,
            vec![
                "unlimited indemnity",
                "auto-renewal clause",
                "governing law defined"
            ]
        );
    }

    #[test]
    fn test_empty_text() {
        let engine = RiskRuleEngine::new();
        let (score, triggered) = engine.evaluate("");
        assert_eq!(score, 0);
        assert!(triggered.is_empty());
    }
}
