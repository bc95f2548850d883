use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thesis_models::config::ClassificationRule;
use thesis_models::work::{UnitOutcome, WorkResult};
use tracing::warn;

use crate::parser::payload_from_raw;

/// One classified result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub payload: Value,
}

/// Bucket name -> entries, in result order.
pub type Buckets = BTreeMap<String, Vec<BucketEntry>>;

/// Normalized payload of a result: parsed JSON, `{"raw": text}` when the
/// output is not JSON, or `{"error": message}` for failed units.
pub fn result_payload(result: &WorkResult) -> Value {
    match &result.outcome {
        UnitOutcome::Completed { raw } => payload_from_raw(raw),
        UnitOutcome::Failed { error } => serde_json::json!({ "error": error }),
    }
}

/// Route results into buckets by role label.
///
/// A result goes into every bucket whose matcher is a substring of its agent
/// role. Results matching no rule are dropped with a warning. Every rule's
/// bucket is present in the output, even if empty.
pub fn classify(results: &[WorkResult], rules: &[ClassificationRule]) -> Buckets {
    let mut buckets: Buckets = rules
        .iter()
        .map(|rule| (rule.bucket.clone(), Vec::new()))
        .collect();

    for result in results {
        let matching: Vec<&ClassificationRule> = rules
            .iter()
            .filter(|rule| result.agent.contains(rule.matcher.as_str()))
            .collect();

        if matching.is_empty() {
            warn!(agent = %result.agent, subject = ?result.subject, "Result matched no classification rule, dropping");
            continue;
        }

        let payload = result_payload(result);
        for rule in matching {
            buckets
                .entry(rule.bucket.clone())
                .or_default()
                .push(BucketEntry {
                    subject: result.subject.clone(),
                    payload: payload.clone(),
                });
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::unit;
    use serde_json::json;
    use thesis_models::config::default_rules;

    fn completed(role: &str, subject: &str, raw: &str) -> WorkResult {
        WorkResult::completed(&unit(role, "task").with_subject(subject), raw.to_string(), 1)
    }

    fn sample_results() -> Vec<WorkResult> {
        vec![
            completed("Hypothesis Critic", "hypothesis-1", r#"{"critique": "c1"}"#),
            completed("Hypothesis Refiner", "hypothesis-1", r#"{"name": "r1"}"#),
            completed("Portfolio Construction Strategist", "hypothesis-1", "weights pending"),
            completed("Hypothesis Critic", "hypothesis-2", r#"{"critique": "c2"}"#),
            completed("Falsification Analyst", "hypothesis-2", r#"{"falsified": false}"#),
        ]
    }

    #[test]
    fn routes_by_role_substring() {
        let buckets = classify(&sample_results(), &default_rules());

        assert_eq!(buckets["critique"].len(), 2);
        assert_eq!(buckets["refined"].len(), 1);
        assert_eq!(buckets["portfolio"].len(), 1);
        assert_eq!(buckets["critique"][1].subject.as_deref(), Some("hypothesis-2"));
        assert_eq!(buckets["critique"][1].payload, json!({"critique": "c2"}));
    }

    #[test]
    fn non_json_output_is_wrapped() {
        let buckets = classify(&sample_results(), &default_rules());
        assert_eq!(buckets["portfolio"][0].payload, json!({"raw": "weights pending"}));
    }

    #[test]
    fn prose_with_embedded_json_is_wrapped_whole() {
        let text = "Critique: the thesis ignores {\"risk\": \"term premium\"} and also ignores the fiscal cliff entirely.";
        let results = [completed("Hypothesis Critic", "hypothesis-1", text)];
        let buckets = classify(&results, &default_rules());
        assert_eq!(buckets["critique"][0].payload, json!({"raw": text}));
    }

    #[test]
    fn failed_unit_becomes_error_payload() {
        let failed = WorkResult::failed(&unit("Hypothesis Refiner", "task"), "timed out".to_string(), 5);
        let buckets = classify(&[failed], &default_rules());
        assert_eq!(buckets["refined"][0].payload, json!({"error": "timed out"}));
    }

    #[test]
    fn unmatched_results_are_dropped() {
        let buckets = classify(&sample_results(), &default_rules());
        let total: usize = buckets.values().map(Vec::len).sum();
        // Five results, one from an agent with no rule.
        assert_eq!(total, 4);
        assert!(!buckets.contains_key("falsification"));
    }

    #[test]
    fn multi_match_appends_to_every_bucket() {
        let rules = vec![
            ClassificationRule::new("portfolio", "Portfolio"),
            ClassificationRule::new("construction", "Portfolio Construction"),
        ];
        let buckets = classify(&sample_results(), &rules);
        assert_eq!(buckets["portfolio"].len(), 1);
        assert_eq!(buckets["construction"].len(), 1);
    }

    #[test]
    fn every_rule_has_a_bucket() {
        let buckets = classify(&[], &default_rules());
        assert_eq!(buckets.len(), 3);
        assert!(buckets.values().all(Vec::is_empty));
    }

    #[test]
    fn classification_is_idempotent() {
        let results = sample_results();
        let rules = default_rules();
        assert_eq!(classify(&results, &rules), classify(&results, &rules));
    }

    #[test]
    fn each_match_appears_exactly_once() {
        let results = sample_results();
        let rules = default_rules();
        let buckets = classify(&results, &rules);

        for rule in &rules {
            let expected = results
                .iter()
                .filter(|r| r.agent.contains(rule.matcher.as_str()))
                .count();
            assert_eq!(buckets[&rule.bucket].len(), expected, "bucket {}", rule.bucket);
        }
    }
}
