//! End-to-end pipeline runs against a scripted executor.
//!
//! Each test points the output directory at a temp dir, scripts the trader
//! and refinement agents, runs the full stage sequence, and inspects the
//! artifacts written to disk.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tempfile::TempDir;
use thesis_agents::pipeline::BATCH_SUBJECT;
use thesis_agents::test_support::ScriptedExecutor;
use thesis_agents::{AgentError, BatchRunner, Pipeline, Schemas, Stage};
use thesis_models::config::{FailurePolicy, PipelineConfig, RefineGranularity};
use tokio_util::sync::CancellationToken;

const TWO_HYPOTHESES: &str = r#"Here is the thesis:
```json
{"items": [
  {"name": "Long duration", "thesis": "Cuts are coming"},
  {"name": "Short dollar", "thesis": "Capital rotates abroad"}
]}
```"#;

fn schemas() -> Schemas {
    Schemas::new(
        ["raw_trade_thesis", "trade_thesis", "portfolio"]
            .into_iter()
            .map(|name| (name.to_string(), format!("{{\"title\": \"{name}\"}}")))
            .collect(),
    )
}

fn config(dir: &TempDir, granularity: RefineGranularity, policy: FailurePolicy) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.output.dir = dir.path().display().to_string();
    config.refine.granularity = granularity;
    config.runtime.failure_policy = policy;
    config
}

/// Trader returns two hypotheses; the portfolio agent allocates per subject.
fn scripted() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .respond("Trader", TWO_HYPOTHESES)
        .respond_with("Portfolio Construction", |unit| {
            json!({
                "name": unit.subject,
                "objective": "Express the thesis",
                "assets": [
                    {"ticker": "TLT", "ticker_name": "20+ Year Treasury", "weight": 0.6},
                    {"ticker": "UUP", "weight": "0.4"}
                ]
            })
            .to_string()
        })
}

fn pipeline(
    executor: Arc<ScriptedExecutor>,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Pipeline {
    let runner = BatchRunner::from_runtime(executor, &config.runtime, cancel);
    Pipeline::new(runner, config, schemas())
        .unwrap()
        .with_date(NaiveDate::from_ymd_opt(2026, 3, 4).unwrap())
}

fn read_json(dir: &TempDir, name: &str) -> Value {
    let text = std::fs::read_to_string(dir.path().join(name)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn exists(dir: &TempDir, name: &str) -> bool {
    dir.path().join(name).exists()
}

fn subjects(entries: &Value) -> Vec<&str> {
    entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["subject"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn per_hypothesis_run_writes_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(scripted());

    let report = pipeline(executor.clone(), &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.stages.len(), 3);
    assert_eq!(report.stage(Stage::Research).unwrap().units, 6);
    assert_eq!(report.stage(Stage::Hypothesize).unwrap().units, 1);
    assert_eq!(report.stage(Stage::Refine).unwrap().units, 6);
    assert_eq!(report.hypotheses, 2);
    assert_eq!(report.artifacts.len(), 7);
    assert_eq!(executor.calls(), 6 + 1 + 6);

    let research = read_json(&dir, "research_summary.json");
    assert_eq!(research.as_array().unwrap().len(), 6);

    let hypotheses = read_json(&dir, "hypotheses.json");
    assert_eq!(hypotheses[1]["name"], "Short dollar");

    for file in ["critic_feedback.json", "refined_hypotheses.json", "portfolio.json"] {
        let entries = read_json(&dir, file);
        assert_eq!(subjects(&entries), vec!["hypothesis-1", "hypothesis-2"], "{file}");
    }

    let summaries = read_json(&dir, "portfolio_summary.json");
    assert_eq!(summaries.as_array().unwrap().len(), 2);
    assert_eq!(summaries[0]["fully_allocated"], true);
    assert_eq!(summaries[1]["name"], "hypothesis-2");
}

#[tokio::test]
async fn refinement_outputs_pair_with_their_hypothesis() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(scripted().delay("Critic", Duration::from_millis(20)));

    pipeline(executor, &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    // Unscripted agents echo their subject and task back.
    let critique = read_json(&dir, "critic_feedback.json");
    for entry in critique.as_array().unwrap() {
        assert_eq!(entry["payload"]["subject"], entry["subject"]);
    }
    let second = critique[1]["payload"]["task"].as_str().unwrap();
    assert!(second.contains("Short dollar"));
    assert!(!second.contains("Long duration"));
}

#[tokio::test]
async fn per_batch_run_produces_one_triple() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerBatch, FailurePolicy::Capture);
    let executor = Arc::new(scripted());

    let report = pipeline(executor.clone(), &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.stage(Stage::Refine).unwrap().units, 3);
    assert_eq!(executor.calls(), 6 + 1 + 3);
    for file in ["critic_feedback.json", "refined_hypotheses.json", "portfolio.json"] {
        let entries = read_json(&dir, file);
        assert_eq!(subjects(&entries), vec![BATCH_SUBJECT], "{file}");
    }

    let critique = read_json(&dir, "critic_feedback.json");
    let task = critique[0]["payload"]["task"].as_str().unwrap();
    assert!(task.contains("Long duration") && task.contains("Short dollar"));
}

#[tokio::test]
async fn trader_sees_the_joined_research() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(scripted().respond("Fiscal Policy", "Deficits keep widening."));

    pipeline(executor.clone(), &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    let trader = executor
        .seen()
        .into_iter()
        .find(|unit| unit.role() == "Trader")
        .unwrap();
    assert!(trader.task.description.contains("Deficits keep widening."));
    assert!(trader.task.description.contains("Federal Reserve Policy Analyst"));
    assert!(trader.task.description.contains("2026-03-04"));
    assert!(trader.task.expected_output.contains("raw_trade_thesis"));
}

#[tokio::test]
async fn captured_research_failure_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(scripted().fail("Banking System Risk"));

    let report = pipeline(executor, &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.stage(Stage::Research).unwrap().failures, 1);
    let research = read_json(&dir, "research_summary.json");
    assert_eq!(research[1]["agent"], "Banking System Risk Analyst");
    assert!(research[1]["output"]["error"]
        .as_str()
        .unwrap()
        .contains("Scripted failure"));
    assert!(research[0]["output"].get("error").is_none());
}

#[tokio::test]
async fn fail_fast_research_failure_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::FailFast);
    let executor = Arc::new(scripted().fail("Banking System Risk"));

    let err = pipeline(executor, &config, CancellationToken::new())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::UnitFailed { index: 1, .. }));
    assert!(!exists(&dir, "research_summary.json"));
}

#[tokio::test]
async fn failed_trader_is_a_stage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(ScriptedExecutor::new().fail("Trader"));

    let err = pipeline(executor, &config, CancellationToken::new())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Stage { ref stage, .. } if stage == "hypothesize"));
    assert!(exists(&dir, "research_summary.json"));
    assert!(!exists(&dir, "trader_hypothesis.json"));
    assert!(!exists(&dir, "hypotheses.json"));
}

#[tokio::test]
async fn unparseable_hypothesis_keeps_raw_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(ScriptedExecutor::new().respond("Trader", "Buy bonds, probably."));

    let err = pipeline(executor, &config, CancellationToken::new())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Stage { ref stage, .. } if stage == "hypothesize"));
    let raw = std::fs::read_to_string(dir.path().join("trader_hypothesis.json")).unwrap();
    assert_eq!(raw, "Buy bonds, probably.");
}

#[tokio::test]
async fn empty_hypothesis_list_is_a_stage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(ScriptedExecutor::new().respond("Trader", r#"{"items": []}"#));

    let err = pipeline(executor.clone(), &config, CancellationToken::new())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Stage { ref stage, .. } if stage == "refine"));
    assert_eq!(read_json(&dir, "hypotheses.json"), json!([]));
    assert_eq!(executor.calls(), 6 + 1);
}

#[tokio::test]
async fn single_object_hypothesis_is_refined_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let executor = Arc::new(ScriptedExecutor::new().respond("Trader", r#"{"name": "Long gold"}"#));

    let report = pipeline(executor, &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.hypotheses, 1);
    assert_eq!(report.stage(Stage::Refine).unwrap().units, 3);
    assert_eq!(read_json(&dir, "hypotheses.json"), json!([{"name": "Long gold"}]));
}

#[tokio::test]
async fn summaries_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    config.refine.summarize_portfolio = false;

    let report = pipeline(Arc::new(scripted()), &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.artifacts.len(), 6);
    assert!(!exists(&dir, "portfolio_summary.json"));
}

#[tokio::test]
async fn summaries_follow_portfolio_role_when_bucket_is_renamed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    for rule in &mut config.refine.rules {
        if rule.matcher == "Portfolio Construction" {
            rule.bucket = "allocations".to_string();
        }
    }

    pipeline(Arc::new(scripted()), &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert!(exists(&dir, "allocations.json"));
    let summaries = read_json(&dir, "portfolio_summary.json");
    assert_eq!(subjects(&summaries), vec!["hypothesis-1", "hypothesis-2"]);
}

#[tokio::test]
async fn summary_weights_are_decimal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerBatch, FailurePolicy::Capture);

    pipeline(Arc::new(scripted()), &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    let summaries: Vec<thesis_models::PortfolioSummary> =
        serde_json::from_value(read_json(&dir, "portfolio_summary.json")).unwrap();
    assert_eq!(summaries[0].total_weight, dec!(1.0));
    assert_eq!(summaries[0].positions[1].weight, dec!(0.4));
}

#[tokio::test]
async fn cancelled_run_stops_in_research() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline(Arc::new(scripted()), &config, cancel)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert!(!exists(&dir, "research_summary.json"));
}

#[tokio::test]
async fn rerun_overwrites_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, RefineGranularity::PerHypothesis, FailurePolicy::Capture);

    pipeline(Arc::new(scripted()), &config, CancellationToken::new())
        .run()
        .await
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new().respond("Trader", r#"[{"name": "Only one"}]"#));
    pipeline(executor, &config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(read_json(&dir, "hypotheses.json"), json!([{"name": "Only one"}]));
    assert_eq!(subjects(&read_json(&dir, "portfolio.json")), vec!["hypothesis-1"]);
}
