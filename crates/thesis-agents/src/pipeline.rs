use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thesis_models::config::{
    ClassificationRule, OutputConfig, PipelineConfig, RefineGranularity, ResearchTopic,
    RoleTemplate,
};
use thesis_models::hypothesis::{hypothesis_subject, normalize_hypotheses};
use thesis_models::portfolio::PortfolioSummary;
use thesis_models::work::{TaskSpec, UnitOutcome, WorkResult, WorkUnit};
use thesis_store::{JsonSink, Payload};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::batch::BatchRunner;
use crate::classify::{classify, result_payload};
use crate::error::AgentError;
use crate::parser::{parse_json, parse_payload};
use crate::prompts::{
    self, date_line, render, DATE_PLACEHOLDER, HYPOTHESIS_PLACEHOLDER, RESEARCH_PLACEHOLDER,
    SCHEMA_PLACEHOLDER,
};
use crate::schemas::Schemas;

/// Subject of the single refinement triple in per-batch mode.
pub const BATCH_SUBJECT: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Hypothesize,
    Refine,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Research => f.write_str("research"),
            Self::Hypothesize => f.write_str("hypothesize"),
            Self::Refine => f.write_str("refine"),
            Self::Done => f.write_str("done"),
        }
    }
}

fn stage_error(stage: Stage, message: impl Into<String>) -> AgentError {
    AgentError::Stage {
        stage: stage.to_string(),
        message: message.into(),
    }
}

/// Unit and failure counts for one completed stage.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub units: usize,
    pub failures: usize,
    pub elapsed_ms: u64,
}

impl StageReport {
    fn from_results(stage: Stage, results: &[WorkResult], started: Instant) -> Self {
        Self {
            stage,
            units: results.len(),
            failures: results.iter().filter(|r| r.is_failed()).count(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    pub hypotheses: usize,
    pub artifacts: Vec<PathBuf>,
    pub elapsed_ms: u64,
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Templates for every stage, with configured overrides applied.
#[derive(Debug, Clone)]
pub struct StageTemplates {
    pub research: Vec<ResearchTopic>,
    pub trader: RoleTemplate,
    pub critic: RoleTemplate,
    pub refiner: RoleTemplate,
    pub portfolio: RoleTemplate,
}

impl StageTemplates {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let research = if config.research.topics.is_empty() {
            prompts::research_topics()
        } else {
            config.research.topics.clone()
        };
        let refine = &config.refine;

        Self {
            research,
            trader: config.trader.clone().unwrap_or_else(prompts::trader_template),
            critic: refine.critic.clone().unwrap_or_else(prompts::critic_template),
            refiner: refine.refiner.clone().unwrap_or_else(prompts::refiner_template),
            portfolio: refine
                .portfolio
                .clone()
                .unwrap_or_else(prompts::portfolio_template),
        }
    }

    fn all(&self) -> impl Iterator<Item = &RoleTemplate> {
        self.research
            .iter()
            .map(|topic| &topic.template)
            .chain([&self.trader, &self.critic, &self.refiner, &self.portfolio])
    }
}

/// Join research results into one document: `[{task, agent, output}]`.
///
/// `output` is the parsed payload when the whole response is JSON, the raw
/// text otherwise, and `{"error": message}` for failed units.
pub fn research_document(results: &[WorkResult]) -> Value {
    let entries = results
        .iter()
        .map(|result| {
            let output = match &result.outcome {
                UnitOutcome::Completed { raw } => {
                    parse_payload(raw).unwrap_or_else(|| Value::String(raw.clone()))
                }
                UnitOutcome::Failed { error } => json!({ "error": error }),
            };
            json!({
                "task": result.task,
                "agent": result.agent,
                "output": output,
            })
        })
        .collect();
    Value::Array(entries)
}

/// Drives Research -> Hypothesize -> Refine -> Done over a batch runner.
pub struct Pipeline {
    runner: BatchRunner,
    templates: StageTemplates,
    schemas: Schemas,
    rules: Vec<ClassificationRule>,
    granularity: RefineGranularity,
    summarize_portfolio: bool,
    output: OutputConfig,
    sink: JsonSink,
    today: NaiveDate,
}

impl Pipeline {
    /// Build a pipeline. Every schema a template references must be loaded.
    pub fn new(
        runner: BatchRunner,
        config: &PipelineConfig,
        schemas: Schemas,
    ) -> Result<Self, AgentError> {
        let templates = StageTemplates::from_config(config);
        for template in templates.all() {
            if let Some(name) = &template.schema {
                if schemas.get(name).is_none() {
                    return Err(AgentError::Config(format!(
                        "Template for '{}' references unknown schema '{name}'",
                        template.agent.role
                    )));
                }
            }
        }

        Ok(Self {
            runner,
            templates,
            schemas,
            rules: config.refine.rules.clone(),
            granularity: config.refine.granularity,
            summarize_portfolio: config.refine.summarize_portfolio,
            output: config.output.clone(),
            sink: JsonSink::new(&config.output.dir),
            today: Utc::now().date_naive(),
        })
    }

    /// Pin the date injected into prompts.
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_granularity(mut self, granularity: RefineGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn sink(&self) -> &JsonSink {
        &self.sink
    }

    pub async fn run(&self) -> Result<PipelineReport, AgentError> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let mut report = PipelineReport {
            run_id,
            started_at: Utc::now(),
            stages: Vec::new(),
            hypotheses: 0,
            artifacts: Vec::new(),
            elapsed_ms: 0,
        };
        info!(%run_id, policy = %self.runner.policy(), granularity = %self.granularity, "Starting pipeline");

        let research = self.research(&mut report).await.inspect_err(|e| {
            error!(%run_id, stage = %Stage::Research, error = %e, "Stage failed");
        })?;
        let hypothesis = self
            .hypothesize(&research, &mut report)
            .await
            .inspect_err(|e| {
                error!(%run_id, stage = %Stage::Hypothesize, error = %e, "Stage failed");
            })?;
        self.refine(&hypothesis, &mut report)
            .await
            .inspect_err(|e| {
                error!(%run_id, stage = %Stage::Refine, error = %e, "Stage failed");
            })?;

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            %run_id,
            stage = %Stage::Done,
            artifacts = report.artifacts.len(),
            elapsed_ms = report.elapsed_ms,
            "Pipeline complete"
        );
        Ok(report)
    }

    pub fn research_units(&self) -> Result<Vec<WorkUnit>, AgentError> {
        self.templates
            .research
            .iter()
            .map(|topic| {
                self.instantiate(&topic.template, &[])
                    .map(|unit| unit.with_subject(&topic.name))
            })
            .collect()
    }

    pub fn trader_unit(&self, research: &Value) -> Result<WorkUnit, AgentError> {
        let research = serde_json::to_string_pretty(research)?;
        self.instantiate(
            &self.templates.trader,
            &[(RESEARCH_PLACEHOLDER, research.as_str())],
        )
    }

    /// Critic, refiner and portfolio units, in that order per subject.
    pub fn refine_units(&self, hypotheses: &[Value]) -> Result<Vec<WorkUnit>, AgentError> {
        let subjects: Vec<(String, String)> = match self.granularity {
            RefineGranularity::PerHypothesis => hypotheses
                .iter()
                .enumerate()
                .map(|(i, h)| -> Result<(String, String), serde_json::Error> {
                    Ok((hypothesis_subject(i), serde_json::to_string_pretty(h)?))
                })
                .collect::<Result<_, _>>()?,
            RefineGranularity::PerBatch => vec![(
                BATCH_SUBJECT.to_string(),
                serde_json::to_string_pretty(hypotheses)?,
            )],
        };

        let mut units = Vec::with_capacity(subjects.len() * 3);
        for (subject, text) in &subjects {
            for template in [
                &self.templates.critic,
                &self.templates.refiner,
                &self.templates.portfolio,
            ] {
                let unit = self.instantiate(template, &[(HYPOTHESIS_PLACEHOLDER, text.as_str())])?;
                units.push(unit.with_subject(subject));
            }
        }
        Ok(units)
    }

    fn instantiate(
        &self,
        template: &RoleTemplate,
        vars: &[(&str, &str)],
    ) -> Result<WorkUnit, AgentError> {
        let schema = match &template.schema {
            Some(name) => self.schemas.get(name).ok_or_else(|| {
                AgentError::Config(format!("Schema '{name}' is not loaded"))
            })?,
            None => "",
        };
        let date = date_line(self.today);

        let mut all = vars.to_vec();
        all.push((SCHEMA_PLACEHOLDER, schema));
        all.push((DATE_PLACEHOLDER, date.as_str()));

        Ok(WorkUnit::new(
            TaskSpec {
                description: render(&template.description, &all),
                expected_output: render(&template.expected_output, &all),
            },
            template.agent.clone(),
        ))
    }

    fn persist<'a>(
        &self,
        report: &mut PipelineReport,
        name: &str,
        payload: impl Into<Payload<'a>>,
    ) -> Result<(), AgentError> {
        let path = self.sink.write(name, payload)?;
        report.artifacts.push(path);
        Ok(())
    }

    async fn research(&self, report: &mut PipelineReport) -> Result<Value, AgentError> {
        let started = Instant::now();
        let units = self.research_units()?;
        info!(stage = %Stage::Research, units = units.len(), "Dispatching research");

        let results = self.runner.run_batch(units).await?;
        let stage = StageReport::from_results(Stage::Research, &results, started);
        if stage.failures > 0 {
            warn!(stage = %Stage::Research, failures = stage.failures, "Some research units failed");
        }

        let document = research_document(&results);
        self.persist(report, &self.output.research, &document)?;
        info!(stage = %Stage::Research, units = stage.units, elapsed_ms = stage.elapsed_ms, "Stage complete");
        report.stages.push(stage);
        Ok(document)
    }

    async fn hypothesize(
        &self,
        research: &Value,
        report: &mut PipelineReport,
    ) -> Result<Value, AgentError> {
        let started = Instant::now();
        let unit = self.trader_unit(research)?;
        info!(stage = %Stage::Hypothesize, role = %unit.role(), "Dispatching trader");

        let results = self.runner.run_batch(vec![unit]).await?;
        let stage = StageReport::from_results(Stage::Hypothesize, &results, started);
        let result = results
            .into_iter()
            .next()
            .ok_or_else(|| stage_error(Stage::Hypothesize, "no result for trader unit"))?;

        let raw = match result.outcome {
            UnitOutcome::Completed { raw } => raw,
            UnitOutcome::Failed { error } => {
                return Err(stage_error(
                    Stage::Hypothesize,
                    format!("trader unit failed: {error}"),
                ))
            }
        };
        self.persist(report, &self.output.raw_hypothesis, raw.as_str())?;

        let hypothesis = parse_json(&raw).map_err(|e| {
            stage_error(Stage::Hypothesize, format!("unparseable hypothesis: {e}"))
        })?;
        info!(stage = %Stage::Hypothesize, elapsed_ms = stage.elapsed_ms, "Stage complete");
        report.stages.push(stage);
        Ok(hypothesis)
    }

    async fn refine(
        &self,
        hypothesis: &Value,
        report: &mut PipelineReport,
    ) -> Result<(), AgentError> {
        let started = Instant::now();
        let hypotheses = normalize_hypotheses(hypothesis);
        self.persist(report, &self.output.hypotheses, &Value::Array(hypotheses.clone()))?;
        if hypotheses.is_empty() {
            return Err(stage_error(Stage::Refine, "no hypotheses to refine"));
        }
        report.hypotheses = hypotheses.len();

        let units = self.refine_units(&hypotheses)?;
        info!(
            stage = %Stage::Refine,
            hypotheses = hypotheses.len(),
            units = units.len(),
            granularity = %self.granularity,
            "Dispatching refinement"
        );

        let results = self.runner.run_batch(units).await?;
        let stage = StageReport::from_results(Stage::Refine, &results, started);
        if stage.failures > 0 {
            warn!(stage = %Stage::Refine, failures = stage.failures, "Some refinement units failed");
        }

        let buckets = classify(&results, &self.rules);
        for (bucket, entries) in &buckets {
            let file = self.output.bucket_file(bucket);
            self.persist(report, &file, &serde_json::to_value(entries)?)?;
        }

        if self.summarize_portfolio {
            let summaries = portfolio_summaries(&results, &self.templates.portfolio.agent.role);
            self.persist(
                report,
                &self.output.portfolio_summary,
                &serde_json::to_value(&summaries)?,
            )?;
        }

        info!(stage = %Stage::Refine, units = stage.units, elapsed_ms = stage.elapsed_ms, "Stage complete");
        report.stages.push(stage);
        Ok(())
    }
}

/// Flatten every payload produced by the portfolio role that carries assets.
pub fn portfolio_summaries(results: &[WorkResult], role: &str) -> Vec<PortfolioSummary> {
    results
        .iter()
        .filter(|result| result.agent == role)
        .filter_map(|result| {
            let payload = result_payload(result);
            let summary = PortfolioSummary::from_payload(&payload, result.subject.as_deref());
            if summary.is_none() {
                warn!(subject = ?result.subject, "Portfolio payload has no assets, skipping summary");
            }
            summary
        })
        .inspect(|summary| {
            if !summary.fully_allocated {
                warn!(
                    subject = ?summary.subject,
                    total_weight = %summary.total_weight,
                    "Portfolio weights do not sum to 1"
                );
            }
        })
        .collect()
}
