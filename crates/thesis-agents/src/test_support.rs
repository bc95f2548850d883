//! Test support module providing a scripted unit executor.
//!
//! `ScriptedExecutor` stands in for the agent runtime: outputs, delays,
//! failures and panics are keyed by role-label substring, and every call is
//! recorded so tests can inspect the prompts a stage built.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thesis_models::work::{AgentProfile, TaskSpec, WorkUnit};

use crate::error::AgentError;
use crate::executor::UnitExecutor;

type Responder = Arc<dyn Fn(&WorkUnit) -> String + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Respond(Responder),
    Delay(Duration),
    Fail,
    Panic,
}

/// Executor whose behavior is scripted per role.
///
/// Roles without a scripted response answer with
/// `{"role": .., "subject": .., "task": ..}` so tests can check pairing.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, Behavior)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<WorkUnit>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer units whose role contains `role` with a fixed output.
    pub fn respond(self, role: &str, output: &str) -> Self {
        let output = output.to_string();
        self.respond_with(role, move |_| output.clone())
    }

    pub fn respond_with<F>(mut self, role: &str, responder: F) -> Self
    where
        F: Fn(&WorkUnit) -> String + Send + Sync + 'static,
    {
        self.rules
            .push((role.to_string(), Behavior::Respond(Arc::new(responder))));
        self
    }

    pub fn delay(mut self, role: &str, delay: Duration) -> Self {
        self.rules.push((role.to_string(), Behavior::Delay(delay)));
        self
    }

    pub fn fail(mut self, role: &str) -> Self {
        self.rules.push((role.to_string(), Behavior::Fail));
        self
    }

    pub fn panic_on(mut self, role: &str) -> Self {
        self.rules.push((role.to_string(), Behavior::Panic));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Units executed so far, in call order.
    pub fn seen(&self) -> Vec<WorkUnit> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn behaviors(&self, role: &str) -> Vec<Behavior> {
        self.rules
            .iter()
            .filter(|(key, _)| role.contains(key.as_str()))
            .map(|(_, behavior)| behavior.clone())
            .collect()
    }
}

fn echo(unit: &WorkUnit) -> String {
    serde_json::json!({
        "role": unit.agent.role,
        "subject": unit.subject,
        "task": unit.task.description,
    })
    .to_string()
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UnitExecutor for ScriptedExecutor {
    async fn execute(&self, unit: &WorkUnit) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(unit.clone());
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut output = None;
        for behavior in self.behaviors(unit.role()) {
            match behavior {
                Behavior::Delay(delay) => tokio::time::sleep(delay).await,
                Behavior::Fail => {
                    return Err(AgentError::Cli(format!(
                        "Scripted failure for {}",
                        unit.role()
                    )))
                }
                Behavior::Panic => panic!("Scripted panic for {}", unit.role()),
                Behavior::Respond(responder) => {
                    output.get_or_insert_with(|| responder(unit));
                }
            }
        }

        Ok(output.unwrap_or_else(|| echo(unit)))
    }
}

/// A bare unit with the given role and task description.
pub fn unit(role: &str, description: &str) -> WorkUnit {
    WorkUnit::new(
        TaskSpec {
            description: description.to_string(),
            expected_output: String::new(),
        },
        AgentProfile {
            role: role.to_string(),
            goal: String::new(),
            backstory: String::new(),
            model: None,
            tools: vec![],
        },
    )
}
