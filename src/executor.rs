//! Scenario and step execution.

use crate::error::{ResolveError, StepFailure};
use crate::http_client::HttpClient;
use crate::model::{ExecuteResult, ExecuteStepResult, Scenario, Step};
use crate::{resolver, validator};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Wait between attempts when a step has no retry policy.
const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(1);

/// Plays scenarios.
#[async_trait]
pub trait ScenarioRunner: Send + Sync {
    /// Execute every step of `scenario` in order.
    ///
    /// Step failures are recorded in the result; only a resolver error
    /// ends the scenario early and is returned.
    async fn play(&self, scenario: &mut Scenario) -> Result<ExecuteResult, ResolveError>;
}

/// HTTP scenario executor sharing one client across all scenarios.
#[derive(Clone)]
pub struct Executor {
    client: Arc<dyn HttpClient>,
}

impl Executor {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// Run a step with its retry policy.
    ///
    /// `retries` on the result is the number of retries still available
    /// when the final attempt ran: it counts down from `attempts` and is
    /// 0 once every retry was used.
    async fn play_step(&self, step: &mut Step) -> ExecuteStepResult {
        let (attempts, timeout) = match &step.retry {
            Some(retry) => (retry.attempts, retry.timeout),
            None => (0, DEFAULT_RETRY_TIMEOUT),
        };

        let start = Instant::now();
        let mut remaining = attempts;
        loop {
            let (mut result, outcome) = self.execute_and_validate(step).await;
            result.retries = remaining;

            match outcome {
                Ok(()) => {
                    result.duration = start.elapsed();
                    return result;
                }
                Err(failure) => {
                    result.error = Some(failure.to_string());
                    if remaining == 0 {
                        warn!(step = %step.name, "step failed: {}", failure);
                        result.duration = start.elapsed();
                        return result;
                    }
                    debug!(
                        "retrying step {} in {:?} ({} retries left)",
                        step.name, timeout, remaining
                    );
                    tokio::time::sleep(timeout).await;
                    remaining -= 1;
                }
            }
        }
    }

    /// Send the step's request once and validate the response.
    ///
    /// The step is marked executed and keeps the response whenever the
    /// call returned, even if validation fails afterwards.
    pub async fn execute_and_validate(
        &self,
        step: &mut Step,
    ) -> (ExecuteStepResult, Result<(), StepFailure>) {
        let mut result = ExecuteStepResult {
            name: step.name.clone(),
            url: step.request.url.clone(),
            assertions: step.assertion_count(),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self.client.send(&step.request).await;
        result.request_duration = start.elapsed();

        let response = match response {
            Ok(response) => response,
            Err(err) => return (result, Err(err.into())),
        };

        step.executed = true;
        let outcome = validator::validate(step, &response);
        step.result = Some(response);
        result.success = outcome.is_ok();

        (result, outcome.map_err(StepFailure::from))
    }
}

#[async_trait]
impl ScenarioRunner for Executor {
    #[instrument(skip(self, scenario), fields(name = %scenario.name))]
    async fn play(&self, scenario: &mut Scenario) -> Result<ExecuteResult, ResolveError> {
        let start = Instant::now();
        let mut success = true;
        let mut total_assertions = 0;
        let mut step_results = Vec::with_capacity(scenario.steps.len());

        info!("Starting scenario: {}", scenario.name);

        for index in 0..scenario.steps.len() {
            info!(
                "Running step {}/{}: {}",
                index + 1,
                scenario.steps.len(),
                scenario.steps[index].name
            );

            let resolved = resolver::resolve_step(&scenario.steps, index)?;
            scenario.steps[index] = resolved;
            let step_result = self.play_step(&mut scenario.steps[index]).await;

            total_assertions += step_result.assertions;
            success = success && step_result.success;
            step_results.push(step_result);
        }

        let result = ExecuteResult {
            name: scenario.name.clone(),
            total_execution_time: start.elapsed(),
            total_assertions,
            step_results,
            success,
        };

        info!(
            "Scenario finished: {} ({} ms) - Success: {}",
            result.name,
            result.total_execution_time.as_millis(),
            result.success
        );

        Ok(result)
    }
}
