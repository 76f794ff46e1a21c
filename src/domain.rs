//! Run-level domain model.

use crate::model::{ExecuteResult, ExecuteStepResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of a run.
///
/// `pending → running → {completed, failure, cancelled}`; a pending run
/// may also be cancelled directly. No state is ever re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failure,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failure | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failure | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One execution of all scenarios of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub project_id: Uuid,
    pub state: RunState,
    pub success: bool,
    pub error_message: Option<String>,
    pub scenario_run_details: Vec<ScenarioRunDetails>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(project_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            state: RunState::Pending,
            success: false,
            error_message: None,
            scenario_run_details: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRunDetails {
    pub name: String,
    pub duration: Duration,
    pub assertions: usize,
    pub steps: Vec<StepRunDetails>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRunDetails {
    pub name: String,
    pub assertions: usize,
    pub url: String,
    pub request_duration: Duration,
    pub duration: Duration,
    pub retries: u32,
    pub success: bool,
}

impl From<&ExecuteResult> for ScenarioRunDetails {
    fn from(result: &ExecuteResult) -> Self {
        Self {
            name: result.name.clone(),
            duration: result.total_execution_time,
            assertions: result.total_assertions,
            steps: result.step_results.iter().map(Into::into).collect(),
            success: result.success,
        }
    }
}

impl From<&ExecuteStepResult> for StepRunDetails {
    fn from(result: &ExecuteStepResult) -> Self {
        Self {
            name: result.name.clone(),
            assertions: result.assertions,
            url: result.url.clone(),
            request_duration: result.request_duration,
            duration: result.duration,
            retries: result.retries,
            success: result.success,
        }
    }
}

/// Changes applied to a run by [`crate::repository::RunRepository::update`].
#[derive(Debug, Clone)]
pub struct UpdateRunRequest {
    pub id: Uuid,
    pub state: RunState,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub scenario_run_details: Option<Vec<ScenarioRunDetails>>,
}

impl UpdateRunRequest {
    pub fn state(id: Uuid, state: RunState) -> Self {
        Self {
            id,
            state,
            success: None,
            error_message: None,
            scenario_run_details: None,
        }
    }

    pub fn failure(id: Uuid, message: String) -> Self {
        Self {
            error_message: Some(message),
            success: Some(false),
            ..Self::state(id, RunState::Failure)
        }
    }

    pub fn completed(id: Uuid, success: bool, details: Vec<ScenarioRunDetails>) -> Self {
        Self {
            success: Some(success),
            scenario_run_details: Some(details),
            ..Self::state(id, RunState::Completed)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecType {
    Yaml,
}

/// A scenario as stored for a project. `spec` holds the base64 encoded
/// definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredScenario {
    pub id: Uuid,
    pub name: String,
    pub spec_type: SpecType,
    pub spec: String,
    pub project_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
}

/// Summary of a finished run, handed to notifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRun {
    pub name: String,
    pub success: bool,
    pub version: String,
    pub duration: Duration,
    pub time: DateTime<Utc>,
    pub scenario_runs: Vec<ScenarioRunSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRunSummary {
    pub name: String,
    pub success: bool,
    pub duration: Duration,
    /// Number of steps in the scenario.
    pub assertions: usize,
    /// Number of steps that succeeded.
    pub successful_assertions: usize,
}

impl ProjectRun {
    pub fn new(project: &Project, run: &Run) -> Self {
        let scenario_runs: Vec<ScenarioRunSummary> = run
            .scenario_run_details
            .iter()
            .map(|s| ScenarioRunSummary {
                name: s.name.clone(),
                success: s.success,
                duration: s.duration,
                assertions: s.steps.len(),
                successful_assertions: s
                    .steps
                    .iter()
                    .filter(|step| step.success)
                    .count(),
            })
            .collect();

        Self {
            name: project.name.clone(),
            success: run.success,
            version: "latest".to_string(),
            duration: scenario_runs.iter().map(|s| s.duration).sum(),
            time: run.created_at,
            scenario_runs,
        }
    }
}
