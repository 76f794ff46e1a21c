//! Completion processing: summarises finished runs for notifiers.

use crate::domain::ProjectRun;
use crate::error::ProcessError;
use crate::events::Processor;
use crate::repository::{ProjectRepository, RunRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Receives the summary of every finished run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_completion(&self, project_run: &ProjectRun) -> Result<(), ProcessError>;
}

pub struct CompletionProcessor {
    notifiers: Vec<Arc<dyn Notifier>>,
    runs: Arc<dyn RunRepository>,
    projects: Arc<dyn ProjectRepository>,
}

impl CompletionProcessor {
    pub fn new(
        notifiers: Vec<Arc<dyn Notifier>>,
        runs: Arc<dyn RunRepository>,
        projects: Arc<dyn ProjectRepository>,
    ) -> Self {
        Self {
            notifiers,
            runs,
            projects,
        }
    }
}

#[async_trait]
impl Processor<Uuid> for CompletionProcessor {
    #[instrument(skip(self))]
    async fn process(&self, run_id: Uuid) -> Result<Uuid, ProcessError> {
        let run = self.runs.get(run_id).await?;
        let project = self.projects.get_by_id(run.project_id).await?;
        let project_run = ProjectRun::new(&project, &run);

        for notifier in &self.notifiers {
            notifier.send_completion(&project_run).await?;
        }
        Ok(run_id)
    }
}

/// Writes run summaries to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_completion(&self, project_run: &ProjectRun) -> Result<(), ProcessError> {
        info!(
            project = %project_run.name,
            success = project_run.success,
            version = %project_run.version,
            duration_ms = project_run.duration.as_millis() as u64,
            "run finished"
        );
        for scenario in &project_run.scenario_runs {
            if scenario.success {
                info!(
                    "  {} ({}/{} steps passed, {} ms)",
                    scenario.name,
                    scenario.successful_assertions,
                    scenario.assertions,
                    scenario.duration.as_millis()
                );
            } else {
                warn!(
                    "  {} ({}/{} steps passed, {} ms)",
                    scenario.name,
                    scenario.successful_assertions,
                    scenario.assertions,
                    scenario.duration.as_millis()
                );
            }
        }
        Ok(())
    }
}
