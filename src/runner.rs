//! Runner service: turns a run request for a project into a queued run.

use crate::domain::Run;
use crate::error::ProcessError;
use crate::events::Producer;
use crate::repository::{ProjectRepository, RunRepository};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

pub struct Runner {
    projects: Arc<dyn ProjectRepository>,
    runs: Arc<dyn RunRepository>,
    producer: Arc<dyn Producer<Uuid>>,
}

impl Runner {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        runs: Arc<dyn RunRepository>,
        producer: Arc<dyn Producer<Uuid>>,
    ) -> Self {
        Self {
            projects,
            runs,
            producer,
        }
    }

    /// Create a `pending` run for the project and hand its id to the runs
    /// queue. Waits while the queue has no free capacity.
    #[instrument(skip(self))]
    pub async fn run_project(&self, project_id: Uuid) -> Result<Run, ProcessError> {
        let project = self.projects.get_by_id(project_id).await?;
        self.queue_run(project.id).await
    }

    /// Same as [`Runner::run_project`] for the project named `name`.
    #[instrument(skip(self))]
    pub async fn run_project_by_name(&self, name: &str) -> Result<Run, ProcessError> {
        let project = self.projects.get_by_name(name).await.inspect_err(|e| {
            error!("failed to get project by name: {e}");
        })?;
        self.queue_run(project.id).await
    }

    async fn queue_run(&self, project_id: Uuid) -> Result<Run, ProcessError> {
        let run = self.runs.create(project_id).await.inspect_err(|e| {
            error!("failed to create run: {e}");
        })?;
        // A run whose id could not be queued stays pending.
        self.producer.produce(run.id).await.inspect_err(|e| {
            error!(run_id = %run.id, "failed to produce run for project: {e}");
        })?;
        info!(run_id = %run.id, "queued run");
        Ok(run)
    }
}
