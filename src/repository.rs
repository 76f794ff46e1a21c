//! Persistence collaborators of the run pipeline and an in-memory store.

use crate::definition;
use crate::domain::{Project, Run, SpecType, StoredScenario, UpdateRunRequest};
use crate::error::RepositoryError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    /// All scenarios of a project, in insertion order.
    async fn get_for_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<StoredScenario>, RepositoryError>;
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Create a `pending` run for the project.
    async fn create(&self, project_id: Uuid) -> Result<Run, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Run, RepositoryError>;

    /// Apply an update and return the stored run.
    async fn update(&self, request: UpdateRunRequest) -> Result<Run, RepositoryError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, name: &str) -> Result<Project, RepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Project, RepositoryError>;

    /// Look a project up by its exact name.
    async fn get_by_name(&self, name: &str) -> Result<Project, RepositoryError>;
}

/// Process-local implementation of every repository trait.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    projects: RwLock<HashMap<Uuid, Project>>,
    scenarios: RwLock<Vec<StoredScenario>>,
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a scenario definition for a project, base64 encoding it.
    pub async fn add_scenario(
        &self,
        project_id: Uuid,
        name: &str,
        definition: &str,
    ) -> StoredScenario {
        let scenario = StoredScenario {
            id: Uuid::new_v4(),
            name: name.to_string(),
            spec_type: SpecType::Yaml,
            spec: definition::encode_spec(definition),
            project_id,
        };
        self.scenarios.write().await.push(scenario.clone());
        scenario
    }
}

#[async_trait]
impl ScenarioRepository for MemoryRepository {
    async fn get_for_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<StoredScenario>, RepositoryError> {
        Ok(self
            .scenarios
            .read()
            .await
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RunRepository for MemoryRepository {
    async fn create(&self, project_id: Uuid) -> Result<Run, RepositoryError> {
        let run = Run::new(project_id);
        self.runs.write().await.insert(run.id, run.clone());
        debug!(run_id = %run.id, "created run");
        Ok(run)
    }

    async fn get(&self, id: Uuid) -> Result<Run, RepositoryError> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("run", id))
    }

    async fn update(&self, request: UpdateRunRequest) -> Result<Run, RepositoryError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&request.id)
            .ok_or_else(|| RepositoryError::not_found("run", request.id))?;

        if !run.state.can_transition_to(request.state) {
            return Err(RepositoryError::InvalidTransition {
                id: run.id,
                from: run.state,
                to: request.state,
            });
        }

        debug!(run_id = %run.id, from = %run.state, to = %request.state, "updating run");
        run.state = request.state;
        if let Some(success) = request.success {
            run.success = success;
        }
        if let Some(message) = request.error_message {
            run.error_message = Some(message);
        }
        if let Some(details) = request.scenario_run_details {
            run.scenario_run_details = details;
        }
        Ok(run.clone())
    }
}

#[async_trait]
impl ProjectRepository for MemoryRepository {
    async fn create(&self, name: &str) -> Result<Project, RepositoryError> {
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.projects
            .write()
            .await
            .insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Project, RepositoryError> {
        self.projects
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("project", id))
    }

    async fn get_by_name(&self, name: &str) -> Result<Project, RepositoryError> {
        self.projects
            .read()
            .await
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("project", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunState;

    #[tokio::test]
    async fn test_scenarios_are_scoped_to_project() {
        let repo = MemoryRepository::new();
        let first = ProjectRepository::create(&repo, "first").await.unwrap();
        let second = ProjectRepository::create(&repo, "second").await.unwrap();
        repo.add_scenario(first.id, "a", "type: http\n").await;
        repo.add_scenario(second.id, "b", "type: http\n").await;
        repo.add_scenario(first.id, "c", "type: http\n").await;

        let scenarios = repo.get_for_project(first.id).await.unwrap();

        let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(
            definition::decode_spec(&scenarios[0].spec).unwrap(),
            "type: http\n"
        );
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let repo = MemoryRepository::new();
        let project = ProjectRepository::create(&repo, "p").await.unwrap();
        let run = RunRepository::create(&repo, project.id).await.unwrap();
        assert_eq!(run.state, RunState::Pending);

        let running = repo
            .update(UpdateRunRequest::state(run.id, RunState::Running))
            .await
            .unwrap();
        assert_eq!(running.state, RunState::Running);

        let done = repo
            .update(UpdateRunRequest::completed(run.id, true, vec![]))
            .await
            .unwrap();
        assert_eq!(done.state, RunState::Completed);
        assert!(done.success);
        assert_eq!(repo.get(run.id).await.unwrap().state, RunState::Completed);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected() {
        let repo = MemoryRepository::new();
        let run = RunRepository::create(&repo, Uuid::new_v4()).await.unwrap();

        let err = repo
            .update(UpdateRunRequest::completed(run.id, true, vec![]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RepositoryError::InvalidTransition {
                id: run.id,
                from: RunState::Pending,
                to: RunState::Completed,
            }
        );
        assert_eq!(repo.get(run.id).await.unwrap().state, RunState::Pending);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let repo = MemoryRepository::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            repo.get(id).await,
            Err(RepositoryError::NotFound { entity: "run", .. })
        ));
        assert!(matches!(
            repo.update(UpdateRunRequest::state(id, RunState::Running)).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(
            repo.get_by_id(id).await,
            Err(RepositoryError::NotFound { entity: "project", .. })
        ));
    }

    #[tokio::test]
    async fn test_project_lookup_by_name() {
        let repo = MemoryRepository::new();
        let accounts = ProjectRepository::create(&repo, "accounts").await.unwrap();
        ProjectRepository::create(&repo, "billing").await.unwrap();

        assert_eq!(repo.get_by_name("accounts").await.unwrap().id, accounts.id);
        assert_eq!(
            repo.get_by_name("Accounts").await.unwrap_err(),
            RepositoryError::not_found("project", "Accounts")
        );
        assert_eq!(
            repo.get_by_name("missing").await.unwrap_err().to_string(),
            "project missing not found"
        );
    }
}
