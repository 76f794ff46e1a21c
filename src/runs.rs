//! Run processor: executes every scenario of a project for one run.

use crate::definition;
use crate::domain::{RunState, ScenarioRunDetails, UpdateRunRequest};
use crate::error::ProcessError;
use crate::events::{Processor, Producer};
use crate::executor::ScenarioRunner;
use crate::model::ExecuteResult;
use crate::repository::{RunRepository, ScenarioRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

pub struct RunProcessor {
    scenarios: Arc<dyn ScenarioRepository>,
    runs: Arc<dyn RunRepository>,
    completions: Arc<dyn Producer<Uuid>>,
    runner: Arc<dyn ScenarioRunner>,
}

impl RunProcessor {
    pub fn new(
        scenarios: Arc<dyn ScenarioRepository>,
        runs: Arc<dyn RunRepository>,
        completions: Arc<dyn Producer<Uuid>>,
        runner: Arc<dyn ScenarioRunner>,
    ) -> Self {
        Self {
            scenarios,
            runs,
            completions,
            runner,
        }
    }

    /// Decode, parse and play every scenario of the project in order.
    /// The first error ends processing.
    async fn process_project(&self, project_id: Uuid) -> Result<Vec<ExecuteResult>, ProcessError> {
        let scenarios = self.scenarios.get_for_project(project_id).await?;
        let mut results = Vec::with_capacity(scenarios.len());

        for stored in scenarios {
            info!(scenario_id = %stored.id, name = %stored.name, "processing scenario");
            let text = definition::decode_spec(&stored.spec)?;
            let mut scenario = definition::parse_definition(&stored.name, &text)?;
            results.push(self.runner.play(&mut scenario).await?);
        }

        Ok(results)
    }
}

#[async_trait]
impl Processor<Uuid> for RunProcessor {
    #[instrument(skip(self))]
    async fn process(&self, run_id: Uuid) -> Result<Uuid, ProcessError> {
        let run = self
            .runs
            .update(UpdateRunRequest::state(run_id, RunState::Running))
            .await?;
        info!(project_id = %run.project_id, "processing project");

        let results = match self.process_project(run.project_id).await {
            Ok(results) => results,
            Err(err) => {
                error!("run failed: {err}");
                let failure = UpdateRunRequest::failure(run_id, err.to_string());
                return Err(match self.runs.update(failure).await {
                    Ok(_) => err,
                    Err(update) => ProcessError::Combined {
                        error: Box::new(err),
                        update,
                    },
                });
            }
        };

        let success = results.iter().all(|r| r.success);
        let details: Vec<ScenarioRunDetails> = results.iter().map(Into::into).collect();
        self.runs
            .update(UpdateRunRequest::completed(run_id, success, details))
            .await?;
        info!(project_id = %run.project_id, success, "project processed");

        self.completions.produce(run_id).await?;
        Ok(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Run;
    use crate::error::{EventError, RepositoryError};
    use crate::executor::tests::{json_response, ScriptedClient};
    use crate::executor::Executor;
    use crate::repository::{MemoryRepository, ProjectRepository};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProducer {
        produced: Mutex<Vec<Uuid>>,
        closed: bool,
    }

    #[async_trait]
    impl Producer<Uuid> for RecordingProducer {
        async fn produce(&self, id: Uuid) -> Result<(), EventError> {
            if self.closed {
                return Err(EventError::ChannelClosed);
            }
            self.produced.lock().unwrap().push(id);
            Ok(())
        }
    }

    /// Delegates to the memory repository but refuses failure updates.
    struct NoFailureUpdates(Arc<MemoryRepository>);

    #[async_trait]
    impl RunRepository for NoFailureUpdates {
        async fn create(&self, project_id: Uuid) -> Result<Run, RepositoryError> {
            RunRepository::create(self.0.as_ref(), project_id).await
        }

        async fn get(&self, id: Uuid) -> Result<Run, RepositoryError> {
            self.0.get(id).await
        }

        async fn update(&self, request: UpdateRunRequest) -> Result<Run, RepositoryError> {
            if request.state == RunState::Failure {
                return Err(RepositoryError::Other("database is gone".to_string()));
            }
            self.0.update(request).await
        }
    }

    const OK_SCENARIO: &str = r#"
version: "1"
type: http
steps:
  - name: health
    request:
      url: http://localhost/health
    validation:
      status:
        assertion: equal
        value: 200
"#;

    const FAILING_SCENARIO: &str = r#"
version: "1"
type: http
steps:
  - name: health
    request:
      url: http://localhost/health
    validation:
      status:
        assertion: equal
        value: 201
"#;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        producer: Arc<RecordingProducer>,
        client: Arc<ScriptedClient>,
        run_id: Uuid,
        project_id: Uuid,
    }

    async fn fixture(scenarios: &[&str]) -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let project = ProjectRepository::create(repo.as_ref(), "shop")
            .await
            .unwrap();
        for (i, text) in scenarios.iter().enumerate() {
            repo.add_scenario(project.id, &format!("scenario-{i}"), text)
                .await;
        }
        let run = RunRepository::create(repo.as_ref(), project.id)
            .await
            .unwrap();
        Fixture {
            repo,
            producer: Arc::new(RecordingProducer::default()),
            client: Arc::new(ScriptedClient::always(json_response(200, "{}"))),
            run_id: run.id,
            project_id: project.id,
        }
    }

    fn processor(
        f: &Fixture,
        runs: Arc<dyn RunRepository>,
        producer: Arc<dyn Producer<Uuid>>,
    ) -> RunProcessor {
        RunProcessor::new(
            f.repo.clone(),
            runs,
            producer,
            Arc::new(Executor::new(f.client.clone())),
        )
    }

    #[tokio::test]
    async fn test_successful_run_completes_and_notifies() {
        let f = fixture(&[OK_SCENARIO, OK_SCENARIO]).await;
        let p = processor(&f, f.repo.clone(), f.producer.clone());

        let id = p.process(f.run_id).await.unwrap();

        assert_eq!(id, f.run_id);
        let run = f.repo.get(f.run_id).await.unwrap();
        assert_eq!(run.state, RunState::Completed);
        assert!(run.success);
        assert_eq!(run.scenario_run_details.len(), 2);
        assert_eq!(run.scenario_run_details[0].name, "scenario-0");
        assert_eq!(run.scenario_run_details[0].assertions, 1);
        assert_eq!(*f.producer.produced.lock().unwrap(), vec![f.run_id]);
        assert_eq!(f.client.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_assertion_still_completes_run() {
        let f = fixture(&[OK_SCENARIO, FAILING_SCENARIO]).await;
        let p = processor(&f, f.repo.clone(), f.producer.clone());

        p.process(f.run_id).await.unwrap();

        let run = f.repo.get(f.run_id).await.unwrap();
        assert_eq!(run.state, RunState::Completed);
        assert!(!run.success);
        assert!(run.scenario_run_details[0].success);
        assert!(!run.scenario_run_details[1].success);
        assert!(!run.scenario_run_details[1].steps[0].success);
        assert_eq!(f.producer.produced.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_definition_error_marks_run_failed() {
        let f = fixture(&[OK_SCENARIO, "version: '1'\ntype: grpc\n"]).await;
        let p = processor(&f, f.repo.clone(), f.producer.clone());

        let err = p.process(f.run_id).await.unwrap_err();

        assert!(matches!(err, ProcessError::Definition(_)));
        let run = f.repo.get(f.run_id).await.unwrap();
        assert_eq!(run.state, RunState::Failure);
        assert!(!run.success);
        assert_eq!(
            run.error_message.as_deref(),
            Some("unsupported scenario type 'grpc'")
        );
        assert!(f.producer.produced.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_update_error_is_combined() {
        let f = fixture(&["version: '1'\ntype: grpc\n"]).await;
        let runs = Arc::new(NoFailureUpdates(f.repo.clone()));
        let p = processor(&f, runs, f.producer.clone());

        let err = p.process(f.run_id).await.unwrap_err();

        match &err {
            ProcessError::Combined { error, update } => {
                assert!(matches!(**error, ProcessError::Definition(_)));
                assert_eq!(
                    *update,
                    RepositoryError::Other("database is gone".to_string())
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "unsupported scenario type 'grpc' repository error: database is gone"
        );
        assert_eq!(
            f.repo.get(f.run_id).await.unwrap().state,
            RunState::Running
        );
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_processed() {
        let f = fixture(&[OK_SCENARIO]).await;
        let p = processor(&f, f.repo.clone(), f.producer.clone());

        let err = p.process(Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(
            err,
            ProcessError::Repository(RepositoryError::NotFound { .. })
        ));
        assert_eq!(f.client.calls(), 0);
        assert_eq!(
            f.repo.get_for_project(f.project_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_completion_produce_error_is_returned() {
        let f = fixture(&[OK_SCENARIO]).await;
        let producer = Arc::new(RecordingProducer {
            closed: true,
            ..Default::default()
        });
        let p = processor(&f, f.repo.clone(), producer);

        let err = p.process(f.run_id).await.unwrap_err();

        assert!(matches!(err, ProcessError::Event(EventError::ChannelClosed)));
        assert_eq!(
            f.repo.get(f.run_id).await.unwrap().state,
            RunState::Completed
        );
    }
}
