//! Error types shared across the engine and the run pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while turning a stored definition into a scenario.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to decode scenario spec: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("scenario spec is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid yaml definition for scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported scenario type '{0}'")]
    UnsupportedType(String),
}

/// Errors raised by the dynamic (cross-step) value resolver.
///
/// Any of these aborts the remaining steps of the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid path {0}")]
    InvalidPath(String),

    #[error("step {step} requires input from non executed step {dependency}")]
    NonExecutedStep { step: String, dependency: String },

    #[error("key {key} not found in {body} for step {step}")]
    KeyNotFound {
        step: String,
        key: String,
        body: String,
    },
}

/// A failed assertion on a step response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed at step \"{step}\" for request to {url}: {message}")]
pub struct AssertionError {
    pub step: String,
    pub url: String,
    pub message: String,
}

/// Failure of the HTTP call itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Why one attempt of a step did not succeed.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Assertion(#[from] AssertionError),
}

/// Errors returned by the repository collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No `entity` matches `key`, an id or a project name.
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("run {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: crate::domain::RunState,
        to: crate::domain::RunState,
    },

    #[error("repository error: {0}")]
    Other(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// Errors raised by the event queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("event channel closed")]
    ChannelClosed,

    #[error("consumer close timed out")]
    CloseTimeout,

    #[error("consumer shutdown cancelled")]
    Cancelled,

    #[error("consumer is already running")]
    AlreadyConsuming,

    #[error("invalid consumer options: {0}")]
    InvalidOptions(String),
}

/// Errors returned from a processor invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("notifier failed: {0}")]
    Notifier(String),

    /// Processing failed and recording the failure failed as well.
    #[error("{error} {update}")]
    Combined {
        error: Box<ProcessError>,
        update: RepositoryError,
    },
}
