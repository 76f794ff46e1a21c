//! Declarative HTTP scenario engine with an in-process run pipeline.
//!
//! Scenario documents describe ordered HTTP steps with assertions and
//! retries. Later steps can reference values from earlier responses with
//! `${steps.<name>.response.body.<path>}` placeholders. Runs of a project
//! are queued through [`events`], executed by [`runs::RunProcessor`] and
//! summarised by [`completions::CompletionProcessor`].

pub mod completions;
pub mod config;
pub mod definition;
pub mod domain;
pub mod error;
pub mod events;
pub mod executor;
pub mod http_client;
pub mod logging;
pub mod model;
pub mod replacer;
pub mod repository;
pub mod resolver;
pub mod runner;
pub mod runs;
pub mod validator;

pub use config::{ConsumerOptions, ExecutorOptions, ScenarioFileLoader};
pub use definition::parse_definition;
pub use error::*;
pub use executor::{Executor, ScenarioRunner};
pub use http_client::{HttpClient, ReqwestClient};
pub use model::*;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
