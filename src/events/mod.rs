//! In-process event queue decoupling run requests from run execution.
//!
//! A [`Producer`] enqueues identifiers, a [`Consumer`] dequeues them and
//! hands each one to a [`Processor`] running on a fixed-size worker pool.

pub mod local;
pub mod pool;

use crate::error::{EventError, ProcessError};
use async_trait::async_trait;
use std::time::Duration;

pub use local::{channel, LocalConsumer, LocalProducer};
pub use pool::WorkerPool;

#[async_trait]
pub trait Producer<T: Send + 'static>: Send + Sync {
    /// Enqueue `id`, waiting while the queue is full.
    async fn produce(&self, id: T) -> Result<(), EventError>;
}

/// Handles one dequeued identifier.
#[async_trait]
pub trait Processor<T: Send + 'static>: Send + Sync {
    async fn process(&self, id: T) -> Result<T, ProcessError>;
}

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Dequeue and process identifiers until shut down.
    async fn consume(&self) -> Result<(), EventError>;

    /// Stop accepting work and wait up to `timeout` for in-flight jobs.
    async fn shutdown(&self, timeout: Duration) -> Result<(), EventError>;
}
