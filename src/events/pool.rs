//! Fixed-size worker pool.

use super::Processor;
use crate::error::{EventError, ProcessError};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;

/// Receivers for the values and errors produced by the workers. Both
/// close once every worker has exited.
pub struct ResultChannels<T> {
    pub values: UnboundedReceiver<T>,
    pub errors: UnboundedReceiver<ProcessError>,
}

/// Runs jobs on `parallelism` tokio tasks sharing one job queue.
pub struct WorkerPool<T> {
    jobs: async_channel::Sender<T>,
    results: Option<ResultChannels<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(parallelism: usize, processor: Arc<dyn Processor<T>>) -> Self {
        let parallelism = parallelism.max(1);
        let (jobs, queue) = async_channel::bounded::<T>(parallelism);
        let (value_tx, values) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        for worker in 0..parallelism {
            let queue = queue.clone();
            let processor = processor.clone();
            let value_tx = value_tx.clone();
            let error_tx = error_tx.clone();
            tokio::spawn(async move {
                while let Ok(job) = queue.recv().await {
                    let sent = match processor.process(job).await {
                        Ok(value) => value_tx.send(value).is_ok(),
                        Err(err) => error_tx.send(err).is_ok(),
                    };
                    if !sent {
                        debug!(worker, "result receiver dropped");
                    }
                }
                debug!(worker, "worker stopped");
            });
        }

        Self {
            jobs,
            results: Some(ResultChannels { values, errors }),
        }
    }

    /// Submit a job, waiting while every worker is busy and the queue is
    /// full.
    pub async fn add_job(&self, job: T) -> Result<(), EventError> {
        self.jobs
            .send(job)
            .await
            .map_err(|_| EventError::ChannelClosed)
    }

    /// Take the result receivers. Returns `None` after the first call.
    pub fn result_channels(&mut self) -> Option<ResultChannels<T>> {
        self.results.take()
    }

    /// Stop accepting jobs. Queued jobs are still processed, after which
    /// the workers exit and the result channels close.
    pub fn done(&self) {
        self.jobs.close();
    }
}
