//! Channel-backed producer and consumer living in the same process.
//!
//! The local consumer cannot guarantee that every run is processed: on
//! shutdown it drains what it already received within the close timeout
//! and abandons whatever is still in flight after that.

use super::pool::{ResultChannels, WorkerPool};
use super::{Consumer, Processor, Producer};
use crate::config::ConsumerOptions;
use crate::error::EventError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info};

/// Create a connected producer and receiver pair.
pub fn channel<T>(capacity: usize) -> (LocalProducer<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (LocalProducer { tx }, rx)
}

#[derive(Debug)]
pub struct LocalProducer<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for LocalProducer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Producer<T> for LocalProducer<T> {
    async fn produce(&self, id: T) -> Result<(), EventError> {
        self.tx.send(id).await.map_err(|_| EventError::ChannelClosed)
    }
}

pub struct LocalConsumer<T> {
    stream: Mutex<Option<mpsc::Receiver<T>>>,
    processor: Arc<dyn Processor<T>>,
    options: ConsumerOptions,
    close: watch::Sender<bool>,
    done: watch::Sender<bool>,
}

impl<T: Send + 'static> LocalConsumer<T> {
    pub fn new(
        stream: mpsc::Receiver<T>,
        processor: Arc<dyn Processor<T>>,
        options: ConsumerOptions,
    ) -> Result<Self, EventError> {
        options.validate()?;
        Ok(Self {
            stream: Mutex::new(Some(stream)),
            processor,
            options,
            close: watch::Sender::new(false),
            done: watch::Sender::new(false),
        })
    }

    /// Signal the consume loop to stop and race its drain against
    /// `timeout` and `cancelled`.
    ///
    /// Returns [`EventError::CloseTimeout`] if the pool has not drained in
    /// time and [`EventError::Cancelled`] if `cancelled` resolves first.
    /// Jobs still running in either case are abandoned. A consumer that was
    /// never started has nothing to drain and returns at once; a later
    /// `consume` only drains the ids already buffered.
    pub async fn shutdown_until<F>(&self, cancelled: F, timeout: Duration) -> Result<(), EventError>
    where
        F: Future<Output = ()> + Send,
    {
        info!("shutting down consumer");
        self.close.send_replace(true);
        if self.stream.lock().await.is_some() {
            debug!("consumer was never started");
            return Ok(());
        }

        tokio::select! {
            drained = wait_until_set(self.done.subscribe()) => drained,
            _ = tokio::time::sleep(timeout) => Err(EventError::CloseTimeout),
            _ = cancelled => Err(EventError::Cancelled),
        }
    }

    async fn run(
        &self,
        stream: &mut mpsc::Receiver<T>,
        pool: &WorkerPool<T>,
    ) -> Result<(), EventError> {
        let close = self.close.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = wait_until_set(close.clone()) => break,
                id = stream.recv() => match id {
                    Some(id) => pool.add_job(id).await?,
                    None => {
                        debug!("all producers dropped");
                        break;
                    }
                },
            }
        }

        // Ids already handed over by producers are still processed.
        stream.close();
        while let Some(id) = stream.recv().await {
            pool.add_job(id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> Consumer for LocalConsumer<T> {
    async fn consume(&self) -> Result<(), EventError> {
        let mut stream = self
            .stream
            .lock()
            .await
            .take()
            .ok_or(EventError::AlreadyConsuming)?;

        let mut pool = WorkerPool::new(self.options.parallelism, self.processor.clone());
        let results = pool.result_channels().ok_or(EventError::AlreadyConsuming)?;
        let collector = tokio::spawn(collect_results(results));

        info!(parallelism = self.options.parallelism, "consumer started");
        let outcome = self.run(&mut stream, &pool).await;

        pool.done();
        match collector.await {
            Ok(processed) => info!(processed, "consumer drained"),
            Err(err) => error!("result collector failed: {err}"),
        }
        self.done.send_replace(true);
        outcome
    }

    async fn shutdown(&self, timeout: Duration) -> Result<(), EventError> {
        self.shutdown_until(std::future::pending(), timeout).await
    }
}

/// Drain both result channels until the workers are gone. Errors are
/// logged and dropped.
async fn collect_results<T>(mut results: ResultChannels<T>) -> usize {
    let mut processed = 0;
    let mut values_open = true;
    let mut errors_open = true;

    while values_open || errors_open {
        tokio::select! {
            value = results.values.recv(), if values_open => match value {
                Some(_) => processed += 1,
                None => values_open = false,
            },
            err = results.errors.recv(), if errors_open => match err {
                Some(err) => {
                    processed += 1;
                    error!("failed to process event: {err}");
                }
                None => errors_open = false,
            },
        }
    }
    processed
}

async fn wait_until_set(mut flag: watch::Receiver<bool>) -> Result<(), EventError> {
    loop {
        let set = *flag.borrow_and_update();
        if set {
            return Ok(());
        }
        flag.changed().await.map_err(|_| EventError::ChannelClosed)?;
    }
}
