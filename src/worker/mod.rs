//! Worker loop and supervisor lifecycle.
//!
//! Each worker repeatedly leases one prediction, runs the pipeline, and
//! persists the result inside the lease's transaction. The supervisor
//! spawns the pool, listens for termination signals, and drains: workers
//! finish the job they are on, then exit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::cost::{CostLogEntry, CostTracker};
use crate::error::{AppResult, StorageResult};
use crate::storage::{LeasedJob, PostSource, ValidationQueue};
use crate::validation::ValidatorPipeline;

/// One validation worker.
pub struct Worker<Q: ValidationQueue> {
    id: usize,
    queue: Arc<Q>,
    posts: Arc<dyn PostSource>,
    pipeline: Arc<ValidatorPipeline>,
    tracker: CostTracker,
    config: WorkerConfig,
    stop: watch::Receiver<bool>,
}

impl<Q> Worker<Q>
where
    Q: ValidationQueue,
{
    /// Assemble one worker over shared components.
    pub fn new(
        id: usize,
        queue: Arc<Q>,
        posts: Arc<dyn PostSource>,
        pipeline: Arc<ValidatorPipeline>,
        tracker: CostTracker,
        config: WorkerConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            queue,
            posts,
            pipeline,
            tracker,
            config,
            stop,
        }
    }

    /// Loop until the stop flag is set. Errors are recoverable: the
    /// lease's transaction rolls back and the worker sleeps before the
    /// next attempt.
    pub async fn run(mut self) {
        info!(worker = self.id, "Worker started");

        while !*self.stop.borrow() {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    self.tracker
                        .mark_worker(self.id, "Waiting (idle)", false)
                        .await;
                    self.sleep_unless_stopped(self.config.idle_sleep_secs).await;
                }
                Err(e) => {
                    error!(worker = self.id, error = %e, "Validation sweep failed, retrying");
                    self.tracker
                        .mark_worker(self.id, "Error (retrying)", false)
                        .await;
                    self.sleep_unless_stopped(self.config.error_sleep_secs).await;
                }
            }
        }

        self.tracker.mark_worker(self.id, "Stopped", false).await;
        info!(worker = self.id, "Worker stopped");
    }

    /// Lease and validate one prediction. `Ok(false)` means the queue was
    /// empty. Dropping the job on an error path rolls its transaction
    /// back, leaving the prediction eligible for the next sweep.
    async fn process_next(&self) -> StorageResult<bool> {
        let Some(job) = self.queue.lease(Utc::now()).await? else {
            return Ok(false);
        };

        let prediction_id = job.tuple().prediction.id.clone();
        self.tracker.mark_worker(self.id, "Validating", true).await;
        info!(worker = self.id, prediction_id = %prediction_id, "Validating prediction");

        let output = self.pipeline.run(job.tuple(), self.posts.as_ref()).await?;
        let inserted = job.persist(output.record.clone()).await?;

        if inserted {
            info!(
                worker = self.id,
                prediction_id = %prediction_id,
                outcome = %output.record.outcome,
                searches = output.costs.search_api_calls,
                "Validation persisted"
            );
            self.tracker
                .record_validation(CostLogEntry::from_output(&output))
                .await;
        } else {
            warn!(
                worker = self.id,
                prediction_id = %prediction_id,
                "Another worker already validated this prediction"
            );
        }

        Ok(true)
    }

    async fn sleep_unless_stopped(&mut self, secs: u64) {
        let stop = &mut self.stop;
        let stopped = async {
            if stop.changed().await.is_err() {
                // Sender gone; no stop signal can ever arrive.
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = stopped => {}
        }
    }
}

/// Spawns the worker pool and manages graceful shutdown.
pub struct Supervisor<Q: ValidationQueue> {
    queue: Arc<Q>,
    posts: Arc<dyn PostSource>,
    pipeline: Arc<ValidatorPipeline>,
    tracker: CostTracker,
    config: WorkerConfig,
    on_shutdown: Option<Box<dyn Fn() + Send + Sync>>,
}

impl<Q> Supervisor<Q>
where
    Q: ValidationQueue + 'static,
    Q::Job: 'static,
{
    /// Assemble a supervisor over shared components.
    pub fn new(
        queue: Arc<Q>,
        posts: Arc<dyn PostSource>,
        pipeline: ValidatorPipeline,
        tracker: CostTracker,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            posts,
            pipeline: Arc::new(pipeline),
            tracker,
            config,
            on_shutdown: None,
        }
    }

    /// Hook invoked once when a termination signal arrives, before the
    /// stop flag is set. Used to silence log output for the shutdown
    /// display.
    pub fn on_shutdown(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_shutdown = Some(Box::new(hook));
        self
    }

    /// Start the pool, wait for a termination signal, drain all workers.
    pub async fn run(self) -> AppResult<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut workers = JoinSet::new();

        info!(count = self.config.count, "Starting workers");

        for id in 0..self.config.count {
            let worker = Worker::new(
                id,
                Arc::clone(&self.queue),
                Arc::clone(&self.posts),
                Arc::clone(&self.pipeline),
                self.tracker.clone(),
                self.config.clone(),
                stop_rx.clone(),
            );
            workers.spawn(worker.run());
        }
        drop(stop_rx);

        let hook = self.on_shutdown;
        tokio::spawn(async move {
            match wait_for_termination().await {
                Ok(()) => {
                    info!("Shutdown signal received, draining workers");
                    if let Some(hook) = &hook {
                        hook();
                    }
                    let _ = stop_tx.send(true);
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for termination signals");
                }
            }
        });

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task aborted");
            }
        }

        info!("All workers drained");
        Ok(())
    }
}

/// Resolve once either termination signal arrives.
#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
