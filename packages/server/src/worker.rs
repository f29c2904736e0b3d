//! Background worker used by the outbox relay.
//!
//! A [`BackgroundWorker`] owns a tokio task that processes submitted tasks
//! from an mpsc channel and fires a periodic tick; the [`BackgroundRunnable`]
//! implementation supplies the behavior. Handlers hold a cheap
//! [`WorkerHandle`] to nudge the worker without owning it.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Channel capacity for submitted tasks. Submissions beyond this are dropped
/// by [`WorkerHandle::nudge`], which is fine for wake-up-style tasks.
const TASK_CAPACITY: usize = 256;

/// Behavior plugged into a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single submitted task.
    async fn run(&mut self, task: Self::Task);

    /// Called at every tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Cloneable handle for submitting tasks to a running worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle<T> {
    tx: mpsc::Sender<T>,
}

impl<T> WorkerHandle<T> {
    /// Submits a task without waiting. Dropped silently when the worker has
    /// stopped or its queue is full; the periodic tick covers for lost
    /// nudges.
    pub fn nudge(&self, task: T) {
        if self.tx.try_send(task).is_err() {
            tracing::debug!("worker nudge dropped");
        }
    }
}

/// Owns the worker task; stopping it waits for a clean shutdown.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: mpsc::Sender<R::Task>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Starts the worker with the given runnable and tick interval.
    pub fn start(mut runnable: R, tick_interval_ms: u64) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(TASK_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(std::time::Duration::from_millis(tick_interval_ms));
            // Skip the immediate first tick so on_tick doesn't fire at startup.
            tick.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break, // All senders dropped.
                        }
                    }
                    _ = tick.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// A handle for submitting tasks from elsewhere (e.g. request handlers).
    #[must_use]
    pub fn handle(&self) -> WorkerHandle<R::Task> {
        WorkerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stops the worker and waits for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
