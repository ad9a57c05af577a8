use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::QueueError;
use crate::worker::executor::UnitExecutor;

/// N workers draining the queue concurrently.
///
/// Each worker holds at most one unit at a time. On shutdown a worker stops
/// waiting for new units but finishes the one it is executing.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0 or if called outside a tokio runtime.
    pub fn start(executor: Arc<UnitExecutor>, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (shutdown, shutdown_rx) = watch::channel(false);

        let workers = (0..worker_count)
            .map(|worker_id| {
                let executor = Arc::clone(&executor);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(run_worker(worker_id, executor, shutdown_rx))
            })
            .collect();

        info!("Started {} workers", worker_count);

        Self { workers, shutdown }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Signals shutdown and waits for every worker to stop.
    pub async fn wait(self) {
        self.shutdown.send_replace(true);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    executor: Arc<UnitExecutor>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Worker {} started", worker_id);
    let queue = Arc::clone(executor.queue());

    loop {
        if *shutdown.borrow() {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        let leased = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!("Worker {} lost its pool", worker_id);
                    break;
                }
                continue;
            }
            leased = queue.dequeue() => leased,
        };

        match leased {
            Ok(lease) => {
                let unit_id = lease.unit_id;
                let outcome = executor.execute(lease).await;
                debug!("Worker {} resolved unit {}: {:?}", worker_id, unit_id, outcome);
            }
            Err(QueueError::Closed) => {
                debug!("Worker {} queue closed", worker_id);
                break;
            }
            Err(e) => {
                error!("Worker {} failed to dequeue: {}", worker_id, e);
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
                }
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
