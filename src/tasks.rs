//! Bounded background task queue
//!
//! Detached side work (cache refreshes after reads and writes) goes through
//! a fixed-capacity queue drained by a single runner. Each task gets its own
//! time budget, independent of whoever submitted it. When the queue is full
//! the task is dropped and counted instead of spawning more work.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownListener;

struct Job {
    name: &'static str,
    work: BoxFuture<'static, ()>,
}

/// Submission handle of the background queue
#[derive(Clone)]
pub struct BackgroundTasks {
    tx: mpsc::Sender<Job>,
    dropped: Arc<AtomicU64>,
}

impl BackgroundTasks {
    /// Spawn the runner and return the submission handle
    pub fn start(
        capacity: usize,
        task_timeout: Duration,
        shutdown: ShutdownListener,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let runner = tokio::spawn(run(rx, task_timeout, shutdown));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            runner,
        )
    }

    /// Queue a task without waiting; `false` if it was dropped
    pub fn submit<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = Job {
            name,
            work: task.boxed(),
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(task = name, "Background task dropped");
                false
            }
        }
    }

    /// Tasks dropped because the queue was full or stopped
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("capacity", &self.tx.max_capacity())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

async fn run(mut rx: mpsc::Receiver<Job>, task_timeout: Duration, mut shutdown: ShutdownListener) {
    info!("Background task runner started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        if tokio::time::timeout(task_timeout, job.work).await.is_err() {
            warn!(
                task = job.name,
                timeout_ms = task_timeout.as_millis() as u64,
                "Background task timed out"
            );
        }
    }

    info!("Background task runner stopped");
}
