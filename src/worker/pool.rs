//! Elastic worker pool with live resizing.
//!
//! Each worker runs under its own child CancellationToken. Shrinking only
//! cancels the tail workers' tokens: a canceled worker finishes its current
//! job on its own clock, so in-flight jobs are never interrupted by a
//! resize.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{Worker, WorkerOptions};
use crate::bus::EventBus;
use crate::database::repositories::JobRepository;
use crate::executors::ExecutorRegistry;
use crate::jobs::JobService;
use crate::limiter::DynamicLimiter;
use crate::settings::RuntimeSettings;

struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Elastic set of workers, resizable at runtime.
pub struct WorkerPool {
    parent: CancellationToken,
    repo: Arc<dyn JobRepository>,
    jobs: Arc<JobService>,
    bus: Arc<EventBus>,
    registry: Arc<ExecutorRegistry>,
    opts: WorkerOptions,
    download_limiter: Option<Arc<DynamicLimiter>>,
    settings: Option<Arc<dyn RuntimeSettings>>,

    next_worker_id: AtomicUsize,
    active: Mutex<Vec<WorkerHandle>>,
    /// Canceled workers still draining their current job; joined on close.
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent: CancellationToken,
        repo: Arc<dyn JobRepository>,
        jobs: Arc<JobService>,
        bus: Arc<EventBus>,
        registry: Arc<ExecutorRegistry>,
        opts: WorkerOptions,
        download_limiter: Option<Arc<DynamicLimiter>>,
        settings: Option<Arc<dyn RuntimeSettings>>,
    ) -> Self {
        Self {
            parent,
            repo,
            jobs,
            bus,
            registry,
            opts,
            download_limiter,
            settings,
            next_worker_id: AtomicUsize::new(1),
            active: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Number of active (non-canceled) workers.
    pub fn count(&self) -> usize {
        self.active.lock().len()
    }

    /// Resize the pool to `n` workers (clamped to at least 1). Growing
    /// spawns new workers; shrinking cancels the tail and returns
    /// immediately while those workers drain.
    pub fn set_count(&self, n: usize) {
        let n = n.max(1);

        let mut active = self.active.lock();
        let current = active.len();
        if n == current {
            return;
        }

        if n > current {
            for _ in current..n {
                active.push(self.spawn_worker());
            }
            info!(workers = n, "worker pool grown");
            return;
        }

        let tail: Vec<WorkerHandle> = active.split_off(n);
        drop(active);

        let mut retired = self.retired.lock();
        for handle in tail {
            handle.cancel.cancel();
            retired.push(handle.task);
        }
        info!(workers = n, "worker pool shrunk");
    }

    /// Cancel all workers and wait for them to return, including workers
    /// still draining from earlier shrinks.
    pub async fn close(&self) {
        let handles: Vec<WorkerHandle> = std::mem::take(&mut *self.active.lock());
        for handle in &handles {
            handle.cancel.cancel();
        }

        let mut tasks: Vec<JoinHandle<()>> =
            handles.into_iter().map(|handle| handle.task).collect();
        tasks.append(&mut self.retired.lock());

        for task in tasks {
            let _ = task.await;
        }
        info!("worker pool closed");
    }

    fn spawn_worker(&self) -> WorkerHandle {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.parent.child_token();

        let worker = Worker::new(
            id,
            Arc::clone(&self.repo),
            Arc::clone(&self.jobs),
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
            self.opts.clone(),
            self.download_limiter.clone(),
            self.settings.clone(),
        );

        let worker_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            worker.run(worker_cancel).await;
        });

        WorkerHandle { cancel, task }
    }
}
