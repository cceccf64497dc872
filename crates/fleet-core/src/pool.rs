use crate::config::default_concurrency;
use crate::context::{RunContext, TaskContext};
use crate::model::{RepositoryStatus, SyncResult};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};
use std::time::Duration;
use tracing::{debug, warn};

/// Results the pool can order and inspect for stop-on-failure.
pub trait PoolResult {
    fn sort_key(&self) -> (&str, &Path);
    fn is_failure(&self) -> bool;
}

impl PoolResult for RepositoryStatus {
    fn sort_key(&self) -> (&str, &Path) {
        (&self.repo_id, &self.path)
    }

    fn is_failure(&self) -> bool {
        self.is_failed()
    }
}

impl PoolResult for SyncResult {
    fn sort_key(&self) -> (&str, &Path) {
        (&self.repo_id, &self.path)
    }

    fn is_failure(&self) -> bool {
        !self.ok
    }
}

/// One completed item, reported on the collecting thread.
pub struct Progress<'a, R> {
    pub done: usize,
    pub total: usize,
    pub result: &'a R,
}

/// Fixed-size pool of scoped worker threads pulling from a shared queue.
/// Items are moved into workers and results moved back; the caller never
/// shares state with a worker.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    timeout: Option<Duration>,
    stop_on_failure: bool,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            timeout: None,
            stop_on_failure: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `work` for every item with at most `workers` in flight, each
    /// under its own deadline. Items never started (stop-on-failure or run
    /// cancellation) are turned into results by `aborted`. The returned
    /// list is sorted by `(repo_id, path)`.
    pub fn run<I, R, W, A>(
        &self,
        items: Vec<I>,
        ctx: &RunContext,
        work: W,
        aborted: A,
        progress: &mut dyn FnMut(Progress<'_, R>),
    ) -> Vec<R>
    where
        I: Send,
        R: PoolResult + Send,
        W: Fn(I, &TaskContext) -> R + Sync,
        A: Fn(I) -> R,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.workers.min(total);
        let queue = Mutex::new(VecDeque::from(items));
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::sync_channel::<R>(workers * 2);
        debug!(workers, total, "starting worker pool");

        let mut results = std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let stop = &stop;
                let work = &work;
                scope.spawn(move || {
                    loop {
                        if stop.load(Ordering::SeqCst) || ctx.cancel_token().is_cancelled() {
                            break;
                        }
                        let next = match queue.lock() {
                            Ok(mut guard) => guard.pop_front(),
                            Err(_) => None,
                        };
                        let Some(item) = next else {
                            break;
                        };
                        let task = ctx.task(self.timeout);
                        let result = work(item, &task);
                        if self.stop_on_failure
                            && result.is_failure()
                            && !stop.swap(true, Ordering::SeqCst)
                        {
                            warn!("stopping after first failure");
                        }
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut results = Vec::with_capacity(total);
            for result in rx {
                results.push(result);
                if let Some(result) = results.last() {
                    progress(Progress {
                        done: results.len(),
                        total,
                        result,
                    });
                }
            }
            results
        });

        let leftover = match queue.into_inner() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        for item in leftover {
            let result = aborted(item);
            results.push(result);
            if let Some(result) = results.last() {
                progress(Progress {
                    done: results.len(),
                    total,
                    result,
                });
            }
        }

        results.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        results
    }
}
