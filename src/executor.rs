//! Task execution across worker threads.
//!
//! The session submits one task per admitted stream; the executor runs
//! each on some worker thread, most-urgent priority first. `stop()`
//! cancels everything still pending and joins the workers, so a running
//! task is guaranteed to have exited by the time `stop()` returns.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;

/// A schedulable unit of work bound to one stream.
///
/// `run` and `cancel` may be invoked from any worker thread; `cancel`
/// may race with an in-progress `run` and must only signal, not block.
pub trait Task: Send + Sync {
    fn run(&self);
    fn cancel(&self);
}

/// Schedules tasks by priority across worker threads.
pub trait Executor: Send + Sync {
    /// Submit a task at the given priority (0 is most urgent). Must not
    /// be called while holding any lock the task itself may take: an
    /// inline executor runs the task before returning.
    fn add_task(&self, task: Arc<dyn Task>, priority: u8);

    /// Cancel all pending tasks and block until every running task has
    /// exited. Idempotent. Must not be called from a worker thread.
    fn stop(&self);
}

/// Executor that runs each task synchronously inside `add_task`.
///
/// Used in tests and single-threaded hosts; it is also the reason the
/// session must finish all bookkeeping for a stream before submitting
/// its task.
#[derive(Default)]
pub struct InlineExecutor {
    stopped: AtomicBool,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for InlineExecutor {
    fn add_task(&self, task: Arc<dyn Task>, _priority: u8) {
        if self.stopped.load(Ordering::Acquire) {
            task.cancel();
            return;
        }
        task.run();
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

struct Pending {
    // BTreeMap iterates keys in ascending order, so bucket 0 drains first.
    buckets: BTreeMap<u8, VecDeque<Arc<dyn Task>>>,
    stopped: bool,
}

impl Pending {
    // Empty buckets are pruned eagerly, so the first bucket always has work.
    fn pop_most_urgent(&mut self) -> Option<Arc<dyn Task>> {
        let (&priority, queue) = self.buckets.iter_mut().next()?;
        let task = queue.pop_front();
        if queue.is_empty() {
            self.buckets.remove(&priority);
        }
        task
    }
}

struct Shared {
    pending: Mutex<Pending>,
    work_available: Condvar,
}

/// Fixed-size pool of worker threads draining a priority-bucketed queue.
pub struct ThreadPoolExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolExecutor {
    /// Spawn `num_workers` threads, each running tasks to completion one
    /// at a time.
    pub fn new(num_workers: usize) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending {
                buckets: BTreeMap::new(),
                stopped: false,
            }),
            work_available: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("stream-worker-{}", worker_id))
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut pending = shared.pending.lock().expect("executor queue poisoned");
            loop {
                if let Some(task) = pending.pop_most_urgent() {
                    break Some(task);
                }
                if pending.stopped {
                    break None;
                }
                pending = shared
                    .work_available
                    .wait(pending)
                    .expect("executor queue poisoned");
            }
        };
        match task {
            Some(task) => task.run(),
            None => return,
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn add_task(&self, task: Arc<dyn Task>, priority: u8) {
        let mut pending = self.shared.pending.lock().expect("executor queue poisoned");
        if pending.stopped {
            drop(pending);
            task.cancel();
            return;
        }
        pending.buckets.entry(priority).or_default().push_back(task);
        drop(pending);
        self.shared.work_available.notify_one();
    }

    fn stop(&self) {
        let cancelled = {
            let mut pending = self.shared.pending.lock().expect("executor queue poisoned");
            pending.stopped = true;
            let mut cancelled = Vec::new();
            for (_, mut queue) in std::mem::take(&mut pending.buckets) {
                cancelled.extend(queue.drain(..));
            }
            cancelled
        };
        self.shared.work_available.notify_all();

        // Cancelled tasks never ran; tell them so before dropping them.
        for task in cancelled {
            task.cancel();
        }

        let workers = std::mem::take(&mut *self.workers.lock().expect("worker handles poisoned"));
        debug!(workers = workers.len(), "stopping executor");
        for handle in workers {
            handle.join().expect("worker thread panicked");
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}
