//! Bounded worker pool for commit copies
//!
//! Commit is asynchronous: the caller gets a future immediately and a
//! worker moves the record from temp to permanent storage. Workers are a
//! fixed pool draining a bounded FIFO queue; a full queue pushes back on
//! the submitter rather than growing without bound.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

/// Error returned when the task queue is full or the pool is shut down
#[derive(Debug)]
pub struct QueueFullError;

impl std::fmt::Display for QueueFullError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "copy task queue is full")
    }
}

impl std::error::Error for QueueFullError {}

/// Scheduler metrics snapshot
#[derive(Debug, Clone, Copy)]
pub struct SchedulerStats {
    /// Tasks waiting in the queue
    pub queue_depth: usize,
    /// Tasks currently executing
    pub active_tasks: usize,
    /// Tasks completed since creation
    pub tasks_completed: u64,
    /// Worker thread count
    pub worker_count: usize,
}

type Task = Box<dyn FnOnce() + Send>;

struct SchedulerInner {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    max_queue_depth: usize,
    tasks_completed: AtomicU64,
}

/// Fixed pool of worker threads draining a bounded FIFO queue
pub struct CopyScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl CopyScheduler {
    /// Spawn `worker_count` workers named `warcstore-copy-N`
    pub fn new(worker_count: usize, max_queue_depth: usize) -> Self {
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            max_queue_depth,
            tasks_completed: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let inner = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("warcstore-copy-{i}"))
                .spawn(move || worker_loop(&inner))
                .expect("failed to spawn copy worker thread");
            workers.push(handle);
        }

        CopyScheduler {
            inner,
            workers: Mutex::new(workers),
            worker_count,
        }
    }

    /// Enqueue a task
    ///
    /// Fails with [`QueueFullError`] when the queue is at capacity or the
    /// scheduler has shut down.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), QueueFullError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(QueueFullError);
        }
        if self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth {
            return Err(QueueFullError);
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Box::new(task));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until all queued and in-flight tasks have completed
    ///
    /// Workers keep running afterwards; this does not signal shutdown.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_tasks.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to finish remaining tasks and join them
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Hold the queue lock while notifying so a worker between its
        // shutdown check and its wait cannot miss the wakeup.
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Metrics snapshot
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_tasks: self.inner.active_tasks.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            worker_count: self.worker_count,
        }
    }
}

// Decrements active_tasks and notifies drain waiters on drop, so the
// bookkeeping survives a panicking task.
struct ActiveTaskGuard<'a> {
    inner: &'a SchedulerInner,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &SchedulerInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };

        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
            error!("copy task panicked");
        }
    }
}
