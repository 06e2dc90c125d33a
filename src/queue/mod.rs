//! In-process job queues
//!
//! A [`JobQueue`] holds jobs in a priority heap:
//! - Lower priority values are handed out first, ties in arrival order
//! - Every job waits out the queue's fixed delay before it becomes available;
//!   waiting jobs sit in a second heap keyed by ready time
//! - Failed jobs come back after the retry delay while attempts remain
//!
//! Worker pools are started with [`spawn_workers`].

mod worker;

pub use worker::{spawn_workers, JobHandler};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// Longest a waiting worker sleeps before re-checking the heaps
const MAX_IDLE_WAIT: Duration = Duration::from_millis(250);

/// The four pipeline queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Crawl,
    Scrape,
    Tokenize,
    Index,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Scrape => "scrape",
            Self::Tokenize => "tokenize",
            Self::Index => "index",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-queue scheduling and retry policy
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Throttle delay applied to every added job
    pub delay: Duration,
    /// Total attempts before a failing job is dropped
    pub max_attempts: u32,
    /// Delay before a failed job becomes available again
    pub retry_delay: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }
}

/// A unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Job<T> {
    pub id: u64,
    /// Free-form label; the pipeline uses the source name
    pub name: String,
    pub data: T,
    /// Lower values run first
    pub priority: i64,
    pub attempts_made: u32,
}

struct QueuedJob<T> {
    job: Job<T>,
    ready_at: Instant,
    seq: u64,
}

// Reverse comparison so BinaryHeap pops the lowest (priority, seq) first
impl<T> Ord for QueuedJob<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .job
            .priority
            .cmp(&self.job.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for QueuedJob<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for QueuedJob<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for QueuedJob<T> {}

/// A job still serving its delay, ordered by earliest `ready_at` first
struct Delayed<T>(QueuedJob<T>);

impl<T> Ord for Delayed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .ready_at
            .cmp(&self.0.ready_at)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

impl<T> PartialOrd for Delayed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Delayed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.seq == other.0.seq
    }
}

impl<T> Eq for Delayed<T> {}

struct QueueState<T> {
    /// Jobs that may run now, best priority on top
    ready: BinaryHeap<QueuedJob<T>>,
    /// Jobs waiting out a delay, earliest on top
    delayed: BinaryHeap<Delayed<T>>,
    next_seq: u64,
    next_id: u64,
}

impl<T> QueueState<T> {
    /// Moves every delayed job whose time has come onto the ready heap
    fn promote(&mut self, now: Instant) {
        while self
            .delayed
            .peek()
            .is_some_and(|Delayed(queued)| queued.ready_at <= now)
        {
            if let Some(Delayed(queued)) = self.delayed.pop() {
                self.ready.push(queued);
            }
        }
    }
}

/// Priority job queue shared between producers and a worker pool
pub struct JobQueue<T> {
    name: QueueName,
    options: QueueOptions,
    state: Mutex<QueueState<T>>,
    notify: Notify,
    active: AtomicUsize,
    closed: AtomicBool,
}

impl<T: Send + 'static> JobQueue<T> {
    pub fn new(name: QueueName, options: QueueOptions) -> Self {
        Self {
            name,
            options,
            state: Mutex::new(QueueState {
                ready: BinaryHeap::new(),
                delayed: BinaryHeap::new(),
                next_seq: 0,
                next_id: 1,
            }),
            notify: Notify::new(),
            active: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a job, available after the queue's delay
    ///
    /// Returns the job id.
    pub fn add(&self, name: &str, data: T, priority: i64) -> u64 {
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            id
        };

        self.push(
            Job {
                id,
                name: name.to_string(),
                data,
                priority,
                attempts_made: 0,
            },
            self.options.delay,
        );
        id
    }

    fn push(&self, job: Job<T>, delay: Duration) {
        {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            let queued = QueuedJob {
                job,
                ready_at: Instant::now() + delay,
                seq,
            };
            if delay.is_zero() {
                state.ready.push(queued);
            } else {
                state.delayed.push(Delayed(queued));
            }
        }
        self.notify.notify_one();
    }

    /// Pops the best job that is ready now, counting it as active
    ///
    /// Returns the job, or the time until the earliest waiting job is ready.
    fn try_pop(&self) -> Result<Job<T>, Option<Duration>> {
        let mut state = self.lock();
        let now = Instant::now();
        state.promote(now);

        match state.ready.pop() {
            Some(queued) => {
                self.active.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(queued.job)
            }
            None => Err(state
                .delayed
                .peek()
                .map(|Delayed(queued)| queued.ready_at.saturating_duration_since(now))),
        }
    }

    /// Waits for the next available job
    ///
    /// Returns `None` once the queue is closed. The caller must report the
    /// outcome with [`complete`](Self::complete) or [`fail`](Self::fail).
    pub async fn next(&self) -> Option<Job<T>> {
        loop {
            if self.is_closed() {
                return None;
            }

            let wait = match self.try_pop() {
                Ok(job) => return Some(job),
                Err(Some(wait)) => wait.min(MAX_IDLE_WAIT),
                Err(None) => MAX_IDLE_WAIT,
            };

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Marks an active job as finished successfully
    pub fn complete(&self, job: &Job<T>) {
        debug!("{} job {} completed", self.name, job.id);
        self.active.fetch_sub(1, AtomicOrdering::SeqCst);
    }

    /// Marks an active job as failed
    ///
    /// The job is re-queued after the retry delay while attempts remain and
    /// `retryable` is true; otherwise it is dropped. Returns whether it was
    /// re-queued.
    pub fn fail(&self, mut job: Job<T>, retryable: bool) -> bool {
        job.attempts_made += 1;
        let requeue = retryable && job.attempts_made < self.options.max_attempts;

        if requeue {
            warn!(
                "{} job {} ({}) failed, attempt {}/{}",
                self.name, job.id, job.name, job.attempts_made, self.options.max_attempts
            );
            self.push(job, self.options.retry_delay);
        } else {
            error!(
                "{} job {} ({}) dropped after {} attempt(s)",
                self.name, job.id, job.name, job.attempts_made
            );
        }

        self.active.fetch_sub(1, AtomicOrdering::SeqCst);
        requeue
    }

    /// Number of jobs waiting (ready or delayed)
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.delayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs currently held by workers
    pub fn active_count(&self) -> usize {
        self.active.load(AtomicOrdering::SeqCst)
    }

    /// No job is waiting and none is being processed
    pub fn is_idle(&self) -> bool {
        self.is_empty() && self.active_count() == 0
    }

    /// Stops handing out jobs; waiting workers return
    pub fn close(&self) {
        self.closed.store(true, AtomicOrdering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }
}

impl<T: Clone + Send + 'static> JobQueue<T> {
    /// Snapshot of waiting jobs in scheduling order
    pub fn pending(&self) -> Vec<Job<T>> {
        let state = self.lock();
        let mut queued: Vec<&QueuedJob<T>> = state
            .ready
            .iter()
            .chain(state.delayed.iter().map(|Delayed(queued)| queued))
            .collect();
        queued.sort_by(|a, b| b.cmp(a));
        queued.into_iter().map(|q| q.job.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(options: QueueOptions) -> JobQueue<&'static str> {
        JobQueue::new(QueueName::Crawl, options)
    }

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let q = queue(QueueOptions::default());
        q.add("WSJ", "plain-1", 0);
        q.add("WSJ", "topical-1", -1);
        q.add("WSJ", "plain-2", 0);
        q.add("WSJ", "topical-2", -1);

        let pending: Vec<_> = q.pending().into_iter().map(|j| j.data).collect();
        assert_eq!(pending, vec!["topical-1", "topical-2", "plain-1", "plain-2"]);

        let mut order = Vec::new();
        for _ in 0..4 {
            let job = q.next().await.unwrap();
            q.complete(&job);
            order.push(job.data);
        }
        assert_eq!(order, pending);
        assert!(q.is_idle());
    }

    #[tokio::test]
    async fn test_delay_holds_jobs_back() {
        let q = queue(QueueOptions {
            delay: Duration::from_millis(50),
            ..QueueOptions::default()
        });
        let added = Instant::now();
        q.add("WSJ", "late", 0);

        assert!(matches!(q.try_pop(), Err(Some(_))));
        assert_eq!(q.len(), 1);

        let job = q.next().await.unwrap();
        assert!(added.elapsed() >= Duration::from_millis(50));
        assert_eq!(job.data, "late");
        assert_eq!(q.active_count(), 1);
        q.complete(&job);
        assert_eq!(q.active_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_until_attempts_exhausted() {
        let q = queue(QueueOptions {
            max_attempts: 3,
            ..QueueOptions::default()
        });
        q.add("WSJ", "flaky", 0);

        let job = q.next().await.unwrap();
        assert!(q.fail(job, true));
        let job = q.next().await.unwrap();
        assert_eq!(job.attempts_made, 1);
        assert!(q.fail(job, true));
        let job = q.next().await.unwrap();
        assert_eq!(job.attempts_made, 2);
        assert!(!q.fail(job, true));

        assert!(q.is_idle());
    }

    #[tokio::test]
    async fn test_delayed_retry_does_not_block_ready_jobs() {
        let q = queue(QueueOptions {
            max_attempts: 2,
            retry_delay: Duration::from_secs(60),
            ..QueueOptions::default()
        });
        q.add("WSJ", "flaky", -5);

        let job = q.next().await.unwrap();
        assert!(q.fail(job, true));
        q.add("WSJ", "fresh", 0);

        // The retry outranks "fresh" but is still serving its delay
        let job = q.next().await.unwrap();
        assert_eq!(job.data, "fresh");
        q.complete(&job);

        match q.try_pop() {
            Err(Some(wait)) => assert!(wait > Duration::from_secs(50)),
            _ => panic!("retry should still be delayed"),
        }
        assert_eq!(q.len(), 1);
        assert_eq!(q.pending()[0].data, "flaky");
    }

    #[tokio::test]
    async fn test_non_retryable_failure_drops_job() {
        let q = queue(QueueOptions {
            max_attempts: 5,
            ..QueueOptions::default()
        });
        q.add("Gazette", "unknown", 0);

        let job = q.next().await.unwrap();
        assert!(!q.fail(job, false));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_close_releases_waiting_worker() {
        let q = std::sync::Arc::new(queue(QueueOptions::default()));
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.next().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();
        assert!(waiter.await.unwrap().is_none());
    }
}
