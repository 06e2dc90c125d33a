//! Worker pools draining a [`JobQueue`]

use super::{Job, JobQueue};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Processes one job at a time
///
/// Errors are reported back to the queue, which applies its retry policy.
#[async_trait]
pub trait JobHandler<T>: Send + Sync {
    async fn handle(&self, job: &Job<T>) -> Result<()>;
}

/// Starts `concurrency` workers pulling from `queue` until it is closed
pub fn spawn_workers<T>(
    queue: Arc<JobQueue<T>>,
    concurrency: usize,
    handler: Arc<dyn JobHandler<T>>,
) -> Vec<JoinHandle<()>>
where
    T: Send + Sync + 'static,
{
    (0..concurrency)
        .map(|worker_id| {
            let queue = queue.clone();
            let handler = handler.clone();

            tokio::spawn(async move {
                debug!("{} worker {} started", queue.name(), worker_id);

                while let Some(job) = queue.next().await {
                    match handler.handle(&job).await {
                        Ok(()) => queue.complete(&job),
                        Err(e) => {
                            warn!("{} job {} ({}) error: {}", queue.name(), job.id, job.name, e);
                            let retryable = e.is_retryable();
                            queue.fail(job, retryable);
                        }
                    }
                }

                debug!("{} worker {} stopped", queue.name(), worker_id);
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueueName, QueueOptions};
    use crate::RippleError;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<u32>>,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl JobHandler<u32> for Recorder {
        async fn handle(&self, job: &Job<u32>) -> Result<()> {
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(RippleError::Fetch {
                        url: format!("job-{}", job.data),
                        message: "HTTP 503".to_string(),
                    });
                }
            }
            self.seen.lock().unwrap().push(job.data);
            Ok(())
        }
    }

    async fn wait_idle<T: Send + 'static>(queue: &JobQueue<T>) {
        for _ in 0..200 {
            if queue.is_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never drained");
    }

    #[tokio::test]
    async fn test_workers_process_and_retry() {
        let queue = Arc::new(JobQueue::new(
            QueueName::Index,
            QueueOptions {
                max_attempts: 3,
                ..QueueOptions::default()
            },
        ));
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            failures_left: Mutex::new(2),
        });

        queue.add("WSJ", 1, 0);
        let workers = spawn_workers(queue.clone(), 1, handler.clone());

        wait_idle(&queue).await;
        assert_eq!(*handler.seen.lock().unwrap(), vec![1]);

        queue.close();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_exhausted_job_is_dropped() {
        let queue = Arc::new(JobQueue::new(QueueName::Crawl, QueueOptions::default()));
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            failures_left: Mutex::new(1),
        });

        queue.add("WSJ", 7, 0);
        queue.add("WSJ", 8, 0);
        let workers = spawn_workers(queue.clone(), 2, handler.clone());

        wait_idle(&queue).await;
        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);

        queue.close();
        for worker in workers {
            worker.await.unwrap();
        }
    }
}
