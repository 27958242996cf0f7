//! Serial task queue owned by a backend.
//!
//! Jobs run one at a time, in submission order, on a single spawned task.
//! The worker only keeps a [`Weak`] handle to its target: once the target is
//! dropped its sender goes away too and the loop ends.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

type Job<T> = Box<dyn FnOnce(Arc<T>) -> BoxFuture<'static, ()> + Send>;

/// Handle for submitting jobs to a target's worker loop.
pub struct TaskQueue<T> {
    sender: mpsc::UnboundedSender<Job<T>>,
    pending: Arc<AtomicUsize>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T: Send + Sync + 'static> TaskQueue<T> {
    /// Spawn the worker loop for `target` on the current tokio runtime.
    ///
    /// Must be called from inside a runtime.
    pub fn spawn(target: Weak<T>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_worker(target, receiver, Arc::clone(&pending)));

        Self { sender, pending }
    }

    /// Queue a job. Returns `false` once the worker has stopped.
    pub fn enqueue<F>(&self, job: F) -> bool
    where
        F: FnOnce(Arc<T>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Box::new(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            debug!("Worker stopped, job dropped");
            return false;
        }
        true
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every job submitted so far, and every job those jobs
    /// submitted in turn, has finished.
    pub async fn flush(&self) {
        loop {
            let (tx, rx) = oneshot::channel();
            let pending = Arc::clone(&self.pending);
            let queued = self.enqueue(move |_| {
                Box::pin(async move {
                    // This barrier is still counted
                    let behind = pending.load(Ordering::SeqCst).saturating_sub(1);
                    if tx.send(behind).is_err() {
                        trace!("Flush caller gone before barrier ran");
                    }
                })
            });
            if !queued {
                return;
            }

            match rx.await {
                Ok(0) | Err(_) => return,
                Ok(behind) => trace!(behind, "Flush barrier passed with work still queued"),
            }
        }
    }
}

async fn run_worker<T>(
    target: Weak<T>,
    mut receiver: mpsc::UnboundedReceiver<Job<T>>,
    pending: Arc<AtomicUsize>,
) {
    debug!("Collection worker started");

    while let Some(job) = receiver.recv().await {
        let Some(target) = target.upgrade() else {
            pending.fetch_sub(1, Ordering::SeqCst);
            break;
        };
        job(target).await;
        pending.fetch_sub(1, Ordering::SeqCst);
    }

    debug!("Collection worker stopped");
}
