//! Single-flight request queue.
//!
//! All generation work in the process runs through one worker task that pulls
//! jobs off a channel, so at most one job is ever in flight and jobs run in the
//! order they were submitted.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SerializerError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

static SHARED: Mutex<Weak<RequestSerializer>> = Mutex::new(Weak::new());

/// Process-wide gate around the generative backend.
///
/// Must be created inside a tokio runtime.
pub struct RequestSerializer {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl RequestSerializer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker_loop(rx));
        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The gate shared by every assistant in this process.
    ///
    /// Returns the live gate while anyone still holds it, otherwise starts a new
    /// one. A gate that has been shut down is replaced.
    pub fn shared() -> Arc<Self> {
        let mut slot = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.upgrade()
            && !existing.is_closed()
        {
            return existing;
        }
        let gate = Arc::new(Self::new());
        *slot = Arc::downgrade(&gate);
        gate
    }

    /// Run `f` with the gate held and return its output.
    ///
    /// Waits behind every job submitted earlier. The gate is released when `f`
    /// finishes, fails or panics. A caller that stops waiting before its turn
    /// comes never runs `f`.
    ///
    /// `f` must not call back into the serializer: the nested job would queue
    /// behind its own caller and never run.
    pub async fn run_exclusive<F, Fut, T>(&self, f: F) -> Result<T, SerializerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T, SerializerError>>();
        let pending = self.pending.clone();

        let job: Job = Box::new(move || {
            async move {
                if reply_tx.is_closed() {
                    debug!("caller went away, skipping queued request");
                } else {
                    let outcome = AssertUnwindSafe(async move { f().await })
                        .catch_unwind()
                        .await
                        .map_err(|_| {
                            warn!("queued request panicked");
                            SerializerError::Panicked
                        });
                    let _ = reply_tx.send(outcome);
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            .boxed()
        });

        {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = sender.as_ref().ok_or(SerializerError::Closed)?;
            self.pending.fetch_add(1, Ordering::SeqCst);
            if sender.send(job).is_err() {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(SerializerError::Closed);
            }
        }

        reply_rx.await.map_err(|_| SerializerError::Closed)?
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop accepting work, then wait for already-queued jobs to finish.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("request worker ended abnormally: {}", e);
            }
        }
    }
}

impl Default for RequestSerializer {
    fn default() -> Self {
        Self::new()
    }
}

async fn worker_loop(mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        job().await;
    }
    debug!("request worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_job_output() {
        let serializer = RequestSerializer::new();
        let out = serializer.run_exclusive(|| async { 40 + 2 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let serializer = Arc::new(RequestSerializer::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let serializer = serializer.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                serializer
                    .run_exclusive(move || async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        order.lock().unwrap().push(i);
                    })
                    .await
            }));
            // Let each submission reach the queue before the next one.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_panic_releases_gate() {
        let serializer = RequestSerializer::new();
        let failed = serializer
            .run_exclusive(|| async {
                if true {
                    panic!("backend exploded");
                }
            })
            .await;
        assert_eq!(failed, Err(SerializerError::Panicked));

        let next = serializer.run_exclusive(|| async { "ok" }).await;
        assert_eq!(next, Ok("ok"));
        assert_eq!(serializer.pending(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_job_is_skipped() {
        let serializer = Arc::new(RequestSerializer::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let (release_tx, release_rx) = oneshot::channel::<()>();
        let blocker = {
            let serializer = serializer.clone();
            tokio::spawn(async move {
                serializer
                    .run_exclusive(move || async move {
                        let _ = release_rx.await;
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let abandoned = {
            let serializer = serializer.clone();
            let ran = ran.clone();
            tokio::spawn(async move {
                serializer
                    .run_exclusive(move || async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();
        let _ = abandoned.await;

        release_tx.send(()).unwrap();
        blocker.await.unwrap().unwrap();
        serializer.run_exclusive(|| async {}).await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_closes() {
        let serializer = Arc::new(RequestSerializer::new());
        let queued = {
            let serializer = serializer.clone();
            tokio::spawn(async move {
                serializer
                    .run_exclusive(|| async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        7
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        serializer.shutdown().await;
        assert_eq!(queued.await.unwrap(), Ok(7));
        assert!(serializer.is_closed());
        assert_eq!(
            serializer.run_exclusive(|| async { 1 }).await,
            Err(SerializerError::Closed)
        );
    }

    #[tokio::test]
    async fn test_shared_gate_is_reused_until_shut_down() {
        let first = RequestSerializer::shared();
        let second = RequestSerializer::shared();
        assert!(Arc::ptr_eq(&first, &second));

        first.shutdown().await;
        let replacement = RequestSerializer::shared();
        assert!(!Arc::ptr_eq(&first, &replacement));
        assert_eq!(replacement.run_exclusive(|| async { 3 }).await, Ok(3));
    }
}
