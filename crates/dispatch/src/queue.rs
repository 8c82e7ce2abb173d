//! Serialized FIFO execution queue.
//!
//! One worker task per queue dequeues from the head and runs each callback
//! to completion before taking the next one, so no two callbacks posted to
//! the same queue ever overlap.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    futures::{FutureExt, future::BoxFuture},
    tokio::{
        runtime::Handle,
        sync::mpsc::{self, error::TrySendError},
        task::JoinHandle,
    },
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, gauge};

use crate::executor::panic_message;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("execution queue is full ({capacity} pending)")]
    Full { capacity: usize },

    #[error("execution queue is closed")]
    Closed,

    #[error("execution queue requires a tokio runtime")]
    NoRuntime,
}

enum JobSender {
    Bounded(mpsc::Sender<Job>),
    Unbounded(mpsc::UnboundedSender<Job>),
}

enum JobReceiver {
    Bounded(mpsc::Receiver<Job>),
    Unbounded(mpsc::UnboundedReceiver<Job>),
}

impl JobReceiver {
    async fn recv(&mut self) -> Option<Job> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

pub struct ExecutionQueue {
    tx: Mutex<Option<JobSender>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    capacity: Option<usize>,
}

impl ExecutionQueue {
    /// Start a queue on the current tokio runtime.
    ///
    /// `capacity` bounds the backlog; `None` (or `Some(0)`) is unbounded.
    /// When bounded, [`post`](Self::post) rejects instead of waiting.
    pub fn spawn(capacity: Option<usize>) -> Result<Self, QueueError> {
        let handle = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let capacity = capacity.filter(|c| *c > 0);
        let (tx, rx) = match capacity {
            Some(bound) => {
                let (tx, rx) = mpsc::channel(bound);
                (JobSender::Bounded(tx), JobReceiver::Bounded(rx))
            },
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (JobSender::Unbounded(tx), JobReceiver::Unbounded(rx))
            },
        };

        let pending = Arc::new(AtomicUsize::new(0));
        let worker = handle.spawn(run_worker(rx, Arc::clone(&pending)));
        debug!(capacity = ?capacity, "execution queue started");

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            pending,
            capacity,
        })
    }

    /// Append `item` to the tail. The worker later runs `callback(item)`.
    ///
    /// On error the item and callback are dropped without running.
    pub fn post<T, F, Fut>(&self, item: T, callback: F) -> Result<(), QueueError>
    where
        T: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Box::new(move || async move { callback(item).await }.boxed());

        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(self.rejected(QueueError::Closed));
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        let sent = match tx {
            JobSender::Bounded(tx) => tx.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => QueueError::Full {
                    capacity: self.capacity.unwrap_or_default(),
                },
                TrySendError::Closed(_) => QueueError::Closed,
            }),
            JobSender::Unbounded(tx) => tx.send(job).map_err(|_| QueueError::Closed),
        };
        drop(guard);

        match sent {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                gauge!(dispatch_metrics::QUEUE_DEPTH).set(self.pending() as f64);
                Ok(())
            },
            Err(e) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Err(self.rejected(e))
            },
        }
    }

    fn rejected(&self, e: QueueError) -> QueueError {
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::QUEUE_REJECTIONS_TOTAL).increment(1);
        e
    }

    /// Items posted but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Stop accepting items, let the worker drain what is queued, and wait
    /// for it to finish. Must not be awaited from inside a queued callback.
    pub async fn shutdown(&self) {
        let sender = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);

        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "execution queue worker ended abnormally");
            }
            debug!("execution queue drained");
        }
    }
}

impl std::fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("pending", &self.pending())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn run_worker(mut rx: JobReceiver, pending: Arc<AtomicUsize>) {
    while let Some(job) = rx.recv().await {
        let _ = pending.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        #[cfg(feature = "metrics")]
        gauge!(dispatch_metrics::QUEUE_DEPTH).set(pending.load(Ordering::SeqCst) as f64);

        if let Err(payload) = AssertUnwindSafe(job()).catch_unwind().await {
            error!(panic = %panic_message(payload.as_ref()), "queued execution panicked");
        }
    }
}
