//! Execution contexts.
//!
//! [`MainQueue`] is the primary context: a serial executor on one named
//! thread. Every completion and frame notification the controller emits runs
//! there, in submission order. Setup work runs on short-lived background
//! threads spawned with [`spawn_background`].

use crate::errors::{BackendError, CameraError};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueShared {
    sender: Sender<Job>,
    thread_id: ThreadId,
    name: String,
}

/// Serial primary execution context.
#[derive(Clone)]
pub struct MainQueue {
    shared: Arc<QueueShared>,
}

impl MainQueue {
    /// Spawn the queue thread. It exits once every handle is dropped and the
    /// remaining jobs have run.
    pub fn spawn(name: &str) -> Result<Self, CameraError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_jobs(receiver))
            .map_err(|e| BackendError::new(format!("spawn failed: {e}")))?;

        Ok(Self {
            shared: Arc::new(QueueShared {
                sender,
                thread_id: handle.thread().id(),
                name: name.to_string(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.sender.send(Box::new(job)).is_err() {
            log::warn!("Main queue '{}' is gone; dropping job", self.shared.name);
        }
    }

    /// True when called from the queue's own thread.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.shared.thread_id
    }

    /// Block until every job dispatched before this call has run.
    pub fn flush(&self) {
        if self.is_current() {
            return;
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.dispatch(move || {
            let _ = tx.send(());
        });
        let _ = rx.recv();
    }

    /// Like [`flush`](Self::flush) but gives up after `timeout`. Returns
    /// whether the queue drained in time. Returns immediately on the queue
    /// thread itself.
    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        if self.is_current() {
            return true;
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.dispatch(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(timeout).is_ok()
    }
}

fn run_jobs(receiver: Receiver<Job>) {
    for job in receiver.iter() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("Callback panicked on main queue");
        }
    }
    log::debug!("Main queue drained and closed");
}

/// Run `work` on a named background thread.
pub fn spawn_background<F>(name: &str, work: F) -> Result<JoinHandle<()>, CameraError>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map_err(|e| CameraError::Backend(BackendError::new(format!("spawn failed: {e}"))))
}
