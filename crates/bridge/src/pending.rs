//! One in-flight host call: a completion shared by the success and failure
//! handlers, and the waiter owned by the calling routine.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use helmlet_core::{LookupError, LookupResult};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<LookupResult<T>>>>>;

/// Settling side of a [`PendingCall`]. Clones share one slot: the first
/// `resolve`/`reject` takes it, every later attempt is a no-op.
pub struct Completion<T> {
    slot: Slot<T>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self { Self { slot: Arc::clone(&self.slot) } }
}

impl<T> Completion<T> {
    pub fn resolve(&self, value: T) -> bool { self.settle(Ok(value)) }

    pub fn reject(&self, err: LookupError) -> bool { self.settle(Err(err)) }

    /// Returns true when this call settled the slot.
    pub fn settle(&self, outcome: LookupResult<T>) -> bool {
        let tx = self.slot.lock().unwrap_or_else(|p| p.into_inner()).take();
        match tx {
            Some(tx) => {
                // the waiter may already have given up
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool { self.slot.lock().unwrap_or_else(|p| p.into_inner()).is_none() }
}

/// Waiting side of one Get/List. Owned by the caller, never shared.
pub struct PendingCall<T> {
    label: String,
    rx: oneshot::Receiver<LookupResult<T>>,
    task: Option<JoinHandle<()>>,
    runtime: Handle,
}

impl<T> PendingCall<T> {
    pub fn channel(label: impl Into<String>, runtime: Handle) -> (Completion<T>, PendingCall<T>) {
        let (tx, rx) = oneshot::channel();
        let completion = Completion { slot: Arc::new(Mutex::new(Some(tx))) };
        (completion, PendingCall { label: label.into(), rx, task: None, runtime })
    }

    /// Task driving the host call; aborted if the wait is cut short.
    pub fn attach(&mut self, task: JoinHandle<()>) { self.task = Some(task); }

    pub fn label(&self) -> &str { &self.label }

    /// Wait for the single outcome, a deadline, or cancellation, whichever comes first.
    pub async fn wait_async(mut self, deadline: Option<Duration>, cancel: &CancellationToken) -> LookupResult<T> {
        let t0 = Instant::now();
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        let outcome = tokio::select! {
            biased;
            res = &mut self.rx => match res {
                Ok(outcome) => return outcome,
                Err(_) => LookupError::Abandoned { verb: self.label.clone() },
            },
            _ = cancel.cancelled() => LookupError::Cancelled { verb: self.label.clone() },
            _ = expired => LookupError::DeadlineExceeded { verb: self.label.clone(), after_ms: t0.elapsed().as_millis() as u64 },
        };
        if let Some(task) = self.task.take() { task.abort(); }
        Err(outcome)
    }

    /// Blocking variant for synchronous callers. Must not be called from
    /// within an async context; the runtime must keep its timers driven
    /// elsewhere (multi-thread runtime).
    pub fn wait(self, deadline: Option<Duration>, cancel: &CancellationToken) -> LookupResult<T> {
        let runtime = self.runtime.clone();
        runtime.block_on(self.wait_async(deadline, cancel))
    }
}

impl<T> Drop for PendingCall<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() { task.abort(); }
        }
    }
}
