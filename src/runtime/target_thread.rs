//! Dedicated thread that owns a target and drains its work forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::error::SchedulerError;
use crate::core::executor::Runnable;
use crate::core::scheduler::Scheduler;
use crate::core::target::{CallContext, Target};

enum Message {
    Run(Runnable),
    Stop,
}

/// An engine thread ("render", "audio", ...) bound to one target.
///
/// Work for the target is queued to the thread and run with a context bound
/// to the target, so nested dispatches and joins on the thread see the right
/// affinity.
pub struct TargetThread {
    target: Target,
    tx: Sender<Message>,
    closed: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TargetThread {
    /// Register `target` with `scheduler` and start its thread.
    ///
    /// # Errors
    ///
    /// Registration errors from the scheduler, or `Backend` if the thread
    /// cannot be spawned.
    pub fn spawn(scheduler: &Scheduler, target: Target) -> Result<Self, SchedulerError> {
        let (tx, rx) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let drain_tx = tx.clone();
        let drain_closed = Arc::clone(&closed);
        let drain_target = target.clone();
        scheduler.register_target(
            target.clone(),
            Arc::new(move |run: Runnable| {
                if drain_closed.load(Ordering::Acquire) {
                    return Err(SchedulerError::TargetClosed(drain_target.clone()));
                }
                drain_tx
                    .send(Message::Run(run))
                    .map_err(|_| SchedulerError::TargetClosed(drain_target.clone()))
            }),
        )?;

        let ctx = CallContext::bound(target.clone());
        let handle = thread::Builder::new()
            .name(format!("fs-target-{target}"))
            .spawn(move || drain_forever(&rx, &ctx))
            .map_err(|e| SchedulerError::Backend(format!("failed to spawn thread for `{target}`: {e}")))?;
        info!(target = %target, "target thread started");

        Ok(Self {
            target,
            tx,
            closed,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The target this thread owns.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Run arbitrary work on the thread, with its bound context.
    ///
    /// # Errors
    ///
    /// `ShutDown` if the thread has stopped.
    pub fn execute<F>(&self, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&CallContext) + Send + 'static,
    {
        self.tx
            .send(Message::Run(Box::new(work)))
            .map_err(|_| SchedulerError::ShutDown)
    }

    /// Stop after the work already queued, and wait for the thread to exit.
    ///
    /// The target stays registered with the scheduler, but from now on every
    /// dispatch to it fails with `TargetClosed`. A call that raced the stop and
    /// was queued behind it is abandoned and dropped from its cache on the next
    /// lookup.
    pub fn stop(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.tx.send(Message::Stop);
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(target = %self.target, "target thread panicked");
        }
        info!(target = %self.target, "target thread stopped");
    }
}

impl Drop for TargetThread {
    fn drop(&mut self) {
        // Signal only; the thread finishes its queue and exits on its own.
        self.closed.store(true, Ordering::Release);
        let _ = self.tx.send(Message::Stop);
    }
}

fn drain_forever(rx: &Receiver<Message>, ctx: &CallContext) {
    debug!(target = ?ctx.target(), "draining");
    while let Ok(message) = rx.recv() {
        match message {
            Message::Run(run) => run(ctx),
            Message::Stop => break,
        }
    }
    debug!(target = ?ctx.target(), "drain loop exiting");
}
