//! Work queue drained explicitly by its owner, typically once per frame.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};
use tracing::debug;

use crate::core::error::SchedulerError;
use crate::core::executor::Runnable;
use crate::core::scheduler::Scheduler;
use crate::core::target::{CallContext, Target};

/// Queue of calls for one target, run whenever the owning thread calls
/// [`drain`](Self::drain).
///
/// Dropping the queue abandons everything still queued, and later dispatches
/// to its target fail with `TargetClosed`.
pub struct FrameQueue {
    ctx: CallContext,
    rx: Receiver<Runnable>,
}

impl FrameQueue {
    /// Register `target` with `scheduler`, queueing its calls here.
    ///
    /// # Errors
    ///
    /// Registration errors from the scheduler.
    pub fn register(scheduler: &Scheduler, target: Target) -> Result<Self, SchedulerError> {
        let (tx, rx) = unbounded::<Runnable>();
        let closed = target.clone();
        scheduler.register_target(
            target.clone(),
            Arc::new(move |run: Runnable| {
                tx.send(run)
                    .map_err(|_| SchedulerError::TargetClosed(closed.clone()))
            }),
        )?;
        Ok(Self {
            ctx: CallContext::bound(target),
            rx,
        })
    }

    /// Context bound to this queue's target; use it for dispatches and joins
    /// made by the owning thread.
    #[must_use]
    pub const fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Number of queued calls.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run the calls that were queued when the drain started; work queued by
    /// those calls waits for the next drain. Returns how many ran.
    pub fn drain(&self) -> usize {
        let queued = self.rx.len();
        let mut ran = 0;
        while ran < queued {
            let Ok(run) = self.rx.try_recv() else {
                break;
            };
            run(&self.ctx);
            ran += 1;
        }
        if ran > 0 {
            debug!(target = ?self.ctx.target(), ran = ran, "frame queue drained");
        }
        ran
    }
}
