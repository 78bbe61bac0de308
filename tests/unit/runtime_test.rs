//! Tests for drain owners

use prometheus_frame_scheduler::core::{CallContext, CallOptions, Dispatcher, Function, Scheduler, Target};
use prometheus_frame_scheduler::runtime::{FrameQueue, TargetThread};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_frame_queue_defers_work_queued_during_a_drain() {
    let scheduler = Arc::new(Scheduler::thread_pool(1).unwrap());
    let queue = FrameQueue::register(&scheduler, Target::named("ui")).unwrap();
    let dispatcher = Arc::new(Dispatcher::with_scheduler(Arc::clone(&scheduler)));

    let leaf = Function::new("leaf", |(): ()| 1_u8);
    let nested = Arc::clone(&dispatcher);
    let spawn_more = Function::with_context("spawn_more", move |ctx: &CallContext, (): ()| {
        let opts = CallOptions::asynchronous().with_target(Target::named("ui"));
        nested.dispatch(ctx, &opts, &leaf, ()).map(|_| ()).is_ok()
    });

    let opts = CallOptions::asynchronous().with_target(Target::named("ui"));
    let result = dispatcher
        .dispatch(&CallContext::unbound(), &opts, &spawn_more, ())
        .unwrap();

    assert_eq!(queue.drain(), 1);
    assert_eq!(result.try_get(), Some(Ok(true)));
    assert_eq!(queue.pending(), 1);
    assert_eq!(queue.drain(), 1);
    scheduler.shutdown();
}

#[test]
fn test_target_thread_reports_its_target() {
    let scheduler = Scheduler::single_threaded();
    let thread = TargetThread::spawn(&scheduler, Target::named("io")).unwrap();
    assert_eq!(thread.target(), &Target::named("io"));

    let (tx, rx) = crossbeam_channel::bounded(1);
    thread
        .execute(move |ctx| {
            tx.send(ctx.is_bound_to(&Target::named("io"))).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    thread.stop();
}
