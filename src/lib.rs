//! # Prometheus Frame Scheduler
//!
//! A memoizing, affinity-aware call scheduler for frame-driven engines.
//!
//! Every unit of work is a *call*: a [`Function`](core::Function) applied to
//! arguments. Calls are dispatched through one facade, which looks them up in
//! a versioned cache, decides whether they may run inline, and otherwise
//! routes them to the execution context (*target*) they are affine to.
//!
//! ## Core Problem Solved
//!
//! Engine subsystems issue the same expensive calls many times per frame,
//! from many threads, and some work may only run on a specific thread:
//!
//! - **Duplicate work**: identical calls within a validity window must run at most once
//! - **Per-frame validity**: some results are valid for one frame, some forever, some per version
//! - **Thread affinity**: render or audio work must run on its owning thread
//! - **No deadlocks**: a thread joining work affine to itself runs it instead of waiting
//!
//! ## Key Features
//!
//! - **Content-addressed memoization**: call identity from function id plus argument hashes
//! - **Five cache policies**: no-op, per-tick, invalidate-older, invalidate-different, forever
//! - **Interchangeable pools**: fixed thread pool, work-stealing, task-per-call, custom
//! - **Drain owners**: dedicated target threads and per-frame queues
//! - **Failure capture**: panics in any execution path reach every joiner
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_frame_scheduler::core::{
//!     Cache, CallContext, CallOptions, Dispatcher, Function, Scheduler,
//! };
//!
//! let scheduler = Arc::new(Scheduler::thread_pool(4)?);
//! let dispatch = Dispatcher::with_scheduler(Arc::clone(&scheduler));
//! let ctx = CallContext::unbound();
//!
//! let mesh = Function::new("build_mesh", |(lod,): (u32,)| expensive_mesh(lod));
//! let opts = CallOptions::asynchronous().with_cache(Cache::PER_TICK);
//!
//! for frame in 0.. {
//!     let a = dispatch.dispatch(&ctx, &opts, &mesh, (2,))?;
//!     let b = dispatch.dispatch(&ctx, &opts, &mesh, (2,))?; // same call, runs once
//!     assert_eq!(a.join(&ctx)?, b.join(&ctx)?);
//!     scheduler.tick(frame);
//! }
//! ```
//!
//! For complete examples, see `tests/dispatch_test.rs` and `tests/affinity_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: identity, results, caches, executors.
pub mod core;
/// Configuration models for schedulers and pools.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Drain owners for inline targets.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::{build_scheduler, SchedulerBuilder};
pub use crate::config::SchedulerSettings;
pub use crate::core::{
    Cache, CallContext, CallError, CallOptions, CallResult, Dispatcher, ExecutionMode, Function,
    Scheduler, SchedulerError, Target,
};
pub use crate::runtime::{FrameQueue, TargetThread};
