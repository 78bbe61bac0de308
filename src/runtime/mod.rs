//! Drain owners: the execution contexts that run inline-target work.

pub mod frame_queue;
pub mod target_thread;

pub use frame_queue::FrameQueue;
pub use target_thread::TargetThread;
