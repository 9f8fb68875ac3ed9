//! Durable task queue (C10, §4.10): enqueue/consume background work
//! backed by the metadata store, with retry, priority, and three named
//! queues. Periodic schema syncs and notification fan-out both run
//! through here rather than as ad-hoc spawned tasks, so every attempt is
//! durable across a process restart.

mod backoff;
mod handler;
mod queue;
mod worker;

pub use handler::{ExecutionContext, FnHandler, TaskHandler};
pub use queue::{EnqueueOptions, Queue};
pub use worker::{enqueue, Worker};
