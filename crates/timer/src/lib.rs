//! Deferred Task Scheduler
//!
//! Schedules a message to be delivered after a delay and lets the caller
//! cancel it beforehand. Delivery goes through the owner's ordered queue,
//! never through a callback, so timer firings are serialized with every
//! other input.
//!
//! Two implementations:
//! - [`TokioScheduler`]: one sleeping tokio task per timer
//! - [`ManualScheduler`]: virtual clock advanced by hand

mod scheduler;

pub use scheduler::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
