//! Scheduler Implementations

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Handle returned by [`Scheduler::schedule`], used to cancel the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Deferred delivery of messages of type `T`
pub trait Scheduler<T> {
    /// Deliver `message` once `after` has elapsed
    fn schedule(&mut self, after: Duration, message: T) -> TimerHandle;

    /// Prevent a pending delivery. Cancelling twice, or after the message
    /// was delivered, does nothing.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Scheduler backed by tokio timers.
///
/// Each timer is a task sleeping for its delay, then sending the message
/// into the owner's queue. Must be used from within a tokio runtime.
pub struct TokioScheduler<C> {
    sender: mpsc::Sender<C>,
    tasks: HashMap<TimerHandle, AbortHandle>,
    next_id: u64,
}

impl<C: Send + 'static> TokioScheduler<C> {
    pub fn new(sender: mpsc::Sender<C>) -> Self {
        Self {
            sender,
            tasks: HashMap::new(),
            next_id: 0,
        }
    }

    /// Timers not yet fired or cancelled
    pub fn active(&mut self) -> usize {
        self.tasks.retain(|_, task| !task.is_finished());
        self.tasks.len()
    }
}

impl<T, C> Scheduler<T> for TokioScheduler<C>
where
    T: Into<C>,
    C: Send + 'static,
{
    fn schedule(&mut self, after: Duration, message: T) -> TimerHandle {
        self.tasks.retain(|_, task| !task.is_finished());

        let handle = TimerHandle(self.next_id);
        self.next_id += 1;

        let sender = self.sender.clone();
        let message: C = message.into();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if sender.send(message).await.is_err() {
                debug!("Timer {:?} fired after its queue closed", handle);
            }
        });

        self.tasks.insert(handle, task.abort_handle());
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

/// A message waiting in the manual scheduler
struct Pending<T> {
    due: Duration,
    handle: TimerHandle,
    message: T,
}

impl<T> Eq for Pending<T> {}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.handle == other.handle
    }
}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior (earliest due first),
        // then earliest scheduled first
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scheduler driven by a virtual clock.
///
/// Nothing fires until [`ManualScheduler::advance`] moves the clock past a
/// message's due time; the due messages are then returned in due order.
pub struct ManualScheduler<T> {
    now: Duration,
    queue: BinaryHeap<Pending<T>>,
    cancelled: HashSet<TimerHandle>,
    next_id: u64,
}

impl<T> Default for ManualScheduler<T> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 0,
        }
    }
}

impl<T> ManualScheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward and collect every message that came due
    pub fn advance(&mut self, by: Duration) -> Vec<T> {
        self.now += by;

        let mut fired = Vec::new();
        while self.queue.peek().is_some_and(|p| p.due <= self.now) {
            if let Some(pending) = self.queue.pop() {
                if !self.cancelled.remove(&pending.handle) {
                    fired.push(pending.message);
                }
            }
        }
        fired
    }

    /// Number of messages still waiting to fire
    pub fn pending(&self) -> usize {
        self.queue
            .iter()
            .filter(|p| !self.cancelled.contains(&p.handle))
            .count()
    }

    /// Check whether a timer is still waiting to fire
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.due_at(handle).is_some()
    }

    /// Virtual time at which a pending timer fires
    pub fn due_at(&self, handle: TimerHandle) -> Option<Duration> {
        if self.cancelled.contains(&handle) {
            return None;
        }
        self.queue
            .iter()
            .find(|p| p.handle == handle)
            .map(|p| p.due)
    }
}

impl<T> Scheduler<T> for ManualScheduler<T> {
    fn schedule(&mut self, after: Duration, message: T) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;

        self.queue.push(Pending {
            due: self.now + after,
            handle,
            message,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if self.queue.iter().any(|p| p.handle == handle) {
            self.cancelled.insert(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_fires_in_due_order() {
        let mut scheduler = ManualScheduler::new();
        scheduler.schedule(Duration::from_secs(5), "late");
        scheduler.schedule(Duration::from_secs(1), "early");
        scheduler.schedule(Duration::from_secs(1), "early-second");

        assert!(scheduler.advance(Duration::from_millis(999)).is_empty());
        assert_eq!(
            scheduler.advance(Duration::from_millis(1)),
            vec!["early", "early-second"]
        );
        assert_eq!(scheduler.advance(Duration::from_secs(10)), vec!["late"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_manual_cancel_is_idempotent() {
        let mut scheduler = ManualScheduler::new();
        let keep = scheduler.schedule(Duration::from_secs(2), 1);
        let dropped = scheduler.schedule(Duration::from_secs(2), 2);

        scheduler.cancel(dropped);
        scheduler.cancel(dropped);
        assert!(!scheduler.is_pending(dropped));
        assert_eq!(scheduler.due_at(keep), Some(Duration::from_secs(2)));

        assert_eq!(scheduler.advance(Duration::from_secs(2)), vec![1]);

        // Already fired
        scheduler.cancel(keep);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_delivers_after_delay() {
        let (tx, mut rx) = mpsc::channel::<u32>(4);
        let mut scheduler = TokioScheduler::new(tx);

        scheduler.schedule(Duration::from_secs(3), 7u32);
        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_cancel() {
        let (tx, mut rx) = mpsc::channel::<u32>(4);
        let mut scheduler = TokioScheduler::new(tx);

        let first = scheduler.schedule(Duration::from_secs(1), 1u32);
        scheduler.schedule(Duration::from_secs(2), 2u32);
        Scheduler::<u32>::cancel(&mut scheduler, first);
        Scheduler::<u32>::cancel(&mut scheduler, first);

        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(scheduler.active(), 0);
    }
}
