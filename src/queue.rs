//! The shared task queue.
//!
//! [`TaskQueue`] is an unbounded FIFO queue that any number of threads may insert into and
//! retrieve from concurrently. Insertion never blocks. Retrieval blocks for at most a
//! caller-specified timeout, and reports [`QueueTimeout`] if nothing arrived in time.
//!
//! Producers and consumers do not talk to [`TaskQueue`] directly, but through the [`Enqueue`] and
//! [`Dequeue`] traits, so that a queue can be wrapped (for example to count operations).

use std::{collections::VecDeque, error::Error, fmt, time::Duration};

use crate::sync::{Condvar, Mutex};

/// The inserting half of a queue.
pub trait Enqueue<T> {
    /// Inserts `item` at the tail. Never blocks.
    fn enqueue(&self, item: T);

    /// Best-effort number of queued items, for diagnostics only.
    fn observed_size(&self) -> usize;
}

/// The retrieving half of a queue.
pub trait Dequeue<T> {
    /// Removes and returns the head item, waiting up to `timeout` for one to arrive.
    fn dequeue(&self, timeout: Duration) -> Result<T, QueueTimeout>;

    /// Removes and returns the head item if there is one, without waiting.
    fn try_dequeue(&self) -> Option<T>;
}

/// An unbounded, thread-safe FIFO queue with bounded-wait retrieval.
///
/// Every enqueued item is handed to exactly one successful [`Dequeue::dequeue`] or
/// [`Dequeue::try_dequeue`] call, in global insertion order.
///
/// The queue is meant to be shared through an [`Arc`](std::sync::Arc).
pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    /// Signaled once per inserted item, waking at most one blocked retrieval.
    available: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Returns whether the queue was empty at the time of the call.
    ///
    /// Like [`Enqueue::observed_size`], this is a hint that may be stale by the time the caller
    /// looks at it.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Enqueue<T> for TaskQueue<T> {
    fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
        // Notify after releasing the lock, so the woken thread doesn't immediately block on it.
        self.available.notify_one();
    }

    fn observed_size(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T> Dequeue<T> for TaskQueue<T> {
    fn dequeue(&self, timeout: Duration) -> Result<T, QueueTimeout> {
        let items = self.items.lock();
        let (mut items, _) = self
            .available
            .wait_timeout_while(items, timeout, |items| items.is_empty());
        // Check the queue instead of the `WaitTimeoutResult`: an item may have arrived right as
        // the wait timed out, and then it's ours to take.
        items.pop_front().ok_or(QueueTimeout { waited: timeout })
    }

    fn try_dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }
}

impl<T: fmt::Debug> fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

/// Returned by [`Dequeue::dequeue`] when no item arrived within the requested wait.
///
/// This is an expected outcome, not a fault: it is how consumers find out that the queue has been
/// idle for too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTimeout {
    waited: Duration,
}

impl QueueTimeout {
    /// The timeout that elapsed.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Error for QueueTimeout {}

impl fmt::Display for QueueTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue stayed empty for {:?}", self.waited)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Barrier},
        thread,
        time::Instant,
    };

    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn queue_is_send_sync() {
        assert_send_sync::<TaskQueue<String>>();
    }

    #[test]
    fn fifo_single_thread() {
        let queue = TaskQueue::new();
        for i in 0..5 {
            queue.enqueue(i);
        }
        assert_eq!(queue.observed_size(), 5);
        let out: Vec<_> = (0..5)
            .map(|_| queue.dequeue(Duration::ZERO).unwrap())
            .collect();
        assert_eq!(out, [0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_on_non_empty_does_not_wait() {
        let queue = TaskQueue::new();
        queue.enqueue("a");
        let start = Instant::now();
        assert_eq!(queue.dequeue(Duration::from_secs(10)), Ok("a"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn dequeue_times_out_when_empty() {
        let queue = TaskQueue::<u32>::new();
        let timeout = Duration::from_millis(30);
        let start = Instant::now();
        let err = queue.dequeue(timeout).unwrap_err();
        assert!(start.elapsed() >= timeout);
        assert_eq!(err.waited(), timeout);
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn enqueue_before_timeout_wakes_waiter() {
        let queue = Arc::new(TaskQueue::new());
        let q2 = queue.clone();
        let waiter = thread::spawn(move || q2.dequeue(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        queue.enqueue(7);
        assert_eq!(waiter.join().unwrap(), Ok(7));
    }

    #[test]
    fn no_loss_no_duplication() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let queue = Arc::new(TaskQueue::new());
        let barrier = Arc::new(Barrier::new(PRODUCERS + CONSUMERS));

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = queue.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let mut seen = Vec::new();
                    while let Ok(item) = queue.dequeue(Duration::from_millis(200)) {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_PRODUCER {
                        queue.enqueue((p, i));
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        let mut all = Vec::new();
        for consumer in consumers {
            let seen = consumer.join().unwrap();
            // Items from one producer are observed by one consumer in the order they were inserted.
            for p in 0..PRODUCERS {
                let from_p: Vec<_> = seen.iter().filter(|(q, _)| *q == p).collect();
                assert!(from_p.windows(2).all(|w| w[0].1 < w[1].1));
            }
            all.extend(seen);
        }

        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());
        assert!(queue.is_empty());
    }
}
