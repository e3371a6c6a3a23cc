//! Consumers, and how they decide that there is no more work.
//!
//! Producers never announce that they are done. By default, a [`Consumer`] therefore relies on a
//! heuristic: if the queue stays empty for its whole idle threshold, production is assumed to be
//! over and the consumer exits. With producers finishing at different times, this can strand
//! items, since every consumer may have given up before a slow producer's last item arrives.
//!
//! [`TerminationPolicy::ProducerCountdown`] closes that gap. Every producer holds a
//! [`ProducerToken`] while it runs, and consumers only give up once all tokens are released and a
//! final drain of the queue comes up empty.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    delay::DelaySource,
    lifecycle::{Lifecycle, UnitKind},
    queue::Dequeue,
};

/// How consumers decide that production has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationPolicy {
    /// Exit after the queue has been empty for the idle threshold.
    ///
    /// Items that arrive after every consumer has exited stay in the queue.
    #[default]
    IdleTimeout,
    /// Like [`TerminationPolicy::IdleTimeout`], but keep waiting while any producer is still
    /// running, and drain the queue once the last one has exited.
    ProducerCountdown,
}

/// Shared count of producers that have not exited yet.
#[derive(Debug, Clone, Default)]
pub struct LiveProducers {
    count: Arc<AtomicUsize>,
}

impl LiveProducers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more live producer, until the returned token is dropped.
    pub fn register(&self) -> ProducerToken {
        self.count.fetch_add(1, Ordering::AcqRel);
        ProducerToken {
            count: self.count.clone(),
        }
    }

    /// Number of tokens that have not been dropped yet.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// Marks a producer as live. Dropping it (including during unwinding) marks it as exited.
#[derive(Debug)]
pub struct ProducerToken {
    count: Arc<AtomicUsize>,
}

impl Drop for ProducerToken {
    fn drop(&mut self) {
        // Release: everything this producer enqueued is visible to a consumer that sees the
        // decremented count.
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The state of a [`Consumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Active,
    /// The consumer has given up on the queue and will not touch it again.
    Terminated,
}

/// Takes items out of a queue and processes them until the queue goes idle.
pub struct Consumer<T, D> {
    id: usize,
    idle_threshold: Duration,
    delay: D,
    countdown: Option<LiveProducers>,
    state: ConsumerState,
    processed: Vec<T>,
    queue_operations: usize,
}

impl<T: fmt::Display, D: DelaySource> Consumer<T, D> {
    /// Creates a consumer that gives up once the queue has been empty for `idle_threshold`.
    ///
    /// Processing an item takes the next delay from `delay`.
    pub fn new(id: usize, idle_threshold: Duration, delay: D) -> Self {
        Self {
            id,
            idle_threshold,
            delay,
            countdown: None,
            state: ConsumerState::Active,
            processed: Vec::new(),
            queue_operations: 0,
        }
    }

    /// Switches this consumer to [`TerminationPolicy::ProducerCountdown`], tracking `live`.
    pub fn with_countdown(self, live: LiveProducers) -> Self {
        Self {
            countdown: Some(live),
            ..self
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Number of queue operations issued so far.
    pub fn queue_operations(&self) -> usize {
        self.queue_operations
    }

    /// Performs one state transition and returns the new state.
    ///
    /// While active, this waits for an item for up to the idle threshold and processes it. Once
    /// terminated, this returns immediately without touching `queue`.
    pub fn step<Q>(&mut self, queue: &Q) -> ConsumerState
    where
        Q: Dequeue<T> + ?Sized,
    {
        if self.state == ConsumerState::Terminated {
            return ConsumerState::Terminated;
        }

        self.queue_operations += 1;
        match queue.dequeue(self.idle_threshold) {
            Ok(item) => self.process(item),
            Err(timeout) => match self.countdown.as_ref().map(LiveProducers::count) {
                Some(0) => {
                    self.drain(queue);
                    log::debug!("consumer {}: all producers done, exiting", self.id);
                    self.state = ConsumerState::Terminated;
                }
                Some(live) => {
                    log::debug!(
                        "consumer {}: {timeout}, but {live} producer(s) still running",
                        self.id,
                    );
                }
                None => {
                    log::debug!("consumer {}: {timeout}, exiting", self.id);
                    self.state = ConsumerState::Terminated;
                }
            },
        }
        self.state
    }

    /// Steps until terminated.
    pub fn run<Q>(mut self, queue: &Q) -> ConsumerReport<T>
    where
        Q: Dequeue<T> + ?Sized,
    {
        let _lifecycle = Lifecycle::start(UnitKind::Consumer, self.id);
        while self.step(queue) == ConsumerState::Active {}
        self.into_report()
    }

    pub fn into_report(self) -> ConsumerReport<T> {
        ConsumerReport {
            id: self.id,
            processed: self.processed,
            queue_operations: self.queue_operations,
        }
    }

    /// Processes whatever is left without waiting.
    fn drain<Q>(&mut self, queue: &Q)
    where
        Q: Dequeue<T> + ?Sized,
    {
        loop {
            self.queue_operations += 1;
            match queue.try_dequeue() {
                Some(item) => self.process(item),
                None => break,
            }
        }
    }

    fn process(&mut self, item: T) {
        log::trace!("consumer {} got {item}", self.id);
        self.delay.pause();
        log::trace!("consumer {} finished {item}", self.id);
        self.processed.push(item);
    }
}

/// What a [`Consumer`] did before it terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport<T> {
    pub id: usize,
    /// Items in the order they were processed.
    pub processed: Vec<T>,
    /// Every `dequeue` and `try_dequeue` issued, including the one that timed out.
    pub queue_operations: usize,
}
