//! Producers and the items they make.

use std::fmt;

use crate::{
    consumer::ProducerToken,
    delay::DelaySource,
    lifecycle::{Lifecycle, UnitKind},
    queue::Enqueue,
};

/// A unit of work, identified by the producer that made it and its position in that producer's
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskItem {
    producer: usize,
    seq: usize,
}

impl TaskItem {
    pub fn new(producer: usize, seq: usize) -> Self {
        Self { producer, seq }
    }

    /// ID of the producer that made this item (starting at 1).
    pub fn producer(&self) -> usize {
        self.producer
    }

    /// Index of this item among its producer's items (starting at 0).
    pub fn seq(&self) -> usize {
        self.seq
    }

    /// The item's label, `Task-{producer}-{seq}`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TaskItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task-{}-{}", self.producer, self.seq)
    }
}

/// Makes a fixed number of [`TaskItem`]s and puts them into a queue.
///
/// Before every item, the producer pauses for the next delay from its [`DelaySource`], simulating
/// the work of making it.
pub struct Producer<D> {
    id: usize,
    quota: usize,
    delay: D,
    token: Option<ProducerToken>,
}

impl<D: DelaySource> Producer<D> {
    pub fn new(id: usize, quota: usize, delay: D) -> Self {
        Self {
            id,
            quota,
            delay,
            token: None,
        }
    }

    /// Attaches a [`ProducerToken`], which is released when this producer exits.
    ///
    /// Consumers using [`TerminationPolicy::ProducerCountdown`] wait for all tokens to be released
    /// before they give up on the queue.
    ///
    /// [`TerminationPolicy::ProducerCountdown`]: crate::TerminationPolicy::ProducerCountdown
    pub fn with_token(self, token: ProducerToken) -> Self {
        Self {
            token: Some(token),
            ..self
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Produces all items into `queue`, then exits.
    pub fn run<Q>(mut self, queue: &Q) -> ProducerReport
    where
        Q: Enqueue<TaskItem> + ?Sized,
    {
        let _lifecycle = Lifecycle::start(UnitKind::Producer, self.id);
        // Keep the token alive until after the last item is in the queue.
        let _token = self.token.take();

        let mut produced = Vec::with_capacity(self.quota);
        for seq in 0..self.quota {
            let item = TaskItem::new(self.id, seq);
            log::trace!("producer {} producing {item}", self.id);
            self.delay.pause();

            queue.enqueue(item);
            log::trace!(
                "producer {} put {item} into queue (size {})",
                self.id,
                queue.observed_size()
            );
            produced.push(item);
        }

        ProducerReport {
            id: self.id,
            produced,
        }
    }
}

/// What a [`Producer`] did before it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    pub id: usize,
    /// Items in the order they were enqueued.
    pub produced: Vec<TaskItem>,
}
