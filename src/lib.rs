//! A bounded-wait multi-producer/multi-consumer task queue, and two small inter-thread handshakes.
//!
//! # Overview
//!
//! The centerpiece of this library is the [`TaskQueue`]: an unbounded FIFO queue that any number
//! of threads can insert into and retrieve from. Insertion never blocks; retrieval waits for at
//! most a caller-specified timeout.
//!
//! Around it sit the units that use it:
//!
//! - A [`Producer`] makes a fixed number of [`TaskItem`]s, pausing before each one to simulate
//!   work, and puts them into the queue.
//! - A [`Consumer`] takes items out of the queue and processes them, until the queue has been
//!   empty for longer than its *idle threshold*.
//! - The [`Orchestrator`] spawns all consumers, then all producers, each on its own named thread,
//!   and waits for every one of them to exit.
//!
//! ## Knowing when to stop
//!
//! Producers never tell consumers that they are done. A consumer has to infer it: if no work
//! shows up for a whole idle threshold, it assumes none will, and exits. This is a heuristic, and
//! it can be wrong. If a slow producer's item arrives after every consumer has given up, that item
//! stays in the queue forever. The [`RunReport`] lists such items as `stranded`.
//!
//! [`TerminationPolicy::ProducerCountdown`] trades the heuristic for an exact answer: producers
//! hold a token while they run, and consumers only exit once all tokens are gone and a final
//! drain of the queue comes up empty.
//!
//! ## Simulated work
//!
//! All pauses come from a [`DelaySource`]. By default that is a random [`DelayRange`]; tests (and
//! [`Orchestrator::with_delays`]) can supply exact durations instead.
//!
//! # Usage
//!
//! Running the producer/consumer demonstration with shortened timings:
//!
//! ```
//! use std::time::Duration;
//! use taskwait::{DelayRange, Orchestrator, QueueDemoConfig};
//!
//! let config = QueueDemoConfig::new()
//!     .idle_threshold(Duration::from_millis(300))
//!     .production_delay(DelayRange::new(Duration::from_millis(5), Duration::from_millis(10)))
//!     .consumption_delay(DelayRange::new(Duration::from_millis(8), Duration::from_millis(15)));
//!
//! let report = Orchestrator::new(config).run().unwrap();
//! assert!(report.all_completed());
//! assert_eq!(report.produced().count(), 6);
//! assert_eq!(report.consumed().count(), 6);
//! ```
//!
//! Using the queue directly:
//!
//! ```
//! use std::{sync::Arc, thread, time::Duration};
//! use taskwait::{Dequeue, Enqueue, TaskQueue};
//!
//! let queue = Arc::new(TaskQueue::new());
//! let q = queue.clone();
//! let consumer = thread::spawn(move || q.dequeue(Duration::from_secs(5)));
//!
//! queue.enqueue("work");
//! assert_eq!(consumer.join().unwrap(), Ok("work"));
//! assert!(queue.dequeue(Duration::from_millis(10)).is_err());
//! ```
//!
//! # Handshakes
//!
//! The [`pipe`] module provides a duplex pipe and a parent/child exchange over it, and the
//! [`echo`] module a single-connection TCP acknowledgement server and its client.
//!
//! # Logging
//!
//! Diagnostics go through the [`log`] facade. Unit start and exit, and every item, are logged at
//! `trace` level; run milestones at `debug`; stranded items, panicked units and missed responses
//! at `warn`. No logger is installed by this crate.
//!
//! [`log`]: https://crates.io/crates/log

mod consumer;
mod delay;
pub mod echo;
mod lifecycle;
mod orchestrator;
pub mod pipe;
mod producer;
mod queue;
mod sync;
mod unit;


pub use consumer::{
    Consumer, ConsumerReport, ConsumerState, LiveProducers, ProducerToken, TerminationPolicy,
};
pub use delay::{DelayRange, DelaySource};
pub use lifecycle::UnitKind;
pub use orchestrator::{BoxedDelay, Orchestrator, QueueDemoConfig, RunReport};
pub use producer::{Producer, ProducerReport, TaskItem};
pub use queue::{Dequeue, Enqueue, QueueTimeout, TaskQueue};
pub use unit::{Panicked, Unit, UnitBuilder};
