//! Running a full set of producers and consumers against one queue.

use std::{fmt, io, sync::Arc, time::Duration};

use crate::{
    consumer::{Consumer, ConsumerReport, LiveProducers, ProducerToken, TerminationPolicy},
    delay::{DelayRange, DelaySource},
    lifecycle::UnitKind,
    producer::{Producer, ProducerReport, TaskItem},
    queue::{Dequeue, TaskQueue},
    unit::{Panicked, Unit, UnitBuilder},
};

/// Parameters of a producer/consumer run.
///
/// The defaults are 2 producers making 3 items each, 2 consumers that give up after 3 seconds
/// without work, 0.5–1.0 s to make an item, and 0.8–1.5 s to process one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDemoConfig {
    producers: usize,
    consumers: usize,
    quota: usize,
    idle_threshold: Duration,
    production_delay: DelayRange,
    consumption_delay: DelayRange,
    termination: TerminationPolicy,
}

impl Default for QueueDemoConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            quota: 3,
            idle_threshold: Duration::from_secs(3),
            production_delay: DelayRange::new(
                Duration::from_millis(500),
                Duration::from_millis(1000),
            ),
            consumption_delay: DelayRange::new(
                Duration::from_millis(800),
                Duration::from_millis(1500),
            ),
            termination: TerminationPolicy::IdleTimeout,
        }
    }
}

impl QueueDemoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of producers.
    #[inline]
    pub fn producers(self, producers: usize) -> Self {
        Self { producers, ..self }
    }

    /// Sets the number of consumers.
    #[inline]
    pub fn consumers(self, consumers: usize) -> Self {
        Self { consumers, ..self }
    }

    /// Sets the number of items every producer makes.
    #[inline]
    pub fn quota(self, quota: usize) -> Self {
        Self { quota, ..self }
    }

    /// Sets how long a consumer waits on an empty queue before giving up.
    #[inline]
    pub fn idle_threshold(self, idle_threshold: Duration) -> Self {
        Self {
            idle_threshold,
            ..self
        }
    }

    /// Sets how long it takes a producer to make one item.
    #[inline]
    pub fn production_delay(self, production_delay: DelayRange) -> Self {
        Self {
            production_delay,
            ..self
        }
    }

    /// Sets how long it takes a consumer to process one item.
    #[inline]
    pub fn consumption_delay(self, consumption_delay: DelayRange) -> Self {
        Self {
            consumption_delay,
            ..self
        }
    }

    /// Sets how consumers decide that production has ended.
    ///
    /// The default, [`TerminationPolicy::IdleTimeout`], can strand items.
    #[inline]
    pub fn termination(self, termination: TerminationPolicy) -> Self {
        Self {
            termination,
            ..self
        }
    }

    /// Total number of items the producers will make.
    pub fn total_items(&self) -> usize {
        self.producers * self.quota
    }
}

/// A type-erased [`DelaySource`] owned by a single unit.
pub type BoxedDelay = Box<dyn FnMut() -> Duration + Send>;

type DelayFactory = Box<dyn Fn(UnitKind, usize) -> BoxedDelay + Send + Sync>;

/// Spawns consumers and producers, and waits for all of them to exit.
///
/// Every call to [`Orchestrator::run`] uses a fresh [`TaskQueue`]. All consumers are spawned before
/// the first producer, so that they are already waiting when the first item arrives.
///
/// There is no overall deadline: if a unit never exits, [`Orchestrator::run`] never returns.
pub struct Orchestrator {
    config: QueueDemoConfig,
    delays: DelayFactory,
}

impl Orchestrator {
    /// Creates an orchestrator whose units draw their delays from the ranges in `config`.
    pub fn new(config: QueueDemoConfig) -> Self {
        let (production, consumption) = (config.production_delay, config.consumption_delay);
        Self {
            config,
            delays: Box::new(move |kind: UnitKind, _: usize| -> BoxedDelay {
                let mut range = match kind {
                    UnitKind::Producer => production,
                    UnitKind::Consumer => consumption,
                };
                Box::new(move || range.next_delay())
            }),
        }
    }

    /// Overrides the delay source of every unit.
    ///
    /// `delays` is called once per unit, with its kind and its ID (starting at 1), before the unit
    /// is spawned.
    pub fn with_delays<F>(self, delays: F) -> Self
    where
        F: Fn(UnitKind, usize) -> BoxedDelay + Send + Sync + 'static,
    {
        Self {
            delays: Box::new(delays),
            ..self
        }
    }

    /// Runs all units to completion and reports what each of them did.
    ///
    /// Returns an error only if the OS refuses to spawn a thread. Units that were already spawned
    /// are joined before the error is returned.
    pub fn run(&self) -> io::Result<RunReport> {
        let config = &self.config;
        let queue: Arc<TaskQueue<TaskItem>> = Arc::new(TaskQueue::new());
        log::debug!(
            "starting {} consumer(s) and {} producer(s) ({:?})",
            config.consumers,
            config.producers,
            config.termination,
        );

        // Declared before the tokens, so an early return releases the tokens before joining.
        let mut consumers = Vec::with_capacity(config.consumers);
        let mut producers = Vec::with_capacity(config.producers);

        // Registered up front, so no consumer sees zero live producers before they start.
        let live = LiveProducers::new();
        let mut tokens: Vec<ProducerToken> = match config.termination {
            TerminationPolicy::IdleTimeout => Vec::new(),
            TerminationPolicy::ProducerCountdown => {
                (0..config.producers).map(|_| live.register()).collect()
            }
        };

        for id in 1..=config.consumers {
            let mut consumer = Consumer::new(
                id,
                config.idle_threshold,
                (self.delays)(UnitKind::Consumer, id),
            );
            if config.termination == TerminationPolicy::ProducerCountdown {
                consumer = consumer.with_countdown(live.clone());
            }
            let queue = queue.clone();
            consumers.push(spawn_unit(UnitKind::Consumer, id, move || {
                consumer.run(&*queue)
            })?);
        }

        for id in 1..=config.producers {
            let mut producer =
                Producer::new(id, config.quota, (self.delays)(UnitKind::Producer, id));
            if let Some(token) = tokens.pop() {
                producer = producer.with_token(token);
            }
            let queue = queue.clone();
            producers.push(spawn_unit(UnitKind::Producer, id, move || {
                producer.run(&*queue)
            })?);
        }

        let producers: Vec<_> = producers.into_iter().map(Unit::join).collect();
        let consumers: Vec<_> = consumers.into_iter().map(Unit::join).collect();

        let mut stranded = Vec::new();
        while let Some(item) = queue.try_dequeue() {
            stranded.push(item);
        }

        let report = RunReport {
            producers,
            consumers,
            stranded,
        };
        for panicked in report.panicked() {
            log::warn!("{panicked}");
        }
        if !report.stranded.is_empty() {
            log::warn!(
                "{} item(s) left in the queue after all consumers exited",
                report.stranded.len()
            );
        }
        log::debug!("run complete: {report}");
        Ok(report)
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn spawn_unit<R, F>(kind: UnitKind, id: usize, f: F) -> io::Result<Unit<R>>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    UnitBuilder::new().name(format!("{kind}-{id}")).spawn(f)
}

/// The outcome of an [`Orchestrator::run`].
#[derive(Debug)]
pub struct RunReport {
    /// One entry per producer, in ID order.
    pub producers: Vec<Result<ProducerReport, Panicked>>,
    /// One entry per consumer, in ID order.
    pub consumers: Vec<Result<ConsumerReport<TaskItem>, Panicked>>,
    /// Items still in the queue after every unit exited, in queue order.
    pub stranded: Vec<TaskItem>,
}

impl RunReport {
    /// Items enqueued by producers that exited normally.
    pub fn produced(&self) -> impl Iterator<Item = &TaskItem> {
        self.producers
            .iter()
            .flatten()
            .flat_map(|report| &report.produced)
    }

    /// Items processed by consumers that exited normally.
    pub fn consumed(&self) -> impl Iterator<Item = &TaskItem> {
        self.consumers
            .iter()
            .flatten()
            .flat_map(|report| &report.processed)
    }

    /// Panics of any unit.
    pub fn panicked(&self) -> impl Iterator<Item = &Panicked> {
        let producers = self.producers.iter().filter_map(|r| r.as_ref().err());
        let consumers = self.consumers.iter().filter_map(|r| r.as_ref().err());
        producers.chain(consumers)
    }

    /// Returns whether every unit exited normally.
    pub fn all_completed(&self) -> bool {
        self.panicked().next().is_none()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} produced, {} consumed, {} stranded, {} of {} units panicked",
            self.produced().count(),
            self.consumed().count(),
            self.stranded.len(),
            self.panicked().count(),
            self.producers.len() + self.consumers.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::test::silent_panic;

    use super::*;

    fn fast() -> QueueDemoConfig {
        QueueDemoConfig::new()
            .idle_threshold(Duration::from_millis(300))
            .production_delay(DelayRange::new(
                Duration::from_millis(5),
                Duration::from_millis(20),
            ))
            .consumption_delay(DelayRange::new(
                Duration::from_millis(5),
                Duration::from_millis(20),
            ))
    }

    /// Producer 1 is instant, producer 2 takes far longer per item than the idle threshold.
    fn staggered(kind: UnitKind, id: usize) -> BoxedDelay {
        let delay = match (kind, id) {
            (UnitKind::Producer, 2) => Duration::from_millis(300),
            _ => Duration::ZERO,
        };
        Box::new(move || delay)
    }

    fn race_config() -> QueueDemoConfig {
        QueueDemoConfig::new()
            .producers(2)
            .consumers(1)
            .quota(3)
            .idle_threshold(Duration::from_millis(60))
    }

    #[test]
    fn defaults() {
        let config = QueueDemoConfig::default();
        assert_eq!(config.producers, 2);
        assert_eq!(config.consumers, 2);
        assert_eq!(config.quota, 3);
        assert_eq!(config.total_items(), 6);
        assert_eq!(config.idle_threshold, Duration::from_secs(3));
        assert_eq!(config.production_delay.min(), Duration::from_millis(500));
        assert_eq!(config.production_delay.max(), Duration::from_millis(1000));
        assert_eq!(config.consumption_delay.min(), Duration::from_millis(800));
        assert_eq!(config.consumption_delay.max(), Duration::from_millis(1500));
        assert_eq!(config.termination, TerminationPolicy::IdleTimeout);
    }

    #[test]
    fn two_producers_two_consumers() {
        let report = Orchestrator::new(fast()).run().unwrap();

        assert_eq!(report.producers.len(), 2);
        assert_eq!(report.consumers.len(), 2);
        assert!(report.all_completed());
        assert_eq!(report.produced().count(), 6);
        assert_eq!(report.consumed().count(), 6);
        assert!(report.stranded.is_empty());

        let produced: HashSet<_> = report.produced().collect();
        let consumed: HashSet<_> = report.consumed().collect();
        assert_eq!(produced, consumed);
    }

    #[test]
    fn every_item_consumed_exactly_once() {
        let config = fast().producers(4).consumers(3).quota(10);
        let delays = |_: UnitKind, _: usize| -> BoxedDelay { Box::new(|| Duration::ZERO) };
        let report = Orchestrator::new(config).with_delays(delays).run().unwrap();

        let consumed: Vec<_> = report.consumed().copied().collect();
        let unique: HashSet<_> = consumed.iter().copied().collect();
        assert_eq!(consumed.len(), 40);
        assert_eq!(unique.len(), 40);
        for producer in 1..=4 {
            for seq in 0..10 {
                assert!(unique.contains(&TaskItem::new(producer, seq)));
            }
        }
    }

    #[test]
    fn idle_timeout_can_strand_items() {
        // The consumer drains producer 1 and gives up long before producer 2's first item.
        let report = Orchestrator::new(race_config())
            .with_delays(staggered)
            .run()
            .unwrap();

        assert!(report.all_completed());
        assert_eq!(report.produced().count(), 6);
        assert!(!report.stranded.is_empty());
        assert!(report.consumed().count() < 6);
        assert_eq!(report.consumed().count() + report.stranded.len(), 6);
        assert!(report.stranded.iter().all(|item| item.producer() == 2));
    }

    #[test]
    fn countdown_strands_nothing() {
        let config = race_config().termination(TerminationPolicy::ProducerCountdown);
        let report = Orchestrator::new(config)
            .with_delays(staggered)
            .run()
            .unwrap();

        assert!(report.all_completed());
        assert!(report.stranded.is_empty());
        assert_eq!(report.consumed().count(), 6);
    }

    #[test]
    fn panicking_producer_is_reported() {
        let delays = |kind: UnitKind, id: usize| -> BoxedDelay {
            match (kind, id) {
                (UnitKind::Producer, 2) => Box::new(|| -> Duration { silent_panic("faulty") }),
                _ => Box::new(|| Duration::ZERO),
            }
        };
        for policy in [
            TerminationPolicy::IdleTimeout,
            TerminationPolicy::ProducerCountdown,
        ] {
            let config = fast().idle_threshold(Duration::from_millis(50)).termination(policy);
            let report = Orchestrator::new(config).with_delays(delays).run().unwrap();

            assert!(!report.all_completed());
            let panicked: Vec<_> = report.panicked().collect();
            assert_eq!(panicked.len(), 1);
            assert_eq!(panicked[0].unit(), Some("producer-2"));
            assert_eq!(panicked[0].message(), Some("faulty"));
            assert!(report.producers[0].is_ok());
            assert!(report.consumers.iter().all(Result::is_ok));
            assert_eq!(report.consumed().count(), 3);
        }
    }

    #[test]
    fn no_consumers_strands_everything() {
        let config = fast().consumers(0);
        let report = Orchestrator::new(config).run().unwrap();
        assert_eq!(report.stranded.len(), 6);
        // Global insertion order is kept among the stranded items.
        let from_1: Vec<_> = report.stranded.iter().filter(|i| i.producer() == 1).collect();
        assert!(from_1.windows(2).all(|w| w[0].seq() < w[1].seq()));
    }

    #[test]
    fn no_producers() {
        let config = fast()
            .producers(0)
            .idle_threshold(Duration::from_millis(20))
            .termination(TerminationPolicy::ProducerCountdown);
        let report = Orchestrator::new(config).run().unwrap();
        assert!(report.all_completed());
        assert_eq!(report.consumed().count(), 0);
        assert_eq!(report.to_string(), "0 produced, 0 consumed, 0 stranded, 0 of 2 units panicked");
    }
}
