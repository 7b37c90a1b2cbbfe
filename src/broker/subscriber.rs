use super::endpoint::{Delivery, Endpoint};
use super::stats::{Outcome, Stats};

/// Predicate deciding whether a subscriber wants a published value.
pub type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Registry record for one active subscription.
///
/// Only reachable through the broker's registry; counters change only while
/// the registry lock is held. A missing filter accepts everything.
pub(crate) struct Subscriber<T, E> {
    endpoint: E,
    filter: Option<Filter<T>>,
    pub(crate) stats: Stats,
}

impl<T, E> Subscriber<T, E>
where
    T: Clone,
    E: Endpoint<T>,
{
    pub(crate) fn new(endpoint: E, filter: Option<Filter<T>>) -> Self {
        Self {
            endpoint,
            filter,
            stats: Stats::default(),
        }
    }

    /// Runs the filter and, if it passes, a non-blocking delivery of a copy
    /// of `value`. The outcome is recorded against this subscriber.
    pub(crate) fn offer(&mut self, value: &T) -> Outcome {
        let allowed = self.filter.as_ref().is_none_or(|allow| allow(value));
        let outcome = if !allowed {
            Outcome::Skip
        } else {
            match self.endpoint.try_deliver(value.clone()) {
                Delivery::Accepted => Outcome::Send,
                Delivery::Full | Delivery::Closed => Outcome::Drop,
            }
        };
        self.stats.record(outcome);
        outcome
    }
}
