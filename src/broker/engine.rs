//! Broker engine
//!
//! The in-memory registry of subscribers and the publish fan-out.
//!
//! Concurrency and usage notes:
//! - Every operation takes `&self`; share the broker with `Arc<Broker<T>>`.
//! - A single exclusive lock guards the registry and every subscriber's
//!   counters. Each operation holds it for its whole duration, so publishes,
//!   subscribes and unsubscribes are totally ordered.
//! - Delivery is `try_deliver`, never a blocking send: a slow or stalled
//!   subscriber loses values instead of holding the lock.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::debug;

use super::endpoint::{Endpoint, Mailbox};
use super::stats::Stats;
use super::subscriber::{Filter, Subscriber};
use crate::utils::error::BrokerError;

/// Subscribers in insertion order, plus an identity index into that order.
struct Registry<T, E: Endpoint<T>> {
    index: HashMap<E::Id, u64>,
    slots: BTreeMap<u64, Subscriber<T, E>>,
    next_seq: u64,
}

impl<T, E: Endpoint<T>> Registry<T, E> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn get(&self, id: &E::Id) -> Option<&Subscriber<T, E>> {
        self.index.get(id).and_then(|seq| self.slots.get(seq))
    }
}

/// Pub/sub coordination point for values of type `T`.
///
/// Subscribers are [`Endpoint`]s, each with an optional filter. See
/// [`publish`](Broker::publish), [`subscribe`](Broker::subscribe) and
/// [`unsubscribe`](Broker::unsubscribe).
pub struct Broker<T, E: Endpoint<T> = Mailbox<T>> {
    registry: Mutex<Registry<T, E>>,
}

impl<T, E: Endpoint<T>> Default for Broker<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E: Endpoint<T>> std::fmt::Debug for Broker<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<T, E: Endpoint<T>> Broker<T, E> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
        }
    }

    /// Number of active subscribers.
    pub fn len(&self) -> usize {
        self.registry.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_subscribed(&self, endpoint: &E) -> bool {
        self.registry.lock().index.contains_key(&endpoint.id())
    }
}

impl<T, E> Broker<T, E>
where
    T: Clone,
    E: Endpoint<T>,
{
    /// Publishes `value` to every active and matching subscriber.
    ///
    /// Each delivery is non-blocking, so values are dropped when subscribers
    /// aren't keeping up. Each receiving subscriber gets its own clone. The
    /// returned stats cover this call only; cumulative counters are available
    /// through [`stats`](Broker::stats) and
    /// [`active_subscribers`](Broker::active_subscribers).
    pub fn publish(&self, value: T) -> Stats {
        let mut registry = self.registry.lock();
        let mut stats = Stats::default();

        for subscriber in registry.slots.values_mut() {
            stats.record(subscriber.offer(&value));
        }

        stats
    }

    /// Registers `endpoint` and forwards every published value that passes
    /// `filter` to it.
    pub fn subscribe<F>(&self, endpoint: E, filter: F) -> Result<(), BrokerError>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.insert(endpoint, Some(Box::new(filter)))
    }

    /// Registers `endpoint` for every published value.
    pub fn subscribe_all(&self, endpoint: E) -> Result<(), BrokerError> {
        self.insert(endpoint, None)
    }

    fn insert(&self, endpoint: E, filter: Option<Filter<T>>) -> Result<(), BrokerError> {
        let id = endpoint.id();
        let mut registry = self.registry.lock();

        if registry.index.contains_key(&id) {
            return Err(BrokerError::AlreadySubscribed);
        }

        let seq = registry.next_seq;
        registry.next_seq += 1;
        registry.index.insert(id.clone(), seq);
        registry.slots.insert(seq, Subscriber::new(endpoint, filter));

        debug!(endpoint = ?id, subscribers = registry.slots.len(), "subscribed");
        Ok(())
    }

    /// Removes `endpoint` from the broker and returns its final stats.
    pub fn unsubscribe(&self, endpoint: &E) -> Result<Stats, BrokerError> {
        let id = endpoint.id();
        let mut registry = self.registry.lock();

        let seq = registry
            .index
            .remove(&id)
            .ok_or(BrokerError::NotSubscribed)?;
        let subscriber = registry
            .slots
            .remove(&seq)
            .ok_or(BrokerError::NotSubscribed)?;

        debug!(endpoint = ?id, stats = %subscriber.stats, "unsubscribed");
        Ok(subscriber.stats)
    }

    /// Current stats for the subscription represented by `endpoint`.
    pub fn stats(&self, endpoint: &E) -> Result<Stats, BrokerError> {
        self.registry
            .lock()
            .get(&endpoint.id())
            .map(|s| s.stats)
            .ok_or(BrokerError::NotSubscribed)
    }

    /// Stats for every active subscriber, in subscription order.
    pub fn active_subscribers(&self) -> Vec<Stats> {
        self.registry
            .lock()
            .slots
            .values()
            .map(|s| s.stats)
            .collect()
    }
}
