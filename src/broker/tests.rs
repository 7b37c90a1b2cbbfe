use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;

use super::{Broker, Delivery, Endpoint, Outcome, Stats, mailbox};
use crate::utils::error::BrokerError;

/// Endpoint with a caller-chosen identity that records what it accepts.
#[derive(Clone)]
struct Recorder {
    name: &'static str,
    capacity: usize,
    accepted: Arc<Mutex<Vec<i32>>>,
}

impl Recorder {
    fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            accepted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn drain(&self) -> Vec<i32> {
        std::mem::take(&mut *self.accepted.lock())
    }
}

impl Endpoint<i32> for Recorder {
    type Id = &'static str;

    fn id(&self) -> &'static str {
        self.name
    }

    fn try_deliver(&self, value: i32) -> Delivery {
        let mut accepted = self.accepted.lock();
        if accepted.len() >= self.capacity {
            return Delivery::Full;
        }
        accepted.push(value);
        Delivery::Accepted
    }
}

#[test]
fn test_stats_total_and_display() {
    let stats = Stats::new(1, 2, 3);
    assert_eq!(stats.total(), 6);
    assert_eq!(stats.to_string(), "skips=1 sends=2 drops=3 total=6");
    assert_eq!(Stats::default(), Stats::new(0, 0, 0));
}

#[test]
fn test_stats_record() {
    let mut stats = Stats::default();
    stats.record(Outcome::Skip);
    stats.record(Outcome::Send);
    stats.record(Outcome::Send);
    stats.record(Outcome::Drop);
    assert_eq!(stats, Stats::new(1, 2, 1));
}

#[test]
fn test_stats_serialize_named_fields() {
    let json = serde_json::to_value(Stats::new(4, 5, 6)).unwrap();
    assert_eq!(json, serde_json::json!({ "skips": 4, "sends": 5, "drops": 6 }));
}

#[test]
fn test_broker_new() {
    let broker: Broker<i32> = Broker::default();
    assert!(broker.is_empty());
    assert!(broker.active_subscribers().is_empty());
}

#[test]
fn test_publish_no_subscribers() {
    let broker: Broker<i32> = Broker::new();
    assert_eq!(broker.publish(1), Stats::default());
    assert_eq!(broker.publish(2), Stats::default());
    assert_eq!(broker.publish(3), Stats::default());
}

#[test]
fn test_skip_subscriber() {
    let broker: Broker<i32> = Broker::new();
    let (tx, mut rx) = mailbox::<i32>(10);
    broker.subscribe(tx.clone(), |_: &i32| false).unwrap();

    assert_eq!(broker.publish(1), Stats::new(1, 0, 0));
    assert_eq!(broker.publish(2), Stats::new(1, 0, 0));
    assert_eq!(broker.publish(3), Stats::new(1, 0, 0));

    assert_eq!(broker.unsubscribe(&tx), Ok(Stats::new(3, 0, 0)));
    assert!(rx.try_recv().is_none());
}

#[test]
fn test_slow_subscriber() {
    let broker: Broker<i32> = Broker::new();
    let (c1, mut r1) = mailbox::<i32>(1);
    let (c3, mut r3) = mailbox::<i32>(3);
    broker.subscribe_all(c1.clone()).unwrap();
    broker.subscribe_all(c3.clone()).unwrap();

    assert_eq!(broker.publish(1), Stats::new(0, 2, 0));
    assert_eq!(broker.publish(2), Stats::new(0, 1, 1));
    assert_eq!(broker.publish(3), Stats::new(0, 1, 1));
    assert_eq!(broker.publish(4), Stats::new(0, 0, 2));
    assert_eq!(broker.publish(5), Stats::new(0, 0, 2));

    assert_eq!(r1.try_recv(), Some(1));
    assert_eq!(r3.try_recv(), Some(1));

    assert_eq!(broker.publish(6), Stats::new(0, 2, 0));
    assert_eq!(broker.publish(7), Stats::new(0, 0, 2));

    assert_eq!(broker.unsubscribe(&c1), Ok(Stats::new(0, 2, 5)));
    assert_eq!(broker.unsubscribe(&c3), Ok(Stats::new(0, 4, 3)));

    // Second removal is a one-shot failure, as is a query afterwards.
    assert_eq!(broker.unsubscribe(&c1), Err(BrokerError::NotSubscribed));
    assert_eq!(broker.stats(&c1), Err(BrokerError::NotSubscribed));
}

#[test]
fn test_capacity_one_send_drop_send() {
    let broker: Broker<i32> = Broker::new();
    let (tx, mut rx) = mailbox::<i32>(1);
    broker.subscribe_all(tx.clone()).unwrap();

    assert_eq!(broker.publish(10), Stats::new(0, 1, 0));
    assert_eq!(broker.publish(11), Stats::new(0, 0, 1));
    assert_eq!(rx.try_recv(), Some(10));
    assert_eq!(broker.publish(12), Stats::new(0, 1, 0));
    assert_eq!(rx.try_recv(), Some(12));
}

#[test]
fn test_subscriber_stats() {
    let broker: Broker<i32> = Broker::new();
    let (mod2, _r2) = mailbox::<i32>(100);
    let (mod3, _r3) = mailbox::<i32>(100);
    broker.subscribe(mod2.clone(), |i: &i32| i % 2 == 0).unwrap();
    broker.subscribe(mod3.clone(), |i: &i32| i % 3 == 0).unwrap();

    assert_eq!(broker.publish(1), Stats::new(2, 0, 0));
    assert_eq!(broker.publish(2), Stats::new(1, 1, 0));
    assert_eq!(broker.publish(3), Stats::new(1, 1, 0));
    assert_eq!(broker.publish(4), Stats::new(1, 1, 0));
    assert_eq!(broker.publish(5), Stats::new(2, 0, 0));
    assert_eq!(broker.publish(6), Stats::new(0, 2, 0));

    let mod2_stats = broker.stats(&mod2).unwrap();
    assert_eq!(mod2_stats, Stats::new(3, 3, 0));
    let mod3_stats = broker.stats(&mod3).unwrap();
    assert_eq!(mod3_stats, Stats::new(4, 2, 0));

    let all = broker.active_subscribers();
    assert_eq!(all, vec![mod2_stats, mod3_stats]);

    assert_eq!(broker.unsubscribe(&mod2), Ok(mod2_stats));
    assert_eq!(broker.unsubscribe(&mod3), Ok(mod3_stats));
    assert!(broker.is_empty());
}

#[test]
fn test_duplicate_subscribe_rejected() {
    let broker: Broker<i32> = Broker::new();
    let (tx, _rx) = mailbox::<i32>(4);
    broker.subscribe_all(tx.clone()).unwrap();
    broker.publish(1);

    // A clone shares the identity, so it counts as the same endpoint.
    assert_eq!(
        broker.subscribe(tx.clone(), |_: &i32| false),
        Err(BrokerError::AlreadySubscribed)
    );
    assert_eq!(broker.len(), 1);

    // The original record and its accept-all filter are untouched.
    assert_eq!(broker.publish(2), Stats::new(0, 1, 0));
    assert_eq!(broker.stats(&tx), Ok(Stats::new(0, 2, 0)));
}

#[test]
fn test_unsubscribe_unknown() {
    let broker: Broker<i32> = Broker::new();
    let (known, _r1) = mailbox::<i32>(1);
    let (unknown, _r2) = mailbox::<i32>(1);
    broker.subscribe_all(known.clone()).unwrap();

    assert_eq!(broker.unsubscribe(&unknown), Err(BrokerError::NotSubscribed));
    assert_eq!(broker.len(), 1);
    assert!(broker.is_subscribed(&known));
    assert!(!broker.is_subscribed(&unknown));
}

#[test]
fn test_registry_size_tracks_successful_calls() {
    let broker: Broker<i32> = Broker::new();
    let endpoints: Vec<_> = (0..10).map(|_| mailbox::<i32>(1)).collect();

    for (tx, _) in &endpoints {
        broker.subscribe_all(tx.clone()).unwrap();
    }
    // Duplicates and unknown removals don't change the count.
    assert!(broker.subscribe_all(endpoints[0].0.clone()).is_err());
    for (tx, _) in endpoints.iter().step_by(3) {
        broker.unsubscribe(tx).unwrap();
        assert!(broker.unsubscribe(tx).is_err());
    }

    assert_eq!(broker.len(), 10 - 4);
    assert_eq!(broker.active_subscribers().len(), broker.len());
}

#[test]
fn test_active_subscribers_insertion_order() {
    let broker: Broker<i32, Recorder> = Broker::new();
    let a = Recorder::new("a", 10);
    let b = Recorder::new("b", 10);
    let c = Recorder::new("c", 10);
    broker.subscribe(c.clone(), |v: &i32| *v > 100).unwrap();
    broker.subscribe_all(a.clone()).unwrap();
    broker.subscribe(b.clone(), |v: &i32| v % 2 == 0).unwrap();

    broker.publish(1);
    broker.publish(2);

    let first = broker.active_subscribers();
    assert_eq!(
        first,
        vec![Stats::new(2, 0, 0), Stats::new(0, 2, 0), Stats::new(1, 1, 0)]
    );
    assert_eq!(first, broker.active_subscribers());

    // Removing from the middle keeps the remaining order.
    broker.unsubscribe(&a).unwrap();
    broker.subscribe_all(a.clone()).unwrap();
    assert_eq!(
        broker.active_subscribers(),
        vec![Stats::new(2, 0, 0), Stats::new(1, 1, 0), Stats::new(0, 0, 0)]
    );
}

#[test]
fn test_custom_endpoint_delivery() {
    let broker: Broker<i32, Recorder> = Broker::new();
    let rec = Recorder::new("rec", 2);
    broker.subscribe_all(rec.clone()).unwrap();

    assert_eq!(broker.publish(1), Stats::new(0, 1, 0));
    assert_eq!(broker.publish(2), Stats::new(0, 1, 0));
    assert_eq!(broker.publish(3), Stats::new(0, 0, 1));
    assert_eq!(rec.drain(), vec![1, 2]);
    assert_eq!(broker.publish(4), Stats::new(0, 1, 0));
    assert_eq!(rec.drain(), vec![4]);

    // Same name, same identity.
    let alias = Recorder::new("rec", 100);
    assert_eq!(broker.unsubscribe(&alias), Ok(Stats::new(0, 3, 1)));
}

#[test]
fn test_closed_mailbox_drops() {
    let broker: Broker<i32> = Broker::new();
    let (tx, rx) = mailbox::<i32>(8);
    broker.subscribe_all(tx.clone()).unwrap();
    drop(rx);

    assert!(tx.is_closed());
    assert_eq!(broker.publish(1), Stats::new(0, 0, 1));
    assert_eq!(broker.publish(2), Stats::new(0, 0, 1));
    assert_eq!(broker.stats(&tx), Ok(Stats::new(0, 0, 2)));
}

#[test]
fn test_values_are_independent_copies() {
    let broker: Broker<Vec<i32>> = Broker::new();
    let (a, mut ra) = mailbox::<Vec<i32>>(1);
    let (b, mut rb) = mailbox::<Vec<i32>>(1);
    broker.subscribe_all(a).unwrap();
    broker.subscribe_all(b).unwrap();

    broker.publish(vec![1, 2, 3]);
    let mut from_a = ra.try_recv().unwrap();
    from_a.push(4);
    assert_eq!(rb.try_recv(), Some(vec![1, 2, 3]));
}

#[test]
fn test_mailbox_minimum_capacity() {
    let (tx, rx) = mailbox::<i32>(0);
    assert_eq!(rx.capacity(), 1);
    assert_eq!(tx.id(), rx.id());
    assert_eq!(tx.try_deliver(1), Delivery::Accepted);
    assert_eq!(tx.try_deliver(2), Delivery::Full);
    assert_eq!(rx.len(), 1);
}

#[test]
fn test_mailbox_ids_unique() {
    let (a, _ra) = mailbox::<i32>(1);
    let (b, _rb) = mailbox::<i32>(1);
    assert_ne!(a.id(), b.id());
    assert_eq!(a.clone().id(), a.id());
}

#[test]
fn test_concurrent_publish_and_churn() {
    const PUBLISHERS: usize = 4;
    const PUBLISHES: usize = 500;
    const STABLE: usize = 3;
    const CHURNERS: usize = 3;
    const CHURN_ROUNDS: usize = 50;

    let broker: Arc<Broker<i32>> = Arc::new(Broker::new());

    let stable: Vec<_> = (0..STABLE)
        .map(|i| {
            let (tx, rx) = mailbox::<i32>(16 * (i + 1));
            broker.subscribe_all(tx.clone()).unwrap();
            (tx, rx)
        })
        .collect();

    let churners: Vec<_> = (0..CHURNERS)
        .map(|_| {
            let broker = Arc::clone(&broker);
            thread::spawn(move || {
                for _ in 0..CHURN_ROUNDS {
                    let (tx, mut rx) = mailbox::<i32>(4);
                    let seen = Arc::new(AtomicU64::new(0));
                    let counter = Arc::clone(&seen);
                    broker
                        .subscribe(tx.clone(), move |v: &i32| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            v % 2 == 0
                        })
                        .unwrap();
                    thread::yield_now();
                    let stats = broker.unsubscribe(&tx).unwrap();

                    // Each publish the subscriber was registered for ran its
                    // filter once and was counted exactly once.
                    assert_eq!(stats.total(), seen.load(Ordering::SeqCst));
                    let mut received = 0;
                    while rx.try_recv().is_some() {
                        received += 1;
                    }
                    assert_eq!(stats.sends, received);
                    assert!(broker.unsubscribe(&tx).is_err());
                }
            })
        })
        .collect();

    let publishers: Vec<_> = (0..PUBLISHERS)
        .map(|p| {
            let broker = Arc::clone(&broker);
            thread::spawn(move || {
                for i in 0..PUBLISHES {
                    let stats = broker.publish((p * PUBLISHES + i) as i32);
                    assert!(stats.total() >= STABLE as u64);
                }
            })
        })
        .collect();

    for handle in publishers.into_iter().chain(churners) {
        handle.join().unwrap();
    }

    assert_eq!(broker.len(), STABLE);
    let expected = (PUBLISHERS * PUBLISHES) as u64;
    for (tx, rx) in &stable {
        let stats = broker.stats(tx).unwrap();
        assert_eq!(stats.total(), expected);
        assert_eq!(stats.skips, 0);
        assert_eq!(stats.sends, rx.len() as u64);
    }
    for stats in broker.active_subscribers() {
        assert_eq!(stats.total(), expected);
    }
}
