use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of offering one published value to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The subscriber's filter rejected the value.
    Skip,
    /// The value was accepted by the subscriber's endpoint.
    Send,
    /// The endpoint was full or closed; the value was discarded.
    Drop,
}

/// Delivery statistics for one or more published values.
///
/// Returned by [`Broker::publish`](super::Broker::publish) for a single call,
/// and tracked cumulatively per subscriber.
///
/// Serializes as the three named fields `skips`, `sends` and `drops`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stats {
    /// Values not sent because of filtering rules.
    pub skips: u64,
    /// Values sent successfully.
    pub sends: u64,
    /// Values dropped because the subscriber could not take them.
    pub drops: u64,
}

impl Stats {
    pub const fn new(skips: u64, sends: u64, drops: u64) -> Self {
        Self {
            skips,
            sends,
            drops,
        }
    }

    /// Total number of values represented by the stats.
    pub fn total(&self) -> u64 {
        self.skips + self.sends + self.drops
    }

    /// Counts one outcome.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skip => self.skips += 1,
            Outcome::Send => self.sends += 1,
            Outcome::Drop => self.drops += 1,
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "skips={} sends={} drops={} total={}",
            self.skips,
            self.sends,
            self.drops,
            self.total()
        )
    }
}
