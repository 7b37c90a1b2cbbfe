//! Delivery endpoints.
//!
//! An [`Endpoint`] is anything the broker can hand a value to without
//! blocking. [`Mailbox`] is the stock implementation: a bounded tokio `mpsc`
//! queue whose `try_send` either enqueues immediately or refuses.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Result of a non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The endpoint had spare capacity and took the value.
    Accepted,
    /// The endpoint is at capacity.
    Full,
    /// The receiving side is gone.
    Closed,
}

impl Delivery {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Delivery::Accepted)
    }
}

/// A delivery target with an explicit identity and a fail-fast enqueue.
///
/// Identity is what the broker uses for duplicate detection and removal, so
/// two handles to the same target must report the same [`Endpoint::Id`].
pub trait Endpoint<T>: Send {
    type Id: Eq + Hash + Clone + fmt::Debug + Send;

    fn id(&self) -> Self::Id;

    /// Offers `value` to the endpoint. Must never block.
    fn try_deliver(&self, value: T) -> Delivery;
}

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Mailbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxId(u64);

impl MailboxId {
    fn next() -> Self {
        Self(NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mailbox-{}", self.0)
    }
}

/// Sending half of a bounded mailbox. Clones share the same identity.
#[derive(Debug)]
pub struct Mailbox<T> {
    id: MailboxId,
    sender: mpsc::Sender<T>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sender: self.sender.clone(),
        }
    }
}

/// Receiving half of a bounded mailbox.
#[derive(Debug)]
pub struct MailboxReceiver<T> {
    id: MailboxId,
    capacity: usize,
    receiver: mpsc::Receiver<T>,
}

/// Creates a bounded mailbox holding at most `capacity` undelivered values.
///
/// Minimum capacity is 1 (enforced).
pub fn mailbox<T>(capacity: usize) -> (Mailbox<T>, MailboxReceiver<T>) {
    let capacity = capacity.max(1);
    let id = MailboxId::next();
    let (sender, receiver) = mpsc::channel(capacity);
    (
        Mailbox { id, sender },
        MailboxReceiver {
            id,
            capacity,
            receiver,
        },
    )
}

impl<T> Mailbox<T> {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Whether the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<T: Send> Endpoint<T> for Mailbox<T> {
    type Id = MailboxId;

    fn id(&self) -> MailboxId {
        self.id
    }

    fn try_deliver(&self, value: T) -> Delivery {
        match self.sender.try_send(value) {
            Ok(()) => Delivery::Accepted,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

impl<T> MailboxReceiver<T> {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for the next value. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Takes a value if one is queued.
    pub fn try_recv(&mut self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(v) => Some(v),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Number of values currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
