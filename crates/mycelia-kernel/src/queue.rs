//! Bounded FIFO message queue used as a subscriber inbox.
//!
//! Non-blocking `enqueue` applies the overflow policy when full; `enqueue_wait`
//! applies back-pressure instead and waits for space. Consumers either poll
//! (`dequeue`, `dequeue_batch`) or await (`recv`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use mycelia_core::error::{MyceliaError, Result};
use mycelia_core::message::{Message, MessageId};

/// What a full queue does with a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the head, accept the new message.
    #[default]
    DropOldest,
    /// Discard the incoming message.
    DropNewest,
    /// Fail with `QueueFull`.
    Reject,
}

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Queue was full; the incoming message was discarded.
    Dropped(MessageId),
    /// Queue was full; this older message was evicted to make room.
    Evicted(MessageId),
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    pub len: usize,
    pub capacity: usize,
    pub closed: bool,
}

struct QueueInner {
    buf: VecDeque<Message>,
    closed: bool,
}

enum Push {
    Done,
    Full(Message),
}

pub struct MessageQueue {
    inner: Mutex<QueueInner>,
    not_empty: Notify,
    not_full: Notify,
    capacity: usize,
    overflow: OverflowPolicy,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
}

impl MessageQueue {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                buf: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            capacity,
            overflow,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    // A poisoned lock only means another thread panicked mid-operation; the
    // VecDeque itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Non-blocking enqueue. Applies the overflow policy when full.
    pub fn enqueue(&self, msg: Message) -> Result<EnqueueOutcome> {
        let outcome = {
            let mut g = self.lock();
            if g.closed {
                return Err(MyceliaError::QueueClosed);
            }
            if g.buf.len() < self.capacity {
                g.buf.push_back(msg);
                EnqueueOutcome::Accepted
            } else {
                match self.overflow {
                    OverflowPolicy::Reject => return Err(MyceliaError::QueueFull),
                    OverflowPolicy::DropNewest => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return Ok(EnqueueOutcome::Dropped(msg.id));
                    }
                    OverflowPolicy::DropOldest => {
                        let evicted = g.buf.pop_front().map(|m| m.id).unwrap_or_default();
                        g.buf.push_back(msg);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        EnqueueOutcome::Evicted(evicted)
                    }
                }
            }
        };
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
        Ok(outcome)
    }

    fn try_push(&self, msg: Message) -> Result<Push> {
        let mut g = self.lock();
        if g.closed {
            return Err(MyceliaError::QueueClosed);
        }
        if g.buf.len() >= self.capacity {
            return Ok(Push::Full(msg));
        }
        g.buf.push_back(msg);
        drop(g);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
        Ok(Push::Done)
    }

    /// Enqueue with back-pressure: wait until there is room.
    /// A zero `timeout` waits indefinitely.
    pub async fn enqueue_wait(&self, msg: Message, timeout: Duration) -> Result<()> {
        let wait = async {
            let mut msg = msg;
            loop {
                let notified = self.not_full.notified();
                match self.try_push(msg) {
                    Ok(Push::Done) => return Ok(()),
                    Ok(Push::Full(back)) => msg = back,
                    Err(e) => return Err(e),
                }
                notified.await;
            }
        };

        if timeout.is_zero() {
            wait.await
        } else {
            tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| MyceliaError::Timeout)?
        }
    }

    pub fn dequeue(&self) -> Option<Message> {
        let msg = self.lock().buf.pop_front()?;
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.not_full.notify_one();
        Some(msg)
    }

    pub fn dequeue_batch(&self, max: usize) -> Vec<Message> {
        let out: Vec<Message> = {
            let mut g = self.lock();
            let n = max.min(g.buf.len());
            g.buf.drain(..n).collect()
        };
        if !out.is_empty() {
            self.dequeued.fetch_add(out.len() as u64, Ordering::Relaxed);
            self.not_full.notify_waiters();
            self.not_full.notify_one();
        }
        out
    }

    /// Await the next message. Returns `None` once closed and drained.
    pub async fn recv(&self) -> Option<Message> {
        loop {
            let notified = self.not_empty.notified();
            {
                let mut g = self.lock();
                if let Some(msg) = g.buf.pop_front() {
                    drop(g);
                    self.dequeued.fetch_add(1, Ordering::Relaxed);
                    self.not_full.notify_one();
                    return Some(msg);
                }
                if g.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Refuse further enqueues and wake every waiter. Queued messages stay
    /// dequeuable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn stats(&self) -> QueueStats {
        let (len, closed) = {
            let g = self.lock();
            (g.buf.len(), g.closed)
        };
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            len,
            capacity: self.capacity,
            closed,
        }
    }
}
