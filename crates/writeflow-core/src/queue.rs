// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Ordered, prioritized, back-pressured event transport between producers
//! (a REPL, a provider adapter, a background watcher) and a single consumer
//! (the agent loop). Specialized for two goals: a zero-latency hand-off when
//! the consumer is already parked waiting for work, and graceful
//! back-pressure when producers outrun it.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};

/// One transported event. `T` is the producer-defined payload type — callers
/// typically instantiate this with their own closed enum of message kinds.
#[derive(Debug, Clone)]
pub struct Message<T> {
    pub id: u64,
    pub payload: T,
    /// Higher sorts earlier. Equal-priority messages preserve FIFO order.
    pub priority: i32,
    pub enqueued_at: Instant,
    pub source: String,
}

/// Point-in-time queue metrics, as returned by [`MessageQueue::metrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueMetrics {
    pub primary_len: usize,
    pub secondary_len: usize,
    pub back_pressure: bool,
    pub total_enqueued: u64,
    pub total_consumed: u64,
    /// Rolling average of `consume_timestamp - enqueue_timestamp`, in
    /// microseconds, over every message consumed so far.
    pub avg_latency_micros: u64,
}

struct Inner<T> {
    primary: VecDeque<Message<T>>,
    secondary: VecDeque<Message<T>>,
    closed: bool,
    back_pressure: bool,
    total_consumed: u64,
    total_latency_micros: u128,
}

/// A single-consumer, multi-producer-tolerant priority queue with a
/// zero-latency fast path and two-tier (primary/secondary) buffering.
///
/// See §4.A: `enqueue` delivers directly to a parked reader when one exists;
/// otherwise it inserts into `primary` at the position its priority dictates.
/// When `primary` crosses `high_water`, the tail half migrates to
/// `secondary` and `back_pressure` is raised; `iterate` drains `primary`
/// first and only promotes `secondary` once `primary` is empty, so a drain
/// cycle never reorders across the two tiers.
pub struct MessageQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    next_id: AtomicU64,
    capacity: usize,
    high_water: usize,
}

impl<T: Send + 'static> MessageQueue<T> {
    pub fn new(capacity: usize, high_water: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                primary: VecDeque::new(),
                secondary: VecDeque::new(),
                closed: false,
                back_pressure: false,
                total_consumed: 0,
                total_latency_micros: 0,
            }),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            capacity,
            high_water,
        }
    }

    /// Build from a [`writeflow_config::QueueConfig`] (capacity/high_water
    /// sizing; see the Open Questions note in `SPEC_FULL.md` for why the
    /// 10000/8000 defaults are preserved as-is).
    pub fn from_config(cfg: &writeflow_config::QueueConfig) -> Self {
        Self::new(cfg.capacity, cfg.high_water)
    }

    /// Enqueue `payload` with the given `priority` and `source` tag. Returns
    /// `false` (rejected) only when `primary` is already at hard capacity
    /// and there is no parked reader to hand off to directly.
    pub async fn enqueue(&self, payload: T, priority: i32, source: impl Into<String>) -> bool {
        let msg = Message {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            payload,
            priority,
            enqueued_at: Instant::now(),
            source: source.into(),
        };

        let mut inner = self.inner.lock().await;
        if inner.closed {
            return false;
        }

        // Zero-latency fast path: a parked reader with nothing buffered gets
        // the message directly — insert at the front of `primary` (which is
        // empty in that state) and wake it. This keeps the single insertion
        // code path below correct for both cases.
        if inner.primary.is_empty() && inner.secondary.is_empty() {
            inner.primary.push_back(msg);
            drop(inner);
            self.notify.notify_one();
            return true;
        }

        if inner.primary.len() + inner.secondary.len() >= self.capacity {
            return false;
        }

        // `secondary` holds what was already the logical tail of `primary`
        // before a high-water split, so ordering must be computed across
        // both buffers: only fall through to `secondary` once the message
        // ranks at or after everything currently in `primary`.
        match inner.primary.iter().position(|m| m.priority < msg.priority) {
            Some(idx) => inner.primary.insert(idx, msg),
            None if inner.secondary.is_empty() => inner.primary.push_back(msg),
            None => {
                let idx = inner
                    .secondary
                    .iter()
                    .position(|m| m.priority < msg.priority)
                    .unwrap_or(inner.secondary.len());
                inner.secondary.insert(idx, msg);
            }
        }

        if inner.primary.len() > self.high_water {
            let split_at = inner.primary.len() / 2;
            let tail = inner.primary.split_off(split_at);
            inner.secondary.extend(tail);
            inner.back_pressure = true;
        }

        drop(inner);
        self.notify.notify_one();
        true
    }

    /// Pop the next message in priority order, parking until one arrives or
    /// the queue is closed. Returns `None` only after `close()`.
    pub async fn next(&self) -> Option<Message<T>> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(msg) = inner.primary.pop_front() {
                    if inner.primary.is_empty() && !inner.secondary.is_empty() {
                        std::mem::swap(&mut inner.primary, &mut inner.secondary);
                        inner.back_pressure = false;
                    }
                    let latency = msg.enqueued_at.elapsed().as_micros();
                    inner.total_consumed += 1;
                    inner.total_latency_micros += latency;
                    return Some(msg);
                }
                if inner.primary.is_empty() && !inner.secondary.is_empty() {
                    std::mem::swap(&mut inner.primary, &mut inner.secondary);
                    inner.back_pressure = false;
                    continue;
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Wake any parked reader with end-of-stream; subsequent `enqueue`
    /// calls fail fast (return `false`) without touching the buffers.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.primary.is_empty() || !inner.secondary.is_empty() {
            tracing::warn!(
                primary = inner.primary.len(),
                secondary = inner.secondary.len(),
                "closing message queue with messages still buffered; dropping them"
            );
            inner.primary.clear();
            inner.secondary.clear();
        }
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn metrics(&self) -> QueueMetrics {
        let inner = self.inner.lock().await;
        let avg = if inner.total_consumed > 0 {
            (inner.total_latency_micros / inner.total_consumed as u128) as u64
        } else {
            0
        };
        QueueMetrics {
            primary_len: inner.primary.len(),
            secondary_len: inner.secondary.len(),
            back_pressure: inner.back_pressure,
            total_enqueued: self.next_id.load(Ordering::Relaxed) - 1,
            total_consumed: inner.total_consumed,
            avg_latency_micros: avg,
        }
    }
}

impl<T: Send + 'static> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new(10_000, 8_000)
    }
}

/// Convenience wrapper pairing a `MessageQueue` with a reusable `Arc`
/// handle, matching how the queue is shared between a producer task and
/// the agent loop's consumer task.
pub fn shared<T: Send + 'static>(cfg: &writeflow_config::QueueConfig) -> Arc<MessageQueue<T>> {
    Arc::new(MessageQueue::from_config(cfg))
}
