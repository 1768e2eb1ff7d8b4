// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification fan-out to live observers
//!
//! Best-effort broadcast with a bounded buffer per subscriber. A subscriber
//! that falls behind loses the oldest events and is told how many it
//! missed; nothing is replayed to late joiners.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use wfm_core::event::matches_any;
use wfm_core::{Event, EventPattern};

#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Event>,
}

impl NotificationHub {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. Returns the number of receivers;
    /// having none is not an error.
    pub fn publish(&self, event: Event) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = %name, receivers, "published");
                receivers
            }
            Err(_) => {
                tracing::trace!(event = %name, "no subscribers");
                0
            }
        }
    }

    /// Subscribe to events whose names match any of `patterns` (all when empty)
    pub fn subscribe(&self, patterns: Vec<EventPattern>) -> Subscriber {
        Subscriber {
            rx: self.tx.subscribe(),
            patterns,
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscriber {
    rx: broadcast::Receiver<Event>,
    patterns: Vec<EventPattern>,
    missed: u64,
}

impl Subscriber {
    /// Next matching event; `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if matches_any(&self.patterns, &event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => self.lagged(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if matches_any(&self.patterns, &event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => self.lagged(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn lagged(&mut self, n: u64) {
        self.missed += n;
        tracing::warn!(missed = n, "subscriber lagged, oldest events dropped");
    }

    /// Total events dropped because this subscriber fell behind
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
