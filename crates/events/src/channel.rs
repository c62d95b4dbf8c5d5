// In crates/events/src/channel.rs

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::{Error, Event, Result};

#[derive(Debug, Default)]
struct Queue {
    events: VecDeque<Event>,
    closed: bool,
}

/// An unbounded, ordered queue shared by every stage of the pipeline.
///
/// Any number of producers may `push` and any number of consumers may `pop`.
/// Events pushed by one producer are observed in the order they were pushed.
#[derive(Debug, Default)]
pub struct EventChannel {
    queue: Mutex<Queue>,
    notify: Notify,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        // A panicking producer cannot leave the deque half-written.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event. Never waits.
    pub fn push(&self, event: impl Into<Event>) -> Result<()> {
        let event = event.into();
        {
            let mut queue = self.lock();
            if queue.closed {
                return Err(Error::Closed);
            }
            tracing::trace!(kind = event.kind(), depth = queue.events.len() + 1, "event pushed");
            queue.events.push_back(event);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Appends every event of `events` while holding the lock once, so no other
    /// producer can interleave with the batch.
    pub fn push_all<I>(&self, events: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Event>,
    {
        let pushed = {
            let mut queue = self.lock();
            if queue.closed {
                return Err(Error::Closed);
            }
            let before = queue.events.len();
            queue.events.extend(events.into_iter().map(Into::into));
            queue.events.len() - before
        };
        for _ in 0..pushed {
            self.notify.notify_one();
        }
        Ok(())
    }

    /// Waits for the next event. Returns `None` once the channel is closed and drained.
    pub async fn pop(&self) -> Option<Event> {
        loop {
            // Registered before the check so a concurrent `close` cannot be missed.
            let notified = self.notify.notified();
            {
                let mut queue = self.lock();
                if let Some(event) = queue.events.pop_front() {
                    return Some(event);
                }
                if queue.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Takes the next event if one is queued.
    pub fn try_pop(&self) -> Option<Event> {
        self.lock().events.pop_front()
    }

    /// Refuses further pushes and wakes every waiting consumer.
    /// Events already queued can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }
}
