//! Single-flight request queue.
//!
//! The queue owns every [`RequestEntry`] until it is dispatched. At most one
//! entry is current (in flight); the rest wait in FIFO order.
//!
//! # Admission
//!
//! ```text
//! enqueue(entry)
//!   ├─ delay set   → Deferred  (held outside the sequence until released)
//!   ├─ idle        → Dispatch  (entry becomes current)
//!   └─ busy        → Queued    (appended; oldest pending evicted past max)
//! ```
//!
//! The queue is a plain data structure: timers live in the engine loop,
//! which calls [`RequestQueue::release_delayed`] when a delay elapses.
//! Stale timers are harmless because each deferral carries a generation.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dispatch::RequestCallbacks;
use crate::identifiers::{RequestId, SourceId};
use crate::protocol::AjaxRequest;

// ============================================================================
// RequestEntry
// ============================================================================

/// A queued logical request.
#[derive(Clone)]
pub struct RequestEntry {
    /// The resolved request.
    pub request: AjaxRequest,
    /// Debounce delay.
    pub delay: Option<Duration>,
    /// Queue size override applied on enqueue.
    pub queue_size: Option<usize>,
    /// Request-scoped listeners.
    pub callbacks: RequestCallbacks,
}

impl RequestEntry {
    /// Creates an entry with no delay, override or callbacks.
    #[inline]
    #[must_use]
    pub fn new(request: AjaxRequest) -> Self {
        Self {
            request,
            delay: None,
            queue_size: None,
            callbacks: RequestCallbacks::default(),
        }
    }

    /// Returns the request id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.request.id
    }

    /// Returns the triggering element.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &SourceId {
        &self.request.source
    }
}

impl fmt::Debug for RequestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEntry")
            .field("id", &self.request.id)
            .field("source", &self.request.source)
            .field("delay", &self.delay)
            .field("queue_size", &self.queue_size)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Admission
// ============================================================================

/// Outcome of [`RequestQueue::enqueue`].
#[derive(Debug)]
pub enum Admission {
    /// The queue was idle: the entry is now current and must be sent.
    Dispatch(RequestEntry),

    /// The entry is waiting behind the current request.
    Queued {
        /// Entries dropped to keep the queue within its maximum size.
        evicted: Vec<RequestEntry>,
    },

    /// The entry is held until its delay elapses.
    Deferred {
        /// Source the deferral is keyed by.
        source: SourceId,
        /// Generation to pass back to [`RequestQueue::release_delayed`].
        generation: u64,
        /// Delay to wait.
        delay: Duration,
        /// A previously deferred entry for the same source, now replaced.
        replaced: Option<RequestEntry>,
    },
}

// ============================================================================
// RequestQueue
// ============================================================================

/// A deferred entry and its timer generation.
struct Delayed {
    generation: u64,
    entry: RequestEntry,
}

/// FIFO queue with a single current slot.
pub struct RequestQueue {
    pending: VecDeque<RequestEntry>,
    current: Option<RequestId>,
    max_size: Option<usize>,
    delayed: FxHashMap<SourceId, Delayed>,
    next_generation: u64,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RequestQueue {
    /// Creates a queue. `None` leaves the pending sequence unbounded.
    #[must_use]
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            max_size,
            delayed: FxHashMap::default(),
            next_generation: 0,
        }
    }

    /// Admits an entry.
    ///
    /// A queue-size override on the entry is applied first.
    pub fn enqueue(&mut self, mut entry: RequestEntry) -> Admission {
        if let Some(size) = entry.queue_size {
            self.set_max_size(Some(size));
        }

        match entry.delay.take() {
            Some(delay) if !delay.is_zero() => {
                self.next_generation += 1;
                let generation = self.next_generation;
                let source = entry.source().clone();

                // Keep the delay on the held entry so introspection reflects it.
                entry.delay = Some(delay);
                let replaced = self
                    .delayed
                    .insert(source.clone(), Delayed { generation, entry })
                    .map(|old| old.entry);

                debug!(source = %source, generation, ?delay, "Request deferred");

                Admission::Deferred {
                    source,
                    generation,
                    delay,
                    replaced,
                }
            }
            _ => self.admit(entry),
        }
    }

    /// Releases a deferred entry whose timer elapsed.
    ///
    /// Returns `None` if the deferral was replaced or cancelled since the
    /// timer was started.
    pub fn release_delayed(&mut self, source: &SourceId, generation: u64) -> Option<Admission> {
        let matches = self
            .delayed
            .get(source)
            .is_some_and(|delayed| delayed.generation == generation);

        if !matches {
            return None;
        }

        let mut entry = self.delayed.remove(source)?.entry;
        entry.delay = None;
        Some(self.admit(entry))
    }

    /// Pops the oldest pending entry and makes it current.
    ///
    /// Returns `None` if a request is in flight or nothing is pending.
    pub fn dequeue(&mut self) -> Option<RequestEntry> {
        if self.current.is_some() {
            return None;
        }
        let entry = self.pending.pop_front()?;
        self.current = Some(entry.id());
        Some(entry)
    }

    /// Clears the current slot and advances to the next pending entry.
    ///
    /// A mismatched id leaves the queue untouched.
    pub fn complete_current(&mut self, id: RequestId) -> Option<RequestEntry> {
        if self.current != Some(id) {
            debug!(request_id = %id, current = ?self.current, "Completion for non-current request");
            return None;
        }
        self.current = None;
        self.dequeue()
    }

    /// Drops every pending and deferred entry.
    ///
    /// The current request is unaffected. Returns the number of dropped entries.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.pending.len() + self.delayed.len();
        self.pending.clear();
        self.delayed.clear();
        debug!(dropped, "Queue cancelled");
        dropped
    }

    /// Changes the maximum pending size, trimming the oldest entries.
    pub fn set_max_size(&mut self, max_size: Option<usize>) -> Vec<RequestEntry> {
        self.max_size = max_size;
        self.trim()
    }

    /// Returns the maximum pending size.
    #[inline]
    #[must_use]
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Returns the id of the request in flight.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<RequestId> {
        self.current
    }

    /// Returns the number of pending (not current, not deferred) entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the number of deferred entries.
    #[inline]
    #[must_use]
    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    /// Returns pending ids in dispatch order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<RequestId> {
        self.pending.iter().map(RequestEntry::id).collect()
    }

    fn admit(&mut self, entry: RequestEntry) -> Admission {
        if self.current.is_none() && self.pending.is_empty() {
            self.current = Some(entry.id());
            return Admission::Dispatch(entry);
        }

        self.pending.push_back(entry);
        let evicted = self.trim();

        // An idle queue never holds a backlog.
        if self.current.is_none()
            && let Some(head) = self.dequeue()
        {
            return Admission::Dispatch(head);
        }

        Admission::Queued { evicted }
    }

    fn trim(&mut self) -> Vec<RequestEntry> {
        let Some(max) = self.max_size else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        while self.pending.len() > max {
            if let Some(oldest) = self.pending.pop_front() {
                debug!(request_id = %oldest.id(), max, "Evicting oldest pending request");
                evicted.push(oldest);
            }
        }
        evicted
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("current", &self.current)
            .field("pending", &self.pending.len())
            .field("delayed", &self.delayed.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
