// crates/vstreamer-core/src/registry.rs
// ============================================================================
// Module: Stream Registry
// Description: Session-indexed registry of running streams per kind.
// Purpose: Track admitted streams and the in-flight count used for draining.
// Dependencies: tokio, crate::handle
// ============================================================================

//! ## Overview
//! [`StreamRegistry`] maps monotonically increasing [`SessionId`]s to stream
//! handles, partitioned by [`StreamKind`]. It is not synchronized itself; the
//! engine keeps it behind its single state lock together with the open flag
//! and the current schema snapshot.
//!
//! The in-flight count is published on a `tokio::sync::watch` channel so a
//! closing engine can wait for the drain after releasing the lock.
//!
//! Invariants:
//! - Session ids are never reused and are shared across all kinds.
//! - A live session appears in exactly one kind map.
//! - The in-flight count rises before a session becomes visible and falls
//!   only after it has been removed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::handle::EventStreamHandle;
use crate::handle::StreamError;
use crate::handle::StreamHandle;
use crate::handle::StreamKind;
use crate::snapshot::SchemaSnapshot;

// ============================================================================
// SECTION: Session Types
// ============================================================================

/// Unique session identifier issued at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw identifier.
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered stream handle tagged by kind.
#[derive(Clone)]
pub enum RegisteredStream {
    /// Event stream; receives schema pushes.
    Event(Arc<dyn EventStreamHandle>),
    /// Row stream.
    Row(Arc<dyn StreamHandle>),
    /// Result stream.
    Result(Arc<dyn StreamHandle>),
}

impl RegisteredStream {
    /// Returns the stream kind.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        match self {
            Self::Event(_) => StreamKind::Event,
            Self::Row(_) => StreamKind::Row,
            Self::Result(_) => StreamKind::Result,
        }
    }

    /// Runs the underlying handle.
    ///
    /// # Errors
    ///
    /// Returns the handle's [`StreamError`].
    pub async fn run(&self) -> Result<(), StreamError> {
        match self {
            Self::Event(handle) => handle.run().await,
            Self::Row(handle) | Self::Result(handle) => handle.run().await,
        }
    }

    /// Signals the underlying handle to stop.
    pub fn request_stop(&self) {
        match self {
            Self::Event(handle) => handle.request_stop(),
            Self::Row(handle) | Self::Result(handle) => handle.request_stop(),
        }
    }
}

/// Session summary for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub session_id: SessionId,
    /// Stream kind.
    pub kind: StreamKind,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of running streams.
pub struct StreamRegistry {
    /// Next session identifier to issue.
    next_id: u64,
    /// Running event streams.
    events: BTreeMap<SessionId, Arc<dyn EventStreamHandle>>,
    /// Running row streams.
    rows: BTreeMap<SessionId, Arc<dyn StreamHandle>>,
    /// Running result streams.
    results: BTreeMap<SessionId, Arc<dyn StreamHandle>>,
    /// In-flight session count.
    in_flight: watch::Sender<usize>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            next_id: 0,
            events: BTreeMap::new(),
            rows: BTreeMap::new(),
            results: BTreeMap::new(),
            in_flight,
        }
    }

    /// Registers a stream and returns its new session identifier.
    pub fn register(&mut self, stream: RegisteredStream) -> SessionId {
        self.in_flight.send_modify(|count| *count += 1);
        let session = SessionId::from_raw(self.next_id);
        self.next_id += 1;
        match stream {
            RegisteredStream::Event(handle) => {
                self.events.insert(session, handle);
            }
            RegisteredStream::Row(handle) => {
                self.rows.insert(session, handle);
            }
            RegisteredStream::Result(handle) => {
                self.results.insert(session, handle);
            }
        }
        session
    }

    /// Removes a session; returns false when it was not registered.
    pub fn remove(&mut self, kind: StreamKind, session: SessionId) -> bool {
        let removed = match kind {
            StreamKind::Event => self.events.remove(&session).is_some(),
            StreamKind::Row => self.rows.remove(&session).is_some(),
            StreamKind::Result => self.results.remove(&session).is_some(),
        };
        if removed {
            self.in_flight.send_modify(|count| *count = count.saturating_sub(1));
        }
        removed
    }

    /// Signals every registered stream to stop and returns how many were signalled.
    pub fn request_stop_all(&self) -> usize {
        for handle in self.events.values() {
            handle.request_stop();
        }
        for handle in self.rows.values().chain(self.results.values()) {
            handle.request_stop();
        }
        self.len()
    }

    /// Pushes a schema snapshot to every event stream and returns the count.
    pub fn broadcast_schema(&self, snapshot: &Arc<SchemaSnapshot>) -> usize {
        for handle in self.events.values() {
            handle.apply_schema(Arc::clone(snapshot));
        }
        self.events.len()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len() + self.rows.len() + self.results.len()
    }

    /// Returns true when no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of registered sessions of a kind.
    #[must_use]
    pub fn len_of(&self, kind: StreamKind) -> usize {
        match kind {
            StreamKind::Event => self.events.len(),
            StreamKind::Row => self.rows.len(),
            StreamKind::Result => self.results.len(),
        }
    }

    /// Returns true when the session is registered under any kind.
    #[must_use]
    pub fn contains(&self, session: SessionId) -> bool {
        self.events.contains_key(&session)
            || self.rows.contains_key(&session)
            || self.results.contains_key(&session)
    }

    /// Returns all registered sessions ordered by identifier.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .events
            .keys()
            .map(|id| (id, StreamKind::Event))
            .chain(self.rows.keys().map(|id| (id, StreamKind::Row)))
            .chain(self.results.keys().map(|id| (id, StreamKind::Result)))
            .map(|(id, kind)| SessionInfo {
                session_id: *id,
                kind,
            })
            .collect();
        sessions.sort_by_key(|info| info.session_id);
        sessions
    }

    /// Returns the number of session identifiers issued so far.
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.next_id
    }

    /// Returns the current in-flight count.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Returns a signal that resolves once the in-flight count reaches zero.
    #[must_use]
    pub fn drain_signal(&self) -> DrainSignal {
        DrainSignal {
            receiver: self.in_flight.subscribe(),
        }
    }
}

// ============================================================================
// SECTION: Drain Signal
// ============================================================================

/// Waits for the registry's in-flight count to reach zero.
pub struct DrainSignal {
    /// Receiver observing the in-flight count.
    receiver: watch::Receiver<usize>,
}

impl DrainSignal {
    /// Waits until no session is in flight.
    pub async fn wait(mut self) {
        // The sender lives as long as the registry, so an error only means
        // the registry was dropped and nothing is left to drain.
        let _ = self.receiver.wait_for(|count| *count == 0).await;
    }
}
