//! Pipeline event system for collaborator surfaces.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that a late-attaching display surface
//! can catch up on stage lifecycle. Worker output lines pass through here
//! too; per-workflow ordering is the broadcast channel's send order.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{Stage, Workflow};

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 256;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Stage lifecycle -------------------------------------------------
    StageStarted {
        workflow: Workflow,
        stage: Stage,
    },
    /// One line of interleaved stdout/stderr from the running stage.
    StageLine {
        workflow: Workflow,
        stage: Stage,
        line: String,
    },
    StageEnded {
        workflow: Workflow,
        stage: Stage,
        exit_code: Option<i32>,
    },

    // -- Derived facts -----------------------------------------------------
    /// The disc title parsed out of the extraction info probe.
    MediaNameDetected {
        name: String,
    },
    /// A path the transcode workflow can adopt as its source now exists
    /// (a validated VOB directory, or the concatenated output file).
    SourcePathAvailable {
        path: PathBuf,
    },
    /// The transcode probe rebuilt the stream list.
    StreamsDiscovered {
        count: usize,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        // Store in ring buffer regardless of subscriber count.
        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.broadcast(EventPayload::StageStarted {
            workflow: Workflow::Extraction,
            stage: Stage::Info,
        });

        let event = rx.try_recv().unwrap();
        match &event.payload {
            EventPayload::StageStarted { workflow, stage } => {
                assert_eq!(*workflow, Workflow::Extraction);
                assert_eq!(*stage, Stage::Info);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn lines_arrive_in_send_order() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();

        for i in 0..10 {
            bus.broadcast(EventPayload::StageLine {
                workflow: Workflow::Transcode,
                stage: Stage::Run,
                line: format!("frame {i}"),
            });
        }

        for i in 0..10 {
            let event = rx.try_recv().unwrap();
            match event.payload {
                EventPayload::StageLine { line, .. } => {
                    assert_eq!(line, format!("frame {i}"));
                }
                other => panic!("unexpected payload: {:?}", other),
            }
        }
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(16);
        for _ in 0..(MAX_RECENT_EVENTS + 50) {
            bus.broadcast(EventPayload::StageEnded {
                workflow: Workflow::Extraction,
                stage: Stage::Run,
                exit_code: Some(0),
            });
        }
        let recent = bus.recent_events(MAX_RECENT_EVENTS + 100);
        assert_eq!(recent.len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::MediaNameDetected {
            name: "SOME_DISC".into(),
        });
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = Event::new(EventPayload::SourcePathAvailable {
            path: PathBuf::from("/tmp/out/SOME_DISC/VIDEO_TS"),
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
    }
}
