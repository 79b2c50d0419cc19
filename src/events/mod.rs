//! Per-job event channel
//!
//! Events from every job share one `tokio::broadcast` channel plus a bounded
//! replay ring. Sequence numbers are assigned and sent under the same lock,
//! so the ring and the live feed agree on a single total order. A subscriber
//! that attaches after a job started still receives that job's buffered
//! events first, then the live ones, and the stream ends after the job's
//! terminal event.
//!
//! A subscriber that falls behind the broadcast buffer refills itself from
//! the ring. Terminal events are also kept in a ring of their own, so a slow
//! reader still sees how its job ended even after busy neighbours pushed the
//! job's progress out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::jobs::{JobError, JobId, JobState, VideoSummary};

/// Global, strictly increasing event sequence number
pub type Sequence = u64;

/// Default replay ring size
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

const LOST_OUTCOME_MESSAGE: &str = "Event stream fell behind and the job outcome was lost";

/// Payload of a job event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        percent: u8,
        stage: JobState,
        message: String,
    },
    Complete {
        artifact_url: String,
        metadata: VideoSummary,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl JobEvent {
    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Progress { .. } => "progress",
            JobEvent::Complete { .. } => "complete",
            JobEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub seq: Sequence,
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: JobEvent,
}

#[derive(Debug)]
struct Ring {
    capacity: usize,
    next_seq: Sequence,
    events: VecDeque<EventEnvelope>,
    // Terminal events only, kept apart so they outlive busy neighbours
    terminals: VecDeque<EventEnvelope>,
}

/// Events recovered from the ring for one job
struct Replay {
    events: VecDeque<EventEnvelope>,
    terminal_lost: bool,
}

impl Ring {
    fn push(&mut self, envelope: EventEnvelope) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        if envelope.event.is_terminal() {
            if self.terminals.len() == self.capacity {
                self.terminals.pop_front();
            }
            self.terminals.push_back(envelope.clone());
        }
        self.events.push_back(envelope);
    }

    /// Buffered events of `job_id` with `seq > after`, terminal event last
    fn replay(&self, job_id: JobId, after: Sequence) -> Replay {
        let mut events: VecDeque<EventEnvelope> = self
            .events
            .iter()
            .filter(|e| e.job_id == job_id && e.seq > after)
            .cloned()
            .collect();

        let ended = events.back().is_some_and(|e| e.event.is_terminal());
        if !ended {
            let terminal = self
                .terminals
                .iter()
                .find(|e| e.job_id == job_id && e.seq > after)
                .cloned();
            events.extend(terminal);
        }

        // A full terminal ring that starts past `after` may have evicted ours
        let terminal_lost = !events.back().is_some_and(|e| e.event.is_terminal())
            && self.terminals.len() == self.capacity
            && self.terminals.front().is_some_and(|e| e.seq > after);

        Replay {
            events,
            terminal_lost,
        }
    }
}

/// Shared publisher/subscriber hub for job events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    ring: Arc<Mutex<Ring>>,
}

impl EventBus {
    /// Bus whose broadcast buffer and replay ring both hold `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            ring: Arc::new(Mutex::new(Ring {
                capacity,
                next_seq: 1,
                events: VecDeque::with_capacity(capacity),
                terminals: VecDeque::new(),
            })),
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    fn ring(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish an event for `job_id`, returning its sequence number
    pub fn publish(&self, job_id: JobId, event: JobEvent) -> Sequence {
        let mut ring = self.ring();

        let seq = ring.next_seq;
        ring.next_seq += 1;

        let envelope = EventEnvelope {
            seq,
            job_id,
            timestamp: Utc::now(),
            event,
        };
        ring.push(envelope.clone());

        debug!(%job_id, seq, kind = envelope.event.kind(), "Event published");
        // No receivers is fine: the ring keeps the event for late subscribers
        let _ = self.sender.send(envelope);
        seq
    }

    /// Subscribe to one job, replaying whatever the ring still holds for it
    pub fn subscribe(&self, job_id: JobId) -> JobEventStream {
        let ring = self.ring();
        let receiver = self.sender.subscribe();
        let backlog = ring.replay(job_id, 0).events;
        let horizon = ring.next_seq - 1;
        drop(ring);

        JobEventStream {
            job_id,
            backlog,
            receiver,
            ring: self.ring.clone(),
            last_seq: horizon,
            finished: false,
        }
    }

    /// Whether the ring still holds any event for `job_id`
    pub fn has_events(&self, job_id: JobId) -> bool {
        !self.ring().replay(job_id, 0).events.is_empty()
    }

    /// Buffered events for `job_id`, oldest first
    pub fn history(&self, job_id: JobId) -> Vec<EventEnvelope> {
        self.ring().replay(job_id, 0).events.into()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered events of a single job
pub struct JobEventStream {
    job_id: JobId,
    backlog: VecDeque<EventEnvelope>,
    receiver: broadcast::Receiver<EventEnvelope>,
    ring: Arc<Mutex<Ring>>,
    // Highest sequence seen, starting at the bus position when subscribing
    last_seq: Sequence,
    finished: bool,
}

impl JobEventStream {
    /// Next event, or `None` once the terminal event has been yielded
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(envelope) = self.backlog.pop_front() {
                return Some(self.accept(envelope));
            }

            match self.receiver.recv().await {
                Ok(envelope) if envelope.job_id == self.job_id && envelope.seq > self.last_seq => {
                    return Some(self.accept(envelope));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(job_id = %self.job_id, skipped, "Event subscriber lagged, resyncing");
                    self.resync();
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Refill the backlog from the ring after the live feed dropped events
    fn resync(&mut self) {
        let replay = self
            .ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replay(self.job_id, self.last_seq);
        self.backlog = replay.events;

        if replay.terminal_lost {
            let error = JobError::Unexpected(LOST_OUTCOME_MESSAGE.to_string());
            warn!(job_id = %self.job_id, "Terminal event evicted before delivery");
            self.backlog.push_back(EventEnvelope {
                seq: self.last_seq,
                job_id: self.job_id,
                timestamp: Utc::now(),
                event: JobEvent::Error {
                    kind: error.kind().to_string(),
                    message: error.to_string(),
                },
            });
        }
    }

    fn accept(&mut self, envelope: EventEnvelope) -> EventEnvelope {
        self.last_seq = self.last_seq.max(envelope.seq);
        if envelope.event.is_terminal() {
            self.finished = true;
        }
        envelope
    }
}
