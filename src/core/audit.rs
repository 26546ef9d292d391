//! Audit trail for job lifecycle events.
//!
//! Every acceptance, rejection, state change and cleanup result is recorded
//! as an [`AuditEvent`]. The bundled sink keeps a bounded in-memory buffer.

use std::collections::VecDeque;
use std::fmt;

use crate::core::model::{JobId, Stage};
use crate::util::clock::now_ms;

/// Lifecycle action recorded in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Request accepted and job record created.
    Accept,
    /// Request refused before a process was started.
    Reject,
    /// Job moved to a new status.
    Transition,
    /// Kill requested.
    Kill,
    /// Post-terminal cleanup finished.
    Cleanup,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Transition => "transition",
            Self::Kill => "kill",
            Self::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related job.
    pub job_id: JobId,
    /// Pipeline stage the event belongs to.
    pub stage: Stage,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: parking_lot::Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: parking_lot::Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events recorded for one job, oldest first.
    #[must_use]
    pub fn events_for(&self, job_id: &JobId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| &e.job_id == job_id)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if self.max_events > 0 && events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that forwards events to `tracing` only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "prometheus_job_runner::audit",
            job_id = %event.job_id,
            stage = ?event.stage,
            action = %event.action,
            payload = event.payload.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    job_id: &JobId,
    stage: Stage,
    action: AuditAction,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        job_id: job_id.clone(),
        stage,
        action,
        created_at_ms: now_ms(),
        payload,
    }
}
