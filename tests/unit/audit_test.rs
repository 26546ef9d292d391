//! Tests for audit sink

use prometheus_job_runner::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, JobId, Stage, TracingAuditSink,
};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let id = JobId::new("job1");

    let event = build_audit_event(&id, Stage::Submission, AuditAction::Accept, Some("payload".to_string()));
    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].job_id, id);
    assert_eq!(events[0].stage, Stage::Submission);
    assert_eq!(events[0].action, AuditAction::Accept);
    assert_eq!(events[0].payload.as_deref(), Some("payload"));
    assert!(!events[0].event_id.is_empty());
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    for id in ["job1", "job2", "job3"] {
        sink.record(build_audit_event(&JobId::new(id), Stage::Matching, AuditAction::Reject, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].job_id.as_str(), "job2"); // First one popped
    assert_eq!(events[1].job_id.as_str(), "job3");
}

#[test]
fn test_tracing_sink_accepts_events() {
    TracingAuditSink.record(build_audit_event(
        &JobId::new("job1"),
        Stage::Cleanup,
        AuditAction::Cleanup,
        None,
    ));
}
