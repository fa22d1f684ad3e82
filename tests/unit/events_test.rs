//! Tests for event sinks and serialization

use prometheus_task_pool::core::{
    EventSink, InMemoryEventSink, PoolEvent, TaskId, TracingEventSink, WorkerId,
};

#[test]
fn test_in_memory_sink_filters() {
    let sink = InMemoryEventSink::new(100);
    sink.record(&PoolEvent::WorkerCreated {
        worker_id: WorkerId(1),
        total_workers: 1,
    });
    sink.record(&PoolEvent::TaskFailed {
        task_id: TaskId(4),
        worker_id: WorkerId(1),
        error: "boom".into(),
        attempts: 3,
    });

    let failures = sink.matching(|e| matches!(e, PoolEvent::TaskFailed { .. }));
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name(), "task-failed");
}

#[test]
fn test_event_round_trips_through_json() {
    let event = PoolEvent::ScaledUp {
        added: 3,
        total: 5,
        queue_size: 6,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains(r#""event":"scaled-up""#));
    let back: PoolEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn test_tracing_sink_accepts_events() {
    prometheus_task_pool::util::init_tracing();
    // A second call leaves the installed subscriber alone.
    prometheus_task_pool::util::init_tracing();
    TracingEventSink.record(&PoolEvent::Shutdown {
        tasks_completed: 1,
        tasks_failed: 0,
    });
}
