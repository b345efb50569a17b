//! Tests for conversation-level metrics on the telemetry context.

use std::sync::{Arc, Mutex};

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use companion::Result;
use companion::telemetry::{self, MetricsMirror, TelemetryContext};

/// Mirror that records conversation lengths.
#[derive(Default)]
struct RecordingMirror {
    lengths: Mutex<Vec<(String, u64)>>,
}

impl MetricsMirror for RecordingMirror {
    fn request(&self, _method: &str, _endpoint: &str, _ok: bool) -> Result<()> {
        Ok(())
    }

    fn ai_latency(&self, _model: &str, _seconds: f64, _ok: bool) -> Result<()> {
        Ok(())
    }

    fn conversation_length(&self, session_id: &str, message_count: u64) -> Result<()> {
        self.lengths
            .lock()
            .unwrap()
            .push((session_id.to_string(), message_count));
        Ok(())
    }
}

type SnapshotEntry = (
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
);

fn conversations(snapshot: &[SnapshotEntry], status: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == telemetry::CONVERSATIONS_TOTAL
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == "completion_status" && l.value() == status)
                && key.key().labels().any(|l| {
                    l.key() == "conversation_type" && l.value() == "mental_health_support"
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

#[test]
fn ongoing_and_completed_conversations_are_counted_apart() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let mirror = Arc::new(RecordingMirror::default());
    let context = TelemetryContext::builder("test-service")
        .mirror(mirror.clone())
        .build();

    metrics::with_local_recorder(&recorder, || {
        context.track_conversation("s1", 2, None);
        context.track_conversation("s1", 4, None);
        context.track_conversation("s1", 4, Some(5.0));
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(conversations(&snapshot, "ongoing"), 2);
    assert_eq!(conversations(&snapshot, "completed"), 1);

    let satisfaction: Vec<f64> = snapshot
        .iter()
        .filter(|(key, _, _, _)| key.key().name() == telemetry::USER_SATISFACTION)
        .flat_map(|(_, _, _, value)| match value {
            DebugValue::Histogram(values) => values.iter().map(|v| v.0).collect(),
            _ => Vec::new(),
        })
        .collect();
    assert_eq!(satisfaction, [5.0]);

    assert_eq!(
        *mirror.lengths.lock().unwrap(),
        [
            ("s1".to_string(), 2),
            ("s1".to_string(), 4),
            ("s1".to_string(), 4),
        ]
    );
}

#[test]
fn tracking_without_a_recorder_is_a_no_op() {
    let context = TelemetryContext::disabled("test-service");
    context.track_conversation("s1", 0, Some(1.0));
}
