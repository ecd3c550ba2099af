// packages/engine/tests/recorder_properties.rs
//! Capacity and ordering laws of the event recorder

use proptest::prelude::*;
use wirelens_engine::recording::{EventPatch, EventRecorder, Headers, PartialEvent, TransportKind};

fn pending(n: usize) -> PartialEvent {
    PartialEvent::pending(
        format!("req-{}", n),
        TransportKind::RequestResponse,
        format!("http://svc.test/{}", n),
    )
}

proptest! {
    #[test]
    fn holds_most_recent_min_n_c(capacity in 1usize..32, appended in 0usize..96) {
        let recorder = EventRecorder::with_capacity(capacity);
        for n in 0..appended {
            recorder.append(pending(n));
        }

        let events = recorder.snapshot();
        prop_assert_eq!(events.len(), appended.min(capacity));

        let expected: Vec<String> = (appended.saturating_sub(capacity)..appended)
            .map(|n| format!("req-{}", n))
            .collect();
        let actual: Vec<String> = events.iter().map(|e| e.correlation_id.clone()).collect();
        prop_assert_eq!(actual, expected);

        prop_assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn updates_touch_only_their_event(order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
        let recorder = EventRecorder::with_capacity(8);
        for n in 0..8 {
            recorder.append(pending(n));
        }

        for n in order {
            recorder.update(
                &format!("req-{}", n),
                EventPatch::completed(Some(200 + n as u16), Headers::new(), None),
            );
        }

        for (n, event) in recorder.snapshot().iter().enumerate() {
            prop_assert_eq!(event.status_code, Some(200 + n as u16));
        }
    }
}

#[test]
fn test_capacity_three_keeps_last_three() {
    let recorder = EventRecorder::with_capacity(3);
    for n in 1..=5 {
        recorder.append(pending(n));
    }

    let ids: Vec<String> = recorder
        .snapshot()
        .into_iter()
        .map(|e| e.correlation_id)
        .collect();
    assert_eq!(ids, ["req-3", "req-4", "req-5"]);
    assert_eq!(recorder.stats().events_evicted, 2);
}
